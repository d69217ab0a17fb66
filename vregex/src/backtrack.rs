//! The backtracking engine.
//!
//! Executes a compiled byte program with two explicit stacks instead of host
//! recursion: `regstack` holds one tagged item per decision point, `backpos`
//! remembers the input position last seen at each `BACK` so a loop that
//! makes no progress fails instead of spinning. Star/brace closures first
//! consume greedily with `regrepeat`, then back off one char at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::buffer::{decode_char, prev_char_len, LineProvider, Pos, VisualMode};
use crate::error::MatchFailure;
use crate::prog::{next_in, op, operand, operand_u32, BtProgram, REGMAGIC};
use crate::submatch::Submatches;
use crate::syntax::ProgFlags;
use vregex_unicode::ascii;
use vregex_unicode::case::{is_composing, CharCaseExt};

/// Everything the engines need from the caller for one search.
pub(crate) struct ExecEnv<'a> {
    pub provider: &'a dyn LineProvider,
    /// Absolute line the search starts in (1-based).
    pub firstlnum: u32,
    /// Lines below `firstlnum` still available (0 for a string match).
    pub maxline: u32,
    /// Multi-line search: `\n` atoms advance to the next line.
    pub multi: bool,
    /// `\n` bytes in the line are line breaks.
    pub line_lbr: bool,
    pub ignore_case: bool,
    pub maxcol: u32,
    pub deadline: Option<Instant>,
    pub interrupt: Option<&'a AtomicBool>,
    pub nobreak: bool,
    /// External `\z1`..`\z9` texts from a previous match.
    pub z_in: Option<&'a [Option<String>; 10]>,
    /// Byte budget for the runtime stacks.
    pub max_mem: usize,
}

impl<'a> ExecEnv<'a> {
    fn getline(&self, rel: u32) -> &'a [u8] {
        self.provider.line(self.firstlnum.saturating_add(rel))
    }
}

/// Result of one engine run.
pub(crate) struct EngineOutcome {
    /// 0 for no match, else the 1-based number of lines the match spans.
    pub lines: u32,
    pub subs: Submatches,
    pub zsubs: Option<Box<[Option<String>; 10]>>,
    pub failure: Option<MatchFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SPos {
    lnum: u32,
    col: u32,
}

#[derive(Debug, Clone, Copy)]
struct Save {
    pos: SPos,
    backpos_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegState {
    Nopen,
    Mopen,
    Mclose,
    Zopen,
    Zclose,
    Branch,
    BrcplxMore,
    BrcplxLong,
    BrcplxShort,
    /// Also used for MATCH and SUBPAT; `no` holds the opcode.
    Nomatch,
    Behind1,
    Behind2,
    StarLong,
    StarShort,
}

#[derive(Clone, Copy)]
struct RegItem {
    state: RegState,
    no: u8,
    /// Node this item belongs to; for `Branch` the next alternative.
    scan: usize,
    /// Saved submatch slot (for open/close states).
    save_slot: Option<SPos>,
    /// Saved input position.
    save: Save,
}

#[derive(Clone, Copy)]
struct BackPos {
    scan: usize,
    pos: Save,
}

#[derive(Clone, Copy)]
struct RegStar {
    /// First byte of a following EXACTLY, to skip useless tries.
    nextb: Option<(u8, u8)>,
    count: i64,
    minval: i64,
    maxval: i64,
}

#[derive(Clone, Copy)]
struct RegBehind {
    save_after: Save,
    save_behind: Option<SPos>,
    save_need_clear: bool,
    save_start: [Option<SPos>; 10],
    save_end: [Option<SPos>; 10],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ra {
    Fail,
    Cont,
    Break,
    Match,
    NoMatch,
}

const MAX_LIMIT: i64 = 32767 << 16;
// Rough per-item byte costs for the memory budget.
const ITEM_COST: usize = 64;

struct BtMatcher<'a> {
    prog: &'a BtProgram,
    env: &'a ExecEnv<'a>,
    reg_ic: bool,
    icombine: bool,

    lnum: u32,
    line: &'a [u8],
    col: usize,

    sub_start: [Option<SPos>; 10],
    sub_end: [Option<SPos>; 10],
    z_start: [Option<SPos>; 10],
    z_end: [Option<SPos>; 10],
    need_clear_sub: bool,
    need_clear_z: bool,

    regstack: Vec<RegItem>,
    backpos: Vec<BackPos>,
    star_stack: Vec<RegStar>,
    behind_stack: Vec<RegBehind>,
    behind_pos: Option<SPos>,

    bl_minval: i64,
    bl_maxval: i64,
    brace_min: [i64; 10],
    brace_max: [i64; 10],
    brace_count: [i64; 10],

    op_count: u32,
    failure: Option<MatchFailure>,
}

pub(crate) fn exec(prog: &BtProgram, env: &ExecEnv, col: u32) -> EngineOutcome {
    let mut m = BtMatcher {
        prog,
        env,
        reg_ic: if prog.flags.contains(ProgFlags::ICASE) {
            true
        } else if prog.flags.contains(ProgFlags::NOICASE) {
            false
        } else {
            env.ignore_case
        },
        icombine: prog.flags.contains(ProgFlags::ICOMBINE),
        lnum: 0,
        line: env.getline(0),
        col: 0,
        sub_start: [None; 10],
        sub_end: [None; 10],
        z_start: [None; 10],
        z_end: [None; 10],
        need_clear_sub: true,
        need_clear_z: true,
        regstack: Vec::new(),
        backpos: Vec::new(),
        star_stack: Vec::new(),
        behind_stack: Vec::new(),
        behind_pos: None,
        bl_minval: 0,
        bl_maxval: 0,
        brace_min: [0; 10],
        brace_max: [0; 10],
        brace_count: [0; 10],
        op_count: 0,
        failure: None,
    };
    let lines = m.exec_both(col);
    let (subs, zsubs) = m.collect_subs(lines > 0);
    EngineOutcome { lines, subs, zsubs, failure: m.failure }
}

impl<'a> BtMatcher<'a> {
    fn cur_pos(&self) -> SPos {
        SPos { lnum: self.lnum, col: self.col as u32 }
    }

    fn set_pos(&mut self, pos: SPos) {
        if pos.lnum != self.lnum {
            self.lnum = pos.lnum;
            self.line = self.env.getline(pos.lnum);
        }
        self.col = pos.col as usize;
    }

    fn reg_save(&self) -> Save {
        Save { pos: self.cur_pos(), backpos_len: self.backpos.len() }
    }

    fn reg_restore(&mut self, save: Save) {
        self.set_pos(save.pos);
        self.backpos.truncate(save.backpos_len);
    }

    fn save_equal(&self, save: &Save) -> bool {
        self.cur_pos() == save.pos
    }

    fn at_eol(&self) -> bool {
        self.col >= self.line.len()
    }

    fn cur_char(&self) -> Option<(char, usize)> {
        if self.at_eol() {
            None
        } else {
            Some(decode_char(self.line, self.col))
        }
    }

    fn prev_char(&self) -> Option<char> {
        let len = prev_char_len(self.line, self.col);
        if len == 0 {
            None
        } else {
            Some(decode_char(self.line, self.col - len).0)
        }
    }

    fn advance(&mut self) {
        if let Some((_, len)) = self.cur_char() {
            self.col += len;
        }
    }

    fn nextline(&mut self) {
        self.lnum += 1;
        self.line = self.env.getline(self.lnum);
        self.col = 0;
    }

    fn interrupted(&mut self) -> bool {
        if self.env.nobreak {
            return false;
        }
        if let Some(flag) = self.env.interrupt {
            if flag.load(Ordering::Relaxed) {
                self.failure = Some(MatchFailure::Interrupted);
                return true;
            }
        }
        false
    }

    /// Deadline check, once in a 100 times to avoid overhead.
    fn timed_out(&mut self) -> bool {
        self.op_count += 1;
        if self.op_count < 100 {
            return false;
        }
        self.op_count = 0;
        if self.interrupted() {
            return true;
        }
        if let Some(deadline) = self.env.deadline {
            if Instant::now() >= deadline {
                self.failure = Some(MatchFailure::TimedOut);
                return true;
            }
        }
        false
    }

    fn stacks_over_budget(&mut self) -> bool {
        let used = (self.regstack.len()
            + self.backpos.len()
            + self.star_stack.len()
            + self.behind_stack.len() * 4)
            * ITEM_COST;
        if used > self.env.max_mem {
            self.failure = Some(MatchFailure::TooMuchMemory);
            true
        } else {
            false
        }
    }

    fn push_item(&mut self, item: RegItem) -> bool {
        if self.stacks_over_budget() {
            return false;
        }
        self.regstack.push(item);
        true
    }

    fn opcode(&self, pos: usize) -> u8 {
        self.prog.code[pos]
    }

    fn regnext(&self, pos: usize) -> Option<usize> {
        next_in(&self.prog.code, pos)
    }

    fn operand_str(&self, pos: usize) -> &[u8] {
        let bytes = &self.prog.code[operand(pos)..];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        &bytes[..end]
    }

    fn cleanup_subexpr(&mut self) {
        if self.need_clear_sub {
            self.sub_start = [None; 10];
            self.sub_end = [None; 10];
            self.need_clear_sub = false;
        }
    }

    fn cleanup_zsubexpr(&mut self) {
        if self.need_clear_z {
            self.z_start = [None; 10];
            self.z_end = [None; 10];
            self.need_clear_z = false;
        }
    }

    fn chars_eq(&self, a: char, b: char) -> bool {
        chars_eq(self.reg_ic, a, b)
    }

    /// Does `c` occur in the collection operand?
    fn set_contains(&self, set: &[u8], c: char) -> bool {
        set_contains(self.reg_ic, set, c)
    }

    fn class_ok(&self, base: u8, c: char) -> bool {
        class_ok(self.env.provider.chartab(), base, c)
    }

    /// Virtual column of `col` in the current line, tabs every 8 cells.
    fn vcol_at(&self, line: &[u8], col: usize) -> u32 {
        let mut vcol = 0u32;
        let mut i = 0;
        while i < col && i < line.len() {
            let (c, len) = decode_char(line, i);
            vcol += match c {
                '\t' => 8 - (vcol % 8),
                c if c as u32 >= 0x1100 => 2, // rough wide-char heuristic
                _ => 1,
            };
            i += len;
        }
        vcol
    }

    fn abs_lnum(&self) -> u32 {
        self.env.firstlnum + self.lnum
    }

    fn num_cmp(val: u32, n: u32, cmp: u8) -> bool {
        match cmp {
            b'>' => val > n,
            b'<' => val < n,
            _ => val == n,
        }
    }

    fn match_visual(&self) -> bool {
        let Some((mode, start, end)) = self.env.provider.visual() else {
            return false;
        };
        let (top, bot) =
            if (start.lnum, start.col) <= (end.lnum, end.col) {
                (start, end)
            } else {
                (end, start)
            };
        let lnum = self.abs_lnum();
        let col = self.col as u32;
        if lnum < top.lnum || lnum > bot.lnum {
            return false;
        }
        match mode {
            VisualMode::Line => true,
            VisualMode::Char => {
                !(lnum == top.lnum && col < top.col)
                    && !(lnum == bot.lnum && col > bot.col)
            }
            VisualMode::Block => {
                let start_v = self.vcol_at(
                    self.env.provider.line(top.lnum),
                    top.col as usize,
                );
                let end_v = self.vcol_at(
                    self.env.provider.line(bot.lnum),
                    bot.col as usize,
                );
                let (lo, hi) =
                    (start_v.min(end_v), start_v.max(end_v));
                let v = self.vcol_at(self.line, self.col);
                v >= lo && v <= hi
            }
        }
    }

    fn match_mark(&self, scan: usize) -> bool {
        let name = self.prog.code[operand(scan)] as char;
        let cmp = self.prog.code[operand(scan) + 1];
        let Some(pos) = self.env.provider.mark(name) else {
            return false;
        };
        if pos.lnum == 0 {
            return false;
        }
        let here = (self.abs_lnum(), self.col as u32);
        let there = (pos.lnum, pos.col);
        if there == here {
            !(cmp == b'<' || cmp == b'>')
        } else if there < here {
            cmp == b'>'
        } else {
            cmp == b'<'
        }
    }

    /// Compare the operand of an EXACTLY node at the current position,
    /// advancing over the matched text.
    fn match_exactly(&mut self, scan: usize, next_pos: Option<usize>) -> bool {
        let opnd = self.operand_str(scan);
        if opnd.is_empty() {
            return true;
        }
        let text = std::str::from_utf8(opnd).unwrap_or("");
        let mut col = self.col;
        for pc in text.chars() {
            if self.icombine && is_composing(pc as u32) {
                continue;
            }
            loop {
                if col >= self.line.len() {
                    return false;
                }
                let (ic_, len) = decode_char(self.line, col);
                if self.icombine && is_composing(ic_ as u32) {
                    col += len;
                    continue;
                }
                if !self.chars_eq(pc, ic_) {
                    return false;
                }
                col += len;
                break;
            }
        }
        // An unmatched composing char on the input side fails the match,
        // unless \%C follows or \Z is active.
        if !self.icombine
            && next_pos.map(|p| self.opcode(p)) != Some(op::RE_COMPOSING)
            && col < self.line.len()
        {
            let (c, _) = decode_char(self.line, col);
            if is_composing(c as u32) {
                return false;
            }
        }
        self.col = col;
        true
    }

    fn match_multibyte(&mut self, scan: usize) -> bool {
        let code = &self.prog.code;
        let o = operand(scan);
        let (oc, olen) = decode_char(code, o);
        if olen < 2 {
            return false;
        }
        if is_composing(oc as u32) {
            // A lone composing char matches that composing char at any
            // position where it appears.
            let mut i = self.col;
            while i < self.line.len() {
                let (c, len) = decode_char(self.line, i);
                if !is_composing(c as u32) {
                    if i > self.col {
                        break;
                    }
                } else if c == oc {
                    self.col = i + len;
                    return true;
                }
                i += len;
            }
            return false;
        }
        match self.cur_char() {
            Some((c, len)) if self.chars_eq(c, oc) => {
                self.col += len;
                true
            }
            _ => false,
        }
    }

    /// Match the text captured by group `no` again at the current position.
    fn match_backref(&mut self, no: usize) -> bool {
        let (Some(s), Some(e)) = (self.sub_start[no], self.sub_end[no])
        else {
            // Backref was not set: match an empty string.
            return true;
        };
        let mut rl = s.lnum;
        let mut rc = s.col as usize;
        loop {
            let ref_line = self.env.getline(rl);
            let seg_end =
                if rl == e.lnum { e.col as usize } else { ref_line.len() };
            let mut i = rc;
            while i < seg_end {
                let (pc, plen) = decode_char(ref_line, i);
                match self.cur_char() {
                    Some((c, len)) if self.chars_eq(pc, c) => {
                        self.col += len;
                    }
                    _ => return false,
                }
                i += plen;
            }
            if rl >= e.lnum {
                return true;
            }
            // The captured text continues on the next line; the input must
            // consume a line break here too.
            if !self.at_eol() || self.lnum > self.env.maxline {
                return false;
            }
            self.nextline();
            rl += 1;
            rc = 0;
        }
    }

    fn match_zref(&mut self, no: usize) -> bool {
        let text = self
            .env
            .z_in
            .and_then(|z| z[no].as_deref())
            .unwrap_or("");
        for pc in text.chars() {
            match self.cur_char() {
                Some((c, len)) if self.chars_eq(pc, c) => self.col += len,
                _ => return false,
            }
        }
        true
    }

    /// Repeat the simple operand at `p` up to `maxcount` times, consuming
    /// greedily. Returns how many it matched.
    fn regrepeat(&mut self, p: usize, maxcount: i64) -> i64 {
        let mut count: i64 = 0;
        let opcode = self.opcode(p);
        let with_nl = op::with_nl(opcode);
        let base = if with_nl { opcode - op::ADD_NL } else { opcode };

        macro_rules! try_linebreak {
            () => {{
                // At end of line: cross it for +NL variants. One extra
                // empty line exists past the last one.
                if !self.env.multi
                    || !with_nl
                    || self.lnum > self.env.maxline
                    || self.env.line_lbr
                {
                    break;
                }
                self.nextline();
            }};
        }

        match base {
            op::ANY => {
                while count < maxcount {
                    match self.cur_char() {
                        Some((_, len)) => self.col += len,
                        None => try_linebreak!(),
                    }
                    count += 1;
                }
            }
            op::EXACTLY => {
                // Single char; multi-byte would have used MULTIBYTECODE.
                let c = self.operand_str(p).first().copied().unwrap_or(0)
                    as char;
                while count < maxcount {
                    match self.cur_char() {
                        Some((ic_, len))
                            if self.chars_eq(c, ic_) && len == 1 =>
                        {
                            self.col += len
                        }
                        _ => break,
                    }
                    count += 1;
                }
            }
            op::MULTIBYTECODE => {
                let (oc, olen) =
                    decode_char(&self.prog.code, operand(p));
                if olen < 2 {
                    return 0;
                }
                while count < maxcount {
                    match self.cur_char() {
                        Some((c, len)) if self.chars_eq(c, oc) => {
                            self.col += len
                        }
                        _ => break,
                    }
                    count += 1;
                }
            }
            op::ANYOF | op::ANYBUT => {
                let set = self.operand_str(p).to_vec();
                let want = base == op::ANYOF;
                while count < maxcount {
                    match self.cur_char() {
                        Some((c, len))
                            if self.set_contains(&set, c) == want =>
                        {
                            self.col += len
                        }
                        Some((c, len))
                            if self.env.line_lbr
                                && c == '\n'
                                && with_nl =>
                        {
                            self.col += len
                        }
                        Some(_) => break,
                        None => try_linebreak!(),
                    }
                    count += 1;
                }
            }
            op::NEWL => {
                while count < maxcount {
                    if self.env.line_lbr {
                        match self.cur_char() {
                            Some(('\n', len)) => self.col += len,
                            _ => break,
                        }
                    } else if self.at_eol()
                        && self.env.multi
                        && self.lnum <= self.env.maxline
                    {
                        self.nextline();
                    } else {
                        break;
                    }
                    count += 1;
                }
            }
            _ => {
                // One of the single-char classes.
                while count < maxcount {
                    match self.cur_char() {
                        Some((c, len)) if self.class_ok(base, c) => {
                            self.col += len
                        }
                        Some((c, len))
                            if self.env.line_lbr
                                && c == '\n'
                                && with_nl =>
                        {
                            self.col += len
                        }
                        Some(_) => break,
                        None => try_linebreak!(),
                    }
                    count += 1;
                }
            }
        }
        count
    }

    fn save_subexpr(&self) -> RegBehind {
        RegBehind {
            save_after: Save {
                pos: SPos { lnum: 0, col: 0 },
                backpos_len: 0,
            },
            save_behind: None,
            save_need_clear: self.need_clear_sub,
            save_start: if self.need_clear_sub {
                [None; 10]
            } else {
                self.sub_start
            },
            save_end: if self.need_clear_sub {
                [None; 10]
            } else {
                self.sub_end
            },
        }
    }

    fn restore_subexpr(&mut self, bp: &RegBehind) {
        self.need_clear_sub = bp.save_need_clear;
        if !bp.save_need_clear {
            self.sub_start = bp.save_start;
            self.sub_end = bp.save_end;
        }
    }

    /// Main matching routine: true when the program matches here, leaving
    /// the position just after the last matched char.
    fn regmatch(&mut self, start: usize) -> bool {
        self.regstack.clear();
        self.backpos.clear();
        self.star_stack.clear();
        self.behind_stack.clear();

        let mut scan: Option<usize> = Some(start);
        let mut status;

        'outer: loop {
            if self.interrupted() {
                return false;
            }

            // Items that match sequentially, without using the regstack.
            'inner: loop {
                let Some(pos) = scan else {
                    status = Ra::Fail;
                    break 'inner;
                };
                if self.timed_out() {
                    status = Ra::Fail;
                    break 'inner;
                }
                status = Ra::Cont;

                let mut next = self.regnext(pos);
                let op_raw = self.opcode(pos);

                // A class with NL added matches at the end of line.
                if !self.env.line_lbr
                    && op::with_nl(op_raw)
                    && self.env.multi
                    && self.at_eol()
                    && self.lnum <= self.env.maxline
                {
                    self.nextline();
                } else if self.env.line_lbr
                    && op::with_nl(op_raw)
                    && self.cur_char().map(|(c, _)| c) == Some('\n')
                {
                    self.advance();
                } else {
                    let opcode = if op::with_nl(op_raw) {
                        op_raw - op::ADD_NL
                    } else {
                        op_raw
                    };
                    status = self.step(pos, opcode, &mut next);
                }

                if status != Ra::Cont {
                    break 'inner;
                }
                scan = next;
            }

            // Execute the code for the states on the regstack; pop until an
            // item resumes the inner loop or the stack drains.
            while !self.regstack.is_empty() && status != Ra::Fail {
                let before = self.regstack.len();
                status = self.unwind_one(&mut scan, status);
                if status == Ra::Cont || self.regstack.len() == before {
                    break;
                }
            }

            if status == Ra::Cont {
                continue 'outer;
            }
            if self.regstack.is_empty() || status == Ra::Fail {
                return status == Ra::Match;
            }
        }
    }

    /// One sequential opcode. Returns the status; `next` may be redirected
    /// into an operand.
    fn step(
        &mut self,
        pos: usize,
        opcode: u8,
        next: &mut Option<usize>,
    ) -> Ra {
        match opcode {
            op::BOL => {
                if self.col != 0 {
                    return Ra::NoMatch;
                }
            }
            op::EOL => {
                if !self.at_eol() {
                    return Ra::NoMatch;
                }
            }
            op::RE_BOF => {
                // Not at the start of the file when below the line the
                // search started in, or that line isn't line one.
                if self.lnum != 0
                    || self.col != 0
                    || (self.env.multi && self.env.firstlnum > 1)
                {
                    return Ra::NoMatch;
                }
            }
            op::RE_EOF => {
                if self.lnum != self.env.maxline || !self.at_eol() {
                    return Ra::NoMatch;
                }
            }
            op::CURSOR => {
                let here =
                    Pos::new(self.abs_lnum(), self.col as u32);
                if self.env.provider.cursor() != Some(here) {
                    return Ra::NoMatch;
                }
            }
            op::RE_MARK => {
                if !self.match_mark(pos) {
                    return Ra::NoMatch;
                }
            }
            op::RE_VISUAL => {
                if !self.match_visual() {
                    return Ra::NoMatch;
                }
            }
            op::RE_LNUM => {
                let (n, cmp) = self.pos_pred_operand(pos, PosPred::Lnum);
                if !self.env.multi
                    || !Self::num_cmp(self.abs_lnum(), n, cmp)
                {
                    return Ra::NoMatch;
                }
            }
            op::RE_COL => {
                let (n, cmp) = self.pos_pred_operand(pos, PosPred::Col);
                if !Self::num_cmp(self.col as u32 + 1, n, cmp) {
                    return Ra::NoMatch;
                }
            }
            op::RE_VCOL => {
                let (n, cmp) = self.pos_pred_operand(pos, PosPred::Vcol);
                let v = self.vcol_at(self.line, self.col) + 1;
                if !Self::num_cmp(v, n, cmp) {
                    return Ra::NoMatch;
                }
            }
            op::BOW => {
                let tab = self.env.provider.chartab();
                match self.cur_char() {
                    None => return Ra::NoMatch,
                    Some((c, _)) => {
                        let this_class = tab.char_class(c);
                        if this_class <= 1 {
                            return Ra::NoMatch; // not on a word at all
                        }
                        if let Some(p) = self.prev_char() {
                            if tab.char_class(p) == this_class {
                                return Ra::NoMatch; // still in same word
                            }
                        }
                    }
                }
            }
            op::EOW => {
                if self.col == 0 {
                    return Ra::NoMatch;
                }
                let tab = self.env.provider.chartab();
                let this_class = self
                    .cur_char()
                    .map(|(c, _)| tab.char_class(c))
                    .unwrap_or(0);
                let prev_class = self
                    .prev_char()
                    .map(|c| tab.char_class(c))
                    .unwrap_or(0);
                if this_class == prev_class
                    || prev_class == 0
                    || prev_class == 1
                {
                    return Ra::NoMatch;
                }
            }
            op::ANY => match self.cur_char() {
                Some(_) => self.advance(),
                None => return Ra::NoMatch,
            },
            op::IDENT..=op::NUPPER
                if opcode != op::ANYOF && opcode != op::ANYBUT =>
            {
                match self.cur_char() {
                    Some((c, _)) if self.class_ok(opcode, c) => {
                        self.advance()
                    }
                    _ => return Ra::NoMatch,
                }
            }
            op::EXACTLY => {
                if !self.match_exactly(pos, *next) {
                    return Ra::NoMatch;
                }
            }
            op::ANYOF | op::ANYBUT => {
                let want = opcode == op::ANYOF;
                match self.cur_char() {
                    Some((c, _)) => {
                        let set = self.operand_str(pos).to_vec();
                        if self.set_contains(&set, c) != want {
                            return Ra::NoMatch;
                        }
                        self.advance();
                    }
                    None => return Ra::NoMatch,
                }
            }
            op::MULTIBYTECODE => {
                if !self.match_multibyte(pos) {
                    return Ra::NoMatch;
                }
            }
            op::RE_COMPOSING => {
                // Skip composing characters.
                while let Some((c, len)) = self.cur_char() {
                    if is_composing(c as u32) {
                        self.col += len;
                    } else {
                        break;
                    }
                }
            }
            op::NOTHING => {}
            op::BACK => {
                // On the second visit at the same position the inner loop
                // made no progress: fail instead of looping forever.
                let idx = self
                    .backpos
                    .iter()
                    .position(|bp| bp.scan == pos);
                match idx {
                    None => {
                        let save = self.reg_save();
                        self.backpos.push(BackPos { scan: pos, pos: save });
                        if self.stacks_over_budget() {
                            return Ra::Fail;
                        }
                    }
                    Some(i) => {
                        if self.save_equal(&self.backpos[i].pos) {
                            return Ra::NoMatch;
                        }
                        self.backpos[i].pos = self.reg_save();
                    }
                }
            }
            _ if (op::MOPEN..op::MOPEN + 10).contains(&opcode) => {
                let no = opcode - op::MOPEN;
                self.cleanup_subexpr();
                let save_slot = self.sub_start[no as usize];
                self.sub_start[no as usize] = Some(self.cur_pos());
                if !self.push_item(RegItem {
                    state: RegState::Mopen,
                    no,
                    scan: pos,
                    save_slot,
                    save: self.reg_save(),
                }) {
                    return Ra::Fail;
                }
            }
            op::NOPEN | op::NCLOSE => {
                if !self.push_item(RegItem {
                    state: RegState::Nopen,
                    no: 0,
                    scan: pos,
                    save_slot: None,
                    save: self.reg_save(),
                }) {
                    return Ra::Fail;
                }
            }
            _ if (op::ZOPEN + 1..op::ZOPEN + 10).contains(&opcode) => {
                let no = opcode - op::ZOPEN;
                self.cleanup_zsubexpr();
                let save_slot = self.z_start[no as usize];
                self.z_start[no as usize] = Some(self.cur_pos());
                if !self.push_item(RegItem {
                    state: RegState::Zopen,
                    no,
                    scan: pos,
                    save_slot,
                    save: self.reg_save(),
                }) {
                    return Ra::Fail;
                }
            }
            _ if (op::MCLOSE..op::MCLOSE + 10).contains(&opcode) => {
                let no = opcode - op::MCLOSE;
                self.cleanup_subexpr();
                let save_slot = self.sub_end[no as usize];
                self.sub_end[no as usize] = Some(self.cur_pos());
                if !self.push_item(RegItem {
                    state: RegState::Mclose,
                    no,
                    scan: pos,
                    save_slot,
                    save: self.reg_save(),
                }) {
                    return Ra::Fail;
                }
            }
            _ if (op::ZCLOSE + 1..op::ZCLOSE + 10).contains(&opcode) => {
                let no = opcode - op::ZCLOSE;
                self.cleanup_zsubexpr();
                let save_slot = self.z_end[no as usize];
                self.z_end[no as usize] = Some(self.cur_pos());
                if !self.push_item(RegItem {
                    state: RegState::Zclose,
                    no,
                    scan: pos,
                    save_slot,
                    save: self.reg_save(),
                }) {
                    return Ra::Fail;
                }
            }
            _ if (op::BACKREF + 1..op::BACKREF + 10).contains(&opcode) => {
                let no = (opcode - op::BACKREF) as usize;
                self.cleanup_subexpr();
                if !self.match_backref(no) {
                    return Ra::NoMatch;
                }
            }
            _ if (op::ZREF + 1..op::ZREF + 10).contains(&opcode) => {
                let no = (opcode - op::ZREF) as usize;
                self.cleanup_zsubexpr();
                if !self.match_zref(no) {
                    return Ra::NoMatch;
                }
            }
            op::BRANCH => {
                if next.map(|n| self.opcode(n)) != Some(op::BRANCH) {
                    // No choice: avoid recursion.
                    *next = Some(operand(pos));
                } else {
                    if !self.push_item(RegItem {
                        state: RegState::Branch,
                        no: 0,
                        scan: pos,
                        save_slot: None,
                        save: self.reg_save(),
                    }) {
                        return Ra::Fail;
                    }
                    return Ra::Break;
                }
            }
            op::BRACE_LIMITS => {
                let min = operand_u32(&self.prog.code, pos) as i64;
                let max =
                    operand_u32(&self.prog.code, pos + 4) as i64;
                match next.map(|n| self.opcode(n)) {
                    Some(op::BRACE_SIMPLE) => {
                        self.bl_minval = min;
                        self.bl_maxval = max;
                    }
                    Some(n)
                        if (op::BRACE_COMPLEX..op::BRACE_COMPLEX + 10)
                            .contains(&n) =>
                    {
                        let no = (n - op::BRACE_COMPLEX) as usize;
                        self.brace_min[no] = min;
                        self.brace_max[no] = max;
                        self.brace_count[no] = 0;
                    }
                    _ => return Ra::Fail,
                }
            }
            _ if (op::BRACE_COMPLEX..op::BRACE_COMPLEX + 10)
                .contains(&opcode) =>
            {
                let no = (opcode - op::BRACE_COMPLEX) as usize;
                self.brace_count[no] += 1;

                if self.brace_count[no]
                    <= self.brace_min[no].min(self.brace_max[no])
                {
                    // Not matched enough times yet: try one more.
                    if !self.push_item(RegItem {
                        state: RegState::BrcplxMore,
                        no: no as u8,
                        scan: pos,
                        save_slot: None,
                        save: self.reg_save(),
                    }) {
                        return Ra::Fail;
                    }
                    *next = Some(operand(pos));
                } else if self.brace_min[no] <= self.brace_max[no] {
                    // Range the normal way around: longest match first.
                    if self.brace_count[no] <= self.brace_max[no] {
                        if !self.push_item(RegItem {
                            state: RegState::BrcplxLong,
                            no: no as u8,
                            scan: pos,
                            save_slot: None,
                            save: self.reg_save(),
                        }) {
                            return Ra::Fail;
                        }
                        *next = Some(operand(pos));
                    }
                } else {
                    // Range is backwards: shortest match first.
                    if self.brace_count[no] <= self.brace_min[no] {
                        if !self.push_item(RegItem {
                            state: RegState::BrcplxShort,
                            no: no as u8,
                            scan: pos,
                            save_slot: None,
                            save: self.reg_save(),
                        }) {
                            return Ra::Fail;
                        }
                    }
                }
            }
            op::BRACE_SIMPLE | op::STAR | op::PLUS => {
                // Peek at a following EXACTLY to skip useless tries.
                let nextb = next
                    .filter(|&n| self.opcode(n) == op::EXACTLY)
                    .map(|n| {
                        let b = self.prog.code[operand(n)];
                        let bic = if self.reg_ic {
                            if b.is_ascii_uppercase() {
                                b.to_ascii_lowercase()
                            } else {
                                b.to_ascii_uppercase()
                            }
                        } else {
                            b
                        };
                        (b, bic)
                    });
                let (minval, maxval) = if opcode != op::BRACE_SIMPLE {
                    (if opcode == op::STAR { 0 } else { 1 }, MAX_LIMIT)
                } else {
                    (self.bl_minval, self.bl_maxval)
                };

                // With maxval > minval, match as much as possible, up to
                // maxval. With the limits reversed, maxval is the minimal
                // number to match first.
                let count = self.regrepeat(operand(pos), maxval);
                let ok = if minval <= maxval {
                    count >= minval
                } else {
                    count >= maxval
                };
                if !ok {
                    return Ra::NoMatch;
                }
                self.star_stack.push(RegStar {
                    nextb,
                    count,
                    minval,
                    maxval,
                });
                if !self.push_item(RegItem {
                    state: if minval <= maxval {
                        RegState::StarLong
                    } else {
                        RegState::StarShort
                    },
                    no: 0,
                    scan: pos,
                    save_slot: None,
                    save: self.reg_save(),
                }) {
                    return Ra::Fail;
                }
                return Ra::Break; // skip the restore bits
            }
            op::NOMATCH | op::MATCH | op::SUBPAT => {
                if !self.push_item(RegItem {
                    state: RegState::Nomatch,
                    no: opcode,
                    scan: pos,
                    save_slot: None,
                    save: self.reg_save(),
                }) {
                    return Ra::Fail;
                }
                *next = Some(operand(pos));
            }
            op::BEHIND | op::NOBEHIND => {
                let payload = self.save_subexpr();
                self.behind_stack.push(payload);
                if !self.push_item(RegItem {
                    state: RegState::Behind1,
                    no: opcode,
                    scan: pos,
                    save_slot: None,
                    save: self.reg_save(),
                }) {
                    return Ra::Fail;
                }
                // First try if what follows matches; the behind part is
                // checked by looping afterwards.
            }
            op::BHPOS => {
                if self.behind_pos != Some(self.cur_pos()) {
                    return Ra::NoMatch;
                }
            }
            op::NEWL => {
                let c = self.cur_char().map(|(c, _)| c);
                if self.env.line_lbr {
                    if c != Some('\n') {
                        return Ra::NoMatch;
                    }
                    self.advance();
                } else if c.is_none()
                    && self.env.multi
                    && self.lnum <= self.env.maxline
                {
                    self.nextline();
                } else {
                    return Ra::NoMatch;
                }
            }
            op::END => return Ra::Match,
            _ => return Ra::Fail, // corrupt program
        }
        Ra::Cont
    }

    /// Handle the top regstack item for the given status. May pop, may
    /// mutate the item in place and resume.
    fn unwind_one(&mut self, scan: &mut Option<usize>, status: Ra) -> Ra {
        let mut item = *self.regstack.last().expect("non-empty regstack");
        match item.state {
            RegState::Nopen => {
                // Result is passed on as-is, simply pop the state.
                self.regstack.pop();
                *scan = Some(item.scan);
                status
            }
            RegState::Mopen => {
                if status == Ra::NoMatch {
                    self.sub_start[item.no as usize] = item.save_slot;
                }
                self.regstack.pop();
                *scan = Some(item.scan);
                status
            }
            RegState::Zopen => {
                if status == Ra::NoMatch {
                    self.z_start[item.no as usize] = item.save_slot;
                }
                self.regstack.pop();
                *scan = Some(item.scan);
                status
            }
            RegState::Mclose => {
                if status == Ra::NoMatch {
                    self.sub_end[item.no as usize] = item.save_slot;
                }
                self.regstack.pop();
                *scan = Some(item.scan);
                status
            }
            RegState::Zclose => {
                if status == Ra::NoMatch {
                    self.z_end[item.no as usize] = item.save_slot;
                }
                self.regstack.pop();
                *scan = Some(item.scan);
                status
            }
            RegState::Branch => {
                if status == Ra::Match {
                    self.regstack.pop();
                    *scan = Some(item.scan);
                    return Ra::Match;
                }
                if status != Ra::Break {
                    // After a non-matching branch: try the next one.
                    self.reg_restore(item.save);
                    *scan = Some(item.scan);
                }
                let here = *scan;
                match here {
                    Some(p) if self.opcode(p) == op::BRANCH => {
                        // Prepare to try this branch. Position 0 is the
                        // magic byte: "no more branches".
                        item.scan = self.regnext(p).unwrap_or(0);
                        item.save = self.reg_save();
                        *self.regstack.last_mut().unwrap() = item;
                        *scan = Some(operand(p));
                        status // not popped: resume the inner loop
                    }
                    _ => {
                        // No more branches, didn't find a match.
                        self.regstack.pop();
                        *scan = here;
                        Ra::NoMatch
                    }
                }
            }
            RegState::BrcplxMore => {
                if status == Ra::NoMatch {
                    self.reg_restore(item.save);
                    self.brace_count[item.no as usize] -= 1;
                }
                self.regstack.pop();
                *scan = Some(item.scan);
                status
            }
            RegState::BrcplxLong => {
                let mut status = status;
                if status == Ra::NoMatch {
                    // No match, but we did find enough matches.
                    self.reg_restore(item.save);
                    self.brace_count[item.no as usize] -= 1;
                    status = Ra::Cont;
                }
                self.regstack.pop();
                if status == Ra::Cont {
                    *scan = self.regnext(item.scan);
                } else {
                    *scan = Some(item.scan);
                }
                status
            }
            RegState::BrcplxShort => {
                if status == Ra::NoMatch {
                    // Try to match one more item.
                    self.reg_restore(item.save);
                }
                self.regstack.pop();
                if status == Ra::NoMatch {
                    *scan = Some(operand(item.scan));
                    Ra::Cont
                } else {
                    *scan = Some(item.scan);
                    status
                }
            }
            RegState::Nomatch => {
                // If the operand matches for NOMATCH, or doesn't match for
                // MATCH/SUBPAT, we fail. Otherwise back up, except for
                // SUBPAT, and continue with what follows.
                let fail_on = if item.no == op::NOMATCH {
                    Ra::Match
                } else {
                    Ra::NoMatch
                };
                let mut status = status;
                if status == fail_on {
                    status = Ra::NoMatch;
                } else {
                    status = Ra::Cont;
                    if item.no != op::SUBPAT {
                        // zero-width
                        self.reg_restore(item.save);
                    }
                }
                self.regstack.pop();
                if status == Ra::Cont {
                    *scan = self.regnext(item.scan);
                } else {
                    *scan = Some(item.scan);
                }
                status
            }
            RegState::Behind1 => {
                if status == Ra::NoMatch {
                    self.regstack.pop();
                    self.behind_stack.pop();
                    *scan = Some(item.scan);
                    return Ra::NoMatch;
                }
                // The stuff after BEHIND/NOBEHIND matches. Now check the
                // behind part, trying end positions one char back at a
                // time; BHPOS anchors the operand's end here.
                let save_after = self.reg_save();
                let save_behind = self.behind_pos;
                let bp = self.behind_stack.last_mut().unwrap();
                bp.save_after = save_after;
                bp.save_behind = save_behind;
                self.behind_pos = Some(item.save.pos);

                item.state = RegState::Behind2;
                *self.regstack.last_mut().unwrap() = item;
                self.reg_restore(item.save);
                *scan = Some(operand(item.scan) + 4);
                status // not popped: resume the inner loop
            }
            RegState::Behind2 => self.unwind_behind2(scan, status, item),
            RegState::StarLong | RegState::StarShort => {
                self.unwind_star(scan, status, item)
            }
        }
    }

    fn unwind_behind2(
        &mut self,
        scan: &mut Option<usize>,
        status: Ra,
        mut item: RegItem,
    ) -> Ra {
        let behind_end = self.behind_pos.expect("behind in progress");
        if status == Ra::Match && self.cur_pos() == behind_end {
            // Found a match that ends where the assertion sits.
            let bp = *self.behind_stack.last().unwrap();
            self.behind_pos = bp.save_behind;
            let status = if item.no == op::BEHIND {
                self.reg_restore(bp.save_after);
                Ra::Match
            } else {
                // We didn't want a match; restore the subexprs set by the
                // text that follows.
                self.restore_subexpr(&bp);
                Ra::NoMatch
            };
            self.regstack.pop();
            self.behind_stack.pop();
            *scan = Some(item.scan);
            return status;
        }

        // No match, or one that ends elsewhere: go back one char, maybe to
        // the previous line once.
        let limit = operand_u32(&self.prog.code, item.scan) as i64;
        let mut ok = true;
        if limit > 0 {
            let base = if item.save.pos.lnum < behind_end.lnum {
                self.env.getline(item.save.pos.lnum).len() as i64
            } else {
                behind_end.col as i64
            };
            if base - item.save.pos.col as i64 >= limit {
                ok = false;
            }
        }
        if ok {
            if item.save.pos.col == 0 {
                if item.save.pos.lnum < behind_end.lnum
                    || item.save.pos.lnum == 0
                    || !self.env.multi
                {
                    ok = false;
                } else {
                    item.save.pos.lnum -= 1;
                    item.save.pos.col =
                        self.env.getline(item.save.pos.lnum).len() as u32;
                }
            } else {
                let line = self.env.getline(item.save.pos.lnum);
                let back = prev_char_len(line, item.save.pos.col as usize);
                item.save.pos.col -= back.max(1) as u32;
            }
        }
        if ok {
            // Advanced; prepare for finding a match again.
            *self.regstack.last_mut().unwrap() = item;
            self.reg_restore(item.save);
            *scan = Some(operand(item.scan) + 4);
            if status == Ra::Match {
                // The subexprs may have been set; restore them for the
                // next try.
                let bp = *self.behind_stack.last().unwrap();
                self.restore_subexpr(&bp);
                return Ra::NoMatch;
            }
            status // not popped: resume
        } else {
            // Can't advance. For NOBEHIND that's a match.
            let bp = *self.behind_stack.last().unwrap();
            self.behind_pos = bp.save_behind;
            let status = if item.no == op::NOBEHIND {
                self.reg_restore(bp.save_after);
                Ra::Match
            } else {
                if status == Ra::Match {
                    self.restore_subexpr(&bp);
                }
                Ra::NoMatch
            };
            self.regstack.pop();
            self.behind_stack.pop();
            *scan = Some(item.scan);
            status
        }
    }

    fn unwind_star(
        &mut self,
        scan: &mut Option<usize>,
        status: Ra,
        item: RegItem,
    ) -> Ra {
        if status == Ra::Match {
            self.regstack.pop();
            self.star_stack.pop();
            *scan = Some(item.scan);
            return Ra::Match;
        }

        let mut rst = *self.star_stack.last().unwrap();
        let mut item = item;

        // Tried once already: restore the input position.
        if status != Ra::Break {
            self.reg_restore(item.save);
        }

        let mut status = status;
        // Repeat until a position where the rest could match.
        let resumed = loop {
            if status != Ra::Break {
                if item.state == RegState::StarLong {
                    // Trying for the longest match: back up one char.
                    rst.count -= 1;
                    if rst.count < rst.minval {
                        break false;
                    }
                    if self.col == 0 {
                        // Back up to the last char of the previous line.
                        if self.lnum == 0 {
                            status = Ra::NoMatch;
                            break false;
                        }
                        self.lnum -= 1;
                        self.line = self.env.getline(self.lnum);
                        self.col = self.line.len();
                    } else {
                        self.col -=
                            prev_char_len(self.line, self.col).max(1);
                    }
                } else {
                    // Reversed limits: shortest first, advance one more.
                    if rst.count == rst.minval
                        || self.regrepeat(operand(item.scan), 1) == 0
                    {
                        break false;
                    }
                    rst.count += 1;
                }
                if self.interrupted() {
                    break false;
                }
            } else {
                status = Ra::NoMatch;
            }

            // If it could match, try it.
            let could = match rst.nextb {
                None => true,
                Some((b, bic)) => self
                    .line
                    .get(self.col)
                    .map(|&x| x == b || x == bic)
                    .unwrap_or(false),
            };
            if could {
                item.save = self.reg_save();
                break true;
            }
        };

        *self.star_stack.last_mut().unwrap() = rst;
        if resumed {
            *self.regstack.last_mut().unwrap() = item;
            *scan = self.regnext(item.scan);
            Ra::Cont
        } else {
            self.regstack.pop();
            self.star_stack.pop();
            *scan = Some(item.scan);
            Ra::NoMatch
        }
    }

    fn pos_pred_operand(&self, pos: usize, kind: PosPred) -> (u32, u8) {
        let code = &self.prog.code;
        let n = operand_u32(code, pos);
        let cmp = code[operand(pos) + 4];
        let cursor_rel = code[operand(pos) + 5] != 0;
        if !cursor_rel {
            return (n, cmp);
        }
        let val = match (self.env.provider.cursor(), kind) {
            (Some(p), PosPred::Lnum) => p.lnum,
            (Some(p), PosPred::Col) => p.col + 1,
            (Some(p), PosPred::Vcol) => {
                self.vcol_at(self.env.provider.line(p.lnum), p.col as usize)
                    + 1
            }
            (None, _) => 0,
        };
        (val, cmp)
    }

    /// Try a match at column `col` of the first line.
    fn regtry(&mut self, col: u32) -> u32 {
        self.set_pos(SPos { lnum: 0, col });
        self.need_clear_sub = true;
        self.need_clear_z = self.prog.has_z;

        if !self.regmatch(1) {
            return 0;
        }

        self.cleanup_subexpr();
        if self.sub_start[0].is_none() {
            self.sub_start[0] = Some(SPos { lnum: 0, col });
        }
        match self.sub_end[0] {
            None => self.sub_end[0] = Some(self.cur_pos()),
            Some(e) => self.lnum = e.lnum, // use the line of \ze
        }
        1 + self.lnum
    }

    /// Search for a match from `col` on: anchored patterns try once, others
    /// advance one char at a time, skipping by the known start char.
    fn exec_both(&mut self, mut col: u32) -> u32 {
        if self.prog.code.first() != Some(&REGMAGIC) {
            return 0;
        }
        if self.env.maxcol > 0 && col >= self.env.maxcol {
            return 0;
        }

        if self.prog.anchored {
            if let Some(start) = self.prog.start_char {
                let ok = match decode_at(self.line, col as usize) {
                    Some(c) => {
                        c == start
                            || (self.reg_ic
                                && c.to_fold_case() == start.to_fold_case())
                    }
                    None => false,
                };
                if !ok {
                    return 0;
                }
            }
            let r = self.regtry(col);
            if r > 0 {
                self.normalize_slot0();
            }
            return r;
        }

        let mut tm_count = 0u32;
        loop {
            if self.interrupted() {
                return 0;
            }
            if let Some(start) = self.prog.start_char {
                match self.skip_to_char(col, start) {
                    Some(c) => col = c,
                    None => return 0,
                }
            }
            if self.env.maxcol > 0 && col >= self.env.maxcol {
                return 0;
            }

            let r = self.regtry(col);
            if r > 0 {
                self.normalize_slot0();
                return r;
            }
            if self.failure.is_some() {
                return 0;
            }

            // The try may have moved to another line; start over on the
            // first one.
            if self.lnum != 0 {
                self.lnum = 0;
                self.line = self.env.getline(0);
            }
            self.col = col as usize;
            match self.cur_char() {
                None => return 0,
                Some((_, len)) => col += len as u32,
            }

            // Check for timeout once in twenty times.
            tm_count += 1;
            if tm_count == 20 {
                tm_count = 0;
                if let Some(deadline) = self.env.deadline {
                    if Instant::now() >= deadline {
                        self.failure = Some(MatchFailure::TimedOut);
                        return 0;
                    }
                }
            }
        }
    }

    /// Find the next occurrence of `start` at or after byte `col` in the
    /// first line.
    fn skip_to_char(&mut self, col: u32, start: char) -> Option<u32> {
        self.lnum = 0;
        self.line = self.env.getline(0);
        let line = self.line;
        let mut i = col as usize;
        if start.is_ascii() && !self.reg_ic {
            // Single-byte fast path.
            return memchr::memchr(start as u8, &line[i.min(line.len())..])
                .map(|off| (i + off) as u32);
        }
        while i < line.len() {
            let (c, len) = decode_char(line, i);
            if self.chars_eq(start, c) {
                return Some(i as u32);
            }
            i += len;
        }
        None
    }

    /// The end must never be before the start; `\zs`/`\ze` can produce that.
    fn normalize_slot0(&mut self) {
        if let (Some(s), Some(e)) = (self.sub_start[0], self.sub_end[0]) {
            if (e.lnum, e.col) < (s.lnum, s.col) {
                self.sub_end[0] = Some(s);
            }
        }
    }

    fn slice_text(&self, s: SPos, e: SPos) -> String {
        let mut out = String::new();
        let mut l = s.lnum;
        loop {
            let line = self.env.getline(l);
            let from = if l == s.lnum { s.col as usize } else { 0 };
            let to = if l == e.lnum { e.col as usize } else { line.len() };
            if from <= to && to <= line.len() {
                out.push_str(&String::from_utf8_lossy(&line[from..to]));
            }
            if l >= e.lnum {
                break;
            }
            out.push('\n');
            l += 1;
        }
        out
    }

    fn collect_subs(
        &mut self,
        matched: bool,
    ) -> (Submatches, Option<Box<[Option<String>; 10]>>) {
        let mut subs = Submatches::default();
        if !matched {
            return (subs, None);
        }
        for i in 0..10 {
            if let (Some(s), Some(e)) = (self.sub_start[i], self.sub_end[i]) {
                if (e.lnum, e.col) < (s.lnum, s.col) {
                    continue;
                }
                subs.start[i] = Some(Pos::new(
                    self.env.firstlnum + s.lnum,
                    s.col,
                ));
                subs.end[i] =
                    Some(Pos::new(self.env.firstlnum + e.lnum, e.col));
                subs.text[i] = Some(self.slice_text(s, e));
            }
        }
        let zsubs = if self.prog.has_z {
            self.cleanup_zsubexpr();
            let mut z: Box<[Option<String>; 10]> = Default::default();
            for i in 0..10 {
                if let (Some(s), Some(e)) = (self.z_start[i], self.z_end[i]) {
                    // Only single-line z captures are kept.
                    if s.lnum == e.lnum && e.col >= s.col {
                        z[i] = Some(self.slice_text(s, e));
                    }
                }
            }
            Some(z)
        } else {
            None
        };
        (subs, zsubs)
    }
}

#[derive(Clone, Copy)]
enum PosPred {
    Lnum,
    Col,
    Vcol,
}

fn decode_at(line: &[u8], col: usize) -> Option<char> {
    if col >= line.len() {
        None
    } else {
        Some(decode_char(line, col).0)
    }
}

pub(crate) fn chars_eq(ic: bool, a: char, b: char) -> bool {
    a == b || (ic && a.to_fold_case() == b.to_fold_case())
}

pub(crate) fn set_contains(ic: bool, set: &[u8], c: char) -> bool {
    let s = std::str::from_utf8(set).unwrap_or("");
    s.chars().any(|sc| chars_eq(ic, sc, c))
}

/// Single-char class predicate for a base opcode in `ANY..=NUPPER`.
pub(crate) fn class_ok(
    tab: &crate::chartab::ChartabView,
    base: u8,
    c: char,
) -> bool {
    let cp = c as u32;
    match base {
        op::ANY => true,
        op::IDENT => tab.is_ident(c),
        op::SIDENT => !c.is_ascii_digit() && tab.is_ident(c),
        op::KWORD => tab.is_word(c),
        op::SKWORD => !c.is_ascii_digit() && tab.is_word(c),
        op::FNAME => tab.is_fname(c),
        op::SFNAME => !c.is_ascii_digit() && tab.is_fname(c),
        op::PRINT => tab.is_print(c),
        op::SPRINT => !c.is_ascii_digit() && tab.is_print(c),
        op::WHITE => ascii::is_white(cp),
        op::NWHITE => !ascii::is_white(cp),
        op::DIGIT => ascii::is_digit(cp),
        op::NDIGIT => !ascii::is_digit(cp),
        op::HEX => ascii::is_hex(cp),
        op::NHEX => !ascii::is_hex(cp),
        op::OCTAL => ascii::is_octal(cp),
        op::NOCTAL => !ascii::is_octal(cp),
        op::WORD => ascii::is_word(cp),
        op::NWORD => !ascii::is_word(cp),
        op::HEAD => ascii::is_head(cp),
        op::NHEAD => !ascii::is_head(cp),
        op::ALPHA => ascii::is_alpha(cp),
        op::NALPHA => !ascii::is_alpha(cp),
        op::LOWER => ascii::is_lower_ascii(cp),
        op::NLOWER => !ascii::is_lower_ascii(cp),
        op::UPPER => ascii::is_upper_ascii(cp),
        op::NUPPER => !ascii::is_upper_ascii(cp),
        _ => false,
    }
}
