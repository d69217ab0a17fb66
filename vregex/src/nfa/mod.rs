//! The NFA engine: Thompson construction plus a two-frontier lockstep
//! simulation with capture snapshots.
//!
//! Used by default. Patterns with back-references, look-behind, `\@>` atomic
//! groups or `\%[...]` make the compiler bail out with `TooExpensive`; the
//! dispatcher then recompiles for the backtracking engine. Look-ahead is
//! handled by a nested sub-simulation during epsilon closure. A runtime step
//! budget triggers the same fall-through for pathological inputs.

use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::backtrack::{chars_eq, class_ok, set_contains, EngineOutcome, ExecEnv};
use crate::buffer::{decode_char, Pos};
use crate::error::{Error, MatchFailure};
use crate::submatch::Submatches;
use crate::syntax::{Ast, LookKind, Parsed, PosKind, ProgFlags};

const MAX_LIMIT: u32 = 32767 << 16;
/// Brace ranges wider than this are not expanded into states.
const MAX_BRACE_EXPAND: u32 = 32;
/// Runtime budget: thread additions before giving up.
const MAX_THREAD_ADDS: u64 = 2_000_000;

#[derive(Debug, Clone)]
enum Inst {
    Char(char),
    Class { code: u8, with_nl: bool },
    Set { chars: Rc<str>, negate: bool, with_nl: bool },
    Newl,
    Split { pref: usize, alt: usize },
    Jmp(usize),
    Save(usize),
    Assert(Assert),
    /// Nested look-ahead: run `looks[idx]` anchored here.
    Look { idx: usize, negate: bool },
    Match,
}

#[derive(Debug, Clone, Copy)]
enum Assert {
    Bol,
    Eol,
    Bof,
    Eof,
    Bow,
    Eow,
    Cursor,
    Visual,
    Mark { name: char, cmp: u8 },
    Pos { kind: PosKind, value: u32, cmp: u8, cursor_rel: bool },
}

/// A compiled NFA: a state array plus the entry state (always 0).
#[derive(Debug, Clone)]
pub(crate) struct NfaProgram {
    insts: Vec<Inst>,
    looks: Vec<Vec<Inst>>,
    pub ngroups: u8,
    pub flags: ProgFlags,
    pub has_z: bool,
    pub anchored: bool,
    pub start_char: Option<char>,
    nslots: usize,
}

struct Compiler {
    insts: Vec<Inst>,
    looks: Vec<Vec<Inst>>,
    has_z: bool,
}

pub(crate) fn compile_nfa(parsed: &Parsed) -> Result<NfaProgram, Error> {
    if parsed.uses_z_refs {
        return Err(Error::TooExpensive);
    }
    let mut c = Compiler {
        insts: Vec::new(),
        looks: Vec::new(),
        has_z: parsed.has_z_groups,
    };
    c.insts.push(Inst::Save(0));
    c.emit(&parsed.ast)?;
    c.insts.push(Inst::Match);

    // Anchored when every alternative starts with ^ or \%^.
    let anchored = match &parsed.ast {
        Ast::Alt(branches) => branches.iter().all(starts_anchored),
        other => starts_anchored(other),
    };
    let start_char = first_char_of(&parsed.ast);

    Ok(NfaProgram {
        insts: c.insts,
        looks: c.looks,
        ngroups: parsed.ngroups,
        flags: parsed.flags,
        has_z: parsed.has_z_groups,
        anchored,
        start_char,
        nslots: if parsed.has_z_groups { 40 } else { 20 },
    })
}

fn starts_anchored(ast: &Ast) -> bool {
    match ast {
        Ast::Bol | Ast::Bof => true,
        Ast::Concat(items) => {
            items.first().map(starts_anchored).unwrap_or(false)
        }
        Ast::Group { ast, .. } | Ast::NGroup(ast) => starts_anchored(ast),
        Ast::Alt(branches) => branches.iter().all(starts_anchored),
        _ => false,
    }
}

/// First literal char each alternative must start with, if any.
fn first_char_of(ast: &Ast) -> Option<char> {
    match ast {
        Ast::Exactly(s) => s.chars().next(),
        Ast::Multibyte(s) => s.chars().next(),
        Ast::Concat(items) => {
            let mut iter = items.iter();
            let first = iter.next()?;
            match first {
                Ast::Bol | Ast::Bof | Ast::MatchStart | Ast::Nothing => {
                    first_char_of(iter.next()?)
                }
                other => first_char_of(other),
            }
        }
        Ast::Group { ast, .. } | Ast::NGroup(ast) => first_char_of(ast),
        Ast::Alt(branches) => {
            let mut chars = branches.iter().map(first_char_of);
            let first = chars.next()??;
            for c in chars {
                if c != Some(first) {
                    return None;
                }
            }
            Some(first)
        }
        _ => None,
    }
}

impl Compiler {
    fn emit(&mut self, ast: &Ast) -> Result<(), Error> {
        match ast {
            Ast::Alt(branches) => self.emit_alt(branches),
            Ast::Concat(items) => {
                for item in items {
                    self.emit(item)?;
                }
                Ok(())
            }
            Ast::Nothing => Ok(()),

            Ast::Star(atom) => self.emit_star(atom, true),
            Ast::Plus(atom) => {
                let body = self.insts.len();
                self.emit(atom)?;
                let split = self.insts.len();
                self.insts.push(Inst::Split { pref: body, alt: split + 1 });
                Ok(())
            }
            Ast::Quest(atom) => {
                let split = self.insts.len();
                self.insts.push(Inst::Split { pref: 0, alt: 0 });
                self.emit(atom)?;
                let after = self.insts.len();
                self.insts[split] =
                    Inst::Split { pref: split + 1, alt: after };
                Ok(())
            }
            Ast::Brace { atom, min, max } => self.emit_brace(atom, *min, *max),

            Ast::Look { atom, kind, .. } => match kind {
                LookKind::Ahead | LookKind::AheadNot => {
                    let mut sub = Compiler {
                        insts: Vec::new(),
                        looks: Vec::new(),
                        has_z: self.has_z,
                    };
                    sub.emit(atom)?;
                    sub.insts.push(Inst::Match);
                    if !sub.looks.is_empty() {
                        // Nested looks inside looks: leave it to the
                        // backtracker.
                        return Err(Error::TooExpensive);
                    }
                    let idx = self.looks.len();
                    self.looks.push(sub.insts);
                    self.insts.push(Inst::Look {
                        idx,
                        negate: matches!(kind, LookKind::AheadNot),
                    });
                    Ok(())
                }
                LookKind::Behind
                | LookKind::BehindNot
                | LookKind::Atomic => Err(Error::TooExpensive),
            },

            Ast::Group { num, ast } => {
                self.insts.push(Inst::Save(2 * *num as usize));
                self.emit(ast)?;
                self.insts.push(Inst::Save(2 * *num as usize + 1));
                Ok(())
            }
            Ast::ZGroup { num, ast } => {
                self.insts.push(Inst::Save(20 + 2 * *num as usize));
                self.emit(ast)?;
                self.insts.push(Inst::Save(20 + 2 * *num as usize + 1));
                Ok(())
            }
            Ast::NGroup(ast) => self.emit(ast),

            Ast::OptSeq(_) => Err(Error::TooExpensive),
            Ast::Backref(_) | Ast::ZRef(_) => Err(Error::TooExpensive),
            // Composing-char handling stays with the backtracker.
            Ast::Composing => Err(Error::TooExpensive),

            Ast::Exactly(s) => {
                for c in s.chars() {
                    self.insts.push(Inst::Char(c));
                }
                Ok(())
            }
            Ast::Multibyte(s) => {
                for c in s.chars() {
                    if vregex_unicode::case::is_composing(c as u32) {
                        return Err(Error::TooExpensive);
                    }
                    self.insts.push(Inst::Char(c));
                }
                Ok(())
            }
            Ast::Class { code, with_nl } => {
                self.insts.push(Inst::Class { code: *code, with_nl: *with_nl });
                Ok(())
            }
            Ast::Collection { negate, with_nl, chars } => {
                self.insts.push(Inst::Set {
                    chars: Rc::from(chars.as_str()),
                    negate: *negate,
                    with_nl: *with_nl,
                });
                Ok(())
            }
            Ast::Newl => {
                self.insts.push(Inst::Newl);
                Ok(())
            }

            Ast::MatchStart => {
                self.insts.push(Inst::Save(0));
                Ok(())
            }
            Ast::MatchEnd => {
                self.insts.push(Inst::Save(1));
                Ok(())
            }

            Ast::Bol => self.assert(Assert::Bol),
            Ast::Eol => self.assert(Assert::Eol),
            Ast::Bof => self.assert(Assert::Bof),
            Ast::Eof => self.assert(Assert::Eof),
            Ast::Bow => self.assert(Assert::Bow),
            Ast::Eow => self.assert(Assert::Eow),
            Ast::Cursor => self.assert(Assert::Cursor),
            Ast::Visual => self.assert(Assert::Visual),
            Ast::Mark { name, cmp } => {
                self.assert(Assert::Mark { name: *name, cmp: *cmp })
            }
            Ast::PosPred { kind, value, cmp, cursor_rel } => {
                self.assert(Assert::Pos {
                    kind: *kind,
                    value: *value,
                    cmp: *cmp,
                    cursor_rel: *cursor_rel,
                })
            }
        }
    }

    fn assert(&mut self, a: Assert) -> Result<(), Error> {
        self.insts.push(Inst::Assert(a));
        Ok(())
    }

    fn emit_alt(&mut self, branches: &[Ast]) -> Result<(), Error> {
        if branches.len() == 1 {
            return self.emit(&branches[0]);
        }
        let mut jumps = Vec::new();
        let mut last_split: Option<usize> = None;
        for (i, branch) in branches.iter().enumerate() {
            if let Some(split) = last_split.take() {
                let here = self.insts.len();
                if let Inst::Split { alt, .. } = &mut self.insts[split] {
                    *alt = here;
                }
            }
            if i + 1 < branches.len() {
                let split = self.insts.len();
                self.insts.push(Inst::Split { pref: split + 1, alt: 0 });
                last_split = Some(split);
            }
            self.emit(branch)?;
            if i + 1 < branches.len() {
                jumps.push(self.insts.len());
                self.insts.push(Inst::Jmp(0));
            }
        }
        let end = self.insts.len();
        for j in jumps {
            self.insts[j] = Inst::Jmp(end);
        }
        Ok(())
    }

    fn emit_star(&mut self, atom: &Ast, greedy: bool) -> Result<(), Error> {
        let split = self.insts.len();
        self.insts.push(Inst::Split { pref: 0, alt: 0 });
        self.emit(atom)?;
        self.insts.push(Inst::Jmp(split));
        let after = self.insts.len();
        self.insts[split] = if greedy {
            Inst::Split { pref: split + 1, alt: after }
        } else {
            Inst::Split { pref: after, alt: split + 1 }
        };
        Ok(())
    }

    /// `\{m,n}` by state expansion. A reversed range means reluctant. Wide
    /// ranges are not expanded; the backtracker takes those.
    fn emit_brace(
        &mut self,
        atom: &Ast,
        min: u32,
        max: u32,
    ) -> Result<(), Error> {
        let (lo, hi, greedy) =
            if min <= max { (min, max, true) } else { (max, min, false) };
        for _ in 0..lo {
            self.emit(atom)?;
        }
        if hi >= MAX_LIMIT {
            return self.emit_star(atom, greedy);
        }
        let extra = hi - lo;
        if extra > MAX_BRACE_EXPAND {
            return Err(Error::TooExpensive);
        }
        // Optional copies; nesting them keeps the prefix shared.
        let mut splits = Vec::new();
        for _ in 0..extra {
            let split = self.insts.len();
            self.insts.push(Inst::Split { pref: 0, alt: 0 });
            splits.push(split);
            self.emit(atom)?;
        }
        let after = self.insts.len();
        for split in splits {
            self.insts[split] = if greedy {
                Inst::Split { pref: split + 1, alt: after }
            } else {
                Inst::Split { pref: after, alt: split + 1 }
            };
        }
        Ok(())
    }
}

/// What the simulation sees at one input position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cur {
    Char(char, usize),
    /// A line break between lines (or past the last line).
    Nl,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct NPos {
    lnum: u32,
    col: u32,
}

type Caps = Rc<Vec<Option<NPos>>>;

struct Thread {
    pc: usize,
    caps: Caps,
}

struct Simulator<'a> {
    prog: &'a NfaProgram,
    env: &'a ExecEnv<'a>,
    reg_ic: bool,
    adds: u64,
    failure: Option<MatchFailure>,
}

pub(crate) fn exec(
    prog: &NfaProgram,
    env: &ExecEnv,
    col: u32,
) -> EngineOutcome {
    let reg_ic = if prog.flags.contains(ProgFlags::ICASE) {
        true
    } else if prog.flags.contains(ProgFlags::NOICASE) {
        false
    } else {
        env.ignore_case
    };
    let mut sim =
        Simulator { prog, env, reg_ic, adds: 0, failure: None };
    let matched = sim.run(col);
    let failure = sim.failure;

    let mut subs = Submatches::default();
    let mut zsubs = None;
    let mut lines = 0;
    if let Some((caps, end)) = matched {
        let start = caps[0].unwrap_or(NPos { lnum: 0, col });
        let mut end0 = caps[1].unwrap_or(end);
        // \zs/\ze may invert the range; clamp like the backtracker does.
        if (end0.lnum, end0.col) < (start.lnum, start.col) {
            end0 = start;
        }
        lines = 1 + end0.lnum;
        fill_slot(&mut subs, env, 0, Some(start), Some(end0));
        for no in 1..10 {
            fill_slot(&mut subs, env, no, caps[2 * no], caps[2 * no + 1]);
        }
        if prog.has_z {
            let mut z: Box<[Option<String>; 10]> = Default::default();
            for no in 1..10 {
                if let (Some(s), Some(e)) =
                    (caps[20 + 2 * no], caps[20 + 2 * no + 1])
                {
                    if s.lnum == e.lnum && e.col >= s.col {
                        let line = env.provider.line(env.firstlnum + s.lnum);
                        z[no] = Some(
                            String::from_utf8_lossy(
                                &line[s.col as usize..e.col as usize],
                            )
                            .into_owned(),
                        );
                    }
                }
            }
            zsubs = Some(z);
        }
    }
    EngineOutcome { lines, subs, zsubs, failure }
}

fn fill_slot(
    subs: &mut Submatches,
    env: &ExecEnv,
    no: usize,
    start: Option<NPos>,
    end: Option<NPos>,
) {
    let (Some(s), Some(e)) = (start, end) else { return };
    if (e.lnum, e.col) < (s.lnum, s.col) {
        return;
    }
    subs.start[no] = Some(Pos::new(env.firstlnum + s.lnum, s.col));
    subs.end[no] = Some(Pos::new(env.firstlnum + e.lnum, e.col));
    let mut text = String::new();
    let mut l = s.lnum;
    loop {
        let line = env.provider.line(env.firstlnum + l);
        let from = if l == s.lnum { s.col as usize } else { 0 };
        let to = if l == e.lnum { e.col as usize } else { line.len() };
        if from <= to && to <= line.len() {
            text.push_str(&String::from_utf8_lossy(&line[from..to]));
        }
        if l >= e.lnum {
            break;
        }
        text.push('\n');
        l += 1;
    }
    subs.text[no] = Some(text);
}

impl<'a> Simulator<'a> {
    fn getline(&self, rel: u32) -> &'a [u8] {
        self.env.provider.line(self.env.firstlnum.saturating_add(rel))
    }

    fn current(&self, pos: NPos) -> Cur {
        let line = self.getline(pos.lnum);
        if (pos.col as usize) < line.len() {
            let (c, len) = decode_char(line, pos.col as usize);
            Cur::Char(c, len)
        } else if self.env.multi
            && !self.env.line_lbr
            && pos.lnum <= self.env.maxline
        {
            Cur::Nl
        } else {
            Cur::Eof
        }
    }

    fn next_pos(&self, pos: NPos, cur: Cur) -> NPos {
        match cur {
            Cur::Char(_, len) => {
                NPos { lnum: pos.lnum, col: pos.col + len as u32 }
            }
            Cur::Nl => NPos { lnum: pos.lnum + 1, col: 0 },
            Cur::Eof => pos,
        }
    }

    fn check_assert(&self, a: Assert, pos: NPos) -> bool {
        let env = self.env;
        let line = self.getline(pos.lnum);
        let abs = env.firstlnum + pos.lnum;
        match a {
            Assert::Bol => pos.col == 0,
            Assert::Eol => pos.col as usize >= line.len(),
            Assert::Bof => {
                pos.lnum == 0
                    && pos.col == 0
                    && !(env.multi && env.firstlnum > 1)
            }
            Assert::Eof => {
                pos.lnum == env.maxline && pos.col as usize >= line.len()
            }
            Assert::Bow => {
                let tab = env.provider.chartab();
                if pos.col as usize >= line.len() {
                    return false;
                }
                let (c, _) = decode_char(line, pos.col as usize);
                let this_class = tab.char_class(c);
                if this_class <= 1 {
                    return false;
                }
                match prev_char_at(line, pos.col as usize) {
                    Some(p) => tab.char_class(p) != this_class,
                    None => true,
                }
            }
            Assert::Eow => {
                if pos.col == 0 {
                    return false;
                }
                let tab = env.provider.chartab();
                let this_class = if (pos.col as usize) < line.len() {
                    let (c, _) = decode_char(line, pos.col as usize);
                    tab.char_class(c)
                } else {
                    0
                };
                let prev_class = prev_char_at(line, pos.col as usize)
                    .map(|c| tab.char_class(c))
                    .unwrap_or(0);
                this_class != prev_class
                    && prev_class != 0
                    && prev_class != 1
            }
            Assert::Cursor => {
                env.provider.cursor() == Some(Pos::new(abs, pos.col))
            }
            Assert::Visual => self.check_visual(pos),
            Assert::Mark { name, cmp } => {
                let Some(mark) = env.provider.mark(name) else {
                    return false;
                };
                if mark.lnum == 0 {
                    return false;
                }
                let here = (abs, pos.col);
                let there = (mark.lnum, mark.col);
                if there == here {
                    !(cmp == b'<' || cmp == b'>')
                } else if there < here {
                    cmp == b'>'
                } else {
                    cmp == b'<'
                }
            }
            Assert::Pos { kind, value, cmp, cursor_rel } => {
                let n = if cursor_rel {
                    match (env.provider.cursor(), kind) {
                        (Some(p), PosKind::Lnum) => p.lnum,
                        (Some(p), PosKind::Col) => p.col + 1,
                        (Some(p), PosKind::Vcol) => {
                            vcol_at(
                                env.provider.line(p.lnum),
                                p.col as usize,
                            ) + 1
                        }
                        (None, _) => 0,
                    }
                } else {
                    value
                };
                let val = match kind {
                    PosKind::Lnum => {
                        if !env.multi {
                            return false;
                        }
                        abs
                    }
                    PosKind::Col => pos.col + 1,
                    PosKind::Vcol => vcol_at(line, pos.col as usize) + 1,
                };
                match cmp {
                    b'>' => val > n,
                    b'<' => val < n,
                    _ => val == n,
                }
            }
        }
    }

    fn check_visual(&self, pos: NPos) -> bool {
        let Some((mode, start, end)) = self.env.provider.visual() else {
            return false;
        };
        let (top, bot) = if (start.lnum, start.col) <= (end.lnum, end.col) {
            (start, end)
        } else {
            (end, start)
        };
        let lnum = self.env.firstlnum + pos.lnum;
        if lnum < top.lnum || lnum > bot.lnum {
            return false;
        }
        match mode {
            crate::buffer::VisualMode::Line => true,
            crate::buffer::VisualMode::Char => {
                !(lnum == top.lnum && pos.col < top.col)
                    && !(lnum == bot.lnum && pos.col > bot.col)
            }
            crate::buffer::VisualMode::Block => {
                let sv = vcol_at(
                    self.env.provider.line(top.lnum),
                    top.col as usize,
                );
                let ev = vcol_at(
                    self.env.provider.line(bot.lnum),
                    bot.col as usize,
                );
                let (lo, hi) = (sv.min(ev), sv.max(ev));
                let v = vcol_at(self.getline(pos.lnum), pos.col as usize);
                v >= lo && v <= hi
            }
        }
    }

    /// Epsilon closure: follow splits, jumps, saves and zero-width asserts,
    /// appending reachable consuming states to `list` in priority order.
    fn add_thread(
        &mut self,
        insts: &[Inst],
        list: &mut Vec<Thread>,
        seen: &mut [u32],
        gen: u32,
        pc: usize,
        pos: NPos,
        caps: Caps,
    ) -> Result<(), MatchFailure> {
        self.adds += 1;
        if self.adds > MAX_THREAD_ADDS {
            return Err(MatchFailure::TooExpensive);
        }
        if seen[pc] == gen {
            return Ok(());
        }
        seen[pc] = gen;
        match &insts[pc] {
            Inst::Jmp(to) => {
                self.add_thread(insts, list, seen, gen, *to, pos, caps)
            }
            Inst::Split { pref, alt } => {
                self.add_thread(
                    insts,
                    list,
                    seen,
                    gen,
                    *pref,
                    pos,
                    caps.clone(),
                )?;
                self.add_thread(insts, list, seen, gen, *alt, pos, caps)
            }
            Inst::Save(slot) => {
                let slot = *slot;
                if slot < self.prog.nslots {
                    let mut new_caps = (*caps).clone();
                    new_caps[slot] = Some(pos);
                    self.add_thread(
                        insts,
                        list,
                        seen,
                        gen,
                        pc + 1,
                        pos,
                        Rc::new(new_caps),
                    )
                } else {
                    self.add_thread(insts, list, seen, gen, pc + 1, pos, caps)
                }
            }
            Inst::Assert(a) => {
                if self.check_assert(*a, pos) {
                    self.add_thread(insts, list, seen, gen, pc + 1, pos, caps)
                } else {
                    Ok(())
                }
            }
            Inst::Look { idx, negate } => {
                let prog = self.prog;
                let sub = &prog.looks[*idx];
                let hit = self.run_anchored(sub, pos)?;
                if hit != *negate {
                    self.add_thread(insts, list, seen, gen, pc + 1, pos, caps)
                } else {
                    Ok(())
                }
            }
            _ => {
                list.push(Thread { pc, caps });
                Ok(())
            }
        }
    }

    fn consumes(&self, inst: &Inst, cur: Cur) -> bool {
        match (inst, cur) {
            (Inst::Char(pc), Cur::Char(c, _)) => {
                chars_eq(self.reg_ic, *pc, c)
            }
            (Inst::Class { code, .. }, Cur::Char(c, _)) => {
                class_ok(self.env.provider.chartab(), *code, c)
            }
            (Inst::Class { with_nl, .. }, Cur::Nl) => *with_nl,
            (Inst::Set { chars, negate, .. }, Cur::Char(c, _)) => {
                set_contains(self.reg_ic, chars.as_bytes(), c) != *negate
            }
            (Inst::Set { with_nl, .. }, Cur::Nl) => *with_nl,
            (Inst::Newl, Cur::Nl) => true,
            (Inst::Newl, Cur::Char(c, _)) => {
                self.env.line_lbr && c == '\n'
            }
            _ => false,
        }
    }

    /// Anchored sub-simulation for look-ahead operands: does the operand
    /// match starting exactly at `pos`?
    fn run_anchored(
        &mut self,
        insts: &[Inst],
        start: NPos,
    ) -> Result<bool, MatchFailure> {
        let caps: Caps = Rc::new(vec![None; self.prog.nslots]);
        let mut seen = vec![0u32; insts.len()];
        let mut gen = 0u32;
        let mut clist: Vec<Thread> = Vec::new();
        let mut nlist: Vec<Thread> = Vec::new();
        let mut pos = start;
        gen += 1;
        self.add_thread(
            insts,
            &mut clist,
            &mut seen,
            gen,
            0,
            pos,
            caps.clone(),
        )?;
        loop {
            let cur = self.current(pos);
            let next = self.next_pos(pos, cur);
            gen += 1;
            for th in clist.drain(..) {
                if matches!(insts[th.pc], Inst::Match) {
                    return Ok(true);
                }
                if cur != Cur::Eof && self.consumes(&insts[th.pc], cur) {
                    self.add_thread(
                        insts,
                        &mut nlist,
                        &mut seen,
                        gen,
                        th.pc + 1,
                        next,
                        th.caps.clone(),
                    )?;
                }
            }
            if nlist.is_empty() {
                return Ok(false);
            }
            std::mem::swap(&mut clist, &mut nlist);
            pos = next;
        }
    }

    fn deadline_hit(&mut self) -> bool {
        if let Some(flag) = self.env.interrupt {
            if !self.env.nobreak && flag.load(Ordering::Relaxed) {
                self.failure = Some(MatchFailure::Interrupted);
                return true;
            }
        }
        if let Some(deadline) = self.env.deadline {
            if Instant::now() >= deadline {
                self.failure = Some(MatchFailure::TimedOut);
                return true;
            }
        }
        false
    }

    /// The main lockstep loop. Start threads are injected at every column
    /// of the first line until a match is found; the first match in thread
    /// priority order wins, later higher-priority matches replace it.
    fn run(&mut self, col: u32) -> Option<(Caps, NPos)> {
        let prog = self.prog;
        let insts: &[Inst] = &prog.insts;
        let mut seen = vec![0u32; insts.len()];
        let mut gen = 0u32;
        let mut clist: Vec<Thread> = Vec::new();
        let mut nlist: Vec<Thread> = Vec::new();
        let mut matched: Option<(Caps, NPos)> = None;
        let empty_caps: Caps =
            Rc::new(vec![None; self.prog.nslots]);

        let mut pos = NPos { lnum: 0, col };
        let mut steps = 0u32;
        loop {
            steps += 1;
            if steps % 128 == 0 && self.deadline_hit() {
                return None;
            }

            let cur = self.current(pos);
            gen += 1;

            // Inject a start thread while no match was found; only on the
            // first line, like the backtracker's outer loop.
            let inject = matched.is_none()
                && pos.lnum == 0
                && (pos.col >= col)
                && (!self.prog.anchored || pos.col == col)
                && (self.env.maxcol == 0 || pos.col < self.env.maxcol);
            let inject = inject
                && match (self.prog.start_char, cur) {
                    (Some(sc), Cur::Char(c, _)) => {
                        chars_eq(self.reg_ic, sc, c)
                    }
                    (Some(_), _) => false,
                    (None, _) => true,
                };
            // Process in priority order; existing threads come first.
            let drained: Vec<Thread> = clist.drain(..).collect();
            let mut all = drained;
            if inject {
                let mut starter: Vec<Thread> = Vec::new();
                if self
                    .add_thread(
                        insts,
                        &mut starter,
                        &mut seen,
                        gen,
                        0,
                        pos,
                        empty_caps.clone(),
                    )
                    .is_err()
                {
                    self.failure = Some(MatchFailure::TooExpensive);
                    return None;
                }
                all.extend(starter);
            }

            let next = self.next_pos(pos, cur);
            let step_gen = gen + 1;
            gen = step_gen;
            for th in all {
                if matches!(insts[th.pc], Inst::Match) {
                    // Match for the highest-priority live thread: keep it,
                    // drop the lower-priority rest.
                    matched = Some((th.caps, pos));
                    break;
                }
                if cur != Cur::Eof && self.consumes(&insts[th.pc], cur) {
                    if self
                        .add_thread(
                            insts,
                            &mut nlist,
                            &mut seen,
                            step_gen,
                            th.pc + 1,
                            next,
                            th.caps,
                        )
                        .is_err()
                    {
                        self.failure = Some(MatchFailure::TooExpensive);
                        return None;
                    }
                }
            }

            std::mem::swap(&mut clist, &mut nlist);
            nlist.clear();

            if cur == Cur::Eof {
                break;
            }
            if clist.is_empty() {
                // Nothing in flight: stop when no new starts can appear.
                if matched.is_some()
                    || pos.lnum > 0
                    || (self.prog.anchored && pos.col >= col)
                {
                    break;
                }
            }
            pos = next;
        }
        matched
    }
}

fn prev_char_at(line: &[u8], col: usize) -> Option<char> {
    let len = crate::buffer::prev_char_len(line, col);
    if len == 0 {
        None
    } else {
        Some(decode_char(line, col - len).0)
    }
}

fn vcol_at(line: &[u8], col: usize) -> u32 {
    let mut vcol = 0u32;
    let mut i = 0;
    while i < col && i < line.len() {
        let (c, len) = decode_char(line, i);
        vcol += match c {
            '\t' => 8 - (vcol % 8),
            c if c as u32 >= 0x1100 => 2,
            _ => 1,
        };
        i += len;
    }
    vcol
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, ParseOpts};

    fn nfa(pat: &str) -> Result<NfaProgram, Error> {
        let parsed =
            parse(pat, ParseOpts { magic: true, ..Default::default() })
                .unwrap();
        compile_nfa(&parsed)
    }

    #[test]
    fn bails_on_backtracker_only_features() {
        assert!(matches!(nfa(r"\(a\)\1"), Err(Error::TooExpensive)));
        assert!(matches!(nfa(r"\(a\)\@<=b"), Err(Error::TooExpensive)));
        assert!(matches!(nfa(r"a\@>b"), Err(Error::TooExpensive)));
        assert!(matches!(nfa(r"fu\%[nction]"), Err(Error::TooExpensive)));
        assert!(matches!(nfa(r"a\{1,100}"), Err(Error::TooExpensive)));
    }

    #[test]
    fn compiles_core_constructs() {
        assert!(nfa("foo").is_ok());
        assert!(nfa(r"a*b\+c\=").is_ok());
        assert!(nfa(r"\(a\|b\)c").is_ok());
        assert!(nfa(r"^foo$").is_ok());
        assert!(nfa(r"a\{2,4}").is_ok());
        assert!(nfa(r"foo\(bar\)\@=").is_ok());
        assert!(nfa(r"[a-z]\d").is_ok());
    }

    #[test]
    fn anchoring_and_start_char() {
        assert!(nfa("^foo").unwrap().anchored);
        assert!(!nfa("foo").unwrap().anchored);
        assert_eq!(nfa("foo").unwrap().start_char, Some('f'));
        assert_eq!(nfa(r"foo\|faz").unwrap().start_char, Some('f'));
        assert_eq!(nfa(r"foo\|bar").unwrap().start_char, None);
        assert_eq!(nfa(r".oo").unwrap().start_char, None);
    }
}
