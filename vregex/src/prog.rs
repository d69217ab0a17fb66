//! The backtracking program: opcodes, two-pass emitter, compiled form.
//!
//! A program is one magic prefix byte followed by nodes. A node is one opcode
//! byte plus a two-byte "next" offset (MSB first), then the operand bytes.
//! "next" offsets are positive and relative to the node, except after `BACK`
//! where the offset points backward. Offsets above 16 bits do not fit and
//! make the pattern too long.
//!
//! Emission happens twice over the same code path: a measuring pass that only
//! computes the size, then a writing pass into a buffer of exactly that size.

use crate::error::Error;
use crate::syntax::{
    has_width, is_simple, Ast, LookKind, Parsed, PosKind, ProgFlags,
};

/// Opcodes. One byte each; the numbering groups families so that the
/// submatch number or the line-break variant rides on the opcode itself.
#[allow(dead_code)]
pub(crate) mod op {
    /// End of program or of a look-around operand.
    pub const END: u8 = 0;
    pub const BOL: u8 = 1;
    pub const EOL: u8 = 2;
    /// Match this alternative, or the next (linked by "next" pointers).
    pub const BRANCH: u8 = 3;
    /// Match "", the "next" pointer points backward.
    pub const BACK: u8 = 4;
    /// Match the NUL-terminated operand string.
    pub const EXACTLY: u8 = 5;
    /// Match the empty string.
    pub const NOTHING: u8 = 6;
    /// Match the simple operand 0 or more times.
    pub const STAR: u8 = 7;
    /// Match the simple operand 1 or more times.
    pub const PLUS: u8 = 8;
    /// Look-ahead: match the operand zero-width.
    pub const MATCH: u8 = 9;
    /// Negative look-ahead.
    pub const NOMATCH: u8 = 10;
    /// Look-behind: operand must end at the current position.
    pub const BEHIND: u8 = 11;
    /// Negative look-behind.
    pub const NOBEHIND: u8 = 12;
    /// Atomic group: match the operand here, no re-try.
    pub const SUBPAT: u8 = 13;
    /// Match the simple operand between min and max times.
    pub const BRACE_SIMPLE: u8 = 14;
    /// Match "" at the begin of a word.
    pub const BOW: u8 = 15;
    /// Match "" at the end of a word.
    pub const EOW: u8 = 16;
    /// Four-byte min and max for the following brace node.
    pub const BRACE_LIMITS: u8 = 17;
    /// Match a line break.
    pub const NEWL: u8 = 18;
    /// End position for BEHIND / NOBEHIND.
    pub const BHPOS: u8 = 19;

    // Character classes. Each has a +ADD_NL variant that also matches a
    // line break.
    pub const ANY: u8 = 20;
    pub const ANYOF: u8 = 21;
    pub const ANYBUT: u8 = 22;
    pub const IDENT: u8 = 23;
    pub const SIDENT: u8 = 24;
    pub const KWORD: u8 = 25;
    pub const SKWORD: u8 = 26;
    pub const FNAME: u8 = 27;
    pub const SFNAME: u8 = 28;
    pub const PRINT: u8 = 29;
    pub const SPRINT: u8 = 30;
    pub const WHITE: u8 = 31;
    pub const NWHITE: u8 = 32;
    pub const DIGIT: u8 = 33;
    pub const NDIGIT: u8 = 34;
    pub const HEX: u8 = 35;
    pub const NHEX: u8 = 36;
    pub const OCTAL: u8 = 37;
    pub const NOCTAL: u8 = 38;
    pub const WORD: u8 = 39;
    pub const NWORD: u8 = 40;
    pub const HEAD: u8 = 41;
    pub const NHEAD: u8 = 42;
    pub const ALPHA: u8 = 43;
    pub const NALPHA: u8 = 44;
    pub const LOWER: u8 = 45;
    pub const NLOWER: u8 = 46;
    pub const UPPER: u8 = 47;
    pub const NUPPER: u8 = 48;

    /// Added to a class opcode: also match a line break.
    pub const ADD_NL: u8 = 30;
    pub const FIRST_NL: u8 = ANY + ADD_NL;
    pub const LAST_NL: u8 = NUPPER + ADD_NL;

    /// `MOPEN + 0` is the whole match (`\zs`), 1..9 are `\(`.
    pub const MOPEN: u8 = 80;
    pub const MCLOSE: u8 = 90;
    pub const BACKREF: u8 = 100;
    pub const ZOPEN: u8 = 110;
    pub const ZCLOSE: u8 = 120;
    pub const ZREF: u8 = 130;
    /// Complex brace repeat; ten slots for nesting.
    pub const BRACE_COMPLEX: u8 = 140;
    pub const NOPEN: u8 = 150;
    pub const NCLOSE: u8 = 151;

    /// One multi-byte char; operand length comes from its lead byte.
    pub const MULTIBYTECODE: u8 = 200;
    pub const CURSOR: u8 = 203;
    /// Operand: value u32, cmp u8, cursor-relative u8.
    pub const RE_LNUM: u8 = 204;
    pub const RE_COL: u8 = 205;
    pub const RE_VCOL: u8 = 206;
    /// Operand: mark byte, cmp u8.
    pub const RE_MARK: u8 = 207;
    pub const RE_VISUAL: u8 = 208;
    pub const RE_COMPOSING: u8 = 209;
    pub const RE_BOF: u8 = 210;
    pub const RE_EOF: u8 = 211;

    pub fn with_nl(opcode: u8) -> bool {
        (FIRST_NL..=LAST_NL).contains(&opcode)
    }
}

/// The first program byte; catches callers handing us mutilated programs.
pub(crate) const REGMAGIC: u8 = 0o234;

/// Code emitter: pass 1 measures, pass 2 writes.
pub(crate) enum Emitter {
    Measure { size: usize },
    Write { code: Vec<u8>, too_long: bool },
}

impl Emitter {
    fn len(&self) -> usize {
        match self {
            Emitter::Measure { size } => *size,
            Emitter::Write { code, .. } => code.len(),
        }
    }

    fn byte(&mut self, b: u8) {
        match self {
            Emitter::Measure { size } => *size += 1,
            Emitter::Write { code, .. } => code.push(b),
        }
    }

    fn bytes(&mut self, s: &[u8]) {
        match self {
            Emitter::Measure { size } => *size += s.len(),
            Emitter::Write { code, .. } => code.extend_from_slice(s),
        }
    }

    fn uint32(&mut self, v: u32) {
        self.bytes(&v.to_be_bytes());
    }

    /// Emit a new node with a null "next" pointer; returns its position.
    fn node(&mut self, opcode: u8) -> usize {
        let pos = self.len();
        self.byte(opcode);
        self.byte(0);
        self.byte(0);
        pos
    }

    /// Insert an operator in front of an already-emitted operand. The
    /// operand moves up; relative offsets inside it stay valid.
    fn insert(&mut self, opcode: u8, opnd: usize) {
        match self {
            Emitter::Measure { size } => *size += 3,
            Emitter::Write { code, .. } => {
                code.splice(opnd..opnd, [opcode, 0, 0]);
            }
        }
    }

    /// Insert an operator with a four-byte number operand.
    fn insert_nr(&mut self, opcode: u8, val: u32, opnd: usize) {
        match self {
            Emitter::Measure { size } => *size += 7,
            Emitter::Write { code, .. } => {
                let mut ins = vec![opcode, 0, 0];
                ins.extend_from_slice(&val.to_be_bytes());
                code.splice(opnd..opnd, ins);
            }
        }
    }

    /// Insert an operator carrying min/max limits; also sets its "next" to
    /// the node that follows it.
    fn insert_limits(&mut self, opcode: u8, min: u32, max: u32, opnd: usize) {
        match self {
            Emitter::Measure { size } => {
                *size += 11;
                return;
            }
            Emitter::Write { code, .. } => {
                let mut ins = vec![opcode, 0, 0];
                ins.extend_from_slice(&min.to_be_bytes());
                ins.extend_from_slice(&max.to_be_bytes());
                code.splice(opnd..opnd, ins);
            }
        }
        self.tail(opnd, opnd + 11);
    }

    fn opcode(&self, pos: usize) -> u8 {
        match self {
            Emitter::Measure { .. } => 0,
            Emitter::Write { code, .. } => code[pos],
        }
    }

    fn next_of(&self, pos: usize) -> Option<usize> {
        match self {
            Emitter::Measure { .. } => None,
            Emitter::Write { code, .. } => next_in(code, pos),
        }
    }

    /// Set the "next" pointer at the end of a node chain.
    fn tail(&mut self, from: usize, to: usize) {
        let Emitter::Write { code, too_long } = self else { return };
        let mut scan = from;
        while let Some(next) = next_in(code, scan) {
            scan = next;
        }
        let offset = if code[scan] == op::BACK {
            scan as isize - to as isize
        } else {
            to as isize - scan as isize
        };
        if offset > 0xffff || offset < 0 {
            *too_long = true;
        } else {
            code[scan + 1] = (offset >> 8) as u8;
            code[scan + 2] = offset as u8;
        }
    }

    /// Like `tail`, on the operand of a branch; nop for operandless nodes.
    fn optail(&mut self, pos: usize, to: usize) {
        let opc = self.opcode(pos);
        if let Emitter::Measure { .. } = self {
            return;
        }
        if opc != op::BRANCH
            && !(op::BRACE_COMPLEX..op::BRACE_COMPLEX + 10).contains(&opc)
        {
            return;
        }
        self.tail(pos + 3, to);
    }
}

pub(crate) fn next_in(code: &[u8], pos: usize) -> Option<usize> {
    let offset = ((code[pos + 1] as usize) << 8) | code[pos + 2] as usize;
    if offset == 0 {
        return None;
    }
    if code[pos] == op::BACK {
        Some(pos - offset)
    } else {
        Some(pos + offset)
    }
}

pub(crate) fn operand(pos: usize) -> usize {
    pos + 3
}

/// Four-byte operand, MSB first.
pub(crate) fn operand_u32(code: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes([
        code[pos + 3],
        code[pos + 4],
        code[pos + 5],
        code[pos + 6],
    ])
}

/// A compiled backtracking program.
#[derive(Debug, Clone)]
pub(crate) struct BtProgram {
    pub code: Vec<u8>,
    pub ngroups: u8,
    pub flags: ProgFlags,
    pub has_z: bool,
    /// Anchored at start of line/file; try only the start column.
    pub anchored: bool,
    /// The match must start with this char.
    pub start_char: Option<char>,
    /// The match must contain this literal somewhere.
    pub must_contain: Option<String>,
}

struct EmitCtx {
    num_complex_braces: u8,
}

pub(crate) fn compile_bt(parsed: &Parsed) -> Result<BtProgram, Error> {
    // First pass: determine size. Legality was settled by the parser.
    let mut e = Emitter::Measure { size: 0 };
    let mut ctx = EmitCtx { num_complex_braces: 0 };
    e.byte(REGMAGIC);
    emit_top(&mut e, &mut ctx, &parsed.ast)?;
    let size = e.len();

    // Second pass: emit code.
    let mut e = Emitter::Write { code: Vec::with_capacity(size), too_long: false };
    let mut ctx = EmitCtx { num_complex_braces: 0 };
    e.byte(REGMAGIC);
    emit_top(&mut e, &mut ctx, &parsed.ast)?;
    let Emitter::Write { code, too_long } = e else { unreachable!() };
    if too_long {
        return Err(Error::TooBig);
    }
    debug_assert_eq!(code.len(), size);

    let mut prog = BtProgram {
        code,
        ngroups: parsed.ngroups,
        flags: parsed.flags,
        has_z: parsed.has_z_groups,
        anchored: false,
        start_char: None,
        must_contain: None,
    };
    find_prefilter(&mut prog, &parsed.ast);
    Ok(prog)
}

#[derive(Clone, Copy)]
enum Wrap {
    Top,
    Capture(u8),
    NoCapture,
    ZCapture(u8),
}

fn emit_top(e: &mut Emitter, ctx: &mut EmitCtx, ast: &Ast) -> Result<usize, Error> {
    emit_alt(e, ctx, ast, Wrap::Top)
}

/// Emit an alternation, optionally wrapped in open/close submatch markers.
/// Mirrors the branch layout: every alternative starts with a BRANCH node,
/// the chain of BRANCH nodes ends at a common closing node.
fn emit_alt(
    e: &mut Emitter,
    ctx: &mut EmitCtx,
    ast: &Ast,
    wrap: Wrap,
) -> Result<usize, Error> {
    let wrap_node = match wrap {
        Wrap::Top => None,
        Wrap::Capture(n) => Some(e.node(op::MOPEN + n)),
        Wrap::ZCapture(n) => Some(e.node(op::ZOPEN + n)),
        Wrap::NoCapture => Some(e.node(op::NOPEN)),
    };

    let single;
    let branches: &[Ast] = match ast {
        Ast::Alt(branches) => branches,
        other => {
            single = [other.clone()];
            &single
        }
    };

    let mut start = wrap_node;
    for branch in branches {
        let br = emit_branch(e, ctx, branch)?;
        match start {
            Some(s) => e.tail(s, br),
            None => start = Some(br),
        }
    }
    let start = start.expect("at least one branch");

    let ender = e.node(match wrap {
        Wrap::Top => op::END,
        Wrap::Capture(n) => op::MCLOSE + n,
        Wrap::ZCapture(n) => op::ZCLOSE + n,
        Wrap::NoCapture => op::NCLOSE,
    });
    e.tail(start, ender);

    // Hook the tails of the branches to the closing node.
    let mut br = Some(start);
    while let Some(b) = br {
        e.optail(b, ender);
        br = e.next_of(b);
    }
    Ok(start)
}

fn emit_branch(
    e: &mut Emitter,
    ctx: &mut EmitCtx,
    ast: &Ast,
) -> Result<usize, Error> {
    let ret = e.node(op::BRANCH);
    match ast {
        Ast::Concat(items) => {
            let mut chain: Option<usize> = None;
            for item in items {
                let latest = emit_piece(e, ctx, item)?;
                if let Some(c) = chain {
                    e.tail(c, latest);
                }
                chain = Some(latest);
            }
            if chain.is_none() {
                e.node(op::NOTHING);
            }
        }
        Ast::Nothing => {
            e.node(op::NOTHING);
        }
        other => {
            emit_piece(e, ctx, other)?;
        }
    }
    Ok(ret)
}

fn emit_piece(
    e: &mut Emitter,
    ctx: &mut EmitCtx,
    ast: &Ast,
) -> Result<usize, Error> {
    match ast {
        Ast::Star(atom) => {
            let ret = emit_piece(e, ctx, atom)?;
            if is_simple(atom) {
                e.insert(op::STAR, ret);
            } else {
                // Emit x* as (x&|), where & means "self".
                e.insert(op::BRANCH, ret); // Either x
                let back = e.node(op::BACK); // and loop
                e.optail(ret, back);
                e.optail(ret, ret); // back
                let alt = e.node(op::BRANCH); // or
                e.tail(ret, alt);
                let nil = e.node(op::NOTHING); // null
                e.tail(ret, nil);
            }
            Ok(ret)
        }
        Ast::Plus(atom) => {
            let ret = emit_piece(e, ctx, atom)?;
            if is_simple(atom) {
                e.insert(op::PLUS, ret);
            } else {
                // Emit x+ as x(&|), where & means "self".
                let next = e.node(op::BRANCH); // Either
                e.tail(ret, next);
                let back = e.node(op::BACK); // loop back
                e.tail(back, ret);
                let alt = e.node(op::BRANCH); // or
                e.tail(next, alt);
                let nil = e.node(op::NOTHING); // null
                e.tail(ret, nil);
            }
            Ok(ret)
        }
        Ast::Quest(atom) => {
            // Emit x= as (x|)
            let ret = emit_piece(e, ctx, atom)?;
            e.insert(op::BRANCH, ret); // Either x
            let alt = e.node(op::BRANCH); // or
            e.tail(ret, alt);
            let nil = e.node(op::NOTHING); // null
            e.tail(ret, nil);
            e.optail(ret, nil);
            Ok(ret)
        }
        Ast::Look { atom, kind, limit } => {
            let ret = emit_piece(e, ctx, atom)?;
            let behind =
                matches!(kind, LookKind::Behind | LookKind::BehindNot);
            if behind {
                // Look-behind must end where it started.
                let bh = e.node(op::BHPOS);
                e.tail(ret, bh);
            }
            let end = e.node(op::END); // operand ends
            e.tail(ret, end);
            match kind {
                LookKind::Ahead => e.insert(op::MATCH, ret),
                LookKind::AheadNot => e.insert(op::NOMATCH, ret),
                LookKind::Atomic => e.insert(op::SUBPAT, ret),
                LookKind::Behind => e.insert_nr(op::BEHIND, *limit, ret),
                LookKind::BehindNot => e.insert_nr(op::NOBEHIND, *limit, ret),
            }
            Ok(ret)
        }
        Ast::Brace { atom, min, max } => {
            let ret = emit_piece(e, ctx, atom)?;
            if is_simple(atom) {
                e.insert(op::BRACE_SIMPLE, ret);
                e.insert_limits(op::BRACE_LIMITS, *min, *max, ret);
            } else {
                let no = ctx.num_complex_braces;
                ctx.num_complex_braces += 1;
                debug_assert!(no < 10);
                e.insert(op::BRACE_COMPLEX + no, ret);
                let back = e.node(op::BACK);
                e.optail(ret, back);
                e.optail(ret, ret);
                e.insert_limits(op::BRACE_LIMITS, *min, *max, ret);
            }
            Ok(ret)
        }
        other => emit_atom(e, ctx, other),
    }
}

fn emit_atom(
    e: &mut Emitter,
    ctx: &mut EmitCtx,
    ast: &Ast,
) -> Result<usize, Error> {
    Ok(match ast {
        Ast::Bol => e.node(op::BOL),
        Ast::Eol => e.node(op::EOL),
        Ast::Bow => e.node(op::BOW),
        Ast::Eow => e.node(op::EOW),
        Ast::Bof => e.node(op::RE_BOF),
        Ast::Eof => e.node(op::RE_EOF),
        Ast::Cursor => e.node(op::CURSOR),
        Ast::Visual => e.node(op::RE_VISUAL),
        Ast::Composing => e.node(op::RE_COMPOSING),
        Ast::MatchStart => e.node(op::MOPEN),
        Ast::MatchEnd => e.node(op::MCLOSE),
        Ast::Newl => e.node(op::NEWL),
        Ast::Nothing => e.node(op::NOTHING),

        Ast::Class { code, with_nl } => {
            e.node(code + if *with_nl { op::ADD_NL } else { 0 })
        }

        Ast::Exactly(s) => {
            let ret = e.node(op::EXACTLY);
            e.bytes(s.as_bytes());
            e.byte(0);
            ret
        }

        Ast::Multibyte(s) => {
            let ret = e.node(op::MULTIBYTECODE);
            e.bytes(s.as_bytes());
            ret
        }

        Ast::Collection { negate, with_nl, chars } => {
            let base = if *negate { op::ANYBUT } else { op::ANYOF };
            let ret =
                e.node(base + if *with_nl { op::ADD_NL } else { 0 });
            e.bytes(chars.as_bytes());
            e.byte(0);
            ret
        }

        Ast::Backref(n) => e.node(op::BACKREF + n),
        Ast::ZRef(n) => e.node(op::ZREF + n),

        Ast::Mark { name, cmp } => {
            let ret = e.node(op::RE_MARK);
            e.byte(*name as u32 as u8);
            e.byte(*cmp);
            ret
        }

        Ast::PosPred { kind, value, cmp, cursor_rel } => {
            let ret = e.node(match kind {
                PosKind::Lnum => op::RE_LNUM,
                PosKind::Col => op::RE_COL,
                PosKind::Vcol => op::RE_VCOL,
            });
            e.uint32(*value);
            e.byte(*cmp);
            e.byte(*cursor_rel as u8);
            ret
        }

        Ast::Group { num, ast } => {
            emit_alt(e, ctx, ast, Wrap::Capture(*num))?
        }
        Ast::ZGroup { num, ast } => {
            emit_alt(e, ctx, ast, Wrap::ZCapture(*num))?
        }
        Ast::NGroup(ast) => emit_alt(e, ctx, ast, Wrap::NoCapture)?,

        // \%[abc]: a list of branches, all ending at a shared NOTHING.
        Ast::OptSeq(atoms) => {
            let mut ret: Option<usize> = None;
            let mut lastnode: Option<usize> = None;
            for atom in atoms {
                let br = e.node(op::BRANCH);
                match ret {
                    None => ret = Some(br),
                    Some(_) => e.tail(lastnode.unwrap(), br),
                }
                lastnode = Some(emit_atom(e, ctx, atom)?);
            }
            let ret = ret.expect("non-empty optional sequence");
            let lastnode = lastnode.unwrap();
            let lastbranch = e.node(op::BRANCH);
            let nothing = e.node(op::NOTHING);
            if let Emitter::Write { .. } = e {
                e.tail(lastnode, nothing);
                e.tail(lastbranch, nothing);
                // connect all branches to the closing branch
                let mut br = ret;
                while br != lastnode {
                    if e.opcode(br) == op::BRANCH {
                        e.tail(br, lastbranch);
                        br = operand(br);
                    } else {
                        match e.next_of(br) {
                            Some(n) => br = n,
                            None => break,
                        }
                    }
                }
            }
            ret
        }

        Ast::Alt(_) | Ast::Concat(_) => {
            // Nested plain alternation appears only via groups.
            emit_alt(e, ctx, ast, Wrap::NoCapture)?
        }

        Ast::Star(_)
        | Ast::Plus(_)
        | Ast::Quest(_)
        | Ast::Brace { .. }
        | Ast::Look { .. } => emit_piece(e, ctx, ast)?,
    })
}

/// Dig out the start-of-match optimizations: anchoredness, a required first
/// char and a required literal. Conservative; never rejects a true match.
fn find_prefilter(prog: &mut BtProgram, ast: &Ast) {
    let (anchored, start_char, must_contain) =
        prefilter_of(&prog.code, prog.flags, ast);
    prog.anchored = anchored;
    prog.start_char = start_char;
    prog.must_contain = must_contain;
}

fn exactly_str(code: &[u8], pos: usize) -> Option<&str> {
    let bytes = &code[operand(pos)..];
    let end = bytes.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&bytes[..end]).ok()
}

fn prefilter_of(
    code: &[u8],
    flags: ProgFlags,
    ast: &Ast,
) -> (bool, Option<char>, Option<String>) {
    let mut anchored = false;
    let mut start_char = None;
    let mut must_contain = None;

    let first_branch = 1;
    // Only with one top-level choice.
    match next_in(code, first_branch) {
        Some(after) if code[after] == op::END => {}
        _ => return (anchored, start_char, must_contain),
    }
    let mut scan = operand(first_branch);

    if code[scan] == op::BOL || code[scan] == op::RE_BOF {
        anchored = true;
        match next_in(code, scan) {
            Some(next) => scan = next,
            None => return (anchored, start_char, must_contain),
        }
    }

    if code[scan] == op::EXACTLY {
        start_char = exactly_str(code, scan).and_then(|s| s.chars().next());
    } else if matches!(
        code[scan],
        op::BOW | op::EOW | op::NOTHING | op::MOPEN | op::NOPEN
            | op::MCLOSE | op::NCLOSE
    ) {
        if let Some(next) = next_in(code, scan) {
            if code[next] == op::EXACTLY {
                start_char =
                    exactly_str(code, next).and_then(|s| s.chars().next());
            }
        }
    }

    // If there's something expensive in the pattern, find the longest
    // literal string that must appear, favoring later strings.
    let starts_loose =
        sp_start(ast) || code[scan] == op::BOW || code[scan] == op::EOW;
    if starts_loose && !flags.contains(ProgFlags::HASNL) {
        let mut longest: Option<String> = None;
        let mut cursor = Some(scan);
        while let Some(pos) = cursor {
            if code[pos] == op::EXACTLY {
                if let Some(s) = exactly_str(code, pos) {
                    if s.len() >= longest.as_ref().map_or(1, |l| l.len()) {
                        longest = Some(s.to_string());
                    }
                }
            }
            cursor = next_in(code, pos);
        }
        must_contain = longest;
    }
    (anchored, start_char, must_contain)
}

/// True when the node can start with a zero-width repeat, making the first
/// char unreliable as a filter.
fn sp_start(ast: &Ast) -> bool {
    match ast {
        Ast::Star(_) | Ast::Quest(_) | Ast::Look { .. } => true,
        Ast::Plus(atom) => !has_width(atom),
        Ast::Brace { min, max, .. } => !(*min > 0 && *max > 0),
        Ast::Alt(branches) => branches.iter().any(sp_start),
        Ast::Concat(items) => items.first().map(sp_start).unwrap_or(false),
        Ast::Group { ast, .. } | Ast::ZGroup { ast, .. } | Ast::NGroup(ast) => {
            sp_start(ast)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{parse, ParseOpts};

    fn compile(pat: &str) -> BtProgram {
        let parsed =
            parse(pat, ParseOpts { magic: true, ..Default::default() })
                .unwrap();
        compile_bt(&parsed).unwrap()
    }

    #[test]
    fn program_shape() {
        let prog = compile("foo");
        assert_eq!(prog.code[0], REGMAGIC);
        assert_eq!(prog.code[1], op::BRANCH);
        // the branch chains to the END node
        let end = next_in(&prog.code, 1).unwrap();
        assert_eq!(prog.code[end], op::END);
        // operand of the branch is the literal
        assert_eq!(prog.code[operand(1)], op::EXACTLY);
    }

    #[test]
    fn prefilter_literal() {
        let prog = compile("foo");
        assert_eq!(prog.start_char, Some('f'));
        assert!(!prog.anchored);
    }

    #[test]
    fn prefilter_anchored() {
        let prog = compile("^foo");
        assert!(prog.anchored);
        assert_eq!(prog.start_char, Some('f'));
    }

    #[test]
    fn prefilter_must_contain() {
        let prog = compile(r".*foobar.*");
        assert_eq!(prog.must_contain.as_deref(), Some("foobar"));
    }

    #[test]
    fn no_prefilter_with_alternatives() {
        let prog = compile(r"foo\|bar");
        assert_eq!(prog.start_char, None);
    }

    #[test]
    fn star_inserts_before_operand() {
        let prog = compile("ab*");
        // a is first, then STAR over the 'b'
        let a = operand(1);
        assert_eq!(prog.code[a], op::EXACTLY);
        let star = next_in(&prog.code, a).unwrap();
        assert_eq!(prog.code[star], op::STAR);
        assert_eq!(prog.code[operand(star)], op::EXACTLY);
    }

    #[test]
    fn brace_limits_precede_brace() {
        let prog = compile(r"a\{2,4}");
        let first = operand(1);
        assert_eq!(prog.code[first], op::BRACE_LIMITS);
        assert_eq!(operand_u32(&prog.code, first), 2);
        let brace = next_in(&prog.code, first).unwrap();
        assert_eq!(prog.code[brace], op::BRACE_SIMPLE);
    }

    #[test]
    fn too_long_pattern() {
        let pat = "a".repeat(70_000);
        let parsed =
            parse(&pat, ParseOpts { magic: true, ..Default::default() })
                .unwrap();
        assert!(matches!(compile_bt(&parsed), Err(Error::TooBig)));
    }

    #[test]
    fn measure_matches_write() {
        for pat in [
            "foo",
            r"\(ab\)\1",
            r"a\{2,4}b",
            r"x\+y\=z*",
            r"\(foo\)\@<!bar",
            r"fu\%[nction]",
            r"a\|b\|c",
            r"\%(x\|y\)\{-1,3}",
        ] {
            let parsed =
                parse(pat, ParseOpts { magic: true, ..Default::default() })
                    .unwrap();
            // compile_bt asserts size equality internally
            let prog = compile_bt(&parsed).unwrap();
            assert!(prog.code.len() > 1, "pattern {pat}");
        }
    }
}
