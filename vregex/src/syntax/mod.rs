/*!
Pattern syntax: the magic-mode [lexer] and the recursive-descent parser.

The parser produces a small syntax tree; the backtracking emitter
(`crate::prog`) and the NFA compiler (`crate::nfa`) both consume it. Grammar,
top down: alternation (`\|`) → branch (`\&`) → concatenation → piece (atom
plus quantifier) → atom.
*/

pub mod lexer;

use bitflags::bitflags;

use crate::error::Error;
use crate::prog::op;
use crate::regsub;
use self::lexer::{multi_type, Lexer, MagicLevel, MultiKind, Tok};
use vregex_unicode::{case, equiv};

bitflags! {
    /// Pattern-wide flags collected while parsing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProgFlags: u8 {
        /// `\c`: ignore case.
        const ICASE = 0x01;
        /// `\C`: match case.
        const NOICASE = 0x02;
        /// Pattern can match a line break.
        const HASNL = 0x04;
        /// `\Z`: ignore composing characters.
        const ICOMBINE = 0x08;
        /// Uses `\@<=` or `\@<!`.
        const LOOKBH = 0x10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LookKind {
    /// `\@=`
    Ahead,
    /// `\@!`
    AheadNot,
    /// `\@>`
    Atomic,
    /// `\@<=`
    Behind,
    /// `\@<!`
    BehindNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PosKind {
    Lnum,
    Col,
    Vcol,
}

/// Parsed pattern tree. Quantifiers bind to the preceding atom; a reversed
/// brace range (`min > max`) means reluctant matching.
#[derive(Debug, Clone)]
pub(crate) enum Ast {
    Alt(Vec<Ast>),
    Concat(Vec<Ast>),
    Nothing,
    Star(Box<Ast>),
    Plus(Box<Ast>),
    Quest(Box<Ast>),
    Brace { atom: Box<Ast>, min: u32, max: u32 },
    Look { atom: Box<Ast>, kind: LookKind, limit: u32 },
    Group { num: u8, ast: Box<Ast> },
    NGroup(Box<Ast>),
    ZGroup { num: u8, ast: Box<Ast> },
    /// `\%[abc]`: longest-prefix optional sequence.
    OptSeq(Vec<Ast>),
    Backref(u8),
    ZRef(u8),
    /// Character class; `code` is a base opcode in `ANY..=NUPPER`.
    Class { code: u8, with_nl: bool },
    Exactly(String),
    /// One multi-byte char kept as its own atom (before a multi, or a
    /// composing char).
    Multibyte(String),
    Collection { negate: bool, with_nl: bool, chars: String },
    Newl,
    Bol,
    Eol,
    Bow,
    Eow,
    Bof,
    Eof,
    Cursor,
    Visual,
    Composing,
    /// `\zs`
    MatchStart,
    /// `\ze`
    MatchEnd,
    Mark { name: char, cmp: u8 },
    PosPred { kind: PosKind, value: u32, cmp: u8, cursor_rel: bool },
}

/// True when a quantified `ast` can be matched by the repeat-consumer loop
/// (single-char nodes); everything else compiles to a branch/loop structure.
pub(crate) fn is_simple(ast: &Ast) -> bool {
    match ast {
        Ast::Class { .. } | Ast::Multibyte(_) | Ast::Collection { .. } => true,
        Ast::Exactly(s) => s.chars().count() == 1,
        _ => false,
    }
}

pub(crate) fn has_width(ast: &Ast) -> bool {
    match ast {
        Ast::Exactly(s) => !s.is_empty(),
        Ast::Class { .. }
        | Ast::Multibyte(_)
        | Ast::Collection { .. }
        | Ast::Newl => true,
        Ast::Plus(a) => has_width(a),
        Ast::Brace { atom, min, max } => {
            *min > 0 && *max > 0 && has_width(atom)
        }
        Ast::Group { ast, .. } | Ast::ZGroup { ast, .. } | Ast::NGroup(ast) => {
            has_width(ast)
        }
        Ast::Alt(branches) => branches.iter().all(has_width),
        Ast::Concat(items) => items.iter().any(has_width),
        _ => false,
    }
}

/// The result of parsing one pattern.
#[derive(Debug, Clone)]
pub(crate) struct Parsed {
    pub ast: Ast,
    pub ngroups: u8,
    pub flags: ProgFlags,
    pub has_z_groups: bool,
    pub uses_z_refs: bool,
    pub had_eol: bool,
}

/// Caller-side options for the parser.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ParseOpts {
    pub magic: bool,
    /// `\n` matches a newline char instead of a line break.
    pub string: bool,
    /// Unmatched `[` is an error instead of a literal.
    pub strict: bool,
    /// `\z(...\)` is allowed (syntax-engine callers).
    pub ext_set: bool,
    /// `\z1`..`\z9` are allowed.
    pub ext_use: bool,
}

pub(crate) fn parse(pattern: &str, opts: ParseOpts) -> Result<Parsed, Error> {
    let magic =
        if opts.magic { MagicLevel::Magic } else { MagicLevel::Nomagic };
    let mut p = Parser {
        lex: Lexer::new(pattern, magic),
        opts,
        one_exactly: false,
        nparen: 1,
        nzparen: 1,
        had_endbrace: [false; 10],
        num_complex_braces: 0,
        flags: ProgFlags::default(),
        has_z_groups: false,
        uses_z_refs: false,
        had_eol: false,
    };
    let ast = p.parse_reg(Paren::None)?;
    Ok(Parsed {
        ast,
        ngroups: p.nparen,
        flags: p.flags,
        has_z_groups: p.has_z_groups,
        uses_z_refs: p.uses_z_refs,
        had_eol: p.had_eol,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Paren {
    None,
    Capture,
    NoCapture,
    ZCapture,
}

// Class shortcut chars and their opcodes, positionally aligned.
const CLASS_CHARS: &[u8] = b".iIkKfFpPsSdDxXoOwWhHaAlLuU";
const CLASS_CODES: [u8; 27] = [
    op::ANY,
    op::IDENT,
    op::SIDENT,
    op::KWORD,
    op::SKWORD,
    op::FNAME,
    op::SFNAME,
    op::PRINT,
    op::SPRINT,
    op::WHITE,
    op::NWHITE,
    op::DIGIT,
    op::NDIGIT,
    op::HEX,
    op::NHEX,
    op::OCTAL,
    op::NOCTAL,
    op::WORD,
    op::NWORD,
    op::HEAD,
    op::NHEAD,
    op::ALPHA,
    op::NALPHA,
    op::LOWER,
    op::NLOWER,
    op::UPPER,
    op::NUPPER,
];

// Chars that stay special after '\' inside a collection.
const COLL_INRANGE: &[u8] = b"]^-n\\";
const COLL_ABBR: &[u8] = b"nrtebdoxuU";

struct Parser<'p> {
    lex: Lexer<'p>,
    opts: ParseOpts,
    one_exactly: bool,
    nparen: u8,
    nzparen: u8,
    had_endbrace: [bool; 10],
    num_complex_braces: u8,
    flags: ProgFlags,
    has_z_groups: bool,
    uses_z_refs: bool,
    had_eol: bool,
}

impl<'p> Parser<'p> {
    /// `\` prefix for error messages, absent in very-magic patterns.
    fn bs(&self) -> &'static str {
        if self.lex.magic == MagicLevel::VeryMagic {
            ""
        } else {
            "\\"
        }
    }

    fn parse_reg(&mut self, paren: Paren) -> Result<Ast, Error> {
        let parno = match paren {
            Paren::Capture => {
                if self.nparen >= 10 {
                    return Err(Error::syntax(
                        51,
                        format!("Too many {}(", self.bs()),
                    ));
                }
                let n = self.nparen;
                self.nparen += 1;
                n
            }
            Paren::ZCapture => {
                if self.nzparen >= 10 {
                    return Err(Error::syntax(50, "Too many \\z("));
                }
                let n = self.nzparen;
                self.nzparen += 1;
                n
            }
            _ => 0,
        };

        let mut branches = vec![self.parse_branch()?];
        while self.lex.peekchr() == Tok::Magic(b'|') {
            self.lex.skipchr();
            branches.push(self.parse_branch()?);
        }

        // Check for proper termination.
        if paren != Paren::None {
            if self.lex.getchr() != Tok::Magic(b')') {
                return Err(match paren {
                    Paren::ZCapture => Error::syntax(52, "Unmatched \\z("),
                    Paren::NoCapture => Error::syntax(
                        53,
                        format!("Unmatched {}%(", self.bs()),
                    ),
                    _ => Error::syntax(
                        54,
                        format!("Unmatched {}(", self.bs()),
                    ),
                });
            }
        } else if self.lex.peekchr() != Tok::End {
            return Err(if self.lex.peekchr() == Tok::Magic(b')') {
                Error::syntax(55, format!("Unmatched {})", self.bs()))
            } else {
                Error::syntax(488, "Trailing characters")
            });
        }

        let body = Ast::Alt(branches);
        Ok(match paren {
            Paren::Capture => {
                self.had_endbrace[parno as usize] = true;
                Ast::Group { num: parno, ast: Box::new(body) }
            }
            Paren::ZCapture => Ast::ZGroup { num: parno, ast: Box::new(body) },
            Paren::NoCapture => Ast::NGroup(Box::new(body)),
            Paren::None => body,
        })
    }

    /// One `\|` alternative: concats joined by `\&`. All concats must match
    /// at the same position; only the last one consumes, so the others
    /// become zero-width look-aheads.
    fn parse_branch(&mut self) -> Result<Ast, Error> {
        let mut concats = vec![self.parse_concat()?];
        while self.lex.peekchr() == Tok::Magic(b'&') {
            self.lex.skipchr();
            concats.push(self.parse_concat()?);
        }
        let last = concats.pop().unwrap();
        if concats.is_empty() {
            return Ok(last);
        }
        let mut items: Vec<Ast> = concats
            .into_iter()
            .map(|c| Ast::Look {
                atom: Box::new(c),
                kind: LookKind::Ahead,
                limit: 0,
            })
            .collect();
        items.push(last);
        Ok(Ast::Concat(items))
    }

    fn parse_concat(&mut self) -> Result<Ast, Error> {
        let mut items = Vec::new();
        loop {
            match self.lex.peekchr() {
                Tok::End
                | Tok::Magic(b'|')
                | Tok::Magic(b'&')
                | Tok::Magic(b')') => break,
                Tok::Magic(b'Z') => {
                    self.flags |= ProgFlags::ICOMBINE;
                    self.lex.skipchr_keepstart();
                }
                Tok::Magic(b'c') => {
                    self.flags |= ProgFlags::ICASE;
                    self.lex.skipchr_keepstart();
                }
                Tok::Magic(b'C') => {
                    self.flags |= ProgFlags::NOICASE;
                    self.lex.skipchr_keepstart();
                }
                Tok::Magic(b'v') => {
                    self.lex.magic = MagicLevel::VeryMagic;
                    self.lex.skipchr_keepstart();
                    self.lex.invalidate();
                }
                Tok::Magic(b'm') => {
                    self.lex.magic = MagicLevel::Magic;
                    self.lex.skipchr_keepstart();
                    self.lex.invalidate();
                }
                Tok::Magic(b'M') => {
                    self.lex.magic = MagicLevel::Nomagic;
                    self.lex.skipchr_keepstart();
                    self.lex.invalidate();
                }
                Tok::Magic(b'V') => {
                    self.lex.magic = MagicLevel::VeryNomagic;
                    self.lex.skipchr_keepstart();
                    self.lex.invalidate();
                }
                _ => items.push(self.parse_piece()?),
            }
        }
        Ok(match items.len() {
            0 => Ast::Nothing,
            1 => items.pop().unwrap(),
            _ => Ast::Concat(items),
        })
    }

    fn parse_piece(&mut self) -> Result<Ast, Error> {
        let atom = self.parse_atom()?;
        let opt = self.lex.peekchr();
        if multi_type(opt) == MultiKind::None {
            return Ok(atom);
        }
        self.lex.skipchr();
        let piece = match opt {
            Tok::Magic(b'*') => Ast::Star(Box::new(atom)),
            Tok::Magic(b'+') => Ast::Plus(Box::new(atom)),
            Tok::Magic(b'?') | Tok::Magic(b'=') => Ast::Quest(Box::new(atom)),
            Tok::Magic(b'@') => {
                let limit = self.lex.getdecchrs().unwrap_or(0).max(0) as u32;
                let kind = match self.lex.getchr().no_magic() {
                    Some('=') => LookKind::Ahead,
                    Some('!') => LookKind::AheadNot,
                    Some('>') => LookKind::Atomic,
                    Some('<') => match self.lex.getchr().no_magic() {
                        Some('=') => LookKind::Behind,
                        Some('!') => LookKind::BehindNot,
                        _ => {
                            return Err(Error::syntax(
                                59,
                                format!(
                                    "Invalid character after {}@",
                                    self.bs()
                                ),
                            ))
                        }
                    },
                    _ => {
                        return Err(Error::syntax(
                            59,
                            format!("Invalid character after {}@", self.bs()),
                        ))
                    }
                };
                if matches!(kind, LookKind::Behind | LookKind::BehindNot) {
                    self.flags |= ProgFlags::LOOKBH;
                }
                Ast::Look { atom: Box::new(atom), kind, limit }
            }
            Tok::Magic(b'{') => {
                let (min, max) = self.lex.read_limits()?;
                if !is_simple(&atom) {
                    if self.num_complex_braces >= 10 {
                        return Err(Error::syntax(
                            60,
                            format!("Too many complex {}{{...}}s", self.bs()),
                        ));
                    }
                    self.num_complex_braces += 1;
                }
                Ast::Brace { atom: Box::new(atom), min, max }
            }
            _ => unreachable!(),
        };
        // Can't have a multi follow a multi.
        let next = self.lex.peekchr();
        if multi_type(next) != MultiKind::None {
            return Err(if next == Tok::Magic(b'*') {
                Error::syntax(61, format!("Nested {}*", self.bs()))
            } else {
                Error::syntax(
                    62,
                    format!(
                        "Nested {}{}",
                        self.bs(),
                        next.no_magic().unwrap_or('?')
                    ),
                )
            });
        }
        Ok(piece)
    }

    fn err_one_exactly(&self) -> Error {
        Error::syntax(369, format!("Invalid item in {}%[]", self.bs()))
    }

    fn re_mult_next(&mut self, what: &str) -> Result<(), Error> {
        if multi_type(self.lex.peekchr()) == MultiKind::Mult {
            return Err(Error::syntax(888, format!("Can't repeat {what}")));
        }
        Ok(())
    }

    fn class_atom(&self, c: char, with_nl: bool) -> Option<Ast> {
        let idx = CLASS_CHARS.iter().position(|&b| b == c as u8)?;
        Some(Ast::Class { code: CLASS_CODES[idx], with_nl })
    }

    fn parse_atom(&mut self) -> Result<Ast, Error> {
        let save_prev_at_start = self.lex.prev_at_start();
        let c = self.lex.getchr();
        match c {
            Tok::Magic(b'^') => Ok(Ast::Bol),
            Tok::Magic(b'$') => {
                self.had_eol = true;
                Ok(Ast::Eol)
            }
            Tok::Magic(b'<') => Ok(Ast::Bow),
            Tok::Magic(b'>') => Ok(Ast::Eow),

            Tok::Magic(b'_') => {
                let c2 = self.lex.getchr();
                match c2.no_magic() {
                    Some('^') => return Ok(Ast::Bol),
                    Some('$') => {
                        self.had_eol = true;
                        return Ok(Ast::Eol);
                    }
                    _ => {}
                }
                self.flags |= ProgFlags::HASNL;
                if c2.no_magic() == Some('[') {
                    return self.parse_collection_or_literal(c2, true);
                }
                match c2.no_magic().and_then(|cc| self.class_atom(cc, true)) {
                    Some(ast) => Ok(ast),
                    None => Err(Error::syntax(63, "Invalid use of \\_")),
                }
            }

            // Character classes: . \i \k \f \s \d \w ... and friends.
            Tok::Magic(
                b'.' | b'i' | b'I' | b'k' | b'K' | b'f' | b'F' | b'p' | b'P'
                | b's' | b'S' | b'd' | b'D' | b'x' | b'X' | b'o' | b'O'
                | b'w' | b'W' | b'h' | b'H' | b'a' | b'A' | b'l' | b'L'
                | b'u' | b'U',
            ) => {
                // A '.' followed by a composing char matches the composing
                // char itself.
                if c == Tok::Magic(b'.') {
                    if let Tok::Lit(nc) = self.lex.peekchr() {
                        if case::is_composing(nc as u32) {
                            self.lex.skipchr();
                            return Ok(Ast::Multibyte(nc.to_string()));
                        }
                    }
                }
                let cc = c.no_magic().unwrap();
                Ok(self.class_atom(cc, false).expect("class char"))
            }

            Tok::Magic(b'n') => {
                if self.opts.string {
                    // In a string "\n" matches a newline character.
                    Ok(Ast::Exactly("\n".to_string()))
                } else {
                    // In buffer text "\n" matches the end of a line.
                    self.flags |= ProgFlags::HASNL;
                    Ok(Ast::Newl)
                }
            }

            Tok::Magic(b'(') => {
                if self.one_exactly {
                    return Err(self.err_one_exactly());
                }
                self.parse_reg(Paren::Capture)
            }

            Tok::End
            | Tok::Magic(b'|')
            | Tok::Magic(b'&')
            | Tok::Magic(b')') => {
                if self.one_exactly {
                    return Err(self.err_one_exactly());
                }
                // Supposed to be caught earlier.
                Err(Error::syntax(473, "Internal error in pattern"))
            }

            Tok::Magic(b'=' | b'?' | b'+' | b'@' | b'{' | b'*') => {
                let cc = c.no_magic().unwrap();
                let prefix = if cc == '*' {
                    if self.lex.magic >= MagicLevel::Magic { "" } else { "\\" }
                } else {
                    self.bs()
                };
                Err(Error::syntax(
                    64,
                    format!("{prefix}{cc} follows nothing"),
                ))
            }

            // Previous substitute pattern.
            Tok::Magic(b'~') => match regsub::previous_replacement() {
                Some(prev) => Ok(Ast::Exactly(prev)),
                None => Err(Error::syntax(
                    33,
                    "No previous substitute regular expression",
                )),
            },

            Tok::Magic(b'1'..=b'9') => {
                let refnum = c.no_magic().unwrap() as u8 - b'0';
                self.check_seen_endbrace(refnum)?;
                Ok(Ast::Backref(refnum))
            }

            Tok::Magic(b'z') => self.parse_z_atom(),
            Tok::Magic(b'%') => self.parse_percent_atom(save_prev_at_start),

            Tok::Magic(b'[') => self.parse_collection_or_literal(c, false),

            _ => self.parse_literal(c),
        }
    }

    /// Group `refnum` must have been closed already, unless a look-behind
    /// follows later in the pattern (then `\1` may precede its group).
    fn check_seen_endbrace(&mut self, refnum: u8) -> Result<(), Error> {
        if self.had_endbrace[refnum as usize] {
            return Ok(());
        }
        let rest = self.lex.rest().as_bytes();
        let behind_follows = rest.windows(3).any(|w| {
            w[0] == b'@' && w[1] == b'<' && (w[2] == b'=' || w[2] == b'!')
        });
        if behind_follows {
            Ok(())
        } else {
            Err(Error::BadBackref)
        }
    }

    fn parse_z_atom(&mut self) -> Result<Ast, Error> {
        let c = self.lex.getchr();
        match c.no_magic() {
            Some('(') => {
                if !self.opts.ext_set {
                    return Err(Error::syntax(66, "\\z( not allowed here"));
                }
                if self.one_exactly {
                    return Err(self.err_one_exactly());
                }
                self.has_z_groups = true;
                self.parse_reg(Paren::ZCapture)
            }
            Some(d @ '1'..='9') => {
                if !self.opts.ext_use {
                    return Err(Error::syntax(
                        67,
                        "\\z1 - \\z9 not allowed here",
                    ));
                }
                self.uses_z_refs = true;
                Ok(Ast::ZRef(d as u8 - b'0'))
            }
            Some('s') => {
                self.re_mult_next("\\zs")?;
                Ok(Ast::MatchStart)
            }
            Some('e') => {
                self.re_mult_next("\\ze")?;
                Ok(Ast::MatchEnd)
            }
            _ => Err(Error::syntax(68, "Invalid character after \\z")),
        }
    }

    fn parse_percent_atom(
        &mut self,
        save_prev_at_start: bool,
    ) -> Result<Ast, Error> {
        let c = self.lex.getchr();
        match c.no_magic() {
            Some('(') => {
                if self.one_exactly {
                    return Err(self.err_one_exactly());
                }
                self.parse_reg(Paren::NoCapture)
            }
            Some('^') => Ok(Ast::Bof),
            Some('$') => Ok(Ast::Eof),
            Some('#') => Ok(Ast::Cursor),
            Some('V') => Ok(Ast::Visual),
            Some('C') => Ok(Ast::Composing),

            // \%[abc]: optional sequence, longest prefix wins.
            Some('[') => {
                if self.one_exactly {
                    return Err(self.err_one_exactly());
                }
                let mut items = Vec::new();
                loop {
                    let nc = self.lex.getchr();
                    if nc.no_magic() == Some(']') {
                        break;
                    }
                    if nc == Tok::End {
                        return Err(Error::syntax(
                            69,
                            format!("Missing ] after {}%[", self.bs()),
                        ));
                    }
                    self.lex.ungetchr();
                    self.one_exactly = true;
                    let item = self.parse_atom();
                    self.one_exactly = false;
                    items.push(item?);
                }
                if items.is_empty() {
                    return Err(Error::syntax(
                        70,
                        format!("Empty {}%[]", self.bs()),
                    ));
                }
                Ok(Ast::OptSeq(items))
            }

            // \%d123, \%o40, \%x2a, \%u20ac, \%U1234abcd
            Some(k @ ('d' | 'o' | 'x' | 'u' | 'U')) => {
                let i = match k {
                    'd' => self.lex.getdecchrs(),
                    'o' => self.lex.getoctchrs(),
                    'x' => self.lex.gethexchrs(2),
                    'u' => self.lex.gethexchrs(4),
                    _ => self.lex.gethexchrs(8),
                };
                self.lex.invalidate();
                let ch = match i {
                    Some(0) => Some('\n'),
                    Some(n) if n <= i32::MAX as i64 => {
                        char::from_u32(n as u32)
                    }
                    _ => None,
                };
                let ch = ch.ok_or_else(|| {
                    Error::syntax(
                        678,
                        format!(
                            "Invalid character after {}%[dxouU]",
                            self.bs()
                        ),
                    )
                })?;
                if ch.len_utf8() > 1
                    && (multi_type(self.lex.peekchr()) != MultiKind::None
                        || case::is_composing(ch as u32))
                {
                    Ok(Ast::Multibyte(ch.to_string()))
                } else {
                    Ok(Ast::Exactly(ch.to_string()))
                }
            }

            Some(first)
                if first.is_ascii_digit()
                    || first == '<'
                    || first == '>'
                    || first == '\''
                    || first == '.' =>
            {
                let mut cmp = 0u8;
                let mut tok = c;
                if first == '<' || first == '>' {
                    cmp = first as u8;
                    tok = self.lex.getchr();
                }
                let mut cursor_rel = false;
                if tok.no_magic() == Some('.') {
                    cursor_rel = true;
                    tok = self.lex.getchr();
                }
                let mut n: u32 = 0;
                while let Some(d) = tok.no_magic().and_then(|x| x.to_digit(10))
                {
                    n = n.saturating_mul(10).saturating_add(d);
                    tok = self.lex.getchr();
                }
                if tok.no_magic() == Some('\'') && n == 0 {
                    // "\%'m", "\%<'m" and "\%>'m": mark
                    let name = self
                        .lex
                        .getchr()
                        .no_magic()
                        .ok_or_else(|| self.err_after_percent())?;
                    return Ok(Ast::Mark { name, cmp });
                }
                match tok.no_magic() {
                    Some(k @ ('l' | 'c' | 'v')) => {
                        if cursor_rel && n > 0 {
                            return Err(Error::syntax(
                                1204,
                                format!("No Number allowed after .: '\\%{k}'"),
                            ));
                        }
                        let kind = match k {
                            'l' => {
                                // Keep the start-of-line context: "\%23l^x"
                                // still anchors.
                                if save_prev_at_start {
                                    self.lex.force_at_start();
                                }
                                PosKind::Lnum
                            }
                            'c' => PosKind::Col,
                            _ => PosKind::Vcol,
                        };
                        Ok(Ast::PosPred { kind, value: n, cmp, cursor_rel })
                    }
                    _ => Err(self.err_after_percent()),
                }
            }

            _ => Err(self.err_after_percent()),
        }
    }

    fn err_after_percent(&self) -> Error {
        Error::syntax(71, format!("Invalid character after {}%", self.bs()))
    }

    /// `[...]` collection, or a literal `[` when there is no matching `]`.
    fn parse_collection_or_literal(
        &mut self,
        bracket_tok: Tok,
        with_nl: bool,
    ) -> Result<Ast, Error> {
        let state = self.lex.save_state();
        match self.parse_collection(with_nl)? {
            Some(ast) => Ok(ast),
            None => {
                self.lex.restore_state(&state);
                self.parse_literal(bracket_tok)
            }
        }
    }

    fn parse_collection(
        &mut self,
        mut with_nl: bool,
    ) -> Result<Option<Ast>, Error> {
        let rest = self.lex.rest();
        let close = skip_anyof(rest.as_bytes());
        if rest.as_bytes().get(close) != Some(&b']') {
            if self.opts.strict {
                return Err(Error::syntax(
                    769,
                    format!(
                        "Missing ] after {}[",
                        if self.lex.magic > MagicLevel::Nomagic {
                            ""
                        } else {
                            "\\"
                        }
                    ),
                ));
            }
            return Ok(None);
        }

        let bytes = rest.as_bytes();
        let mut i = 0;
        let mut chars = String::new();
        let negate = bytes.first() == Some(&b'^');
        if negate {
            i += 1;
        }
        // At the start ']' and '-' mean the literal character.
        let mut startc: i64 = -1;
        if matches!(bytes.get(i), Some(&b']') | Some(&b'-')) {
            startc = bytes[i] as i64;
            chars.push(bytes[i] as char);
            i += 1;
        }

        while i < bytes.len() && bytes[i] != b']' {
            if bytes[i] == b'-' {
                i += 1;
                // Not a range at the end, after/before '\n', or with no
                // start char.
                if i >= bytes.len()
                    || bytes[i] == b']'
                    || startc == -1
                    || (bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'n'))
                {
                    chars.push('-');
                    startc = b'-' as i64; // [--x] is a range
                } else {
                    // Also accept "a-[.z.]"
                    let mut endc: i64 = 0;
                    if bytes[i] == b'[' {
                        if let Some((c, adv)) = get_coll_element(&bytes[i..]) {
                            endc = c as i64;
                            i += adv;
                        }
                    }
                    if endc == 0 {
                        let (c, len) = decode_raw(bytes, i);
                        endc = c as i64;
                        i += len;
                        // Accept \o40, \x20 and € style ends too.
                        if endc == b'\\' as i64 {
                            i -= 1;
                            match coll_get_char(bytes, &mut i) {
                                Some(c) => endc = c as i64,
                                None => i += 1,
                            }
                        }
                    }
                    if startc > endc {
                        return Err(Error::syntax(
                            944,
                            "Reverse range in character class",
                        ));
                    }
                    if (startc >= 0x80 || endc >= 0x80)
                        && endc > startc + 256
                    {
                        return Err(Error::syntax(
                            945,
                            "Range too large in character class",
                        ));
                    }
                    let mut cc = startc + 1;
                    while cc <= endc {
                        if let Some(ch) = char::from_u32(cc as u32) {
                            chars.push(ch);
                        }
                        cc += 1;
                    }
                    startc = -1;
                }
            } else if bytes[i] == b'\\'
                && i + 1 < bytes.len()
                && (COLL_INRANGE.contains(&bytes[i + 1])
                    || COLL_ABBR.contains(&bytes[i + 1]))
            {
                i += 1;
                if bytes[i] == b'n' {
                    // '\n' in range: also match a line break. Inside [^],
                    // it changes nothing: "[^\n]" is the same as ".".
                    if !negate {
                        with_nl = true;
                        self.flags |= ProgFlags::HASNL;
                    }
                    i += 1;
                    startc = -1;
                } else if matches!(bytes[i], b'd' | b'o' | b'x' | b'u' | b'U')
                {
                    i -= 1;
                    match coll_get_char(bytes, &mut i) {
                        Some(0) => {
                            chars.push('\n');
                            startc = 0x0a;
                        }
                        Some(c) => {
                            startc = c as i64;
                            if let Some(ch) = char::from_u32(c) {
                                chars.push(ch);
                            }
                        }
                        None => {
                            // Not a number after all; take it literally.
                            i += 1;
                            chars.push('\\');
                            startc = b'\\' as i64;
                        }
                    }
                } else {
                    let tc = match bytes[i] {
                        b'r' => '\r',
                        b't' => '\t',
                        b'e' => '\x1b',
                        b'b' => '\x08',
                        other => other as char,
                    };
                    startc = tc as i64;
                    chars.push(tc);
                    i += 1;
                }
            } else if bytes[i] == b'[' {
                startc = -1;
                if let Some((name, adv)) = get_char_class(&bytes[i..]) {
                    i += adv;
                    push_named_class(&mut chars, name);
                } else if let Some((eq, adv)) = get_equi_class(&bytes[i..]) {
                    i += adv;
                    match equiv::equivalence_class(eq) {
                        Some(group) => chars.extend(group),
                        None => chars.push(eq),
                    }
                } else if let Some((ce, adv)) = get_coll_element(&bytes[i..]) {
                    i += adv;
                    chars.push(ce);
                } else {
                    // literal '[', allow [[-x] as a range
                    startc = b'[' as i64;
                    chars.push('[');
                    i += 1;
                }
            } else {
                let (ch, len) = decode_raw(bytes, i);
                // A composing char stands for itself, not a range start.
                startc = if ch.len_utf8() > 1 && case::is_composing(ch as u32)
                {
                    -1
                } else {
                    ch as i64
                };
                chars.push(ch);
                i += len;
            }
        }

        if bytes.get(i) != Some(&b']') {
            return Err(Error::syntax(
                76,
                "Too many [",
            ));
        }
        // Resync the lexer past the ']'.
        let base = self.lex.raw_pos();
        self.lex.set_raw_pos(base + i);
        self.lex.invalidate();
        self.lex.skipchr();

        Ok(Some(Ast::Collection { negate, with_nl, chars }))
    }

    fn parse_literal(&mut self, first: Tok) -> Result<Ast, Error> {
        // A multi-byte char is its own atom before a multi and when it's a
        // composing char.
        if let Some(ch) = first.no_magic() {
            if ch.len_utf8() > 1
                && (multi_type(self.lex.peekchr()) != MultiKind::None
                    || case::is_composing(ch as u32))
            {
                return Ok(Ast::Multibyte(ch.to_string()));
            }
        }

        let mut s = String::new();
        let mut c = first;
        let mut len = 0;
        // Append chars while there is no following multi (the char before a
        // multi must be a single-char operand) and no magic char shows up.
        // Always take at least one char.
        loop {
            let Some(ch) = c.no_magic() else { break };
            if len > 0
                && !(multi_type(self.lex.peekchr()) == MultiKind::None
                    && !self.one_exactly
                    && matches!(c, Tok::Lit(_)))
            {
                break;
            }
            s.push(ch);
            // Need to take the composing chars too.
            loop {
                match self.lex.rest().chars().next() {
                    Some(cc) if case::is_composing(cc as u32) => {
                        s.push(cc);
                        self.lex.invalidate();
                        self.lex.skipchr();
                    }
                    _ => break,
                }
            }
            c = self.lex.getchr();
            len += 1;
        }
        self.lex.ungetchr();
        Ok(Ast::Exactly(s))
    }
}

fn decode_raw(bytes: &[u8], i: usize) -> (char, usize) {
    crate::buffer::decode_char(bytes, i)
}

/// Skip over a collection body; `bytes` starts after the `[`. Returns the
/// index of the matching `]` or of the end.
fn skip_anyof(bytes: &[u8]) -> usize {
    let mut i = 0;
    if bytes.first() == Some(&b'^') {
        i += 1;
    }
    if matches!(bytes.get(i), Some(&b']') | Some(&b'-')) {
        i += 1;
    }
    while i < bytes.len() && bytes[i] != b']' {
        let (_, len) = decode_raw(bytes, i);
        if len > 1 {
            i += len;
        } else if bytes[i] == b'-' {
            i += 1;
            if i < bytes.len() && bytes[i] != b']' {
                let (_, len) = decode_raw(bytes, i);
                i += len;
            }
        } else if bytes[i] == b'\\'
            && i + 1 < bytes.len()
            && (COLL_INRANGE.contains(&bytes[i + 1])
                || COLL_ABBR.contains(&bytes[i + 1]))
        {
            i += 2;
        } else if bytes[i] == b'[' {
            if let Some((_, adv)) = get_char_class(&bytes[i..]) {
                i += adv;
            } else if let Some((_, adv)) = get_equi_class(&bytes[i..]) {
                i += adv;
            } else if let Some((_, adv)) = get_coll_element(&bytes[i..]) {
                i += adv;
            } else {
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    i
}

const CHAR_CLASS_NAMES: &[&str] = &[
    "alnum:]",
    "alpha:]",
    "blank:]",
    "cntrl:]",
    "digit:]",
    "graph:]",
    "lower:]",
    "print:]",
    "punct:]",
    "space:]",
    "upper:]",
    "xdigit:]",
    "tab:]",
    "return:]",
    "backspace:]",
    "escape:]",
    "ident:]",
    "keyword:]",
    "fname:]",
];

/// `[:name:]`; `bytes` points at the `[`. Returns (class index, bytes used).
fn get_char_class(bytes: &[u8]) -> Option<(usize, usize)> {
    if bytes.get(1) != Some(&b':') {
        return None;
    }
    for (idx, name) in CHAR_CLASS_NAMES.iter().enumerate() {
        if bytes[2..].starts_with(name.as_bytes()) {
            return Some((idx, name.len() + 2));
        }
    }
    None
}

/// `[=a=]`; `bytes` points at the `[`. Returns (char, bytes used).
fn get_equi_class(bytes: &[u8]) -> Option<(char, usize)> {
    if bytes.get(1) != Some(&b'=') || bytes.len() < 5 {
        return None;
    }
    let (c, len) = decode_raw(bytes, 2);
    if bytes.get(2 + len) == Some(&b'=') && bytes.get(3 + len) == Some(&b']') {
        Some((c, len + 4))
    } else {
        None
    }
}

/// `[.a.]`; `bytes` points at the `[`. Returns (char, bytes used).
fn get_coll_element(bytes: &[u8]) -> Option<(char, usize)> {
    if bytes.get(1) != Some(&b'.') || bytes.len() < 5 {
        return None;
    }
    let (c, len) = decode_raw(bytes, 2);
    if bytes.get(2 + len) == Some(&b'.') && bytes.get(3 + len) == Some(&b']') {
        Some((c, len + 4))
    } else {
        None
    }
}

/// `\d`, `\o`, `\x`, `\u`, `\U` escape inside a collection; `i` points at the
/// backslash. Advances `i` past the escape on success.
fn coll_get_char(bytes: &[u8], i: &mut usize) -> Option<u32> {
    let k = bytes.get(*i + 1)?;
    let mut j = *i + 2;
    let (max, radix) = match k {
        b'd' => (usize::MAX, 10),
        b'o' => (3, 8),
        b'x' => (2, 16),
        b'u' => (4, 16),
        b'U' => (8, 16),
        _ => return None,
    };
    let mut nr: i64 = 0;
    let mut digits = 0;
    while digits < max {
        let Some(d) = bytes.get(j).and_then(|&b| (b as char).to_digit(radix))
        else {
            break;
        };
        if radix == 8 && nr >= 0o40 {
            break;
        }
        nr = nr * radix as i64 + d as i64;
        if nr > u32::MAX as i64 {
            return None;
        }
        j += 1;
        digits += 1;
    }
    if digits == 0 {
        return None;
    }
    *i = j;
    Some(nr as u32)
}

fn push_named_class(chars: &mut String, idx: usize) {
    let tab = crate::chartab::ChartabView::default();
    let mut push_range =
        |lo: u32, hi: u32, pred: &dyn Fn(char) -> bool| {
            for cu in lo..=hi {
                if let Some(ch) = char::from_u32(cu) {
                    if pred(ch) {
                        chars.push(ch);
                    }
                }
            }
        };
    match idx {
        0 => push_range(1, 127, &|c| c.is_ascii_alphanumeric()),
        1 => push_range(1, 127, &|c| c.is_ascii_alphabetic()),
        2 => chars.push_str(" \t"),
        3 => push_range(1, 127, &|c| c.is_ascii_control()),
        4 => push_range(1, 127, &|c| c.is_ascii_digit()),
        5 => push_range(1, 127, &|c| c.is_ascii_graphic()),
        6 => push_range(1, 255, &|c| {
            c.is_lowercase() && c != 'ª' && c != 'º'
        }),
        7 => push_range(1, 255, &|c| tab.is_print(c)),
        8 => push_range(1, 127, &|c| c.is_ascii_punctuation()),
        9 => {
            for cu in 9..=13u8 {
                chars.push(cu as char);
            }
            chars.push(' ');
        }
        10 => push_range(1, 255, &|c| c.is_uppercase()),
        11 => push_range(1, 255, &|c| c.is_ascii_hexdigit()),
        12 => chars.push('\t'),
        13 => chars.push('\r'),
        14 => chars.push('\x08'),
        15 => chars.push('\x1b'),
        16 => push_range(1, 255, &|c| tab.is_ident(c)),
        17 => push_range(1, 255, &|c| tab.is_word(c)),
        18 => push_range(1, 255, &|c| tab.is_fname(c)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(pat: &str) -> Parsed {
        parse(pat, ParseOpts { magic: true, ..Default::default() }).unwrap()
    }

    fn parse_err(pat: &str) -> Error {
        parse(pat, ParseOpts { magic: true, ..Default::default() })
            .unwrap_err()
    }

    fn e_number(pat: &str) -> u16 {
        parse_err(pat).e_number()
    }

    #[test]
    fn literals_and_pieces() {
        let p = parse_ok("abc");
        match &p.ast {
            Ast::Alt(branches) => match &branches[0] {
                Ast::Exactly(s) => assert_eq!(s, "abc"),
                other => panic!("expected literal, got {other:?}"),
            },
            other => panic!("expected alt, got {other:?}"),
        }
    }

    #[test]
    fn star_binds_last_char() {
        // "ab*" is 'a' then 'b*'
        let p = parse_ok("ab*");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        let Ast::Concat(items) = &branches[0] else { panic!() };
        assert!(matches!(&items[0], Ast::Exactly(s) if s == "a"));
        assert!(matches!(&items[1], Ast::Star(_)));
    }

    #[test]
    fn group_numbering() {
        let p = parse_ok(r"\(a\)\(b\)");
        assert_eq!(p.ngroups, 3); // next free group number
        let Ast::Alt(branches) = &p.ast else { panic!() };
        let Ast::Concat(items) = &branches[0] else { panic!() };
        assert!(matches!(&items[0], Ast::Group { num: 1, .. }));
        assert!(matches!(&items[1], Ast::Group { num: 2, .. }));
    }

    #[test]
    fn backref_rules() {
        assert!(matches!(
            parse(r"\(a\)\1", ParseOpts { magic: true, ..Default::default() }),
            Ok(_)
        ));
        // \1 before the group closes
        assert_eq!(parse_err(r"\1\(a\)"), Error::BadBackref);
        // ...unless a look-behind follows
        assert!(parse(
            r"\(\1x\)\@<=y",
            ParseOpts { magic: true, ..Default::default() }
        )
        .is_ok());
    }

    #[test]
    fn error_numbers() {
        assert_eq!(e_number(r"\(a"), 54);
        assert_eq!(e_number(r"a\)"), 55);
        assert_eq!(e_number(r"\%(a"), 53);
        assert_eq!(e_number(r"*a"), 64);
        assert_eq!(e_number(r"a\{2,3}\{2}"), 62);
        assert_eq!(e_number(r"a**"), 61);
        assert_eq!(e_number(r"a\{2"), 554);
        assert_eq!(e_number(r"\%[abc"), 69);
        assert_eq!(e_number(r"\%[]"), 70);
        assert_eq!(e_number(r"\z(a\)"), 66);
        assert_eq!(e_number(r"\z1"), 67);
        assert_eq!(e_number(r"[z-a]"), 944);
        assert_eq!(e_number(r"\%q"), 71);
        assert_eq!(e_number(r"a\@x"), 59);
        assert_eq!(e_number(r"\_q"), 63);
        assert_eq!(e_number(r"\%.2l"), 1204);
    }

    #[test]
    fn magic_mode_switches() {
        // \v makes parens magic
        let p = parse_ok(r"\v(a)");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        assert!(matches!(&branches[0], Ast::Group { num: 1, .. }));
        // \V makes everything literal
        let p = parse_ok(r"\V(a)");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        assert!(matches!(&branches[0], Ast::Exactly(s) if s == "(a)"));
    }

    #[test]
    fn flag_atoms() {
        let p = parse_ok(r"\cfoo");
        assert!(p.flags.contains(ProgFlags::ICASE));
        let p = parse_ok(r"foo\C");
        assert!(p.flags.contains(ProgFlags::NOICASE));
        let p = parse_ok(r"a\nb");
        assert!(p.flags.contains(ProgFlags::HASNL));
    }

    #[test]
    fn collection_basics() {
        let p = parse_ok("[a-c]");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        match &branches[0] {
            Ast::Collection { negate, chars, .. } => {
                assert!(!negate);
                assert_eq!(chars, "abc");
            }
            other => panic!("{other:?}"),
        }
        // leading ] is a literal member
        let p = parse_ok("[]x]");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        assert!(
            matches!(&branches[0], Ast::Collection { chars, .. } if chars == "]x")
        );
        // no closing ]: '[' is a literal
        let p = parse_ok("[abc");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        assert!(matches!(&branches[0], Ast::Exactly(s) if s == "[abc"));
        // ... unless strict
        let err = parse(
            "[abc",
            ParseOpts { magic: true, strict: true, ..Default::default() },
        )
        .unwrap_err();
        assert_eq!(err.e_number(), 769);
    }

    #[test]
    fn collection_classes() {
        let p = parse_ok("[[:digit:]x]");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        match &branches[0] {
            Ast::Collection { chars, .. } => {
                assert!(chars.contains('0') && chars.contains('9'));
                assert!(chars.contains('x'));
            }
            other => panic!("{other:?}"),
        }
        let p = parse_ok("[[=e=]]");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        match &branches[0] {
            Ast::Collection { chars, .. } => {
                assert!(chars.contains('e') && chars.contains('é'));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn escapes_in_collection() {
        let p = parse_ok(r"[\x41-\x43]");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        assert!(
            matches!(&branches[0], Ast::Collection { chars, .. } if chars == "ABC")
        );
        let p = parse_ok(r"[a\n]");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        assert!(
            matches!(&branches[0], Ast::Collection { with_nl: true, .. })
        );
    }

    #[test]
    fn z_atoms() {
        let opts = ParseOpts {
            magic: true,
            ext_set: true,
            ext_use: true,
            ..Default::default()
        };
        let p = parse(r"\z(a\)\z1", opts).unwrap();
        assert!(p.has_z_groups && p.uses_z_refs);
        let p = parse_ok(r"foo\zsbar\ze!");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        let Ast::Concat(items) = &branches[0] else { panic!() };
        assert!(items.iter().any(|a| matches!(a, Ast::MatchStart)));
        assert!(items.iter().any(|a| matches!(a, Ast::MatchEnd)));
        assert_eq!(e_number(r"a\zs*"), 888);
    }

    #[test]
    fn percent_atoms() {
        let p = parse_ok(r"\%23l\%<5c\%>8v");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        let Ast::Concat(items) = &branches[0] else { panic!() };
        assert!(matches!(
            items[0],
            Ast::PosPred { kind: PosKind::Lnum, value: 23, cmp: 0, .. }
        ));
        assert!(matches!(
            items[1],
            Ast::PosPred { kind: PosKind::Col, value: 5, cmp: b'<', .. }
        ));
        assert!(matches!(
            items[2],
            Ast::PosPred { kind: PosKind::Vcol, value: 8, cmp: b'>', .. }
        ));

        let p = parse_ok(r"\%'m\%#\%V\%^\%$");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        let Ast::Concat(items) = &branches[0] else { panic!() };
        assert!(matches!(items[0], Ast::Mark { name: 'm', cmp: 0 }));
        assert!(matches!(items[1], Ast::Cursor));
        assert!(matches!(items[2], Ast::Visual));
        assert!(matches!(items[3], Ast::Bof));
        assert!(matches!(items[4], Ast::Eof));
    }

    #[test]
    fn percent_char_codes() {
        let p = parse_ok(r"\%d65\%x42\%u0043");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        let Ast::Concat(items) = &branches[0] else { panic!() };
        assert!(matches!(&items[0], Ast::Exactly(s) if s == "A"));
        assert!(matches!(&items[1], Ast::Exactly(s) if s == "B"));
        assert!(matches!(&items[2], Ast::Exactly(s) if s == "C"));
    }

    #[test]
    fn opt_seq() {
        let p = parse_ok(r"fu\%[nction]");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        let Ast::Concat(items) = &branches[0] else { panic!() };
        match &items[1] {
            Ast::OptSeq(atoms) => assert_eq!(atoms.len(), 6),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn and_branches_desugar_to_lookahead() {
        let p = parse_ok(r"foo\&..");
        let Ast::Alt(branches) = &p.ast else { panic!() };
        let Ast::Concat(items) = &branches[0] else { panic!() };
        assert!(matches!(
            &items[0],
            Ast::Look { kind: LookKind::Ahead, .. }
        ));
    }

    #[test]
    fn behind_flag() {
        let p = parse_ok(r"\(foo\)\@<=bar");
        assert!(p.flags.contains(ProgFlags::LOOKBH));
    }
}
