//! Building replacement text after a successful match.
//!
//! `regtilde` expands `~` to the previous replacement; `vim_regsub` renders
//! a replacement source with `&`/`\0`..`\9` capture references, case sinks
//! and `\=expr` expression evaluation. The render runs twice, once to
//! measure and once to copy, and both runs share the per-depth expression
//! cache so the expression is evaluated exactly once.

use std::cell::{Cell, RefCell};
use std::sync::Mutex;

use bitflags::bitflags;

use crate::buffer::decode_char;
use crate::error::Error;
use crate::exec::Program;
use vregex_unicode::case::CharCaseExt;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegsubFlags: u8 {
        /// Actually write into the destination (second pass).
        const COPY = 0x01;
        /// Behave like 'magic' is set: `&` means the whole match.
        const MAGIC = 0x02;
        /// The caller halves backslashes later: double them here and put a
        /// backslash before a CR.
        const BACKSLASH = 0x04;
    }
}

/// Host expression evaluator for `\=expr` replacements. Receives the ten
/// submatch texts.
pub type ExprCallback<'e> = dyn FnMut(&[Option<String>; 10]) -> String + 'e;

// The process-wide previous replacement. Rewritten only by a non-preview
// regtilde().
static PREV_SUB: Mutex<Option<String>> = Mutex::new(None);

// When nesting more than a couple levels it's probably a mistake.
const MAX_REGSUB_NESTING: usize = 4;

thread_local! {
    static NESTING: Cell<usize> = const { Cell::new(0) };
    static EVAL_RESULT: RefCell<[Option<String>; MAX_REGSUB_NESTING]> =
        const { RefCell::new([None, None, None, None]) };
}

pub(crate) fn previous_replacement() -> Option<String> {
    PREV_SUB.lock().unwrap().clone()
}

#[cfg(test)]
pub(crate) fn reset_previous_replacement() {
    *PREV_SUB.lock().unwrap() = None;
}

/// Expand `~` (magic) or `\~` (nomagic) in `source` to the previous
/// replacement string. Inserted text is not rescanned. Unless this is a
/// preview, the expansion becomes the new previous replacement.
pub fn regtilde(source: &str, magic: bool, preview: bool) -> String {
    let prev = previous_replacement();
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    while i < bytes.len() {
        let tilde = if magic {
            bytes[i] == b'~'
        } else {
            bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'~')
        };
        if tilde {
            if let Some(p) = &prev {
                out.push_str(p);
            }
            i += if magic { 1 } else { 2 };
        } else if bytes[i] == b'\\' && i + 1 < bytes.len() {
            // Skip escaped characters.
            out.push('\\');
            let (c, len) = decode_char(bytes, i + 1);
            out.push(c);
            i += 1 + len;
        } else {
            let (c, len) = decode_char(bytes, i);
            out.push(c);
            i += len;
        }
    }
    if !preview {
        *PREV_SUB.lock().unwrap() = Some(out.clone());
    }
    out
}

/// Pending case conversion for the next replacement char(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseSink {
    None,
    OnceUpper,
    AllUpper,
    OnceLower,
    AllLower,
}

impl CaseSink {
    fn apply(&mut self, c: char) -> char {
        match *self {
            CaseSink::None => c,
            CaseSink::OnceUpper => {
                *self = CaseSink::None;
                c.to_upper_char()
            }
            CaseSink::AllUpper => c.to_upper_char(),
            CaseSink::OnceLower => {
                *self = CaseSink::None;
                c.to_lower_char()
            }
            CaseSink::AllLower => c.to_lower_char(),
        }
    }
}

/// Render the replacement for the last match of `prog`.
///
/// Without [`RegsubFlags::COPY`] nothing is written, only the needed length
/// is computed (and a `\=expr` result cached). With it, the rendering is
/// appended to `dest`. Returns the size of the replacement including a
/// terminating NUL.
pub fn vim_regsub(
    prog: &Program,
    source: &str,
    mut expr_cb: Option<&mut ExprCallback>,
    dest: &mut String,
    flags: RegsubFlags,
) -> Result<usize, Error> {
    let copy = flags.contains(RegsubFlags::COPY);
    let nesting = NESTING.with(|n| n.get());
    if nesting >= MAX_REGSUB_NESTING {
        return Err(Error::SubstNestingTooDeep);
    }

    let rendered = if source.starts_with("\\=") {
        let cached = if copy {
            EVAL_RESULT.with(|er| er.borrow_mut()[nesting].take())
        } else {
            None
        };
        let result = match cached {
            Some(r) => r,
            None => {
                // The expression may invoke substitution recursively; the
                // per-depth cache keeps the levels apart.
                NESTING.with(|n| n.set(nesting + 1));
                let subs = prog.submatches().as_list();
                let result = match expr_cb.as_deref_mut() {
                    Some(cb) => cb(&subs),
                    None => String::new(),
                };
                NESTING.with(|n| n.set(nesting));
                let result = postprocess_eval(&result, flags);
                if !copy {
                    EVAL_RESULT.with(|er| {
                        er.borrow_mut()[nesting] = Some(result.clone())
                    });
                }
                result
            }
        };
        result
    } else {
        render_plain(prog, source, flags)
    };

    if copy {
        dest.push_str(&rendered);
    }
    Ok(rendered.len() + 1)
}

/// Both render passes in one call, returning the replacement text.
pub fn regsub(
    prog: &Program,
    source: &str,
    magic: bool,
    backslash: bool,
    mut expr_cb: Option<&mut ExprCallback>,
) -> Result<String, Error> {
    let mut flags = RegsubFlags::empty();
    if magic {
        flags |= RegsubFlags::MAGIC;
    }
    if backslash {
        flags |= RegsubFlags::BACKSLASH;
    }
    let mut dest = String::new();
    vim_regsub(prog, source, expr_cb.as_deref_mut(), &mut dest, flags)?;
    vim_regsub(
        prog,
        source,
        expr_cb,
        &mut dest,
        flags | RegsubFlags::COPY,
    )?;
    Ok(dest)
}

/// Newlines in an evaluated expression become line breaks (CR); kept
/// backslashes are doubled when the caller halves them later.
fn postprocess_eval(s: &str, flags: RegsubFlags) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    let mut had_backslash = false;
    while let Some(c) = chars.next() {
        if c == '\n' {
            out.push('\r');
        } else if c == '\\' {
            out.push('\\');
            if let Some(n) = chars.next() {
                out.push(if n == '\n' { '\r' } else { n });
            }
            had_backslash = true;
        } else {
            out.push(c);
        }
    }
    if had_backslash && flags.contains(RegsubFlags::BACKSLASH) {
        out = out.replace('\\', "\\\\");
    }
    out
}

fn render_plain(prog: &Program, source: &str, flags: RegsubFlags) -> String {
    let magic = flags.contains(RegsubFlags::MAGIC);
    let backslash = flags.contains(RegsubFlags::BACKSLASH);
    let mut out = String::with_capacity(source.len());
    let mut sink = CaseSink::None;
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let mut group: Option<usize> = None;

        if c == b'&' && magic {
            group = Some(0);
            i += 1;
        } else if c == b'\\' && i + 1 < bytes.len() {
            let n = bytes[i + 1];
            match n {
                b'&' if !magic => {
                    group = Some(0);
                    i += 2;
                }
                b'0'..=b'9' => {
                    group = Some((n - b'0') as usize);
                    i += 2;
                }
                b'u' => {
                    sink = CaseSink::OnceUpper;
                    i += 2;
                    continue;
                }
                b'U' => {
                    sink = CaseSink::AllUpper;
                    i += 2;
                    continue;
                }
                b'l' => {
                    sink = CaseSink::OnceLower;
                    i += 2;
                    continue;
                }
                b'L' => {
                    sink = CaseSink::AllLower;
                    i += 2;
                    continue;
                }
                b'e' | b'E' => {
                    sink = CaseSink::None;
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }

        if let Some(no) = group {
            if let Some(text) = prog.submatches().text(no) {
                for ch in text.chars() {
                    if ch == '\n' {
                        // Captured line break: insert a CR so it becomes a
                        // line break again.
                        out.push('\r');
                    } else if backslash && (ch == '\r' || ch == '\\') {
                        // Will be halved later: double it.
                        out.push('\\');
                        out.push(ch);
                    } else {
                        out.push(sink.apply(ch));
                    }
                }
            }
            continue;
        }

        // Ordinary character, possibly an abbreviation after '\'.
        let ch;
        if c == b'\\' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'r' => {
                    ch = '\r';
                    i += 2;
                }
                b'n' => {
                    ch = '\n';
                    i += 2;
                }
                b't' => {
                    ch = '\t';
                    i += 2;
                }
                b'b' => {
                    ch = '\x08';
                    i += 2;
                }
                _ => {
                    // The backslash is removed later when the caller
                    // halves them; keep it alive here if asked to.
                    if backslash {
                        out.push('\\');
                    }
                    let (c2, len) = decode_char(bytes, i + 1);
                    ch = c2;
                    i += 1 + len;
                }
            }
        } else {
            let (c2, len) = decode_char(bytes, i);
            ch = c2;
            i += len;
        }
        out.push(sink.apply(ch));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{compile, CompileFlags, MatchOptions};

    fn matched(pat: &str, line: &str) -> Program {
        let mut prog = compile(pat, CompileFlags::MAGIC).unwrap();
        assert!(prog.exec_line(
            line.as_bytes(),
            0,
            false,
            &MatchOptions::default()
        ));
        prog
    }

    #[test]
    fn whole_match_and_groups() {
        let prog = matched(r"\(a\)\(b\)", "ab");
        assert_eq!(regsub(&prog, r"<&>", true, false, None).unwrap(), "<ab>");
        assert_eq!(
            regsub(&prog, r"\2\1", true, false, None).unwrap(),
            "ba"
        );
        // \& is the whole match when not magic, & is a literal
        assert_eq!(
            regsub(&prog, r"\&-&", false, false, None).unwrap(),
            "ab-&"
        );
    }

    #[test]
    fn case_sinks() {
        let prog = matched(r"\(aBc\)", "aBc");
        assert_eq!(
            regsub(&prog, r"\U\1\e-\1", true, false, None).unwrap(),
            "ABC-aBc"
        );
        assert_eq!(
            regsub(&prog, r"\u\1", true, false, None).unwrap(),
            "ABc"
        );
        assert_eq!(
            regsub(&prog, r"\l\1", true, false, None).unwrap(),
            "aBc"
        );
        assert_eq!(
            regsub(&prog, r"\L\1", true, false, None).unwrap(),
            "abc"
        );
    }

    #[test]
    fn escapes() {
        let prog = matched("x", "x");
        assert_eq!(
            regsub(&prog, r"a\tb\rc", true, false, None).unwrap(),
            "a\tb\rc"
        );
        // unknown escape: backslash dropped unless BACKSLASH keeps it
        assert_eq!(regsub(&prog, r"a\xb", true, false, None).unwrap(), "axb");
        assert_eq!(
            regsub(&prog, r"a\xb", true, true, None).unwrap(),
            "a\\xb"
        );
    }

    #[test]
    fn expression_replacement() {
        let prog = matched(r"\(Foo\)", "Foo");
        let mut cb = |subs: &[Option<String>; 10]| {
            format!("{}!", subs[1].as_deref().unwrap_or(""))
        };
        let got =
            regsub(&prog, r"\=expr", true, false, Some(&mut cb)).unwrap();
        assert_eq!(got, "Foo!");
    }

    #[test]
    fn expression_evaluated_once_for_both_passes() {
        let prog = matched("x", "x");
        let mut calls = 0;
        let mut cb = |_: &[Option<String>; 10]| {
            calls += 1;
            "y".to_string()
        };
        let got =
            regsub(&prog, r"\=f()", true, false, Some(&mut cb)).unwrap();
        assert_eq!(got, "y");
        assert_eq!(calls, 1);
    }

    // The previous-replacement string is process state; keep the tests
    // touching it from interleaving.
    static TILDE_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn tilde_expansion() {
        let _guard = TILDE_LOCK.lock().unwrap();
        reset_previous_replacement();
        // no previous replacement: the tilde just disappears
        assert_eq!(regtilde("x~y", true, false), "xy");
        // now "xy" is the previous replacement
        assert_eq!(regtilde("a~b", true, false), "axyb");
        // nomagic spells it \~
        assert_eq!(regtilde(r"c\~d", false, false), "caxybd");
        // escaped tilde stays
        assert_eq!(regtilde(r"e\~f", true, true), r"e\~f");
    }

    #[test]
    fn preview_keeps_previous() {
        let _guard = TILDE_LOCK.lock().unwrap();
        reset_previous_replacement();
        regtilde("first", true, false);
        let out = regtilde("~ again", true, true);
        assert_eq!(out, "first again");
        // preview did not store; previous is still "first"
        assert_eq!(regtilde("~", true, true), "first");
    }

    #[test]
    fn nesting_cap() {
        let prog = matched("x", "x");
        NESTING.with(|n| n.set(MAX_REGSUB_NESTING));
        let err =
            regsub(&prog, "y", true, false, None).unwrap_err();
        NESTING.with(|n| n.set(0));
        assert_eq!(err, Error::SubstNestingTooDeep);
    }
}
