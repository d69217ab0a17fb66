//! Compiling patterns and dispatching searches to the engines.
//!
//! The NFA engine is the default. When it cannot handle a pattern (at
//! compile time) or an input (at run time), the pattern is recompiled for
//! the backtracking engine and the search retried, unless the user forced
//! an engine with a `\%#=N` prefix.

use std::cell::Cell;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aho_corasick::AhoCorasick;
use bitflags::bitflags;
use bon::Builder;

use crate::backtrack::{self, ExecEnv};
use crate::buffer::{LineProvider, StringLines};
use crate::error::{Error, MatchFailure};
use crate::nfa::{self, NfaProgram};
use crate::prog::{compile_bt, BtProgram};
use crate::submatch::Submatches;
use crate::syntax::{self, Parsed, ParseOpts};

bitflags! {
    /// Flags for [`compile`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompileFlags: u8 {
        /// Treat the pattern in the default magic mode.
        const MAGIC = 0x01;
        /// The input is a single string, not buffer text: `\n` matches a
        /// newline char.
        const STRING = 0x02;
        /// An unmatched `[` is an error instead of a literal.
        const STRICT = 0x04;
        /// Match without periodic interrupt checks.
        const NOBREAK = 0x08;
        /// `\z(...\)` may be used (syntax-engine callers).
        const EXTMATCH_SET = 0x10;
        /// `\z1`..`\z9` may be used.
        const EXTMATCH_USE = 0x20;
    }
}

impl Default for CompileFlags {
    fn default() -> Self {
        CompileFlags::MAGIC
    }
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions::builder().build()
    }
}

/// Which engine executes the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Auto,
    Backtracking,
    Nfa,
}

#[derive(Debug)]
enum Engine {
    Bt(BtProgram),
    Nfa(NfaProgram),
}

/// Per-search options.
#[derive(Builder)]
pub struct MatchOptions {
    /// Like 'ignorecase'; `\c`/`\C` in the pattern overrule it.
    #[builder(default)]
    pub ignore_case: bool,
    /// Give up after this long and report [`MatchFailure::TimedOut`].
    pub timeout: Option<Duration>,
    /// Checked periodically; when set the search stops.
    pub interrupt: Option<Arc<AtomicBool>>,
    /// Maximum column to search to; 0 for no limit.
    #[builder(default)]
    pub max_col: u32,
    /// Byte budget for the backtracking stacks.
    #[builder(default = 1_000_000)]
    pub max_mem: usize,
}

/// A compiled pattern.
///
/// Created by [`compile`], used any number of times by the search methods,
/// freed by dropping it. Immutable after creation apart from the submatch
/// record of the last successful search and the re-entry guard.
#[derive(Debug)]
pub struct Program {
    engine: Engine,
    parsed: Parsed,
    forced: EngineKind,
    nobreak: bool,
    string_mode: bool,
    in_use: Cell<bool>,
    subs: Submatches,
    zsubs: Option<Box<[Option<String>; 10]>>,
    z_in: Option<Box<[Option<String>; 10]>>,
    last_failure: Option<MatchFailure>,
    /// Quick check for the "must contain" literal in the first line.
    must: Option<AhoCorasick>,
}

/// Compile `pattern` into a [`Program`].
///
/// An optional `\%#=0|1|2` prefix selects the engine: automatic,
/// backtracking, NFA. Anything else after `\%#=` is an error.
pub fn compile(
    pattern: &str,
    flags: CompileFlags,
) -> Result<Program, Error> {
    let mut pat = pattern;
    let mut forced = EngineKind::Auto;
    if let Some(rest) = pat.strip_prefix(r"\%#=") {
        forced = match rest.as_bytes().first() {
            Some(b'0') => EngineKind::Auto,
            Some(b'1') => EngineKind::Backtracking,
            Some(b'2') => EngineKind::Nfa,
            _ => {
                return Err(Error::syntax(
                    864,
                    "\\%#= can only be followed by 0, 1, or 2. The \
                     automatic engine will be used ",
                ))
            }
        };
        pat = &rest[1..];
    }

    let opts = ParseOpts {
        magic: flags.contains(CompileFlags::MAGIC),
        string: flags.contains(CompileFlags::STRING),
        strict: flags.contains(CompileFlags::STRICT),
        ext_set: flags.contains(CompileFlags::EXTMATCH_SET),
        ext_use: flags.contains(CompileFlags::EXTMATCH_USE),
    };
    let parsed = syntax::parse(pat, opts)?;

    let engine = match forced {
        EngineKind::Backtracking => Engine::Bt(compile_bt(&parsed)?),
        EngineKind::Nfa => Engine::Nfa(nfa::compile_nfa(&parsed)?),
        EngineKind::Auto => match nfa::compile_nfa(&parsed) {
            Ok(n) => Engine::Nfa(n),
            Err(Error::TooExpensive) => Engine::Bt(compile_bt(&parsed)?),
            Err(e) => return Err(e),
        },
    };

    let must = match &engine {
        Engine::Bt(bt) => build_must_matcher(bt.must_contain.as_deref()),
        Engine::Nfa(_) => None,
    };

    Ok(Program {
        engine,
        parsed,
        forced,
        nobreak: flags.contains(CompileFlags::NOBREAK),
        string_mode: flags.contains(CompileFlags::STRING),
        in_use: Cell::new(false),
        subs: Submatches::default(),
        zsubs: None,
        z_in: None,
        last_failure: None,
        must,
    })
}

/// A case-insensitive scanner over-matches, which only weakens the filter;
/// it must never reject a true match, so non-ASCII literals are skipped.
fn build_must_matcher(must: Option<&str>) -> Option<AhoCorasick> {
    let must = must?;
    if !must.is_ascii() || must.is_empty() {
        return None;
    }
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([must])
        .ok()
}

impl Program {
    /// Which engine will execute the next search.
    pub fn engine_kind(&self) -> EngineKind {
        match self.engine {
            Engine::Bt(_) => EngineKind::Backtracking,
            Engine::Nfa(_) => EngineKind::Nfa,
        }
    }

    /// Match against a single line, starting at byte `col`. On success the
    /// submatch record holds byte offsets into `line`.
    ///
    /// With `line_lbr`, a `\n` byte in `line` is treated as a line break.
    pub fn exec_line(
        &mut self,
        line: &[u8],
        col: u32,
        line_lbr: bool,
        opts: &MatchOptions,
    ) -> bool {
        let provider = StringLines::new(line);
        self.run(&provider, 1, col, false, line_lbr, opts) > 0
    }

    /// Match against buffer lines starting in line `lnum` at byte `col`.
    /// Returns 0 for no match, otherwise the 1-based number of lines the
    /// match spans.
    pub fn exec_multi(
        &mut self,
        buf: &dyn LineProvider,
        lnum: u32,
        col: u32,
        opts: &MatchOptions,
    ) -> u32 {
        self.run(buf, lnum, col, true, false, opts)
    }

    fn run(
        &mut self,
        provider: &dyn LineProvider,
        firstlnum: u32,
        col: u32,
        multi: bool,
        line_lbr: bool,
        opts: &MatchOptions,
    ) -> u32 {
        self.last_failure = None;
        if self.in_use.get() {
            self.last_failure = Some(MatchFailure::Recursive);
            return 0;
        }
        self.in_use.set(true);
        let lines = self.run_guarded(
            provider, firstlnum, col, multi, line_lbr, opts,
        );
        self.in_use.set(false);
        lines
    }

    fn run_guarded(
        &mut self,
        provider: &dyn LineProvider,
        firstlnum: u32,
        col: u32,
        multi: bool,
        line_lbr: bool,
        opts: &MatchOptions,
    ) -> u32 {
        // The cheap literal check first: no literal, no match.
        if let Some(ac) = &self.must {
            let line = provider.line(firstlnum);
            let from = (col as usize).min(line.len());
            if ac.find(&line[from..]).is_none() {
                return 0;
            }
        }

        let maxline = if multi {
            provider.max_lnum().saturating_sub(firstlnum)
        } else {
            0
        };
        let env = ExecEnv {
            provider,
            firstlnum,
            maxline,
            multi,
            line_lbr: line_lbr || self.string_mode && !multi,
            ignore_case: opts.ignore_case,
            maxcol: opts.max_col,
            deadline: opts.timeout.map(|t| Instant::now() + t),
            interrupt: opts.interrupt.as_deref(),
            nobreak: self.nobreak,
            z_in: self.z_in.as_deref(),
            max_mem: opts.max_mem,
        };

        let mut outcome = match &self.engine {
            Engine::Nfa(n) => nfa::exec(n, &env, col),
            Engine::Bt(b) => backtrack::exec(b, &env, col),
        };

        // NFA gave up on this input: recompile for the backtracker and
        // retry, unless the user explicitly forced the NFA.
        if outcome.failure == Some(MatchFailure::TooExpensive)
            && self.forced != EngineKind::Nfa
            && matches!(self.engine, Engine::Nfa(_))
        {
            match compile_bt(&self.parsed) {
                Ok(bt) => {
                    self.must =
                        build_must_matcher(bt.must_contain.as_deref());
                    self.engine = Engine::Bt(bt);
                    if let Engine::Bt(b) = &self.engine {
                        outcome = backtrack::exec(b, &env, col);
                    }
                }
                Err(_) => {
                    self.last_failure = Some(MatchFailure::TooExpensive);
                    return 0;
                }
            }
        }

        self.last_failure = outcome.failure;
        if outcome.lines > 0 {
            self.subs = outcome.subs;
            self.zsubs = outcome.zsubs;
        }
        outcome.lines
    }

    /// The submatch record of the last successful search.
    pub fn submatches(&self) -> &Submatches {
        &self.subs
    }

    /// `\z(...\)` capture texts of the last successful search.
    pub fn z_matches(&self) -> Option<&[Option<String>; 10]> {
        self.zsubs.as_deref()
    }

    /// Provide external `\z1`..`\z9` texts for the next searches.
    pub fn set_z_input(&mut self, z: Option<[Option<String>; 10]>) {
        self.z_in = z.map(Box::new);
    }

    /// Why the last search reported "no match" early, if it did.
    pub fn last_failure(&self) -> Option<MatchFailure> {
        self.last_failure
    }

    /// The pattern can match a line break.
    pub fn is_multiline(&self) -> bool {
        self.parsed
            .flags
            .contains(crate::syntax::ProgFlags::HASNL)
    }

    /// A `$` was found in the pattern; searches may need the line end.
    pub fn had_eol(&self) -> bool {
        self.parsed.had_eol
    }

    /// The pattern uses `\@<=` or `\@<!`.
    pub fn uses_lookbehind(&self) -> bool {
        self.parsed
            .flags
            .contains(crate::syntax::ProgFlags::LOOKBH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    fn m(pat: &str, line: &str) -> Option<(usize, usize)> {
        let mut prog = compile(pat, CompileFlags::MAGIC).unwrap();
        if prog.exec_line(
            line.as_bytes(),
            0,
            false,
            &MatchOptions::default(),
        ) {
            prog.submatches().byte_range(0)
        } else {
            None
        }
    }

    fn m_bt(pat: &str, line: &str) -> Option<(usize, usize)> {
        m(&format!(r"\%#=1{pat}"), line)
    }

    #[test]
    fn literal_match_both_engines() {
        assert_eq!(m("foo", "a foo b"), Some((2, 5)));
        assert_eq!(m_bt("foo", "a foo b"), Some((2, 5)));
        assert_eq!(m("foo", "bar"), None);
        assert_eq!(m_bt("foo", "bar"), None);
    }

    #[test]
    fn engine_selection_prefix() {
        let prog = compile(r"\%#=1foo", CompileFlags::MAGIC).unwrap();
        assert_eq!(prog.engine_kind(), EngineKind::Backtracking);
        let prog = compile(r"\%#=2foo", CompileFlags::MAGIC).unwrap();
        assert_eq!(prog.engine_kind(), EngineKind::Nfa);
        let prog = compile("foo", CompileFlags::MAGIC).unwrap();
        assert_eq!(prog.engine_kind(), EngineKind::Nfa);
        let err = compile(r"\%#=5foo", CompileFlags::MAGIC).unwrap_err();
        assert_eq!(err.e_number(), 864);
    }

    #[test]
    fn backref_pattern_falls_back_to_bt() {
        let prog = compile(r"\(ab\)\1", CompileFlags::MAGIC).unwrap();
        assert_eq!(prog.engine_kind(), EngineKind::Backtracking);
        // ... and forcing the NFA is an error for such patterns
        assert!(compile(r"\%#=2\(ab\)\1", CompileFlags::MAGIC).is_err());
    }

    #[test]
    fn ignore_case_option_and_overrides() {
        let opts = MatchOptions::builder().ignore_case(true).build();
        let mut prog = compile("foo", CompileFlags::MAGIC).unwrap();
        assert!(prog.exec_line(b"FOO", 0, false, &opts));
        // \C wins over the option
        let mut prog = compile(r"\Cfoo", CompileFlags::MAGIC).unwrap();
        assert!(!prog.exec_line(b"FOO", 0, false, &opts));
        // \c wins the other way
        let mut prog = compile(r"\cfoo", CompileFlags::MAGIC).unwrap();
        assert!(prog.exec_line(b"FOO", 0, false, &MatchOptions::default()));
    }

    #[test]
    fn multi_line_span() {
        let buf = Buffer::new(&["hello", "hello"]);
        let mut prog =
            compile(r"hello\nhello", CompileFlags::MAGIC).unwrap();
        let lines =
            prog.exec_multi(&buf, 1, 0, &MatchOptions::default());
        assert_eq!(lines, 2);
    }

    #[test]
    fn max_col_limits_search() {
        let opts = MatchOptions::builder().max_col(2).build();
        let mut prog = compile("foo", CompileFlags::MAGIC).unwrap();
        assert!(!prog.exec_line(b"xxxfoo", 0, false, &opts));
        assert!(prog.exec_line(b"foo", 0, false, &opts));
    }

    #[test]
    fn string_mode_newline() {
        let mut prog = compile(
            r"a\nb",
            CompileFlags::MAGIC | CompileFlags::STRING,
        )
        .unwrap();
        assert!(prog.exec_line(b"a\nb", 0, true, &MatchOptions::default()));
    }
}
