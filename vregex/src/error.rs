use std::fmt;

/// Errors from compiling or running a pattern.
///
/// Compile errors carry the user-visible `E`-number so the host can show the
/// same diagnostics as the editor. Run-time conditions that merely abort a
/// search (timeout, interrupt, resource limits) are reported as "no match"
/// through the search APIs and surface through
/// [`Program::last_failure`](crate::Program::last_failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Structural pattern error (unmatched paren, bad escape, ...).
    Syntax { code: u16, msg: String },
    /// Program larger than 16-bit offsets, or a numeric escape overflowed.
    TooBig,
    /// The NFA engine cannot handle this pattern; retry with backtracking.
    TooExpensive,
    /// The same compiled program was re-entered while executing.
    Recursive,
    /// The deadline passed during a search.
    TimedOut,
    /// The caller's interrupt flag was set during a search.
    Interrupted,
    /// Internal stacks would exceed the configured memory budget.
    TooMuchMemory,
    /// `\=expr` substitution nested more than 4 deep.
    SubstNestingTooDeep,
    /// Back-reference to a group whose `\)` has not been seen yet.
    BadBackref,
}

impl Error {
    pub(crate) fn syntax(code: u16, msg: impl Into<String>) -> Error {
        Error::Syntax { code, msg: msg.into() }
    }

    /// The Vim error number for this error.
    pub fn e_number(&self) -> u16 {
        match self {
            Error::Syntax { code, .. } => *code,
            Error::TooBig => 339,
            Error::TooExpensive => 1281,
            Error::Recursive => 956,
            Error::TimedOut => 361,
            Error::Interrupted => 361,
            Error::TooMuchMemory => 363,
            Error::SubstNestingTooDeep => 1290,
            Error::BadBackref => 65,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syntax { code, msg } => write!(f, "E{code}: {msg}"),
            Error::TooBig => write!(f, "E339: Pattern too long"),
            Error::TooExpensive => {
                write!(f, "pattern too expensive for the NFA engine")
            }
            Error::Recursive => {
                write!(f, "E956: Cannot use pattern recursively")
            }
            Error::TimedOut => write!(f, "pattern search timed out"),
            Error::Interrupted => write!(f, "pattern search interrupted"),
            Error::TooMuchMemory => write!(
                f,
                "E363: Pattern uses more memory than 'maxmempattern'"
            ),
            Error::SubstNestingTooDeep => {
                write!(f, "E1290: substitute nesting too deep")
            }
            Error::BadBackref => write!(f, "E65: Illegal back reference"),
        }
    }
}

impl std::error::Error for Error {}

/// Why the last search returned "no match" without actually failing to match.
///
/// Cleared at the start of every search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFailure {
    TimedOut,
    Interrupted,
    TooExpensive,
    TooMuchMemory,
    Recursive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_e_numbers() {
        let e = Error::syntax(55, "Unmatched )");
        assert_eq!(e.to_string(), "E55: Unmatched )");
        assert_eq!(e.e_number(), 55);
        assert_eq!(Error::TooBig.to_string(), "E339: Pattern too long");
        assert_eq!(
            Error::SubstNestingTooDeep.to_string(),
            "E1290: substitute nesting too deep"
        );
    }
}
