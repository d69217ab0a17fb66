/*!
Vim-style regular expressions.

Two interchangeable engines execute the same pattern syntax: a Thompson-style
NFA simulation (the default) and a backtracking VM with two explicit stacks.
Patterns using constructs the NFA cannot handle (back-references,
look-behind, `\@>` atomic groups, `\%[...]`) automatically fall through to
the backtracking engine, at compile time or at run time.

## Features
- The full operator set: magic modes (`\v \m \M \V`), alternation and
  branch-AND (`\|`, `\&`), greedy and reluctant quantifiers (`*`, `\+`,
  `\=`, `\{m,n}`, `\{-m,n}`), look-around (`\@=`, `\@!`, `\@<=`, `\@<!`,
  `\@>`), groups and back-references, collections with `[:class:]`,
  `[=equivalence=]` and `[.collation.]` items, `\zs`/`\ze`, `\z(...\)`
  external captures, position atoms (`\%#`, `\%V`, `\%'m`, `\%23l` ...),
  and multi-line atoms (`\n`, `\_x`).
- Submatch capture (slots 0..9) with byte offsets or `(line, column)` pairs.
- [Substitution](regsub) with capture references, case sinks and
  expression-valued replacements.
- A [fuzzy matcher](fuzzy) for completion and interactive finders.
- A self-testing [SHA-256](sha256) helper for undo-file integrity.

## Usage
```
use vregex::{compile, CompileFlags, MatchOptions};

let mut re = compile(r"\(ab\)\1", CompileFlags::MAGIC)?;
assert!(re.exec_line(b"xx abab", 0, false, &MatchOptions::default()));
assert_eq!(re.submatches().byte_range(0), Some((3, 7)));
assert_eq!(re.submatches().text(1), Some("ab"));
# Ok::<(), vregex::Error>(())
```

Matching over buffer lines goes through the [`LineProvider`] seam:
```
use vregex::{compile, Buffer, CompileFlags, MatchOptions};

let buf = Buffer::new(&["hello", "hello"]);
let mut re = compile(r"\(\w\+\)\n\1", CompileFlags::MAGIC)?;
let lines = re.exec_multi(&buf, 1, 0, &MatchOptions::default());
assert_eq!(lines, 2); // the match spans two lines
# Ok::<(), vregex::Error>(())
```

## Engine selection
A `\%#=N` prefix on the pattern forces an engine: `0` automatic, `1`
backtracking, `2` NFA. Errors carry the editor's `E`-numbers:
```
use vregex::{compile, CompileFlags};

let err = compile(r"a\)", CompileFlags::MAGIC).unwrap_err();
assert_eq!(err.to_string(), "E55: Unmatched \\)");
```
*/

pub mod buffer;
pub mod chartab;
pub mod fuzzy;
pub mod regsub;
pub mod sha256;

mod backtrack;
mod error;
mod exec;
mod nfa;
mod prog;
mod submatch;
mod syntax;

pub use buffer::{Buffer, LineProvider, Pos, StringLines, VisualMode};
pub use error::{Error, MatchFailure};
pub use exec::{compile, CompileFlags, EngineKind, MatchOptions, Program};
pub use submatch::Submatches;
pub use syntax::ProgFlags;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_smoke() {
        let mut re = compile(r"^b\|ar$", CompileFlags::MAGIC).unwrap();
        assert!(re.exec_line(b"bar", 0, false, &MatchOptions::default()));
        assert_eq!(re.submatches().byte_range(0), Some((0, 1)));
    }
}
