//! The submatch record of the last successful match.

use crate::buffer::Pos;

/// Start/end positions and captured text for slots 0..9. Slot 0 is the whole
/// match, slots 1..9 are `\(...\)` groups. Positions are absolute buffer
/// positions; for a string match everything is on line 1.
#[derive(Debug, Clone, Default)]
pub struct Submatches {
    pub(crate) start: [Option<Pos>; 10],
    pub(crate) end: [Option<Pos>; 10],
    /// Captured text, lines joined with '\n'.
    pub(crate) text: [Option<String>; 10],
}

impl Submatches {
    /// Start/end of slot `i`, when the group participated in the match.
    pub fn span(&self, i: usize) -> Option<(Pos, Pos)> {
        Some((self.start[i]?, self.end[i]?))
    }

    /// Byte range of slot `i` when it lies on a single line.
    pub fn byte_range(&self, i: usize) -> Option<(usize, usize)> {
        let (s, e) = self.span(i)?;
        if s.lnum == e.lnum {
            Some((s.col as usize, e.col as usize))
        } else {
            None
        }
    }

    pub fn text(&self, i: usize) -> Option<&str> {
        self.text[i].as_deref()
    }

    pub fn is_match(&self) -> bool {
        self.start[0].is_some()
    }

    /// The ten capture texts, for binding into a `\=expr` evaluation.
    pub fn as_list(&self) -> [Option<String>; 10] {
        self.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_and_ranges() {
        let mut subs = Submatches::default();
        subs.start[0] = Some(Pos::new(1, 2));
        subs.end[0] = Some(Pos::new(1, 5));
        subs.text[0] = Some("abc".into());
        assert_eq!(subs.byte_range(0), Some((2, 5)));
        assert_eq!(subs.text(0), Some("abc"));
        assert!(subs.is_match());
        assert_eq!(subs.span(1), None);

        subs.start[1] = Some(Pos::new(1, 0));
        subs.end[1] = Some(Pos::new(2, 3));
        assert_eq!(subs.byte_range(1), None); // spans two lines
    }
}
