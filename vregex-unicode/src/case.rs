/*!
Case conversion and simple case folding.

The engines compare one code point at a time, so only single-char mappings
are provided (`Maße` does not match `MASSE`). Folding normalizes the few
characters with more than one lowercase form (e.g. `ς` and `σ`) to a single
representative, which plain lowercasing does not.
*/

use crate::Sealed;

pub trait CharCaseExt: Sealed {
    /// Single-char uppercase mapping. Multi-char expansions keep the first
    /// char (`ß` stays `ß`-sized territory: `SS` truncates to `S`).
    fn to_upper_char(self) -> char;

    /// Single-char lowercase mapping.
    fn to_lower_char(self) -> char;

    /// Simple case folding to a canonical comparison form.
    fn to_fold_case(self) -> char;
}

impl CharCaseExt for char {
    fn to_upper_char(self) -> char {
        if self.is_ascii() {
            return self.to_ascii_uppercase();
        }
        self.to_uppercase().next().unwrap()
    }

    fn to_lower_char(self) -> char {
        if self.is_ascii() {
            return self.to_ascii_lowercase();
        }
        self.to_lowercase().next().unwrap()
    }

    fn to_fold_case(self) -> char {
        if self.is_ascii() {
            return self.to_ascii_lowercase();
        }
        match self {
            // final sigma folds together with the medial form
            'ς' => 'σ',
            // Kelvin sign and Angstrom sign fold with the letters
            '\u{212a}' => 'k',
            '\u{212b}' => 'å',
            c => c.to_lowercase().next().unwrap(),
        }
    }
}

pub trait StrCaseExt: Sealed {
    /// Fold every char; used for caseless literal comparison.
    fn to_fold_case(&self) -> String;
}

impl StrCaseExt for str {
    fn to_fold_case(&self) -> String {
        self.chars().map(|c| c.to_fold_case()).collect()
    }
}

/// Combining-mark ranges; a composing char joins the preceding base char.
static COMPOSING: &[(u32, u32)] = &[
    (0x0300, 0x036f),
    (0x0483, 0x0489),
    (0x0591, 0x05bd),
    (0x05bf, 0x05bf),
    (0x05c1, 0x05c2),
    (0x05c4, 0x05c5),
    (0x05c7, 0x05c7),
    (0x0610, 0x061a),
    (0x064b, 0x065f),
    (0x0670, 0x0670),
    (0x06d6, 0x06dc),
    (0x06df, 0x06e4),
    (0x06e7, 0x06e8),
    (0x06ea, 0x06ed),
    (0x0711, 0x0711),
    (0x0730, 0x074a),
    (0x07a6, 0x07b0),
    (0x07eb, 0x07f3),
    (0x0816, 0x0819),
    (0x081b, 0x0823),
    (0x0825, 0x0827),
    (0x0829, 0x082d),
    (0x0859, 0x085b),
    (0x08d3, 0x08e1),
    (0x08e3, 0x0902),
    (0x093a, 0x093a),
    (0x093c, 0x093c),
    (0x0941, 0x0948),
    (0x094d, 0x094d),
    (0x0951, 0x0957),
    (0x0962, 0x0963),
    (0x0e31, 0x0e31),
    (0x0e34, 0x0e3a),
    (0x0e47, 0x0e4e),
    (0x1ab0, 0x1aff),
    (0x1dc0, 0x1dff),
    (0x20d0, 0x20ff),
    (0xfe20, 0xfe2f),
];

/// True when `c` is a composing (combining) character.
pub fn is_composing(c: u32) -> bool {
    if c < 0x300 {
        return false;
    }
    COMPOSING
        .binary_search_by(|&(lo, hi)| {
            if hi < c {
                std::cmp::Ordering::Less
            } else if lo > c {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold() {
        assert_eq!('A'.to_fold_case(), 'a');
        assert_eq!('ς'.to_fold_case(), 'σ');
        assert_eq!('Σ'.to_fold_case(), 'σ');
        assert_eq!('É'.to_fold_case(), 'é');
        assert_eq!("ΒΊΟΣ".to_fold_case(), "βίοσ");
    }

    #[test]
    fn upper_lower() {
        assert_eq!('é'.to_upper_char(), 'É');
        assert_eq!('Ā'.to_lower_char(), 'ā');
        assert_eq!('5'.to_upper_char(), '5');
    }

    #[test]
    fn composing() {
        assert!(is_composing(0x0301));
        assert!(is_composing(0x20d0));
        assert!(!is_composing('a' as u32));
        assert!(!is_composing(0x4e00));
    }
}
