//! ASCII class bit table.
//!
//! A 256-entry table decides the cheap per-byte classes in constant time.
//! Code points above `0xff` never carry any of these bits.

const DIGIT: u16 = 0x01;
const HEX: u16 = 0x02;
const OCTAL: u16 = 0x04;
const WORD: u16 = 0x08;
const HEAD: u16 = 0x10;
const ALPHA: u16 = 0x20;
const LOWER: u16 = 0x40;
const UPPER: u16 = 0x80;
const WHITE: u16 = 0x100;

static CLASS_TAB: [u16; 256] = build_class_tab();

const fn build_class_tab() -> [u16; 256] {
    let mut tab = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let c = i as u8;
        tab[i] = match c {
            b'0'..=b'7' => DIGIT | HEX | OCTAL | WORD,
            b'8'..=b'9' => DIGIT | HEX | WORD,
            b'a'..=b'f' => HEX | WORD | HEAD | ALPHA | LOWER,
            b'g'..=b'z' => WORD | HEAD | ALPHA | LOWER,
            b'A'..=b'F' => HEX | WORD | HEAD | ALPHA | UPPER,
            b'G'..=b'Z' => WORD | HEAD | ALPHA | UPPER,
            b'_' => WORD | HEAD,
            b' ' | b'\t' => WHITE,
            _ => 0,
        };
        i += 1;
    }
    tab
}

#[inline]
fn bit(c: u32, flag: u16) -> bool {
    c < 0x100 && CLASS_TAB[c as usize] & flag != 0
}

#[inline]
pub fn is_digit(c: u32) -> bool {
    bit(c, DIGIT)
}

#[inline]
pub fn is_hex(c: u32) -> bool {
    bit(c, HEX)
}

#[inline]
pub fn is_octal(c: u32) -> bool {
    bit(c, OCTAL)
}

/// `0-9A-Za-z_`, the default "word" class.
#[inline]
pub fn is_word(c: u32) -> bool {
    bit(c, WORD)
}

/// A word character that may start an identifier (no digits).
#[inline]
pub fn is_head(c: u32) -> bool {
    bit(c, HEAD)
}

#[inline]
pub fn is_alpha(c: u32) -> bool {
    bit(c, ALPHA)
}

#[inline]
pub fn is_lower_ascii(c: u32) -> bool {
    bit(c, LOWER)
}

#[inline]
pub fn is_upper_ascii(c: u32) -> bool {
    bit(c, UPPER)
}

/// Space or tab. Line breaks are never white here.
#[inline]
pub fn is_white(c: u32) -> bool {
    bit(c, WHITE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_bits() {
        assert!(is_digit('7' as u32) && is_octal('7' as u32));
        assert!(is_digit('9' as u32) && !is_octal('9' as u32));
        assert!(is_hex('f' as u32) && is_hex('F' as u32) && !is_hex('g' as u32));
        assert!(is_word('_' as u32) && is_head('_' as u32));
        assert!(!is_head('3' as u32) && is_word('3' as u32));
        assert!(is_white(' ' as u32) && is_white('\t' as u32));
        assert!(!is_white('\n' as u32));
        // no bits above latin-1
        assert!(!is_word(0x100) && !is_alpha(0x4e00));
    }
}
