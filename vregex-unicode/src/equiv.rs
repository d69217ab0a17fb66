//! Equivalence classes for `[[=x=]]` collection items.
//!
//! The grouping and expansion order are data: precomposed Latin letters
//! collate with their base letter, and expansion emits the members in the
//! fixed order below (observable through `[[=a=]]`).

/// Equivalence-class groups: each group lists a base letter followed by all
/// characters that collate with it. Lookup scans group membership; expansion
/// emits the group in this exact order.
static EQUIV_CLASSES: &[&[char]] = &[
    &[
        'A', '\u{c0}', '\u{c1}', '\u{c2}', '\u{c3}', '\u{c4}', '\u{c5}',
        '\u{100}', '\u{102}', '\u{104}', '\u{1cd}', '\u{1de}', '\u{1e0}',
        '\u{1fa}', '\u{202}', '\u{226}', '\u{23a}', '\u{1e00}', '\u{1ea0}',
        '\u{1ea2}', '\u{1ea4}', '\u{1ea6}', '\u{1ea8}', '\u{1eaa}',
        '\u{1eac}', '\u{1eae}', '\u{1eb0}', '\u{1eb2}', '\u{1eb4}',
        '\u{1eb6}',
    ],
    &['B', '\u{181}', '\u{243}', '\u{1e02}', '\u{1e04}', '\u{1e06}'],
    &[
        'C', '\u{c7}', '\u{106}', '\u{108}', '\u{10a}', '\u{10c}', '\u{187}',
        '\u{23b}', '\u{1e08}', '\u{a792}',
    ],
    &[
        'D', '\u{10e}', '\u{110}', '\u{18a}', '\u{1e0a}', '\u{1e0c}',
        '\u{1e0e}', '\u{1e10}', '\u{1e12}',
    ],
    &[
        'E', '\u{c8}', '\u{c9}', '\u{ca}', '\u{cb}', '\u{112}', '\u{114}',
        '\u{116}', '\u{118}', '\u{11a}', '\u{204}', '\u{206}', '\u{228}',
        '\u{246}', '\u{1e14}', '\u{1e16}', '\u{1e18}', '\u{1e1a}',
        '\u{1e1c}', '\u{1eb8}', '\u{1eba}', '\u{1ebc}', '\u{1ebe}',
        '\u{1ec0}', '\u{1ec2}', '\u{1ec4}', '\u{1ec6}',
    ],
    &['F', '\u{191}', '\u{1e1e}', '\u{a798}'],
    &[
        'G', '\u{11c}', '\u{11e}', '\u{120}', '\u{122}', '\u{193}',
        '\u{1e4}', '\u{1e6}', '\u{1f4}', '\u{1e20}', '\u{a7a0}',
    ],
    &[
        'H', '\u{124}', '\u{126}', '\u{21e}', '\u{1e22}', '\u{1e24}',
        '\u{1e26}', '\u{1e28}', '\u{1e2a}', '\u{2c67}',
    ],
    &[
        'I', '\u{cc}', '\u{cd}', '\u{ce}', '\u{cf}', '\u{128}', '\u{12a}',
        '\u{12c}', '\u{12e}', '\u{130}', '\u{197}', '\u{1cf}', '\u{208}',
        '\u{20a}', '\u{1e2c}', '\u{1e2e}', '\u{1ec8}', '\u{1eca}',
    ],
    &['J', '\u{134}', '\u{248}'],
    &[
        'K', '\u{136}', '\u{198}', '\u{1e8}', '\u{1e30}', '\u{1e32}',
        '\u{1e34}', '\u{2c69}', '\u{a740}',
    ],
    &[
        'L', '\u{139}', '\u{13b}', '\u{13d}', '\u{13f}', '\u{141}',
        '\u{23d}', '\u{1e36}', '\u{1e38}', '\u{1e3a}', '\u{1e3c}',
        '\u{2c60}',
    ],
    &['M', '\u{1e3e}', '\u{1e40}', '\u{1e42}'],
    &[
        'N', '\u{d1}', '\u{143}', '\u{145}', '\u{147}', '\u{1f8}',
        '\u{1e44}', '\u{1e46}', '\u{1e48}', '\u{1e4a}', '\u{a7a4}',
    ],
    &[
        'O', '\u{d2}', '\u{d3}', '\u{d4}', '\u{d5}', '\u{d6}', '\u{d8}',
        '\u{14c}', '\u{14e}', '\u{150}', '\u{19f}', '\u{1a0}', '\u{1d1}',
        '\u{1ea}', '\u{1ec}', '\u{1fe}', '\u{20c}', '\u{20e}', '\u{22a}',
        '\u{22c}', '\u{22e}', '\u{230}', '\u{1e4c}', '\u{1e4e}', '\u{1e50}',
        '\u{1e52}', '\u{1ecc}', '\u{1ece}', '\u{1ed0}', '\u{1ed2}',
        '\u{1ed4}', '\u{1ed6}', '\u{1ed8}', '\u{1eda}', '\u{1edc}',
        '\u{1ede}', '\u{1ee0}', '\u{1ee2}',
    ],
    &['P', '\u{1a4}', '\u{1e54}', '\u{1e56}', '\u{2c63}'],
    &['Q', '\u{24a}'],
    &[
        'R', '\u{154}', '\u{156}', '\u{210}', '\u{212}', '\u{158}',
        '\u{24c}', '\u{1e58}', '\u{1e5a}', '\u{1e5c}', '\u{1e5e}',
        '\u{2c64}', '\u{a7a6}',
    ],
    &[
        'S', '\u{15a}', '\u{15c}', '\u{15e}', '\u{160}', '\u{218}',
        '\u{1e60}', '\u{1e62}', '\u{1e64}', '\u{1e66}', '\u{1e68}',
        '\u{2c7e}', '\u{a7a8}',
    ],
    &[
        'T', '\u{162}', '\u{164}', '\u{166}', '\u{1ac}', '\u{23e}',
        '\u{1ae}', '\u{21a}', '\u{1e6a}', '\u{1e6c}', '\u{1e6e}', '\u{1e70}',
    ],
    &[
        'U', '\u{d9}', '\u{da}', '\u{db}', '\u{dc}', '\u{168}', '\u{16a}',
        '\u{16c}', '\u{16e}', '\u{170}', '\u{172}', '\u{1af}', '\u{1d3}',
        '\u{1d5}', '\u{1d7}', '\u{1d9}', '\u{1db}', '\u{214}', '\u{216}',
        '\u{244}', '\u{1e72}', '\u{1e74}', '\u{1e76}', '\u{1e78}',
        '\u{1e7a}', '\u{1ee4}', '\u{1ee6}', '\u{1ee8}', '\u{1eea}',
        '\u{1eec}', '\u{1eee}', '\u{1ef0}',
    ],
    &['V', '\u{1b2}', '\u{1e7c}', '\u{1e7e}'],
    &[
        'W', '\u{174}', '\u{1e80}', '\u{1e82}', '\u{1e84}', '\u{1e86}',
        '\u{1e88}',
    ],
    &['X', '\u{1e8a}', '\u{1e8c}'],
    &[
        'Y', '\u{dd}', '\u{176}', '\u{178}', '\u{1b3}', '\u{232}', '\u{24e}',
        '\u{1e8e}', '\u{1ef2}', '\u{1ef4}', '\u{1ef6}', '\u{1ef8}',
    ],
    &[
        'Z', '\u{179}', '\u{17b}', '\u{17d}', '\u{1b5}', '\u{1e90}',
        '\u{1e92}', '\u{1e94}', '\u{2c6b}',
    ],
    &[
        'a', '\u{e0}', '\u{e1}', '\u{e2}', '\u{e3}', '\u{e4}', '\u{e5}',
        '\u{101}', '\u{103}', '\u{105}', '\u{1ce}', '\u{1df}', '\u{1e1}',
        '\u{1fb}', '\u{201}', '\u{203}', '\u{227}', '\u{1d8f}', '\u{1e01}',
        '\u{1e9a}', '\u{1ea1}', '\u{1ea3}', '\u{1ea5}', '\u{1ea7}',
        '\u{1ea9}', '\u{1eab}', '\u{1ead}', '\u{1eaf}', '\u{1eb1}',
        '\u{1eb3}', '\u{1eb5}', '\u{1eb7}', '\u{2c65}',
    ],
    &[
        'b', '\u{180}', '\u{253}', '\u{1d6c}', '\u{1d80}', '\u{1e03}',
        '\u{1e05}', '\u{1e07}',
    ],
    &[
        'c', '\u{e7}', '\u{107}', '\u{109}', '\u{10b}', '\u{10d}', '\u{188}',
        '\u{23c}', '\u{1e09}', '\u{a793}', '\u{a794}',
    ],
    &[
        'd', '\u{10f}', '\u{111}', '\u{257}', '\u{1d6d}', '\u{1d81}',
        '\u{1d91}', '\u{1e0b}', '\u{1e0d}', '\u{1e0f}', '\u{1e11}',
        '\u{1e13}',
    ],
    &[
        'e', '\u{e8}', '\u{e9}', '\u{ea}', '\u{eb}', '\u{113}', '\u{115}',
        '\u{117}', '\u{119}', '\u{11b}', '\u{205}', '\u{207}', '\u{229}',
        '\u{247}', '\u{1d92}', '\u{1e15}', '\u{1e17}', '\u{1e19}',
        '\u{1e1b}', '\u{1e1d}', '\u{1eb9}', '\u{1ebb}', '\u{1ebd}',
        '\u{1ebf}', '\u{1ec1}', '\u{1ec3}', '\u{1ec5}', '\u{1ec7}',
    ],
    &['f', '\u{192}', '\u{1d6e}', '\u{1d82}', '\u{1e1f}', '\u{a799}'],
    &[
        'g', '\u{11d}', '\u{11f}', '\u{121}', '\u{123}', '\u{1e5}',
        '\u{1e7}', '\u{1f5}', '\u{260}', '\u{1d83}', '\u{1e21}', '\u{a7a1}',
    ],
    &[
        'h', '\u{125}', '\u{127}', '\u{21f}', '\u{1e23}', '\u{1e25}',
        '\u{1e27}', '\u{1e29}', '\u{1e2b}', '\u{1e96}', '\u{2c68}',
        '\u{a795}',
    ],
    &[
        'i', '\u{ec}', '\u{ed}', '\u{ee}', '\u{ef}', '\u{129}', '\u{12b}',
        '\u{12d}', '\u{12f}', '\u{1d0}', '\u{209}', '\u{20b}', '\u{268}',
        '\u{1d96}', '\u{1e2d}', '\u{1e2f}', '\u{1ec9}', '\u{1ecb}',
    ],
    &['j', '\u{135}', '\u{1f0}', '\u{249}'],
    &[
        'k', '\u{137}', '\u{199}', '\u{1e9}', '\u{1d84}', '\u{1e31}',
        '\u{1e33}', '\u{1e35}', '\u{2c6a}', '\u{a741}',
    ],
    &[
        'l', '\u{13a}', '\u{13c}', '\u{13e}', '\u{140}', '\u{142}',
        '\u{19a}', '\u{1e37}', '\u{1e39}', '\u{1e3b}', '\u{1e3d}',
        '\u{2c61}',
    ],
    &['m', '\u{1d6f}', '\u{1e3f}', '\u{1e41}', '\u{1e43}'],
    &[
        'n', '\u{f1}', '\u{144}', '\u{146}', '\u{148}', '\u{149}', '\u{1f9}',
        '\u{1d70}', '\u{1d87}', '\u{1e45}', '\u{1e47}', '\u{1e49}',
        '\u{1e4b}', '\u{a7a5}',
    ],
    &[
        'o', '\u{f2}', '\u{f3}', '\u{f4}', '\u{f5}', '\u{f6}', '\u{f8}',
        '\u{14d}', '\u{14f}', '\u{151}', '\u{1a1}', '\u{1d2}', '\u{1eb}',
        '\u{1ed}', '\u{1ff}', '\u{20d}', '\u{20f}', '\u{22b}', '\u{22d}',
        '\u{22f}', '\u{231}', '\u{275}', '\u{1e4d}', '\u{1e4f}', '\u{1e51}',
        '\u{1e53}', '\u{1ecd}', '\u{1ecf}', '\u{1ed1}', '\u{1ed3}',
        '\u{1ed5}', '\u{1ed7}', '\u{1ed9}', '\u{1edb}', '\u{1edd}',
        '\u{1edf}', '\u{1ee1}', '\u{1ee3}',
    ],
    &[
        'p', '\u{1a5}', '\u{1d71}', '\u{1d7d}', '\u{1d88}', '\u{1e55}',
        '\u{1e57}',
    ],
    &['q', '\u{24b}', '\u{2a0}'],
    &[
        'r', '\u{155}', '\u{157}', '\u{159}', '\u{211}', '\u{213}',
        '\u{24d}', '\u{1d72}', '\u{1d73}', '\u{1d89}', '\u{1e59}', '\u{27d}',
        '\u{1e5b}', '\u{1e5d}', '\u{1e5f}', '\u{a7a7}',
    ],
    &[
        's', '\u{15b}', '\u{15d}', '\u{15f}', '\u{161}', '\u{23f}',
        '\u{219}', '\u{1d74}', '\u{1d8a}', '\u{1e61}', '\u{1e63}',
        '\u{1e65}', '\u{1e67}', '\u{1e69}', '\u{a7a9}',
    ],
    &[
        't', '\u{163}', '\u{165}', '\u{167}', '\u{1ab}', '\u{21b}',
        '\u{1ad}', '\u{288}', '\u{1d75}', '\u{1e6b}', '\u{1e6d}', '\u{1e6f}',
        '\u{1e71}', '\u{1e97}', '\u{2c66}',
    ],
    &[
        'u', '\u{f9}', '\u{fa}', '\u{fb}', '\u{fc}', '\u{169}', '\u{16b}',
        '\u{16d}', '\u{16f}', '\u{171}', '\u{173}', '\u{1d6}', '\u{1d8}',
        '\u{1da}', '\u{1dc}', '\u{215}', '\u{217}', '\u{1b0}', '\u{1d4}',
        '\u{289}', '\u{1d7e}', '\u{1d99}', '\u{1e73}', '\u{1e75}',
        '\u{1e77}', '\u{1e79}', '\u{1e7b}', '\u{1ee5}', '\u{1ee7}',
        '\u{1ee9}', '\u{1eeb}', '\u{1eed}', '\u{1eef}', '\u{1ef1}',
    ],
    &['v', '\u{28b}', '\u{1d8c}', '\u{1e7d}', '\u{1e7f}'],
    &[
        'w', '\u{175}', '\u{1e81}', '\u{1e83}', '\u{1e85}', '\u{1e87}',
        '\u{1e89}', '\u{1e98}',
    ],
    &['x', '\u{1e8b}', '\u{1e8d}'],
    &[
        'y', '\u{fd}', '\u{ff}', '\u{177}', '\u{1b4}', '\u{233}', '\u{24f}',
        '\u{1e8f}', '\u{1e99}', '\u{1ef3}', '\u{1ef5}', '\u{1ef7}',
        '\u{1ef9}',
    ],
    &[
        'z', '\u{17a}', '\u{17c}', '\u{17e}', '\u{1b6}', '\u{1d76}',
        '\u{1d8e}', '\u{1e91}', '\u{1e93}', '\u{1e95}', '\u{2c6c}',
    ],
];

/// The full equivalence class of `c`, base letter first, or `None` when `c`
/// belongs to no class. The returned slice is the expansion order.
pub fn equivalence_class(c: char) -> Option<&'static [char]> {
    EQUIV_CLASSES
        .iter()
        .find(|group| group.contains(&c))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_letter_leads() {
        for group in EQUIV_CLASSES {
            assert!(group[0].is_ascii_alphabetic());
        }
    }

    #[test]
    fn lookup() {
        let a = equivalence_class('a').unwrap();
        assert_eq!(a[0], 'a');
        assert!(a.contains(&'\u{e0}')); // a-grave
        assert_eq!(equivalence_class('\u{e1}').unwrap()[0], 'a');
        assert_eq!(equivalence_class('7'), None);
        // uppercase and lowercase are distinct classes
        assert_ne!(
            equivalence_class('A').unwrap(),
            equivalence_class('a').unwrap()
        );
    }
}
