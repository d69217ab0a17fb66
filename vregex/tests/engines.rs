//! Single-line matching semantics, exercised on both engines.

use vregex::{compile, CompileFlags, EngineKind, MatchOptions, Program};

fn compiled(pat: &str) -> Program {
    compile(pat, CompileFlags::MAGIC).unwrap()
}

fn find(pat: &str, line: &str) -> Option<(usize, usize)> {
    let mut prog = compiled(pat);
    if prog.exec_line(line.as_bytes(), 0, false, &MatchOptions::default()) {
        prog.submatches().byte_range(0)
    } else {
        None
    }
}

fn find_bt(pat: &str, line: &str) -> Option<(usize, usize)> {
    find(&format!(r"\%#=1{pat}"), line)
}

fn group(pat: &str, line: &str, no: usize) -> Option<String> {
    let mut prog = compiled(pat);
    if prog.exec_line(line.as_bytes(), 0, false, &MatchOptions::default()) {
        prog.submatches().text(no).map(|s| s.to_string())
    } else {
        None
    }
}

#[test]
fn group_and_backreference() {
    // \(ab\)\1 on "abab": whole match at column 0, group 1 is "ab".
    let mut prog = compiled(r"\(ab\)\1");
    assert_eq!(prog.engine_kind(), EngineKind::Backtracking);
    assert!(prog.exec_line(b"abab", 0, false, &MatchOptions::default()));
    assert_eq!(prog.submatches().byte_range(0), Some((0, 4)));
    assert_eq!(prog.submatches().text(1), Some("ab"));

    assert_eq!(find(r"\(ab\)\1", "xabab"), Some((1, 5)));
    assert_eq!(find(r"\(ab\)\1", "abxab"), None);
}

#[test]
fn alternation_with_anchors() {
    assert_eq!(find(r"^foo\|bar$", "bazbar"), Some((3, 6)));
    assert_eq!(find_bt(r"^foo\|bar$", "bazbar"), Some((3, 6)));
    assert_eq!(find(r"^foo\|bar$", "foox"), Some((0, 3)));
    assert_eq!(find(r"^foo\|bar$", "xfoox"), None);
}

#[test]
fn bounded_reluctant_quantifier() {
    // Reluctant still has to satisfy min = 2, and extends up to 4 to let
    // the "b" match.
    assert_eq!(find(r"a\{-2,4}b", "aaaab"), Some((0, 5)));
    assert_eq!(find_bt(r"a\{-2,4}b", "aaaab"), Some((0, 5)));
    assert_eq!(find(r"a\{-2,4}b", "ab"), None);
    assert_eq!(find(r"a\{-2,4}b", "aaaaab"), Some((1, 6)));

    // Greedy prefers the longest count.
    assert_eq!(find(r"a\{2,4}", "aaaaaa"), Some((0, 4)));
    assert_eq!(find_bt(r"a\{2,4}", "aaaaaa"), Some((0, 4)));
}

#[test]
fn lookbehind() {
    // Negative look-behind rejects the match after "foo".
    assert_eq!(find(r"\(foo\)\@<!bar", "foobar"), None);
    assert_eq!(find(r"\(foo\)\@<!bar", "xxbar"), Some((2, 5)));
    // Positive look-behind is the mirror image.
    assert_eq!(find(r"\(foo\)\@<=bar", "foobar"), Some((3, 6)));
    assert_eq!(find(r"\(foo\)\@<=bar", "xxbar"), None);
}

#[test]
fn lookahead() {
    assert_eq!(find(r"foo\(bar\)\@=", "foobar"), Some((0, 3)));
    assert_eq!(find(r"foo\(bar\)\@=", "foobaz"), None);
    assert_eq!(find(r"foo\(bar\)\@!", "foobaz"), Some((0, 3)));
    assert_eq!(find(r"foo\(bar\)\@!", "foobar"), None);
    // Both engines agree; the NFA handles look-ahead natively.
    let prog = compiled(r"foo\(bar\)\@=");
    assert_eq!(prog.engine_kind(), EngineKind::Nfa);
    assert_eq!(find_bt(r"foo\(bar\)\@=", "foobar"), Some((0, 3)));
}

#[test]
fn atomic_group() {
    // The atomic group never gives characters back.
    assert_eq!(find(r"\(a\+\)\@>b", "aaab"), Some((0, 4)));
    assert_eq!(find(r"\(a*\)\@>a", "aaa"), None);
}

#[test]
fn branch_and() {
    // Both concats must match at the same position; the last one counts.
    assert_eq!(find(r"foo\&...", "fooxy"), Some((0, 3)));
    assert_eq!(find(r"foo\&f..", "fooxy"), Some((0, 3)));
    assert_eq!(find(r"bar\&...", "fooxy"), None);
}

#[test]
fn greedy_vs_reluctant_star() {
    // For every pattern, greedy slot-0 is at least as long as reluctant.
    let greedy = find(r"a*", "aaa").unwrap();
    let reluctant = find(r"a\{-}", "aaa").unwrap();
    assert_eq!(greedy, (0, 3));
    assert_eq!(reluctant, (0, 0));
    assert!(greedy.1 - greedy.0 >= reluctant.1 - reluctant.0);
}

#[test]
fn match_start_and_end_atoms() {
    assert_eq!(find(r"foo\zsbar", "foobar"), Some((3, 6)));
    assert_eq!(find_bt(r"foo\zsbar", "foobar"), Some((3, 6)));
    assert_eq!(find(r"foo\zebar", "foobar"), Some((0, 3)));
    assert_eq!(find_bt(r"foo\zebar", "foobar"), Some((0, 3)));
}

#[test]
fn word_boundaries() {
    assert_eq!(find(r"\<foo\>", "a foo b"), Some((2, 5)));
    assert_eq!(find(r"\<foo\>", "afoo b"), None);
    assert_eq!(find(r"\<foo\>", "foo"), Some((0, 3)));
    assert_eq!(find_bt(r"\<foo\>", "a foo b"), Some((2, 5)));
}

#[test]
fn collections() {
    assert_eq!(find(r"[a-c]\+", "xxabcax"), Some((2, 6)));
    assert_eq!(find(r"[^f]oo", "foo boo"), Some((4, 7)));
    assert_eq!(find(r"[]x]\+", "ax]x"), Some((1, 4)));
    // equivalence class members match their base letter's family
    assert_eq!(find(r"[[=e=]]\+", "xété"), Some((1, 3)));
    // character class names
    assert_eq!(find(r"[[:digit:][:space:]]\+", "ab1 2c"), Some((2, 5)));
}

#[test]
fn class_shortcuts() {
    assert_eq!(find(r"\d\+", "ab123cd"), Some((2, 5)));
    assert_eq!(find(r"\s\+", "ab \t cd"), Some((2, 5)));
    assert_eq!(find(r"\w\+", "!?ab_1;"), Some((2, 6)));
    assert_eq!(find(r"\u\l\+", "x Word y"), Some((2, 6)));
    assert_eq!(find(r"\x\+", "zz1aF!"), Some((2, 5)));
}

#[test]
fn optional_sequence() {
    // \%[] matches the longest prefix, possibly empty.
    assert_eq!(find(r"fu\%[nction]", "function"), Some((0, 8)));
    assert_eq!(find(r"fu\%[nction]", "funcX"), Some((0, 4)));
    assert_eq!(find(r"fu\%[nction]", "fu"), Some((0, 2)));
    assert_eq!(find(r"r\%[ead]!", "re!"), Some((0, 3)));
}

#[test]
fn char_code_atoms() {
    assert_eq!(find(r"\%d65\+", "xAAy"), Some((1, 3)));
    assert_eq!(find(r"\%x41", "A"), Some((0, 1)));
    assert_eq!(find(r"\%u20ac", "€"), Some((0, 3)));
}

#[test]
fn file_anchors_in_string() {
    assert_eq!(find(r"\%^abc\%$", "abc"), Some((0, 3)));
    assert_eq!(find(r"\%^abc\%$", "xabc"), None);
}

#[test]
fn case_folding() {
    let opts = MatchOptions::builder().ignore_case(true).build();
    let mut prog = compiled(r"[a-z]\+");
    assert!(prog.exec_line(b"ABC", 0, false, &opts));
    let mut prog = compiled(r"f\{2}");
    assert!(prog.exec_line(b"oFFo", 0, false, &opts));
    // Unicode fold
    let mut prog = compiled("στίγμα");
    assert!(prog.exec_line("ΣΤΊΓΜΑ".as_bytes(), 0, false, &opts));
}

#[test]
fn magic_modes() {
    assert_eq!(find(r"\v(ab)+", "xababy"), Some((1, 5)));
    assert_eq!(find(r"\Va.b", "x a.b y"), Some((2, 5)));
    assert_eq!(find(r"\M.", "a.b"), Some((1, 2)));
}

#[test]
fn back_stack_progress_terminates() {
    // Nested empty-capable loops must not spin: the BACK guard fails a
    // loop that makes no progress.
    assert_eq!(find_bt(r"\(a*\)*b", "aaab"), Some((0, 4)));
    assert_eq!(find_bt(r"\(a*\)*b", "aaac"), None);
    assert_eq!(find_bt(r"\(x\=\)*y", "xxz"), None);
}

#[test]
fn engines_agree_on_slot0() {
    let patterns = [
        r"foo",
        r"fo*",
        r"f.o\=",
        r"[a-z]\+",
        r"^ab\|cd$",
        r"a\{2,3}",
        r"a\{-2,4}b",
        r"\<w\w*\>",
        r"x\zsy",
        r"\(ab\|a\)c",
        r"\d*:",
    ];
    let inputs = [
        "",
        "foo",
        "xfoo",
        "ffoo",
        "abcd",
        "aaa",
        "aaaab",
        "words here",
        "xy",
        "aac abc",
        "12: 34",
    ];
    for pat in patterns {
        let mut bt = compile(
            &format!(r"\%#=1{pat}"),
            CompileFlags::MAGIC,
        )
        .unwrap();
        let mut nfa = compile(
            &format!(r"\%#=2{pat}"),
            CompileFlags::MAGIC,
        )
        .unwrap();
        for input in inputs {
            let opts = MatchOptions::default();
            let hit_bt = bt.exec_line(input.as_bytes(), 0, false, &opts);
            let hit_nfa = nfa.exec_line(input.as_bytes(), 0, false, &opts);
            assert_eq!(hit_bt, hit_nfa, "match disagreement: {pat} / {input}");
            if hit_bt {
                assert_eq!(
                    bt.submatches().byte_range(0),
                    nfa.submatches().byte_range(0),
                    "slot 0 disagreement: {pat} / {input}"
                );
            }
        }
    }
}

#[test]
fn start_column() {
    let mut prog = compiled("o");
    assert!(prog.exec_line(b"foo", 2, false, &MatchOptions::default()));
    assert_eq!(prog.submatches().byte_range(0), Some((2, 3)));
    assert!(!prog.exec_line(b"fo", 2, false, &MatchOptions::default()));
}

#[test]
fn groups_capture_last_iteration() {
    assert_eq!(group(r"\(ab\|a\)\+c", "abac", 1), Some("a".to_string()));
    assert_eq!(group(r"\(\w\)\+!", "abc!", 1), Some("c".to_string()));
}

#[test]
fn interrupt_flag() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let flag = Arc::new(AtomicBool::new(false));
    flag.store(true, Ordering::Relaxed);
    let opts =
        MatchOptions::builder().interrupt(flag).build();
    let mut prog = compiled(r"\%#=1foo");
    assert!(!prog.exec_line(b"foo", 0, false, &opts));
    assert_eq!(
        prog.last_failure(),
        Some(vregex::MatchFailure::Interrupted)
    );
}

#[test]
fn memory_budget() {
    let opts = MatchOptions::builder().max_mem(0).build();
    let mut prog = compiled(r"\%#=1\(a\)\(b\)");
    assert!(!prog.exec_line(b"ab", 0, false, &opts));
    assert_eq!(
        prog.last_failure(),
        Some(vregex::MatchFailure::TooMuchMemory)
    );
}

#[test]
fn compile_is_repeatable() {
    // Compiling and dropping leaves no state behind; a fresh compile of
    // the same pattern behaves identically.
    for _ in 0..3 {
        let mut prog = compiled(r"\(b.\)\1");
        assert!(prog.exec_line(
            b"xbobo",
            0,
            false,
            &MatchOptions::default()
        ));
        assert_eq!(prog.submatches().byte_range(0), Some((1, 5)));
    }
}
