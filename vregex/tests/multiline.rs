//! Matching over buffer lines: `\n` atoms, position predicates, marks,
//! cursor and visual area.

use vregex::{
    compile, Buffer, CompileFlags, MatchOptions, Pos, Program, VisualMode,
};

fn compiled(pat: &str) -> Program {
    compile(pat, CompileFlags::MAGIC).unwrap()
}

fn opts() -> MatchOptions {
    MatchOptions::default()
}

#[test]
fn multi_line_backreference() {
    // \(\w\+\)\n\1 over "hello" / "hello": spans two lines, group 1 is
    // "hello".
    let buf = Buffer::new(&["hello", "hello"]);
    let mut prog = compiled(r"\(\w\+\)\n\1");
    let lines = prog.exec_multi(&buf, 1, 0, &opts());
    assert_eq!(lines, 2);
    assert_eq!(prog.submatches().text(1), Some("hello"));
    assert_eq!(prog.submatches().span(0), Some((Pos::new(1, 0), Pos::new(2, 5))));

    let buf = Buffer::new(&["hello", "world"]);
    let mut prog = compiled(r"\(\w\+\)\n\1");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 0);
}

#[test]
fn newline_atom_spans_lines() {
    let buf = Buffer::new(&["foo", "bar"]);
    let mut prog = compiled(r"foo\nbar");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 2);
    // the whole captured text joins the lines with \n
    assert_eq!(prog.submatches().text(0), Some("foo\nbar"));
}

#[test]
fn any_with_newline() {
    let buf = Buffer::new(&["xa", "b"]);
    let mut prog = compiled(r"a\_.b");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 2);

    // \_[..] collection with line break
    let buf = Buffer::new(&["xa", "b"]);
    let mut prog = compiled(r"a\_[b]b");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 2);
}

#[test]
fn search_starts_in_given_line() {
    let buf = Buffer::new(&["one", "two", "three"]);
    let mut prog = compiled("three");
    // Matches are only looked for in the start line.
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 0);
    assert_eq!(prog.exec_multi(&buf, 3, 0, &opts()), 1);
}

#[test]
fn file_anchors() {
    let buf = Buffer::new(&["first", "last"]);
    let mut prog = compiled(r"\%^first");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 1);
    // \%^ only holds in line one
    let mut prog = compiled(r"\%^last");
    assert_eq!(prog.exec_multi(&buf, 2, 0, &opts()), 0);
    let mut prog = compiled(r"last\%$");
    assert_eq!(prog.exec_multi(&buf, 2, 0, &opts()), 1);
}

#[test]
fn line_predicates() {
    let buf = Buffer::new(&["aaa", "aaa", "aaa"]);
    let mut prog = compiled(r"\%2laa");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 0);
    assert_eq!(prog.exec_multi(&buf, 2, 0, &opts()), 1);

    let mut prog = compiled(r"\%>2laa");
    assert_eq!(prog.exec_multi(&buf, 2, 0, &opts()), 0);
    assert_eq!(prog.exec_multi(&buf, 3, 0, &opts()), 1);
}

#[test]
fn column_predicates() {
    let mut prog = compiled(r"\%3ca");
    assert!(prog.exec_line(b"xxaxx", 0, false, &opts()));
    assert_eq!(prog.submatches().byte_range(0), Some((2, 3)));
    assert!(!prog.exec_line(b"axxxx", 1, false, &opts()));

    // virtual column: a tab advances to the next tab stop
    let mut prog = compiled(r"\%9vx");
    assert!(prog.exec_line(b"\tx", 0, false, &opts()));
}

#[test]
fn cursor_atom() {
    let mut buf = Buffer::new(&["abxcd"]);
    buf.set_cursor(Pos::new(1, 2));
    let mut prog = compiled(r"\%#x");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 1);
    assert_eq!(prog.submatches().byte_range(0), Some((2, 3)));

    buf.set_cursor(Pos::new(1, 3));
    let mut prog = compiled(r"\%#x");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 0);
}

#[test]
fn mark_atom() {
    let mut buf = Buffer::new(&["one", "two"]);
    buf.set_mark('m', Pos::new(2, 0));
    let mut prog = compiled(r"\%'mtwo");
    assert_eq!(prog.exec_multi(&buf, 2, 0, &opts()), 1);
    // before-mark variant
    let mut prog = compiled(r"\%<'mone");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 1);
}

#[test]
fn visual_atom() {
    let mut buf = Buffer::new(&["aabba"]);
    buf.set_visual(VisualMode::Char, Pos::new(1, 2), Pos::new(1, 3));
    let mut prog = compiled(r"\%Vb\+");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 1);
    assert_eq!(prog.submatches().byte_range(0), Some((2, 4)));
}

#[test]
fn z_captures_survive_for_reuse() {
    // \z(...\) captures are exported; \z1 matches against them in a later
    // search.
    let mut setter = compile(
        r"\z(\w\+\):",
        CompileFlags::MAGIC | CompileFlags::EXTMATCH_SET,
    )
    .unwrap();
    assert!(setter.exec_line(b"key: value", 0, false, &opts()));
    let z = setter.z_matches().unwrap().clone();
    assert_eq!(z[1].as_deref(), Some("key"));

    let mut user = compile(
        r"=\z1=",
        CompileFlags::MAGIC | CompileFlags::EXTMATCH_USE,
    )
    .unwrap();
    user.set_z_input(Some(z));
    assert!(user.exec_line(b"=key=", 0, false, &opts()));
    assert!(!user.exec_line(b"=other=", 0, false, &opts()));
}

#[test]
fn lookbehind_across_lines() {
    // The look-behind may scan back into the previous line once.
    let buf = Buffer::new(&["foo", "bar"]);
    let mut prog = compiled(r"foo\n\(oo\n\)\@<=bar");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 2);
    assert_eq!(
        prog.submatches().span(0),
        Some((Pos::new(1, 0), Pos::new(2, 3)))
    );
}

#[test]
fn chartab_controls_word_classes() {
    let mut buf = Buffer::new(&["foo-bar"]);
    let mut prog = compiled(r"\k\+");
    assert_eq!(prog.exec_multi(&buf, 1, 0, &opts()), 1);
    assert_eq!(prog.submatches().byte_range(0), Some((0, 3)));

    // make '-' a keyword char and the whole thing matches
    use vregex::chartab::CharBits;
    buf.chartab_mut().set(b'-', CharBits::KEYWORD);
    let mut prog = compiled(r"\k\+");
    prog.exec_multi(&buf, 1, 0, &opts());
    assert_eq!(prog.submatches().byte_range(0), Some((0, 7)));
}
