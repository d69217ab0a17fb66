use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use vregex::fuzzy::{fuzzy_match, match_fuzzy, FuzzyOptions};
use vregex::{compile, CompileFlags, MatchOptions};

fn bench_fuzzy(c: &mut Criterion) {
    let candidates: Vec<String> = (0..200)
        .map(|i| format!("src/module_{i}/some_file_name_{i}.rs"))
        .collect();
    let refs: Vec<&str> = candidates.iter().map(|s| s.as_str()).collect();

    c.bench_function("fuzzy_match_hit", |b| {
        b.iter(|| {
            fuzzy_match(
                black_box("src/module_42/some_file_name_42.rs"),
                black_box("mod42"),
                false,
            )
        })
    });

    c.bench_function("match_fuzzy_200", |b| {
        let opts = FuzzyOptions::default();
        b.iter(|| match_fuzzy(black_box(&refs), black_box("sfn19"), &opts))
    });
}

fn bench_regex(c: &mut Criterion) {
    let line = "the quick brown fox jumps over the lazy dog".repeat(20);

    c.bench_function("compile_alt", |b| {
        b.iter(|| compile(black_box(r"\(foo\|bar\)\+baz"), CompileFlags::MAGIC))
    });

    c.bench_function("find_literal", |b| {
        let mut prog = compile("lazy dog", CompileFlags::MAGIC).unwrap();
        let opts = MatchOptions::default();
        b.iter(|| prog.exec_line(black_box(line.as_bytes()), 0, false, &opts))
    });

    c.bench_function("find_backref", |b| {
        let mut prog =
            compile(r"\(\w\+\) \1", CompileFlags::MAGIC).unwrap();
        let opts = MatchOptions::default();
        b.iter(|| prog.exec_line(black_box(line.as_bytes()), 0, false, &opts))
    });
}

criterion_group!(benches, bench_fuzzy, bench_regex);
criterion_main!(benches);
