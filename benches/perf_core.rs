use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stepdiff::diff;
use stepdiff::grouping::heuristics;

fn synthetic_diff(file_count: usize, hunks_per_file: usize) -> String {
    let mut text = String::with_capacity(file_count * 160);
    for i in 0..file_count {
        let path = format!("feature_{:03}/file_{:05}.rs", i % 120, i);
        text.push_str(&format!(
            "diff --git a/{p} b/{p}\n--- a/{p}\n+++ b/{p}\n",
            p = path
        ));
        for h in 0..hunks_per_file {
            text.push_str(&format!(
                "@@ -{s},3 +{s},4 @@ fn handler() {{\n context\n+added line {h}\n context\n",
                s = h * 20 + 1
            ));
        }
    }
    text
}

fn bench_parse(c: &mut Criterion) {
    let diff_text = synthetic_diff(2_000, 3);
    c.bench_function("parse_2k_files", |b| {
        b.iter(|| black_box(diff::parse(black_box(&diff_text))));
    });
}

fn bench_heuristic_plan(c: &mut Criterion) {
    let index = diff::parse(&synthetic_diff(2_000, 3));
    c.bench_function("heuristic_plan_2k_files", |b| {
        b.iter(|| {
            let plan = heuristics::build_review_plan(black_box(&index), None).unwrap();
            black_box(plan);
        });
    });
}

criterion_group!(benches, bench_parse, bench_heuristic_plan);
criterion_main!(benches);
