// ABOUTME: Benchmarks routing predicate compilation and evaluation
// ABOUTME: Measures leaf matching, nested logical trees and tag scans against typical requests

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use smsgw::SendSmsRequest;
use smsgw::routing::{Condition, Predicate, Subject, compile, compile_conditions};
use std::time::Duration;

fn mozambique_rule() -> Predicate {
    Predicate::any(vec![
        Predicate::leaf(Subject::Destination).pattern(r"^\+25884"),
        Predicate::all(vec![
            Predicate::leaf(Subject::Tag).equal_to("transaction"),
            Predicate::leaf(Subject::Content).min_length(1).max_length(160),
            Predicate::leaf(Subject::Source).pattern("^(BANK|SHOP)$"),
        ]),
    ])
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    group.measurement_time(Duration::from_secs(5));

    let rule = mozambique_rule();
    group.bench_function("nested_rule", |b| b.iter(|| compile(black_box(&rule))));

    let conditions: Vec<Condition> = (0..10)
        .map(|i| Condition::new(format!("rule-{i}"), "c1", mozambique_rule()))
        .collect();
    group.bench_function("ten_conditions", |b| {
        b.iter(|| compile_conditions("c1", black_box(&conditions)))
    });

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.measurement_time(Duration::from_secs(5));

    let compiled = compile(&mozambique_rule()).unwrap();

    let by_destination = SendSmsRequest::new("r1", "+258841234567", "GATEWAY", "Hello");
    group.bench_function("destination_hit", |b| {
        b.iter(|| compiled.matches(black_box(&by_destination.match_context())))
    });

    let by_tags = SendSmsRequest::new("r2", "+27821234567", "BANK", "Debit of 100 MZN")
        .with_tags(["banking", "alerts", "transaction"]);
    group.bench_function("tag_branch", |b| {
        b.iter(|| compiled.matches(black_box(&by_tags.match_context())))
    });

    let miss = SendSmsRequest::new("r3", "+27821234567", "OTHER", "Hello");
    group.bench_function("miss", |b| {
        b.iter(|| compiled.matches(black_box(&miss.match_context())))
    });

    group.finish();
}

fn bench_tag_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag_counts");
    group.measurement_time(Duration::from_secs(5));

    let compiled = compile(&Predicate::leaf(Subject::Tag).equal_to("transaction")).unwrap();
    for count in [1usize, 8, 64] {
        let mut tags: Vec<String> = (0..count - 1).map(|i| format!("tag-{i}")).collect();
        tags.push("transaction".to_string());
        let request = SendSmsRequest::new("r", "+1", "S", "x").with_tags(tags);

        group.bench_with_input(BenchmarkId::from_parameter(count), &request, |b, request| {
            b.iter(|| compiled.matches(black_box(&request.match_context())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_evaluate, bench_tag_counts);
criterion_main!(benches);
