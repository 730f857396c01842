//! 排序引擎性能基准测试
//!
//! 分别测量单条件评估与完整排序在不同规模下的开销。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rule_ranker::{
    Candidate, Condition, ConditionEvaluator, FieldValue, Operator, RankingEngine, Record, Rule,
    Scope,
};
use std::hint::black_box;

const GENRES: [&str; 6] = ["Action", "Drama", "Comedy", "Fantasy", "Mystery", "Romance"];
const SOURCES: [&str; 3] = ["Manga", "Original", "Light novel"];

fn create_candidates(count: i64) -> Vec<Candidate> {
    (0..count)
        .map(|i| {
            let idx = i as usize;
            Candidate::new(i, format!("anime-{}", i))
                .with_field("source", SOURCES[idx % SOURCES.len()])
                .with_field("score", 5.0 + (i % 50) as f64 / 10.0)
                .with_field("episodes", i % 100)
                .with_field(
                    "genres",
                    FieldValue::set([GENRES[idx % GENRES.len()], GENRES[(idx + 2) % GENRES.len()]]),
                )
        })
        .collect()
}

fn create_rules(count: usize) -> Vec<Rule> {
    (0..count)
        .map(|i| {
            Rule::new(
                i as i64,
                vec![
                    Condition::numeric(Scope::Subject, "rewatched", Operator::Gte, 0.0).unwrap(),
                    Condition::text(
                        Scope::Candidate,
                        "genres",
                        Operator::Eq,
                        GENRES[i % GENRES.len()],
                    )
                    .unwrap(),
                    Condition::numeric(Scope::Candidate, "score", Operator::Gte, 7.0).unwrap(),
                ],
            )
        })
        .collect()
}

/// 单条件评估基准
fn bench_condition_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("condition_evaluation");
    let evaluator = ConditionEvaluator::default();
    let record = Record::new()
        .with("score", 8.5)
        .with("episodes", "24")
        .with("source", "Manga")
        .with("genres", FieldValue::set(GENRES));

    let cases = [
        (
            "numeric_gte",
            Condition::numeric(Scope::Candidate, "score", Operator::Gte, 8.0).unwrap(),
        ),
        (
            "numeric_coerced",
            Condition::numeric(Scope::Candidate, "episodes", Operator::Lt, 30.0).unwrap(),
        ),
        (
            "text_eq",
            Condition::text(Scope::Candidate, "source", Operator::Eq, "Manga").unwrap(),
        ),
        (
            "set_membership",
            Condition::text(Scope::Candidate, "genres", Operator::Eq, "Mystery").unwrap(),
        ),
        (
            "set_neq",
            Condition::text(Scope::Candidate, "genres", Operator::Neq, "Horror").unwrap(),
        ),
    ];

    for (name, condition) in &cases {
        group.bench_function(*name, |b| {
            b.iter(|| evaluator.evaluate(black_box(condition), black_box(&record)))
        });
    }

    group.finish();
}

/// 完整排序基准（规则数 × 候选数）
fn bench_ranking(c: &mut Criterion) {
    let mut group = c.benchmark_group("ranking");
    let engine = RankingEngine::default();
    let subject = Record::new().with("rewatched", 1_i64);

    for (rules, candidates) in [(10, 100), (100, 1_000), (500, 5_000)] {
        let rule_set = create_rules(rules);
        let candidate_set = create_candidates(candidates);

        group.bench_with_input(
            BenchmarkId::new("rules_x_candidates", format!("{}x{}", rules, candidates)),
            &(rule_set, candidate_set),
            |b, (rule_set, candidate_set)| {
                b.iter(|| {
                    engine.rank(
                        black_box(rule_set.as_slice()),
                        &subject,
                        black_box(candidate_set),
                    )
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_condition_evaluation, bench_ranking);
criterion_main!(benches);
