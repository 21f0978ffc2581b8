use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;
use ranktree::{Database, LocalStore, RankConfig, RankEngine, ScoreByRankOptions, Topology};
use tokio::runtime::Runtime;

const MAX_SCORE: i64 = 1_000_000;

/// Helper to build an engine holding `count` random scores
fn populated_engine(rt: &Runtime, branch_factor: u32, count: usize) -> RankEngine<LocalStore> {
    let engine = Database::in_memory()
        .rank_engine(RankConfig::new(1, MAX_SCORE, branch_factor).with_skip_transaction(true))
        .unwrap();
    let mut rng = rand::thread_rng();

    rt.block_on(async {
        for _ in 0..count {
            engine.add_score(rng.gen_range(1..=MAX_SCORE)).await.unwrap();
        }
    });
    engine
}

/// Benchmark topology derivation alone
fn bench_topology(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology");

    for branch_factor in [10u32, 100, 1000].iter() {
        let topology = Topology::new(&RankConfig::new(1, MAX_SCORE, *branch_factor)).unwrap();
        group.bench_with_input(BenchmarkId::new("chain", branch_factor), branch_factor, |b, _| {
            b.iter(|| topology.chain(black_box(654_321)));
        });
        group.bench_with_input(BenchmarkId::new("rank_chain", branch_factor), branch_factor, |b, _| {
            b.iter(|| topology.rank_chain(black_box(654_321)));
        });
    }
    group.finish();
}

/// Benchmark score insertion, with and without transactions
fn bench_add_score(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("add_score");

    for skip_transaction in [false, true] {
        let engine = Database::in_memory()
            .rank_engine(RankConfig::new(1, MAX_SCORE, 100).with_skip_transaction(skip_transaction))
            .unwrap();
        let mut rng = rand::thread_rng();

        let name = if skip_transaction { "direct" } else { "transactional" };
        group.bench_function(name, |b| {
            b.iter(|| {
                rt.block_on(engine.add_score(rng.gen_range(1..=MAX_SCORE))).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark both lookup directions against a populated leaderboard
fn bench_lookups(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("lookups");

    for branch_factor in [10u32, 100].iter() {
        let engine = populated_engine(&rt, *branch_factor, 10_000);
        let mut rng = rand::thread_rng();

        group.bench_with_input(BenchmarkId::new("rank_by_score", branch_factor), branch_factor, |b, _| {
            b.iter(|| rt.block_on(engine.get_rank_by_score(rng.gen_range(1..=MAX_SCORE))).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("score_by_rank", branch_factor), branch_factor, |b, _| {
            b.iter(|| {
                rt.block_on(engine.get_score_by_rank(rng.gen_range(1..=10_000), ScoreByRankOptions::default()))
                    .unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("score_by_rank_highest", branch_factor), branch_factor, |b, _| {
            b.iter(|| {
                rt.block_on(engine.get_score_by_rank(rng.gen_range(1..=10_000), ScoreByRankOptions::highest()))
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_topology, bench_add_score, bench_lookups);
criterion_main!(benches);
