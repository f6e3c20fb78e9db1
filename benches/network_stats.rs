//! Benchmarks for subgraph extraction and network statistics.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};

use cpd_timeslice::cancel::CancelToken;
use cpd_timeslice::checkpoint::{Checkpoint, build_month_list};
use cpd_timeslice::graph::BipartiteGraph;
use cpd_timeslice::graph::extract::{self, IncrementalExtractor};
use cpd_timeslice::graph::stats;
use cpd_timeslice::identifier::VertexIndex;
use cpd_timeslice::membership::{MembershipRow, MembershipTable};

const COMPOUNDS: usize = 20_000;
const PATENTS: usize = 5_000;
const EDGES: usize = 100_000;

fn random_graph() -> BipartiteGraph {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let edges: Vec<(usize, usize)> = (0..EDGES)
        .map(|_| {
            (
                rng.gen_range(0..COMPOUNDS),
                COMPOUNDS + rng.gen_range(0..PATENTS),
            )
        })
        .collect();
    BipartiteGraph::from_edges(
        (0..COMPOUNDS).map(|i| format!("C{i}")).collect(),
        (0..PATENTS).map(|i| format!("P{i}")).collect(),
        &edges,
    )
    .unwrap()
}

fn spread_membership(months: &[Checkpoint]) -> MembershipTable {
    MembershipTable::from_rows(
        (0..COMPOUNDS)
            .map(|i| MembershipRow {
                identifier: format!("C{i}"),
                first_seen: months[i % months.len()],
                vertex: VertexIndex::new(i),
            })
            .collect(),
    )
}

fn bench_stats(c: &mut Criterion) {
    let graph = random_graph();
    let cancel = CancelToken::new();

    c.bench_function("stats_25k_vertices_100k_edges", |bench| {
        bench.iter(|| black_box(stats::compute(&graph, &cancel).unwrap()))
    });
    c.bench_function("transitivity_25k_vertices", |bench| {
        bench.iter(|| black_box(stats::transitivity(graph.petgraph(), &cancel).unwrap()))
    });
}

fn bench_extraction(c: &mut Criterion) {
    let graph = random_graph();
    let months = build_month_list(2000, 2001).unwrap();
    let table = spread_membership(&months);
    let midpoint = months[months.len() / 2];

    c.bench_function("extract_single_checkpoint", |bench| {
        bench.iter(|| black_box(extract::extract(&graph, midpoint, &table).unwrap()))
    });
    c.bench_function("extract_24_checkpoints_incremental", |bench| {
        bench.iter(|| {
            let mut extractor = IncrementalExtractor::new(&graph, &table);
            for &month in &months {
                black_box(extractor.advance(month).unwrap());
            }
        })
    });
}

criterion_group!(benches, bench_stats, bench_extraction);
criterion_main!(benches);
