//! # Story Benchmarks
//!
//! Performance benchmarks for plotline-core story operations.
//!
//! Run with: `cargo bench -p plotline-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use plotline_core::{Graph, NarrativeEngine, canonical_checksum, export, normalize, validate};
use serde_json::{Value as Json, json};
use std::hint::black_box;

/// A linear legacy-dialect story of N branches, each linking to the next.
fn linear_story(size: usize) -> Json {
    let branches: Vec<Json> = (0..size)
        .map(|i| {
            let option = if i + 1 < size {
                json!({
                    "option_id": "next",
                    "option_text": "Continue",
                    "target_branch_id": format!("b{}", i + 1),
                    "condition": "steps >= 0 && !lost",
                    "status_changes": [{ "attribute": "steps", "operation": "+", "value": 1 }]
                })
            } else {
                json!({ "option_id": "end", "option_text": "The end", "end_game": true })
            };
            json!({
                "branch_id": format!("b{i}"),
                "branch_title": format!("Chapter {i}"),
                "content": "Text.",
                "options": [option]
            })
        })
        .collect();
    json!({ "title": "Bench", "branches": branches })
}

fn linear_graph(size: usize) -> Graph {
    normalize(&linear_story(size)).expect("normalize")
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for size in [100, 1000, 10000].iter() {
        let doc = linear_story(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &doc, |b, doc| {
            b.iter(|| black_box(normalize(doc)));
        });
    }

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");

    for size in [100, 1000, 10000].iter() {
        let graph = linear_graph(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &graph, |b, graph| {
            b.iter(|| black_box(validate(graph)));
        });
    }

    group.finish();
}

fn bench_play_through(c: &mut Criterion) {
    let mut group = c.benchmark_group("play_through");

    for size in [100, 500, 1000].iter() {
        let graph = linear_graph(*size);
        let mut path = vec!["next"; size - 1];
        path.push("end");

        group.bench_with_input(BenchmarkId::from_parameter(size), &path, |b, path| {
            let engine = NarrativeEngine::new(&graph);
            b.iter(|| black_box(engine.play(path)));
        });
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for size in [100, 500].iter() {
        let graph = linear_graph(*size);
        let engine = NarrativeEngine::new(&graph);
        let path = vec!["next"; size - 1];
        let state = engine.play(&path).expect("play").state;

        group.bench_with_input(BenchmarkId::from_parameter(size), &state, |b, state| {
            b.iter(|| black_box(engine.replay(state)));
        });
    }

    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");

    for size in [100, 1000].iter() {
        let graph = linear_graph(*size);
        group.bench_with_input(BenchmarkId::new("json", size), &graph, |b, graph| {
            b.iter(|| black_box(export(graph)));
        });
        group.bench_with_input(BenchmarkId::new("checksum", size), &graph, |b, graph| {
            b.iter(|| black_box(canonical_checksum(graph)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_normalize,
    bench_validate,
    bench_play_through,
    bench_replay,
    bench_export,
);

criterion_main!(benches);
