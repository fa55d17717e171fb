use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use snapshot::{DiffResult, NodeType, Typed, diff_array, diff_array_action};
use std::convert::Infallible;

const SMALL_RUN: usize = 64;
const LARGE_RUN: usize = 10_000;
const TYPES: [&str; 4] = ["view", "item", "card", "list"];

#[derive(Clone)]
struct Row {
    ty: NodeType,
}

impl Typed for Row {
    fn node_type(&self) -> &NodeType {
        &self.ty
    }
}

fn make_run(len: usize, shift: usize) -> Vec<Row> {
    (0..len)
        .map(|i| Row {
            ty: NodeType::template(TYPES[(i + shift) % TYPES.len()]),
        })
        .collect()
}

fn diff(before: &[Row], after: &[Row]) -> DiffResult<Row> {
    diff_array(before, after, |a, b| a.ty == b.ty, |_, _, _, _| {})
}

fn bench_diff_identical_small(c: &mut Criterion) {
    let before = make_run(SMALL_RUN, 0);
    c.bench_function("bench_diff_identical_small", |b| {
        b.iter(|| black_box(diff(black_box(&before), black_box(&before))));
    });
}

fn bench_diff_rotated_large(c: &mut Criterion) {
    let before = make_run(LARGE_RUN, 0);
    let after = make_run(LARGE_RUN, 1);
    c.bench_function("bench_diff_rotated_large", |b| {
        b.iter(|| black_box(diff(black_box(&before), black_box(&after))));
    });
}

fn bench_replay_rotated_large(c: &mut Criterion) {
    let before = make_run(LARGE_RUN, 0);
    let after = make_run(LARGE_RUN, 1);
    c.bench_function("bench_replay_rotated_large", |b| {
        b.iter_batched(
            || diff(&before, &after),
            |result| {
                let mut actions = 0usize;
                let placed = diff_array_action(&before, &result, |_| {
                    actions += 1;
                    Ok::<(), Infallible>(())
                });
                black_box((placed.map(|p| p.len()), actions))
            },
            BatchSize::LargeInput,
        );
    });
}

fn bench_diff_grow_large(c: &mut Criterion) {
    let before = make_run(LARGE_RUN / 2, 0);
    let after = make_run(LARGE_RUN, 0);
    c.bench_function("bench_diff_grow_large", |b| {
        b.iter(|| black_box(diff(black_box(&before), black_box(&after)).inserts.len()));
    });
}

criterion_group!(
    benches,
    bench_diff_identical_small,
    bench_diff_rotated_large,
    bench_replay_rotated_large,
    bench_diff_grow_large
);
criterion_main!(benches);
