//! Benchmark: propagation through cells, memos, and node fields

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lattice_store::reactive::{Cell, Memo, Observer, Tracker};
use lattice_store::store::{InitialValues, ModelBuilder, ValueKind};
use lattice_store::Store;

// One cell feeding `width` memos, all read by a single observer
fn benchmark_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [8usize, 64, 512] {
        let tracker = Tracker::new();
        let base = Cell::new(&tracker, 0i64);
        let memos: Vec<Memo<i64>> = (0..width)
            .map(|offset| {
                let source = base.clone();
                Memo::new(&tracker, move |cx| source.read(Some(cx)) + offset as i64)
            })
            .collect();

        let runs = Arc::new(AtomicUsize::new(0));
        let (readers, counter) = (memos.clone(), runs.clone());
        let _observer = Observer::new(&tracker, move |cx| {
            let sum: i64 = readers.iter().map(|memo| memo.read(Some(cx))).sum();
            black_box(sum);
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                next += 1;
                base.write(next);
            });
        });
    }
    group.finish();
}

// `fields` writes to one node, batched versus one flush per write
fn benchmark_batched_writes(c: &mut Criterion) {
    let store = Store::new();
    let mut model = ModelBuilder::new("Sample");
    for field in 0..16 {
        model = model.required_with_default(format!("f{field}"), 0);
    }
    let repo = store.repository(model.build().unwrap()).unwrap();
    let node = repo.create(InitialValues::new()).unwrap();

    let reader = node.clone();
    let _observer = Observer::new(store.tracker(), move |cx| {
        for field in 0..16 {
            black_box(reader.read(&format!("f{field}"), Some(cx)).unwrap());
        }
    });

    let mut next = 0i64;
    c.bench_function("node_writes_unbatched", |b| {
        b.iter(|| {
            next += 1;
            for field in 0..16 {
                node.set(&format!("f{field}"), next).unwrap();
            }
        });
    });

    c.bench_function("node_writes_batched", |b| {
        b.iter(|| {
            next += 1;
            store.batch(|| {
                for field in 0..16 {
                    node.set(&format!("f{field}"), next).unwrap();
                }
            });
        });
    });
}

fn benchmark_create_delete(c: &mut Criterion) {
    let store = Store::new();
    let repo = store
        .repository(
            ModelBuilder::new("Item")
                .required("title", ValueKind::Text)
                .optional("description", ValueKind::Text)
                .required_with_default("completed", false)
                .build()
                .unwrap(),
        )
        .unwrap();

    c.bench_function("create_delete", |b| {
        b.iter(|| {
            let node = repo.create(InitialValues::new().with("title", "x")).unwrap();
            black_box(repo.delete(&node).unwrap());
        });
    });
}

criterion_group!(
    benches,
    benchmark_fan_out,
    benchmark_batched_writes,
    benchmark_create_delete
);
criterion_main!(benches);
