// Benchmark suite for the document core.
//
// Covers the editing patterns that stress different tree paths:
// - sequential typing (in-place block extension, no minting)
// - random-position inserts (splits and fresh identifiers)
// - random deletes (node carving and physical removal)
// - remote replay (identifier-addressed merge on a second replica)

use criterion::{
    BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use logoot_split::{Doc, RemoteOp};

// =============================================================================
// Workloads
// =============================================================================

/// Forward typing: every insert lands at the end of the document.
fn sequential_typing(doc: &mut Doc, count: usize) {
    for i in 0..count {
        let pos = doc.len();
        doc.insert_local(pos, if i % 5 == 4 { " " } else { "a" });
    }
}

/// Inserts at random positions, forcing splits and deep identifiers.
fn random_inserts(doc: &mut Doc, count: usize, rng: &mut StdRng) {
    for _ in 0..count {
        let len = doc.len();
        let pos = if len == 0 { 0 } else { rng.gen_range(0..=len) };
        doc.insert_local(pos, "x");
    }
}

/// Random single-character deletes until the document drains.
fn random_deletes(doc: &mut Doc, rng: &mut StdRng) {
    while doc.len() > 0 {
        let pos = rng.gen_range(0..doc.len());
        doc.delete_local(pos, pos);
    }
}

/// Record one editing session as broadcastable ops.
fn record_session(chars: usize, seed: u64) -> Vec<RemoteOp> {
    let mut doc = Doc::with_seed(1, seed);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ops = Vec::new();
    for _ in 0..chars {
        let len = doc.len();
        if len > 8 && rng.gen_bool(0.3) {
            let pos = rng.gen_range(0..len);
            ops.push(RemoteOp::Delete(doc.delete_local(pos, pos)));
        } else {
            let pos = if len == 0 { 0 } else { rng.gen_range(0..=len) };
            ops.push(RemoteOp::Insert(doc.insert_local(pos, "ab")));
        }
    }
    return ops;
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_local_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_edits");
    for size in [100usize, 1000, 5000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("sequential_typing", size), &size, |b, &n| {
            b.iter(|| {
                let mut doc = Doc::with_seed(1, 42);
                sequential_typing(&mut doc, n);
                black_box(doc.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("random_inserts", size), &size, |b, &n| {
            b.iter(|| {
                let mut doc = Doc::with_seed(1, 42);
                let mut rng = StdRng::seed_from_u64(7);
                random_inserts(&mut doc, n, &mut rng);
                black_box(doc.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("random_deletes", size), &size, |b, &n| {
            b.iter(|| {
                let mut doc = Doc::with_seed(1, 42);
                let mut rng = StdRng::seed_from_u64(7);
                random_inserts(&mut doc, n, &mut rng);
                random_deletes(&mut doc, &mut rng);
                black_box(doc.len())
            });
        });
    }
    group.finish();
}

fn bench_remote_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_replay");
    for size in [100usize, 1000, 5000] {
        let session = record_session(size, 42);
        group.throughput(Throughput::Elements(session.len() as u64));

        group.bench_with_input(
            BenchmarkId::new("in_order", size),
            &session,
            |b, session| {
                b.iter(|| {
                    let mut doc = Doc::with_seed(2, 9);
                    for op in session {
                        op.apply(&mut doc);
                    }
                    black_box(doc.digest())
                });
            },
        );

        let mut reversed = session.clone();
        reversed.reverse();
        group.bench_with_input(
            BenchmarkId::new("reversed", size),
            &reversed,
            |b, session| {
                b.iter(|| {
                    let mut doc = Doc::with_seed(2, 9);
                    for op in session {
                        op.apply(&mut doc);
                    }
                    black_box(doc.digest())
                });
            },
        );
    }
    group.finish();
}

fn bench_digest(c: &mut Criterion) {
    let mut doc = Doc::with_seed(1, 42);
    let mut rng = StdRng::seed_from_u64(7);
    random_inserts(&mut doc, 5000, &mut rng);

    c.bench_function("digest_5000", |b| {
        b.iter(|| black_box(doc.digest()));
    });
}

criterion_group!(benches, bench_local_edits, bench_remote_replay, bench_digest);
criterion_main!(benches);
