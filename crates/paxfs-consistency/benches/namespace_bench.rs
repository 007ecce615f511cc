// Benchmarks for the namespace state machine
// Measures command apply throughput and snapshot encoding

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use paxfs_consistency::{NamespaceState, PaxosCommand};

fn populated(files: usize) -> NamespaceState {
    let mut state = NamespaceState::new();
    state
        .apply(
            1,
            &PaxosCommand::Create {
                path: "/bench".to_string(),
                is_dir: true,
            },
        )
        .unwrap();
    for i in 0..files {
        state
            .apply(
                i as u64 + 2,
                &PaxosCommand::Create {
                    path: format!("/bench/f{}", i),
                    is_dir: false,
                },
            )
            .unwrap();
    }
    state
}

fn bench_apply_update(c: &mut Criterion) {
    c.bench_function("apply_update", |b| {
        b.iter_batched(
            || populated(1),
            |mut state| {
                let update = PaxosCommand::Update {
                    path: "/bench/f0".to_string(),
                    expected_instance: 2,
                    content: vec![7u8; 512],
                };
                state.apply(black_box(3), black_box(&update)).unwrap()
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_precheck(c: &mut Criterion) {
    let state = populated(1000);
    let stale = PaxosCommand::AcquireLock {
        path: "/bench/f500".to_string(),
        expected_instance: 1,
        client_id: "client-A".to_string(),
    };

    c.bench_function("precheck_stale_acquire", |b| {
        b.iter(|| state.precheck(black_box(&stale)))
    });
}

fn bench_snapshot_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_encode");
    for files in [100, 1000, 10000] {
        let state = populated(files);
        group.bench_with_input(BenchmarkId::from_parameter(files), &state, |b, state| {
            b.iter(|| serde_json::to_vec(black_box(state)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_apply_update,
    bench_precheck,
    bench_snapshot_encode
);
criterion_main!(benches);
