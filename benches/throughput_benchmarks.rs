use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rask_batch_buffer::{Buffer, flush_fn};
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

const TIMEOUT: Duration = Duration::from_secs(5);

fn bench_push_only(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create Tokio runtime for benchmark");
    let mut group = c.benchmark_group("push_only");

    for &size in [1_000usize, 10_000].iter() {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    // Large enough that no capacity flush happens while pushing.
                    let buffer = Buffer::<u64>::builder()
                        .flusher(flush_fn(|items: &[u64]| {
                            black_box(items.len());
                        }))
                        .capacity(size + 1)
                        .push_timeout(TIMEOUT)
                        .close_timeout(TIMEOUT)
                        .build()
                        .expect("Failed to build buffer for benchmark");

                    for i in 0..size as u64 {
                        buffer
                            .push(black_box(i))
                            .await
                            .expect("Failed to push item in benchmark");
                    }
                    buffer.close().await.expect("Failed to close buffer in benchmark");
                });
            });
        });
    }
    group.finish();
}

fn bench_push_and_flush(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create Tokio runtime for benchmark");
    let mut group = c.benchmark_group("push_and_flush");
    let items = 10_000usize;

    for &capacity in [10usize, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(items as u64));
        group.bench_with_input(
            BenchmarkId::new("capacity", capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    rt.block_on(async {
                        let buffer = Buffer::<u64>::builder()
                            .flusher(flush_fn(|items: &[u64]| {
                                black_box(items.iter().sum::<u64>());
                            }))
                            .capacity(capacity)
                            .push_timeout(TIMEOUT)
                            .close_timeout(TIMEOUT)
                            .build()
                            .expect("Failed to build buffer for benchmark");

                        for i in 0..items as u64 {
                            buffer
                                .push(black_box(i))
                                .await
                                .expect("Failed to push item in benchmark");
                        }
                        buffer.close().await.expect("Failed to close buffer in benchmark");
                    });
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_push_only, bench_push_and_flush);
criterion_main!(benches);
