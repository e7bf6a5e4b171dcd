use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use taskrunner::{BatchExecutor, QueueExecutor, SingleTaskExecutor};
use tokio::runtime::Runtime;

fn benchmark_single_task(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let executor = SingleTaskExecutor::new(|| async { Ok::<_, String>(42u64) })
        .with_retry_delay(Duration::ZERO);

    c.bench_function("single_task_success", |b| {
        b.iter(|| rt.block_on(async { black_box(executor.execute().await) }))
    });
}

fn benchmark_batch_execution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("batch_execute");

    for &(batch_size, concurrency) in &[(1, 1), (10, 3), (50, 8)] {
        let items: Vec<u64> = (0..1000).collect();
        let executor = BatchExecutor::new(|n: u64| async move { Ok::<_, String>(n * 2) }, items)
            .with_batch_size(batch_size)
            .with_concurrency(concurrency);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", batch_size, concurrency)),
            &executor,
            |b, executor| b.iter(|| rt.block_on(async { black_box(executor.execute().await) })),
        );
    }

    group.finish();
}

fn benchmark_queue_drain(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let executor = QueueExecutor::new(|n: u64| async move { Ok::<_, String>(n + 1) })
        .with_concurrency(4);

    c.bench_function("queue_drain_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                executor.reset();
                executor.add_all(0..1000);
                black_box(executor.execute().await)
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_single_task,
    benchmark_batch_execution,
    benchmark_queue_drain
);
criterion_main!(benches);
