use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::error::Error;
use std::fmt;
use std::future::{ready, Ready};
use std::time::Duration;
use swarm_breaker::{CircuitBreaker, IntentClassifier, JoualBee};
use tokio::runtime::Runtime;

#[derive(Debug)]
struct BenchError(String);

impl BenchError {
    fn new(msg: &str) -> Self {
        BenchError(msg.to_string())
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Benchmark error: {}", self.0)
    }
}

impl Error for BenchError {}

fn successful_operation() -> Ready<Result<(), BenchError>> {
    ready(Ok(()))
}

fn failing_operation() -> Ready<Result<(), BenchError>> {
    ready(Err(BenchError::new("Simulated failure")))
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_circuit_breaker_closed(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::builder("bench")
        .failure_threshold(5)
        .reset_timeout(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_closed_success", |b| {
        b.iter(|| rt.block_on(async { black_box(breaker.call(successful_operation).await) }));
    });
}

fn bench_circuit_breaker_open_fallback(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::builder("bench")
        .reset_timeout(Duration::from_secs(3600))
        .build();
    breaker.force_open();

    c.bench_function("circuit_breaker_open_fallback", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    breaker
                        .call_with_fallback(failing_operation, successful_operation)
                        .await,
                )
            })
        });
    });
}

fn bench_circuit_breaker_transition(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::builder("bench")
        .failure_threshold(5)
        .reset_timeout(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_transition", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();

            rt.block_on(async {
                for _ in 0..iters {
                    breaker.reset();

                    // Trip the breaker, then one open-circuit rejection
                    for _ in 0..5 {
                        let _ = black_box(breaker.call(failing_operation).await);
                    }
                    let _ = black_box(breaker.call(successful_operation).await);
                }
            });

            start.elapsed()
        });
    });
}

fn bench_circuit_breaker_concurrent(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::builder("bench")
        .failure_threshold(100)
        .reset_timeout(Duration::from_secs(30))
        .build();

    const TASK_COUNT: usize = 4;
    const ITERATIONS_PER_TASK: usize = 1000;

    c.bench_function("circuit_breaker_concurrent", |b| {
        b.iter(|| {
            rt.block_on(async {
                let handles: Vec<_> = (0..TASK_COUNT)
                    .map(|_| {
                        let task_breaker = breaker.clone();
                        tokio::spawn(async move {
                            for _ in 0..ITERATIONS_PER_TASK {
                                let _ = black_box(task_breaker.call(successful_operation).await);
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.await.unwrap();
                }
            })
        });
    });
}

fn bench_local_fallback(c: &mut Criterion) {
    let bee = JoualBee::with_seed(42);
    let classifier = IntentClassifier::default();

    c.bench_function("joual_bee_generate_response", |b| {
        b.iter(|| black_box(bee.generate_response(black_box("Yo, c'est quoi la meilleure poutine?"))));
    });

    c.bench_function("intent_classify", |b| {
        b.iter(|| black_box(classifier.classify(black_box("Comment va mon compte de sécurité?"))));
    });
}

criterion_group!(
    benches,
    bench_circuit_breaker_closed,
    bench_circuit_breaker_open_fallback,
    bench_circuit_breaker_transition,
    bench_circuit_breaker_concurrent,
    bench_local_fallback
);
criterion_main!(benches);
