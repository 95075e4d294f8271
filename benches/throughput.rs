use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use travelguard_rs::{CircuitBreaker, GuardedCall, RateLimiter};

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

fn successful_operation() -> Result<(), BenchError> {
    Ok(())
}

fn failing_operation() -> Result<(), BenchError> {
    Err(BenchError::new("Simulated failure"))
}

fn bench_circuit_breaker_closed(c: &mut Criterion) {
    let breaker = CircuitBreaker::builder("bench")
        .failure_rate_threshold(50.0)
        .wait_duration_in_open_state(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_closed_success", |b| {
        b.iter(|| black_box(breaker.call(successful_operation)));
    });
}

fn bench_circuit_breaker_transition(c: &mut Criterion) {
    let breaker = CircuitBreaker::builder("bench")
        .failure_rate_threshold(50.0)
        .sliding_window_size(5)
        .minimum_sample_size(5)
        .wait_duration_in_open_state(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_transition", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();

            for _ in 0..iters {
                breaker.force_closed();

                // Five failures fill the window and trip the breaker
                for _ in 0..5 {
                    let _ = black_box(breaker.call(failing_operation));
                }

                // One open-circuit rejection
                let _ = black_box(breaker.call(successful_operation));
            }

            start.elapsed()
        });
    });
}

fn bench_circuit_breaker_concurrent(c: &mut Criterion) {
    let breaker = CircuitBreaker::builder("bench")
        .failure_rate_threshold(50.0)
        .wait_duration_in_open_state(Duration::from_secs(30))
        .build();

    const THREAD_COUNT: usize = 4;
    const ITERATIONS_PER_THREAD: usize = 1000;

    c.bench_function("circuit_breaker_concurrent", |b| {
        b.iter(|| {
            let barrier = Arc::new(Barrier::new(THREAD_COUNT + 1));
            let mut handles = Vec::with_capacity(THREAD_COUNT);

            for _ in 0..THREAD_COUNT {
                let thread_breaker = breaker.clone();
                let thread_barrier = Arc::clone(&barrier);

                handles.push(thread::spawn(move || {
                    thread_barrier.wait();
                    for _ in 0..ITERATIONS_PER_THREAD {
                        let _ = black_box(thread_breaker.call(successful_operation));
                    }
                }));
            }

            // Start all threads simultaneously
            barrier.wait();

            for handle in handles {
                handle.join().unwrap();
            }
        });
    });
}

fn bench_rate_limiter(c: &mut Criterion) {
    let limiter = RateLimiter::builder("bench")
        .capacity(u32::MAX)
        .refresh_period(Duration::from_secs(3600))
        .build();

    c.bench_function("rate_limiter_try_acquire", |b| {
        b.iter(|| black_box(limiter.try_acquire()));
    });

    let exhausted = RateLimiter::builder("bench-exhausted")
        .capacity(1)
        .refresh_period(Duration::from_secs(3600))
        .build();
    exhausted.try_acquire();

    c.bench_function("rate_limiter_rejection", |b| {
        b.iter(|| black_box(exhausted.try_acquire()));
    });
}

fn bench_guarded_call(c: &mut Criterion) {
    let inline = GuardedCall::new("bench").breaker(CircuitBreaker::builder("bench").build());

    c.bench_function("guarded_call_inline", |b| {
        b.iter(|| black_box(inline.execute(|| Ok::<_, BenchError>(1u32), |_| 0)));
    });

    let timed = inline.clone().timeout(Duration::from_secs(1));

    c.bench_function("guarded_call_with_timeout", |b| {
        b.iter(|| black_box(timed.execute(|| Ok::<_, BenchError>(1u32), |_| 0)));
    });
}

criterion_group!(
    benches,
    bench_circuit_breaker_closed,
    bench_circuit_breaker_transition,
    bench_circuit_breaker_concurrent,
    bench_rate_limiter,
    bench_guarded_call
);
criterion_main!(benches);
