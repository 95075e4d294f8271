use parking_lot::Mutex;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use travelguard_rs::{BreakerError, BreakerEvent, CallOutcome, CircuitBreaker, ManualClock, State};

// Custom error type that implements Error trait
#[derive(Debug)]
struct TestError(String);

impl TestError {
    fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test error: {}", self.0)
    }
}

impl Error for TestError {}

const COOLDOWN: Duration = Duration::from_secs(10);

fn breaker_with(clock: &Arc<ManualClock>, half_open_calls: u32) -> CircuitBreaker {
    CircuitBreaker::builder("test")
        .failure_rate_threshold(50.0)
        .sliding_window_size(4)
        .minimum_sample_size(4)
        .wait_duration_in_open_state(COOLDOWN)
        .half_open_permitted_calls(half_open_calls)
        .clock(Arc::clone(clock))
        .build()
}

fn trip(breaker: &CircuitBreaker) {
    for _ in 0..4 {
        assert!(breaker.permit());
        breaker.record_outcome(CallOutcome::failure(Duration::ZERO));
    }
    assert_eq!(breaker.current_state(), State::Open);
}

#[test]
fn test_circuit_breaker_stays_closed_below_minimum_sample() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);

    for _ in 0..3 {
        assert!(breaker.permit());
        breaker.record_outcome(CallOutcome::failure(Duration::ZERO));
    }

    // 100% failures, but only 3 of the 4 required samples.
    assert_eq!(breaker.current_state(), State::Closed);
    assert_eq!(breaker.snapshot().failed_calls, 3);
}

#[test]
fn test_circuit_breaker_opens_at_failure_threshold() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);

    let outcomes = [
        CallOutcome::success(Duration::ZERO),
        CallOutcome::failure(Duration::ZERO),
        CallOutcome::success(Duration::ZERO),
    ];
    for outcome in outcomes {
        assert!(breaker.permit());
        breaker.record_outcome(outcome);
        assert_eq!(breaker.current_state(), State::Closed);
    }

    assert!(breaker.permit());
    breaker.record_outcome(CallOutcome::failure(Duration::ZERO));
    assert_eq!(breaker.current_state(), State::Open);
}

#[test]
fn test_open_circuit_rejects_without_recording() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);
    trip(&breaker);

    let before = breaker.snapshot();
    clock.advance(COOLDOWN - Duration::from_millis(1));
    for _ in 0..10 {
        assert!(!breaker.permit());
    }

    assert_eq!(breaker.snapshot(), before);
    assert_eq!(breaker.current_state(), State::Open);
}

#[test]
fn test_half_open_admits_limited_trial_calls() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);
    trip(&breaker);

    clock.advance(COOLDOWN);
    assert!(breaker.permit());
    assert_eq!(breaker.current_state(), State::HalfOpen);
    assert!(breaker.permit());
    assert!(!breaker.permit());
    assert!(!breaker.permit());
}

#[test]
fn test_half_open_recovers_to_closed() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);
    trip(&breaker);

    clock.advance(COOLDOWN);
    assert!(breaker.permit());
    assert!(breaker.permit());
    breaker.record_outcome(CallOutcome::success(Duration::ZERO));
    assert_eq!(breaker.current_state(), State::HalfOpen);
    breaker.record_outcome(CallOutcome::success(Duration::ZERO));

    assert_eq!(breaker.current_state(), State::Closed);
    assert_eq!(breaker.snapshot().total_calls, 0);
}

#[test]
fn test_circuit_breaker_half_open_failure() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);
    trip(&breaker);

    clock.advance(COOLDOWN);
    assert!(breaker.permit());
    assert!(breaker.permit());
    breaker.record_outcome(CallOutcome::success(Duration::ZERO));
    breaker.record_outcome(CallOutcome::failure(Duration::ZERO));
    assert_eq!(breaker.current_state(), State::Open);

    // The cooldown restarts from the failed trial.
    clock.advance(COOLDOWN / 2);
    assert!(!breaker.permit());
    clock.advance(COOLDOWN / 2);
    assert!(breaker.permit());
    assert_eq!(breaker.current_state(), State::HalfOpen);
}

#[test]
fn test_late_outcome_while_open_is_ignored() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);

    // Admitted while closed, completes after the trip.
    assert!(breaker.permit());
    trip(&breaker);
    let before = breaker.snapshot();
    breaker.record_outcome(CallOutcome::success(Duration::ZERO));

    assert_eq!(breaker.snapshot(), before);
    assert_eq!(breaker.current_state(), State::Open);
}

#[test]
fn test_calls_admitted_before_trip_are_not_trials() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);

    // Two slow calls admitted while closed, still in flight.
    let stale_first = breaker.try_permit().unwrap();
    let stale_second = breaker.try_permit().unwrap();
    trip(&breaker);

    clock.advance(COOLDOWN);
    let trial = breaker.try_permit().unwrap();
    assert_eq!(breaker.current_state(), State::HalfOpen);

    breaker.record_permitted(stale_first, CallOutcome::success(Duration::ZERO));
    breaker.record_permitted(stale_second, CallOutcome::success(Duration::ZERO));
    assert_eq!(breaker.current_state(), State::HalfOpen);
    assert_eq!(breaker.snapshot().total_calls, 0);

    // Only the real trials decide.
    let second_trial = breaker.try_permit().unwrap();
    breaker.record_permitted(trial, CallOutcome::success(Duration::ZERO));
    assert_eq!(breaker.current_state(), State::HalfOpen);
    breaker.record_permitted(second_trial, CallOutcome::success(Duration::ZERO));
    assert_eq!(breaker.current_state(), State::Closed);
}

#[test]
fn test_untagged_outcomes_never_outnumber_issued_trials() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);
    trip(&breaker);

    clock.advance(COOLDOWN);
    assert!(breaker.permit());

    // More outcomes than the single trial issued so far.
    breaker.record_outcome(CallOutcome::success(Duration::ZERO));
    breaker.record_outcome(CallOutcome::success(Duration::ZERO));

    assert_eq!(breaker.current_state(), State::HalfOpen);
    assert_eq!(breaker.snapshot().total_calls, 1);
}

#[test]
fn test_ignored_outcomes_are_not_published() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 2);
    let published = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&published);
    breaker.hooks().subscribe(move |event| {
        if matches!(event, BreakerEvent::Success { .. } | BreakerEvent::Error { .. }) {
            count.fetch_add(1, Ordering::SeqCst);
        }
    });

    let stale = breaker.try_permit().unwrap();
    trip(&breaker);
    assert_eq!(published.load(Ordering::SeqCst), 4);

    breaker.record_permitted(stale, CallOutcome::success(Duration::ZERO));
    breaker.record_outcome(CallOutcome::failure(Duration::ZERO));

    assert_eq!(published.load(Ordering::SeqCst), 4);
}

#[test]
fn test_slow_calls_open_the_circuit() {
    let clock = Arc::new(ManualClock::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let breaker = CircuitBreaker::builder("slow")
        .slow_call_rate_threshold(50.0)
        .slow_call_duration_threshold(Duration::from_millis(100))
        .sliding_window_size(2)
        .minimum_sample_size(2)
        .clock(Arc::clone(&clock))
        .build();
    let sink = Arc::clone(&events);
    breaker.hooks().subscribe(move |event| sink.lock().push(event.clone()));

    for _ in 0..2 {
        let result = breaker.call(|| {
            clock.advance(Duration::from_millis(150));
            Ok::<_, TestError>("slow but fine")
        });
        assert!(result.is_ok());
    }

    assert_eq!(breaker.current_state(), State::Open);
    let events = events.lock();
    assert!(events.contains(&BreakerEvent::SlowCallRateExceeded { rate_pct: 100.0 }));
    assert!(events.contains(&BreakerEvent::StateTransition {
        from: State::Closed,
        to: State::Open
    }));
}

#[test]
fn test_call_maps_rejection_and_operation_errors() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 1);

    let result = breaker.call(|| -> Result<String, TestError> { Err(TestError::new("boom")) });
    assert!(matches!(result, Err(BreakerError::Operation(_))));
    assert_eq!(breaker.snapshot().failed_calls, 1);

    breaker.reset();
    trip(&breaker);
    let result = breaker.call(|| -> Result<String, TestError> { Ok("success".to_string()) });
    assert!(matches!(result.unwrap_err(), BreakerError::Open));
}

#[test]
fn test_circuit_breaker_manual_control() {
    let breaker = CircuitBreaker::builder("manual").build();

    // Force open
    assert!(breaker.force_open());
    assert_eq!(breaker.current_state(), State::Open);

    // Check that calls are rejected when open
    let result = breaker.call(|| -> Result<String, TestError> { Ok("success".to_string()) });
    assert!(matches!(result.unwrap_err(), BreakerError::Open));

    // Trying to open again should return false (no change)
    assert!(!breaker.force_open());

    // Force closed
    assert!(breaker.force_closed());
    assert_eq!(breaker.current_state(), State::Closed);

    // Trying to close again should return false (no change)
    assert!(!breaker.force_closed());
}

#[test]
fn test_reset_clears_window() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 1);
    trip(&breaker);

    breaker.reset();
    assert_eq!(breaker.current_state(), State::Closed);
    assert_eq!(breaker.snapshot().total_calls, 0);
    assert!(breaker.permit());
}

#[test]
fn test_hooks_observe_full_cycle() {
    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 1);
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let rejected = Arc::new(AtomicUsize::new(0));

    let seen = Arc::clone(&transitions);
    breaker
        .hooks()
        .on_state_transition(move |from, to| seen.lock().push((from, to)));
    let count = Arc::clone(&rejected);
    breaker.hooks().on_not_permitted(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });
    let opened = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&opened);
    breaker.hooks().on_open(move || {
        count.fetch_add(1, Ordering::SeqCst);
    });

    trip(&breaker);
    assert!(!breaker.permit());
    clock.advance(COOLDOWN);
    assert!(breaker.permit());
    breaker.record_outcome(CallOutcome::success(Duration::ZERO));

    assert_eq!(
        *transitions.lock(),
        vec![
            (State::Closed, State::Open),
            (State::Open, State::HalfOpen),
            (State::HalfOpen, State::Closed),
        ]
    );
    assert_eq!(rejected.load(Ordering::SeqCst), 1);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_half_open_permits_are_bounded() {
    const THREAD_COUNT: usize = 8;

    let clock = Arc::new(ManualClock::new());
    let breaker = breaker_with(&clock, 3);
    trip(&breaker);
    clock.advance(COOLDOWN);

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let granted = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            let breaker = breaker.clone();
            let barrier = Arc::clone(&barrier);
            let granted = Arc::clone(&granted);
            thread::spawn(move || {
                barrier.wait();
                if breaker.permit() {
                    granted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(granted.load(Ordering::SeqCst), 3);
    assert_eq!(breaker.current_state(), State::HalfOpen);
}

#[test]
fn test_concurrent_outcomes_are_not_lost() {
    const THREAD_COUNT: usize = 4;
    const CALLS_PER_THREAD: usize = 25;

    let breaker = CircuitBreaker::builder("busy")
        .sliding_window_size(THREAD_COUNT * CALLS_PER_THREAD)
        .build();

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            let breaker = breaker.clone();
            thread::spawn(move || {
                for _ in 0..CALLS_PER_THREAD {
                    assert!(breaker.permit());
                    breaker.record_outcome(CallOutcome::success(Duration::ZERO));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(breaker.snapshot().total_calls, THREAD_COUNT * CALLS_PER_THREAD);
}
