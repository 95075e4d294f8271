//! Outcome tracking and metric sinks.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::state::State;

/// How a guarded call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The operation returned successfully.
    Success,

    /// The operation returned an error or panicked.
    Failure,

    /// The operation did not finish in time.
    Timeout,
}

/// Result of one completed call, as seen by a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOutcome {
    /// How the call ended.
    pub kind: OutcomeKind,

    /// Elapsed time of the call.
    pub duration: Duration,
}

impl CallOutcome {
    /// A successful call.
    pub fn success(duration: Duration) -> Self {
        Self {
            kind: OutcomeKind::Success,
            duration,
        }
    }

    /// A call that returned an error.
    pub fn failure(duration: Duration) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            duration,
        }
    }

    /// A call abandoned after `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            kind: OutcomeKind::Timeout,
            duration: timeout,
        }
    }

    /// Whether the call produced a result.
    pub fn succeeded(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

/// Trait for metrics sinks that can receive breaker and limiter events.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a breaker state transition.
    fn record_state_transition(&self, breaker: &str, from: State, to: State);

    /// Records a completed call.
    fn record_call(&self, breaker: &str, outcome: &CallOutcome);

    /// Records a call the breaker turned away.
    fn record_not_permitted(&self, breaker: &str);

    /// Records a rate limiter decision.
    fn record_permit(&self, limiter: &str, granted: bool);
}

impl<M> MetricSink for std::sync::Arc<M>
where
    M: MetricSink + ?Sized,
{
    fn record_state_transition(&self, breaker: &str, from: State, to: State) {
        (**self).record_state_transition(breaker, from, to);
    }

    fn record_call(&self, breaker: &str, outcome: &CallOutcome) {
        (**self).record_call(breaker, outcome);
    }

    fn record_not_permitted(&self, breaker: &str) {
        (**self).record_not_permitted(breaker);
    }

    fn record_permit(&self, limiter: &str, granted: bool) {
        (**self).record_permit(limiter, granted);
    }
}

/// A null metrics sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _breaker: &str, _from: State, _to: State) {}
    fn record_call(&self, _breaker: &str, _outcome: &CallOutcome) {}
    fn record_not_permitted(&self, _breaker: &str) {}
    fn record_permit(&self, _limiter: &str, _granted: bool) {}
}

/// Aggregate view over the outcomes currently held by a [`SlidingWindow`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSnapshot {
    /// Outcomes in the window.
    pub total_calls: usize,

    /// Failed or timed-out outcomes.
    pub failed_calls: usize,

    /// Outcomes at or above the slow-call threshold.
    pub slow_calls: usize,
}

impl WindowSnapshot {
    /// Failure rate in percent, `0.0` for an empty window.
    pub fn failure_rate_pct(&self) -> f32 {
        percent(self.failed_calls, self.total_calls)
    }

    /// Slow-call rate in percent, `0.0` for an empty window.
    pub fn slow_call_rate_pct(&self) -> f32 {
        percent(self.slow_calls, self.total_calls)
    }
}

fn percent(part: usize, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }

    part as f32 * 100.0 / total as f32
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    failed: bool,
    slow: bool,
    at: Instant,
}

/// Count-based window over the last `capacity` call outcomes.
///
/// Counters are maintained incrementally so rates are O(1) to read.
#[derive(Debug)]
pub struct SlidingWindow {
    entries: VecDeque<Entry>,
    capacity: usize,
    slow_threshold: Duration,
    failed: usize,
    slow: usize,
}

impl SlidingWindow {
    /// Creates a window holding at most `capacity` outcomes. A capacity of
    /// zero is treated as one.
    pub fn new(capacity: usize, slow_threshold: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            slow_threshold,
            failed: 0,
            slow: 0,
        }
    }

    /// Appends an outcome, evicting the oldest one when full.
    pub fn record(&mut self, outcome: CallOutcome, at: Instant) {
        if self.entries.len() == self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.failed -= usize::from(evicted.failed);
                self.slow -= usize::from(evicted.slow);
            }
        }

        let entry = Entry {
            failed: !outcome.succeeded(),
            slow: outcome.duration >= self.slow_threshold,
            at,
        };
        self.failed += usize::from(entry.failed);
        self.slow += usize::from(entry.slow);
        self.entries.push_back(entry);
    }

    /// Number of outcomes held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of outcomes held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// When the most recent outcome was recorded.
    pub fn last_recorded_at(&self) -> Option<Instant> {
        self.entries.back().map(|entry| entry.at)
    }

    /// Drops every outcome.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.failed = 0;
        self.slow = 0;
    }

    /// Current aggregate counts.
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            total_calls: self.entries.len(),
            failed_calls: self.failed,
            slow_calls: self.slow,
        }
    }
}

#[cfg(feature = "prometheus")]
pub use prometheus_sink::PrometheusSink;

#[cfg(feature = "prometheus")]
mod prometheus_sink {
    use super::{CallOutcome, MetricSink};
    use crate::state::State;
    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::registry::Registry;

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct TransitionLabels {
        name: String,
        from: String,
        to: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct CallLabels {
        name: String,
        outcome: String,
    }

    /// Metric sink that exports counters through `prometheus-client`.
    #[derive(Clone, Default)]
    pub struct PrometheusSink {
        transitions: Family<TransitionLabels, Counter>,
        calls: Family<CallLabels, Counter>,
        permits: Family<CallLabels, Counter>,
    }

    impl PrometheusSink {
        /// Creates a sink and registers its counters with `registry`.
        pub fn register(registry: &mut Registry) -> Self {
            let sink = Self::default();
            registry.register(
                "breaker_state_transitions",
                "Circuit breaker state transitions",
                sink.transitions.clone(),
            );
            registry.register(
                "breaker_calls",
                "Calls seen by circuit breakers, by outcome",
                sink.calls.clone(),
            );
            registry.register(
                "limiter_permits",
                "Rate limiter decisions, by outcome",
                sink.permits.clone(),
            );
            sink
        }
    }

    impl MetricSink for PrometheusSink {
        fn record_state_transition(&self, breaker: &str, from: State, to: State) {
            self.transitions
                .get_or_create(&TransitionLabels {
                    name: breaker.to_string(),
                    from: from.as_str().to_string(),
                    to: to.as_str().to_string(),
                })
                .inc();
        }

        fn record_call(&self, breaker: &str, outcome: &CallOutcome) {
            let label = match outcome.kind {
                super::OutcomeKind::Success => "success",
                super::OutcomeKind::Failure => "failure",
                super::OutcomeKind::Timeout => "timeout",
            };
            self.calls
                .get_or_create(&CallLabels {
                    name: breaker.to_string(),
                    outcome: label.to_string(),
                })
                .inc();
        }

        fn record_not_permitted(&self, breaker: &str) {
            self.calls
                .get_or_create(&CallLabels {
                    name: breaker.to_string(),
                    outcome: "not_permitted".to_string(),
                })
                .inc();
        }

        fn record_permit(&self, limiter: &str, granted: bool) {
            self.permits
                .get_or_create(&CallLabels {
                    name: limiter.to_string(),
                    outcome: if granted { "granted" } else { "rejected" }.to_string(),
                })
                .inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest_and_keeps_counts() {
        let now = Instant::now();
        let mut window = SlidingWindow::new(3, Duration::from_millis(100));

        window.record(CallOutcome::failure(Duration::ZERO), now);
        window.record(CallOutcome::success(Duration::from_millis(150)), now);
        window.record(CallOutcome::success(Duration::ZERO), now);
        assert_eq!(
            window.snapshot(),
            WindowSnapshot {
                total_calls: 3,
                failed_calls: 1,
                slow_calls: 1
            }
        );

        // Pushes the failure out.
        window.record(CallOutcome::success(Duration::ZERO), now);
        let snapshot = window.snapshot();
        assert_eq!(snapshot.total_calls, 3);
        assert_eq!(snapshot.failed_calls, 0);
        assert_eq!(snapshot.slow_calls, 1);
    }

    #[test]
    fn timeouts_count_as_failures() {
        let mut window = SlidingWindow::new(4, Duration::from_secs(1));
        window.record(CallOutcome::timeout(Duration::from_secs(10)), Instant::now());

        let snapshot = window.snapshot();
        assert_eq!(snapshot.failure_rate_pct(), 100.0);
        assert_eq!(snapshot.slow_call_rate_pct(), 100.0);
    }

    #[test]
    fn empty_window_has_zero_rates() {
        let window = SlidingWindow::new(0, Duration::from_secs(1));
        assert_eq!(window.capacity(), 1);
        assert!(window.is_empty());
        assert_eq!(window.snapshot().failure_rate_pct(), 0.0);
    }
}
