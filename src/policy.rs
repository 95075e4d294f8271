//! Policy engine for circuit breaker trip decisions.

use crate::metrics::WindowSnapshot;

/// What a policy concluded about a window of outcomes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Both rates are below their thresholds.
    Healthy,

    /// The failure rate reached its threshold.
    FailureRateExceeded(f32),

    /// The slow-call rate reached its threshold.
    SlowCallRateExceeded(f32),
}

impl Verdict {
    /// Whether the breaker should open.
    pub fn is_tripped(&self) -> bool {
        !matches!(self, Verdict::Healthy)
    }
}

/// A policy that decides whether a window of outcomes is unhealthy.
///
/// The breaker only consults the policy once enough outcomes are buffered, so
/// implementations never need to handle small samples themselves.
pub trait BreakerPolicy: Send + Sync + 'static {
    /// Evaluates the current window.
    fn evaluate(&self, window: &WindowSnapshot) -> Verdict;
}

/// Default policy: trip when either rate reaches its percentage threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    failure_rate_threshold_pct: f32,
    slow_call_rate_threshold_pct: f32,
}

impl ThresholdPolicy {
    /// Creates a new threshold policy. Both thresholds are percentages.
    pub fn new(failure_rate_threshold_pct: f32, slow_call_rate_threshold_pct: f32) -> Self {
        Self {
            failure_rate_threshold_pct,
            slow_call_rate_threshold_pct,
        }
    }
}

impl BreakerPolicy for ThresholdPolicy {
    fn evaluate(&self, window: &WindowSnapshot) -> Verdict {
        let failure_rate = window.failure_rate_pct();
        if failure_rate >= self.failure_rate_threshold_pct {
            return Verdict::FailureRateExceeded(failure_rate);
        }

        let slow_rate = window.slow_call_rate_pct();
        if slow_rate >= self.slow_call_rate_threshold_pct {
            return Verdict::SlowCallRateExceeded(slow_rate);
        }

        Verdict::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total: usize, failed: usize, slow: usize) -> WindowSnapshot {
        WindowSnapshot {
            total_calls: total,
            failed_calls: failed,
            slow_calls: slow,
        }
    }

    #[test]
    fn trips_at_threshold_not_below() {
        let policy = ThresholdPolicy::new(50.0, 100.0);
        assert_eq!(
            policy.evaluate(&snapshot(4, 2, 0)),
            Verdict::FailureRateExceeded(50.0)
        );
        assert_eq!(policy.evaluate(&snapshot(4, 1, 0)), Verdict::Healthy);
    }

    #[test]
    fn slow_calls_trip_independently() {
        let policy = ThresholdPolicy::new(50.0, 50.0);
        let verdict = policy.evaluate(&snapshot(4, 0, 3));
        assert_eq!(verdict, Verdict::SlowCallRateExceeded(75.0));
        assert!(verdict.is_tripped());
    }
}
