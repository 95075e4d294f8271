//! Fixed-period rate limiter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::config::{LimiterBuilder, LimiterConfig};
use crate::hook::{HookRegistry, LimiterEvent};
use crate::metrics::MetricSink;

struct LimiterCore {
    available: u32,
    period_start: Instant,
}

impl LimiterCore {
    /// Starts a new period if the current one has run out.
    fn refresh(&mut self, now: Instant, capacity: u32, period: Duration) {
        if now.saturating_duration_since(self.period_start) >= period {
            self.available = capacity;
            self.period_start = now;
        }
    }

    fn until_next_period(&self, now: Instant, period: Duration) -> Duration {
        (self.period_start + period).saturating_duration_since(now)
    }
}

struct LimiterInner {
    name: String,
    config: LimiterConfig,
    core: Mutex<LimiterCore>,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry<LimiterEvent>>,
}

/// Caps the number of permits issued per refresh period.
///
/// Each period starts at the first request made after the previous one
/// expired, and begins with `capacity` permits. Handles are cheap to clone
/// and share state.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

impl RateLimiter {
    /// Creates a rate limiter. Prefer [`RateLimiter::builder`].
    pub fn new(
        name: String,
        config: LimiterConfig,
        clock: Arc<dyn Clock>,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry<LimiterEvent>>,
    ) -> Self {
        let core = LimiterCore {
            available: config.capacity,
            period_start: clock.now(),
        };

        Self {
            inner: Arc::new(LimiterInner {
                name,
                config,
                core: Mutex::new(core),
                clock,
                metric_sink,
                hooks,
            }),
        }
    }

    /// Creates a new builder for customizing a rate limiter.
    pub fn builder(name: impl Into<String>) -> LimiterBuilder {
        LimiterBuilder::new(name)
    }

    /// Name of the limited operation.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Effective configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.inner.config
    }

    /// Observers notified of permit decisions.
    pub fn hooks(&self) -> &HookRegistry<LimiterEvent> {
        &self.inner.hooks
    }

    /// Permits left in the current period, as of now.
    pub fn available_permits(&self) -> u32 {
        let now = self.inner.clock.now();
        let mut core = self.inner.core.lock();
        core.refresh(now, self.inner.config.capacity, self.inner.config.refresh_period());
        core.available
    }

    /// Takes a permit if one is available, without waiting.
    pub fn try_acquire(&self) -> bool {
        let (granted, _) = self.acquire_now();
        self.publish(granted);
        granted
    }

    /// Takes a permit, waiting for the next period if it starts within the
    /// configured timeout.
    ///
    /// Waits at most once; a caller that loses the race for the fresh
    /// period's permits is still denied.
    pub fn acquire(&self) -> bool {
        let max_wait = self.inner.config.timeout();
        let (mut granted, wait) = self.acquire_now();

        if !granted && !max_wait.is_zero() && wait <= max_wait {
            trace!(limiter = %self.inner.name, ?wait, "waiting for next period");
            std::thread::sleep(wait);
            granted = self.acquire_now().0;
        }

        self.publish(granted);
        granted
    }

    /// One attempt under the lock. On denial also returns the time until the
    /// next period starts.
    fn acquire_now(&self) -> (bool, Duration) {
        let now = self.inner.clock.now();
        let period = self.inner.config.refresh_period();
        let mut core = self.inner.core.lock();

        core.refresh(now, self.inner.config.capacity, period);
        if core.available > 0 {
            core.available -= 1;
            (true, Duration::ZERO)
        } else {
            (false, core.until_next_period(now, period))
        }
    }

    fn publish(&self, granted: bool) {
        if granted {
            trace!(limiter = %self.inner.name, "permit acquired");
            self.inner.hooks.emit(&LimiterEvent::Acquired);
        } else {
            debug!(limiter = %self.inner.name, "permit rejected");
            self.inner.hooks.emit(&LimiterEvent::Rejected);
        }
        self.inner.metric_sink.record_permit(&self.inner.name, granted);
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.config.capacity)
            .finish()
    }
}
