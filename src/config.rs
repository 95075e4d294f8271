//! Configuration for circuit breakers, rate limiters and guarded call sites.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use crate::breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::hook::{BreakerEvent, HookRegistry, LimiterEvent};
use crate::limiter::RateLimiter;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::{BreakerPolicy, ThresholdPolicy};

/// Settings for one named circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BreakerConfig {
    /// Failure rate, in percent, at which the breaker opens.
    pub failure_rate_threshold_pct: f32,

    /// Slow-call rate, in percent, at which the breaker opens.
    pub slow_call_rate_threshold_pct: f32,

    /// Calls taking at least this long count as slow.
    pub slow_call_duration_threshold_ms: u64,

    /// Number of outcomes kept in the sliding window.
    pub sliding_window_size: usize,

    /// Outcomes required before rates are evaluated.
    pub minimum_sample_size: usize,

    /// How long the breaker stays open before probing.
    pub wait_duration_in_open_state_ms: u64,

    /// Trial calls admitted while half-open.
    pub half_open_permitted_calls: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold_pct: 50.0,
            slow_call_rate_threshold_pct: 100.0,
            slow_call_duration_threshold_ms: 60_000,
            sliding_window_size: 100,
            minimum_sample_size: 100,
            wait_duration_in_open_state_ms: 60_000,
            half_open_permitted_calls: 10,
        }
    }
}

impl BreakerConfig {
    /// Slow-call threshold as a [`Duration`].
    pub fn slow_call_duration_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_call_duration_threshold_ms)
    }

    /// Open-state cooldown as a [`Duration`].
    pub fn wait_duration_in_open_state(&self) -> Duration {
        Duration::from_millis(self.wait_duration_in_open_state_ms)
    }

    /// Checks every value is in range.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        check_pct(name, "failure_rate_threshold_pct", self.failure_rate_threshold_pct)?;
        check_pct(name, "slow_call_rate_threshold_pct", self.slow_call_rate_threshold_pct)?;
        check_positive(name, "sliding_window_size", self.sliding_window_size as u64)?;
        check_positive(name, "minimum_sample_size", self.minimum_sample_size as u64)?;
        check_positive(name, "half_open_permitted_calls", u64::from(self.half_open_permitted_calls))
    }

    /// Clamps values into range. The minimum sample never exceeds the window,
    /// and a threshold outside `(0, 100]` falls back to its default.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        self.failure_rate_threshold_pct =
            normalized_pct(self.failure_rate_threshold_pct, defaults.failure_rate_threshold_pct);
        self.slow_call_rate_threshold_pct =
            normalized_pct(self.slow_call_rate_threshold_pct, defaults.slow_call_rate_threshold_pct);
        self.sliding_window_size = self.sliding_window_size.max(1);
        self.minimum_sample_size = self.minimum_sample_size.clamp(1, self.sliding_window_size);
        self.half_open_permitted_calls = self.half_open_permitted_calls.max(1);
        self
    }
}

/// Settings for one named rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimiterConfig {
    /// Permits issued per refresh period.
    pub capacity: u32,

    /// Length of a refresh period.
    pub refresh_period_ms: u64,

    /// Longest a caller may wait for the next period. Zero never waits.
    pub timeout_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            refresh_period_ms: 1_000,
            timeout_ms: 0,
        }
    }
}

impl LimiterConfig {
    /// Refresh period as a [`Duration`].
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }

    /// Maximum wait as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks every value is in range.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        check_positive(name, "capacity", u64::from(self.capacity))?;
        check_positive(name, "refresh_period_ms", self.refresh_period_ms)
    }

    /// Clamps values into range.
    pub fn normalized(mut self) -> Self {
        self.capacity = self.capacity.max(1);
        self.refresh_period_ms = self.refresh_period_ms.max(1);
        self
    }
}

/// Settings for one guarded call site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CallSiteConfig {
    /// Time allowed for the operation. Absent means no timeout.
    pub timeout_ms: Option<u64>,
}

impl CallSiteConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Named breaker, limiter and call-site settings, usually loaded from TOML.
///
/// ```toml
/// [circuit_breakers.travelDestination]
/// failure_rate_threshold_pct = 50.0
/// sliding_window_size = 10
/// minimum_sample_size = 5
///
/// [rate_limiters.travelAttractions]
/// capacity = 5
/// refresh_period_ms = 60000
///
/// [call_sites.travelDestination]
/// timeout_ms = 10000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResilienceConfig {
    /// Circuit breakers by name.
    pub circuit_breakers: HashMap<String, BreakerConfig, RandomState>,

    /// Rate limiters by name.
    pub rate_limiters: HashMap<String, LimiterConfig, RandomState>,

    /// Call sites by name.
    pub call_sites: HashMap<String, CallSiteConfig, RandomState>,
}

impl ResilienceConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: ResilienceConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, breaker) in &self.circuit_breakers {
            breaker.validate(name)?;
        }
        for (name, limiter) in &self.rate_limiters {
            limiter.validate(name)?;
        }
        for (name, site) in &self.call_sites {
            if site.timeout_ms == Some(0) {
                return Err(invalid(name, "timeout_ms must be greater than zero"));
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn check_pct(name: &str, field: &str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("{} must be in (0, 100], got {}", field, value)))
    }
}

/// A threshold of zero would trip on every window.
fn normalized_pct(value: f32, default: f32) -> f32 {
    if value > 0.0 && value <= 100.0 {
        value
    } else if value > 100.0 {
        100.0
    } else {
        default
    }
}

fn check_positive(name: &str, field: &str, value: u64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(invalid(name, format!("{} must be greater than zero", field)))
    }
}

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder {
    name: String,
    config: BreakerConfig,
    policy: Option<Box<dyn BreakerPolicy>>,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry<BreakerEvent>>,
}

impl Default for BreakerBuilder {
    fn default() -> Self {
        Self::new("default")
    }
}

impl BreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BreakerConfig::default(),
            policy: None,
            clock: Arc::new(SystemClock),
            metric_sink: Arc::new(NullMetricSink),
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: BreakerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the failure rate, in percent, that will trip the circuit.
    pub fn failure_rate_threshold(mut self, pct: f32) -> Self {
        self.config.failure_rate_threshold_pct = pct;
        self
    }

    /// Sets the slow-call rate, in percent, that will trip the circuit.
    pub fn slow_call_rate_threshold(mut self, pct: f32) -> Self {
        self.config.slow_call_rate_threshold_pct = pct;
        self
    }

    /// Sets the duration at or above which a call counts as slow.
    pub fn slow_call_duration_threshold(mut self, duration: Duration) -> Self {
        self.config.slow_call_duration_threshold_ms = millis(duration);
        self
    }

    /// Sets how many outcomes the sliding window keeps.
    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.config.sliding_window_size = size;
        self
    }

    /// Sets the minimum number of calls required before rates are considered.
    pub fn minimum_sample_size(mut self, size: usize) -> Self {
        self.config.minimum_sample_size = size;
        self
    }

    /// Sets the cooldown before the circuit transitions from open to half-open.
    pub fn wait_duration_in_open_state(mut self, duration: Duration) -> Self {
        self.config.wait_duration_in_open_state_ms = millis(duration);
        self
    }

    /// Sets the number of probes to allow in half-open state.
    pub fn half_open_permitted_calls(mut self, calls: u32) -> Self {
        self.config.half_open_permitted_calls = calls;
        self
    }

    /// Sets a custom policy. Thresholds from the config are then ignored.
    pub fn policy<P: BreakerPolicy>(mut self, policy: P) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Sets the time source.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry for the circuit breaker.
    pub fn hooks(mut self, hooks: HookRegistry<BreakerEvent>) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Builds a new circuit breaker with the configured settings.
    pub fn build(self) -> CircuitBreaker {
        let config = self.config.normalized();
        let policy = self.policy.unwrap_or_else(|| {
            Box::new(ThresholdPolicy::new(
                config.failure_rate_threshold_pct,
                config.slow_call_rate_threshold_pct,
            ))
        });

        CircuitBreaker::new(
            self.name,
            config,
            policy,
            self.clock,
            self.metric_sink,
            self.hooks,
        )
    }
}

/// Builder for creating rate limiters.
pub struct LimiterBuilder {
    name: String,
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry<LimiterEvent>>,
}

impl Default for LimiterBuilder {
    fn default() -> Self {
        Self::new("default")
    }
}

impl LimiterBuilder {
    /// Creates a new builder with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: LimiterConfig::default(),
            clock: Arc::new(SystemClock),
            metric_sink: Arc::new(NullMetricSink),
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    /// Replaces every setting at once.
    pub fn config(mut self, config: LimiterConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the number of permits per refresh period.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Sets the refresh period.
    pub fn refresh_period(mut self, period: Duration) -> Self {
        self.config.refresh_period_ms = millis(period);
        self
    }

    /// Sets how long [`RateLimiter::acquire`] may wait for the next period.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = millis(timeout);
        self
    }

    /// Sets the time source.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets a metric sink for the rate limiter.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry for the rate limiter.
    pub fn hooks(mut self, hooks: HookRegistry<LimiterEvent>) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Builds the rate limiter.
    pub fn build(self) -> RateLimiter {
        RateLimiter::new(
            self.name,
            self.config.normalized(),
            self.clock,
            self.metric_sink,
            self.hooks,
        )
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
