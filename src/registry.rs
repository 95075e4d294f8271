//! Named breaker and limiter instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::config::{BreakerBuilder, LimiterBuilder, ResilienceConfig};
use crate::error::ConfigError;
use crate::guard::GuardedCall;
use crate::limiter::RateLimiter;
use crate::metrics::{MetricSink, NullMetricSink};

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// Hands out one shared breaker and limiter per operation name.
///
/// Instances are created on first use from the matching configuration
/// section, or from defaults when there is none, and live as long as the
/// registry.
pub struct Registry {
    config: ResilienceConfig,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    breakers: RwLock<HashMap<String, CircuitBreaker, RandomState>>,
    limiters: RwLock<HashMap<String, RateLimiter, RandomState>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry where every instance uses default settings.
    pub fn new() -> Self {
        Self::with_validated(ResilienceConfig::default())
    }

    /// Creates a registry backed by `config`, after validating every section.
    pub fn from_config(config: ResilienceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    fn with_validated(config: ResilienceConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            metric_sink: Arc::new(NullMetricSink),
            breakers: RwLock::new(HashMap::default()),
            limiters: RwLock::new(HashMap::default()),
        }
    }

    /// The process-wide registry, using default settings.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Sets the clock shared by every instance the registry creates.
    pub fn with_clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets the metric sink shared by every instance the registry creates.
    pub fn with_metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Configuration the registry was built from.
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// The breaker named `name`, created on first use.
    pub fn breaker(&self, name: &str) -> CircuitBreaker {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(breaker = name, "creating circuit breaker");
                BreakerBuilder::new(name)
                    .config(self.config.circuit_breakers.get(name).cloned().unwrap_or_default())
                    .clock(Arc::clone(&self.clock))
                    .metric_sink(Arc::clone(&self.metric_sink))
                    .build()
            })
            .clone()
    }

    /// The limiter named `name`, created on first use.
    pub fn limiter(&self, name: &str) -> RateLimiter {
        if let Some(limiter) = self.limiters.read().get(name) {
            return limiter.clone();
        }

        let mut limiters = self.limiters.write();
        limiters
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(limiter = name, "creating rate limiter");
                LimiterBuilder::new(name)
                    .config(self.config.rate_limiters.get(name).cloned().unwrap_or_default())
                    .clock(Arc::clone(&self.clock))
                    .metric_sink(Arc::clone(&self.metric_sink))
                    .build()
            })
            .clone()
    }

    /// Configured timeout for the call site `name`, if any.
    pub fn timeout(&self, name: &str) -> Option<Duration> {
        self.config.call_sites.get(name).and_then(|site| site.timeout())
    }

    /// A guarded call using the breaker named `name` and its call-site
    /// timeout, falling back to `default_timeout` when none is configured.
    pub fn breaker_call(&self, name: &str, default_timeout: Option<Duration>) -> GuardedCall {
        GuardedCall::new(name)
            .breaker(self.breaker(name))
            .with_timeout(self.timeout(name).or(default_timeout))
    }

    /// A guarded call using the limiter named `name`.
    pub fn limiter_call(&self, name: &str) -> GuardedCall {
        GuardedCall::new(name)
            .limiter(self.limiter(name))
            .with_timeout(self.timeout(name))
    }

    /// Names of the breakers created so far.
    pub fn breaker_names(&self) -> Vec<String> {
        self.breakers.read().keys().cloned().collect()
    }
}
