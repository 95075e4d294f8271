//! Destination and attractions lookups behind the resilience layer.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::breaker::CircuitBreaker;
use crate::config::{BreakerConfig, CallSiteConfig, LimiterConfig, ResilienceConfig};
use crate::destination::{DestinationFetcher, TravelDestination};
use crate::error::{FallbackCause, FetchError, GatewayError};
use crate::guard::GuardedCall;
use crate::limiter::RateLimiter;
use crate::registry::Registry;

/// Breaker name guarding destination lookups.
pub const DESTINATION_BREAKER: &str = "travelDestination";

/// Limiter name guarding attractions lookups.
pub const ATTRACTIONS_LIMITER: &str = "travelAttractions";

/// Timeout applied to the remote destination fetch.
pub const DESTINATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuned settings for the two travel operations.
///
/// The breaker judges the last 10 calls once 5 have completed, treats calls
/// of 5s or more as slow, and probes with 3 calls after a 30s cooldown. The
/// limiter allows 5 attractions lookups per minute.
pub fn travel_config() -> ResilienceConfig {
    let mut config = ResilienceConfig::default();
    config.circuit_breakers.insert(
        DESTINATION_BREAKER.to_string(),
        BreakerConfig {
            failure_rate_threshold_pct: 50.0,
            slow_call_rate_threshold_pct: 50.0,
            slow_call_duration_threshold_ms: 5_000,
            sliding_window_size: 10,
            minimum_sample_size: 5,
            wait_duration_in_open_state_ms: 30_000,
            half_open_permitted_calls: 3,
        },
    );
    config.rate_limiters.insert(
        ATTRACTIONS_LIMITER.to_string(),
        LimiterConfig {
            capacity: 5,
            refresh_period_ms: 60_000,
            timeout_ms: 0,
        },
    );
    config.call_sites.insert(
        DESTINATION_BREAKER.to_string(),
        CallSiteConfig {
            timeout_ms: Some(DESTINATION_TIMEOUT.as_millis() as u64),
        },
    );
    config
}

fn validate(name: &str, country: &str) -> Result<(), GatewayError> {
    if name.trim().is_empty() {
        return Err(GatewayError::InvalidArgument(
            "Destination name is required and cannot be null or empty".to_string(),
        ));
    }
    if country.trim().is_empty() {
        return Err(GatewayError::InvalidArgument(
            "Country is required and cannot be null or empty".to_string(),
        ));
    }
    Ok(())
}

/// Looks up destination details through a circuit breaker.
///
/// Remote failures, timeouts and open-circuit rejections all resolve to
/// [`TravelDestination::unavailable`]. Only blank input and a confirmed
/// "not found" are reported as errors.
#[derive(Clone)]
pub struct DestinationGateway {
    fetcher: Arc<dyn DestinationFetcher>,
    guard: GuardedCall,
}

impl DestinationGateway {
    /// Guards `fetcher` with `breaker` and the default 10 second timeout.
    pub fn new<F: DestinationFetcher>(fetcher: F, breaker: CircuitBreaker) -> Self {
        let guard = GuardedCall::new(breaker.name().to_string())
            .breaker(breaker)
            .timeout(DESTINATION_TIMEOUT);
        Self {
            fetcher: Arc::new(fetcher),
            guard,
        }
    }

    /// Uses the registry's `travelDestination` breaker and call-site timeout.
    pub fn from_registry<F: DestinationFetcher>(registry: &Registry, fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            guard: registry.breaker_call(DESTINATION_BREAKER, Some(DESTINATION_TIMEOUT)),
        }
    }

    /// Replaces the fetch timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.guard = self.guard.timeout(timeout);
        self
    }

    /// The breaker guarding the fetch.
    pub fn breaker(&self) -> Option<&CircuitBreaker> {
        self.guard.circuit_breaker()
    }

    /// Fetches details for `name` in `country`.
    pub fn lookup(&self, name: &str, country: &str) -> Result<TravelDestination, GatewayError> {
        validate(name, country)?;
        info!(name, country, "fetching destination details");

        let fetcher = Arc::clone(&self.fetcher);
        let (owned_name, owned_country) = (name.to_string(), country.to_string());
        self.guard.execute(
            move || fetcher.fetch(&owned_name, &owned_country).map(Ok),
            |cause| match cause {
                FallbackCause::Remote(FetchError::NotFound) => {
                    warn!(name, country, "destination not found");
                    Err(GatewayError::NotFound {
                        name: name.to_string(),
                        country: country.to_string(),
                    })
                }
                cause => {
                    warn!(name, country, error = %cause, "circuit breaker fallback triggered");
                    Ok(TravelDestination::unavailable(name, country))
                }
            },
        )
    }
}

/// Describes the attractions at a destination, under a rate limiter.
#[derive(Clone)]
pub struct AttractionsGateway {
    guard: GuardedCall,
}

impl AttractionsGateway {
    /// Guards the lookup with `limiter`.
    pub fn new(limiter: RateLimiter) -> Self {
        Self {
            guard: GuardedCall::new(limiter.name().to_string()).limiter(limiter),
        }
    }

    /// Uses the registry's `travelAttractions` limiter.
    pub fn from_registry(registry: &Registry) -> Self {
        Self {
            guard: registry.limiter_call(ATTRACTIONS_LIMITER),
        }
    }

    /// The limiter guarding the lookup.
    pub fn limiter(&self) -> Option<&RateLimiter> {
        self.guard.rate_limiter()
    }

    /// Describes what `name` in `country` is known for.
    pub fn lookup(&self, name: &str, country: &str) -> Result<String, GatewayError> {
        validate(name, country)?;
        info!(name, country, "fetching attractions");

        let owned_name = name.to_string();
        Ok(self.guard.execute(
            move || Ok::<_, Infallible>(describe_attractions(&owned_name)),
            |_| {
                warn!(name, country, "rate limiter fallback triggered");
                format!(
                    "API rate limit exceeded. Please try again in one minute to check the attractions at {}",
                    name
                )
            },
        ))
    }
}

fn describe_attractions(name: &str) -> String {
    format!(
        "{} is renowned for its stunning alpine scenery, abundant wildlife, \
         and iconic trails such as Trail Ridge Road and Bear Lake. \
         The destination offers breathtaking views and unforgettable experiences for nature enthusiasts.",
        name
    )
}
