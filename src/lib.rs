//! # travelguard-rs
//!
//! Travel destination lookups guarded by a circuit breaker and a rate
//! limiter, with deterministic fallback values instead of propagated
//! failures.
//!
//! The crate is organised around one reusable execution shape,
//! [`GuardedCall`], which runs a single attempt of an operation under an
//! optional [`RateLimiter`], an optional [`CircuitBreaker`] and an optional
//! timeout, and hands every rejection or failure to a caller-chosen fallback.
//!
//! ## Circuit breaker states
//!
//! - **Closed**: Normal operation. Outcomes are recorded in a count-based
//!   sliding window; once enough are buffered, a failure or slow-call rate at
//!   or above its threshold opens the circuit.
//! - **Open**: Calls are rejected without reaching the resource until the
//!   cooldown elapses.
//! - **Half-Open**: A bounded number of trial calls probe recovery. Their
//!   aggregate outcome closes the circuit or opens it again.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::time::Duration;
//! use travelguard_rs::{FetchError, GuardedCall, CircuitBreaker};
//!
//! let breaker = CircuitBreaker::builder("inventory")
//!     .failure_rate_threshold(50.0)
//!     .sliding_window_size(10)
//!     .minimum_sample_size(5)
//!     .wait_duration_in_open_state(Duration::from_secs(30))
//!     .build();
//!
//! let call = GuardedCall::new("inventory")
//!     .breaker(breaker)
//!     .timeout(Duration::from_secs(2));
//!
//! let stock: u32 = call.execute(
//!     || Err::<u32, _>(FetchError::remote("connection refused")),
//!     |cause| {
//!         println!("serving cached value: {}", cause);
//!         0
//!     },
//! );
//! assert_eq!(stock, 0);
//! ```
//!
//! ## Travel gateways
//!
//! ```rust
//! use travelguard_rs::{
//!     travel_config, AttractionsGateway, DestinationGateway, FetchError, Registry,
//!     TravelDestination,
//! };
//!
//! let registry = Registry::from_config(travel_config()).unwrap();
//! let destinations = DestinationGateway::from_registry(&registry, |_: &str, _: &str| {
//!     Err::<TravelDestination, _>(FetchError::remote("service down"))
//! });
//!
//! let details = destinations.lookup("Rocky Mountain", "USA").unwrap();
//! assert!(details.is_unavailable());
//!
//! let attractions = AttractionsGateway::from_registry(&registry);
//! assert!(attractions.lookup("Rocky Mountain", "USA").unwrap().starts_with("Rocky Mountain"));
//! ```
//!
//! ## Features
//!
//! - `async` - `GuardedCall::execute_async` on Tokio
//! - `prometheus` - `PrometheusSink` for `prometheus-client`
//! - `http` - `HttpDestinationFetcher` built on `reqwest`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod clock;
mod config;
mod destination;
mod error;
mod gateway;
mod guard;
mod hook;
mod limiter;
mod metrics;
mod policy;
pub mod prelude;
mod registry;
mod state;

// Re-exports
pub use breaker::{CircuitBreaker, Permit};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BreakerBuilder, BreakerConfig, CallSiteConfig, LimiterBuilder, LimiterConfig,
    ResilienceConfig,
};
pub use destination::{
    DestinationFetcher, TravelDestination, NO_DETAILS_AVAILABLE, UNAVAILABLE_DESCRIPTION,
};
#[cfg(feature = "http")]
pub use destination::HttpDestinationFetcher;
pub use error::{
    BreakerError, BreakerResult, ConfigError, FallbackCause, FetchError, GatewayError,
    InternalError,
};
pub use gateway::{
    travel_config, AttractionsGateway, DestinationGateway, ATTRACTIONS_LIMITER,
    DESTINATION_BREAKER, DESTINATION_TIMEOUT,
};
pub use guard::GuardedCall;
pub use hook::{BreakerEvent, HookRegistry, LimiterEvent};
pub use limiter::RateLimiter;
#[cfg(feature = "prometheus")]
pub use metrics::PrometheusSink;
pub use metrics::{CallOutcome, MetricSink, NullMetricSink, OutcomeKind, SlidingWindow, WindowSnapshot};
pub use policy::{BreakerPolicy, ThresholdPolicy, Verdict};
pub use registry::Registry;
pub use state::State;
