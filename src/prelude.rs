//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use travelguard_rs::prelude::*;
//!
//! let registry = Registry::from_config(travel_config()).unwrap();
//! let attractions = AttractionsGateway::from_registry(&registry);
//! ```

pub use crate::{
    travel_config, AttractionsGateway, CallOutcome, CircuitBreaker, DestinationFetcher,
    DestinationGateway, FallbackCause, FetchError, GatewayError, GuardedCall, RateLimiter,
    Registry, State, TravelDestination,
};
