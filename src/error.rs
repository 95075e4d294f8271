//! Error types for the resilience layer and the travel gateways.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Result type for [`CircuitBreaker::call`](crate::CircuitBreaker::call).
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error type for circuit breaker operations.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The circuit is open, calls are not permitted.
    Open,

    /// The underlying operation failed.
    Operation(E),
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open => write!(f, "Circuit breaker is open"),
            BreakerError::Operation(e) => write!(f, "Operation error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Open => None,
            BreakerError::Operation(e) => Some(e),
        }
    }
}

/// Failures of the guarded-call machinery itself, not of the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalError {
    /// The worker thread that runs a timed operation could not be spawned.
    WorkerSpawn,

    /// The operation panicked before producing a result.
    WorkerPanicked,
}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            InternalError::WorkerSpawn => write!(f, "Failed to spawn guarded call worker"),
            InternalError::WorkerPanicked => write!(f, "Guarded operation panicked"),
        }
    }
}

impl Error for InternalError {}

/// Why a guarded call resolved to its fallback.
#[derive(Debug)]
pub enum FallbackCause<E> {
    /// The rate limiter had no permit available.
    RateLimited,

    /// The circuit breaker rejected the call.
    CircuitOpen,

    /// The operation did not finish within the timeout.
    Timeout(Duration),

    /// The operation ran and returned an error.
    Remote(E),

    /// The guarded-call machinery failed around the operation.
    Internal(InternalError),
}

impl<E> FallbackCause<E> {
    /// True when the call was turned away before the operation ran.
    pub fn is_rejection(&self) -> bool {
        matches!(self, FallbackCause::RateLimited | FallbackCause::CircuitOpen)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FallbackCause::RateLimited => "rate_limited",
            FallbackCause::CircuitOpen => "circuit_open",
            FallbackCause::Timeout(_) => "timeout",
            FallbackCause::Remote(_) => "remote_error",
            FallbackCause::Internal(_) => "internal",
        }
    }
}

impl<E> Display for FallbackCause<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FallbackCause::RateLimited => write!(f, "Rate limit exceeded"),
            FallbackCause::CircuitOpen => write!(f, "Circuit breaker is open"),
            FallbackCause::Timeout(after) => write!(f, "Operation timed out after {:?}", after),
            FallbackCause::Remote(e) => write!(f, "Remote error: {}", e),
            FallbackCause::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for FallbackCause<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FallbackCause::Remote(e) => Some(e),
            FallbackCause::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors surfaced by the destination and attractions gateways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// A required argument was blank.
    InvalidArgument(String),

    /// The remote service reported that the destination does not exist.
    NotFound {
        /// Requested destination name.
        name: String,
        /// Requested country.
        country: String,
    },
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::InvalidArgument(msg) => f.write_str(msg),
            GatewayError::NotFound { name, country } => {
                write!(f, "Destination not found: {} in {}", name, country)
            }
        }
    }
}

impl Error for GatewayError {}

/// Errors returned by a [`DestinationFetcher`](crate::DestinationFetcher).
#[derive(Debug)]
pub enum FetchError {
    /// The remote service answered that no such destination exists.
    NotFound,

    /// Any other failure reaching or reading from the remote service.
    Remote(Box<dyn Error + Send + Sync + 'static>),
}

impl FetchError {
    /// Wraps a plain message as a remote failure.
    pub fn remote(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        FetchError::Remote(msg.into())
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NotFound => write!(f, "Destination not found"),
            FetchError::Remote(e) => write!(f, "Failed to retrieve destination details: {}", e),
        }
    }
}

impl Error for FetchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FetchError::NotFound => None,
            FetchError::Remote(e) => Some(e.as_ref()),
        }
    }
}

/// Errors raised while loading resilience configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    Parse(toml::de::Error),

    /// A value was out of range.
    Invalid {
        /// Name of the breaker, limiter or call site.
        name: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "Failed to parse resilience config: {}", e),
            ConfigError::Invalid { name, reason } => {
                write!(f, "Invalid configuration for '{}': {}", name, reason)
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}
