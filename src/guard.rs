//! Guarded execution: limiter, breaker, timeout and fallback around one call.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::breaker::{CircuitBreaker, Permit};
use crate::error::{FallbackCause, InternalError};
use crate::limiter::RateLimiter;
use crate::metrics::CallOutcome;

/// How a single attempt ended.
enum Attempt<T, E> {
    Finished(Result<T, E>),
    TimedOut(Duration),
    Lost(InternalError),
}

/// The execution shape shared by every gateway.
///
/// A `GuardedCall` carries the optional capabilities a call site needs and
/// runs exactly one attempt of an operation per [`execute`](Self::execute).
/// Rejections and failures never reach the caller as errors: they are handed
/// to the fallback, whose value is returned instead.
#[derive(Clone, Debug, Default)]
pub struct GuardedCall {
    name: String,
    breaker: Option<CircuitBreaker>,
    limiter: Option<RateLimiter>,
    timeout: Option<Duration>,
}

impl GuardedCall {
    /// Creates a call site with no protection at all.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Guards the call site with a circuit breaker.
    pub fn breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Guards the call site with a rate limiter.
    pub fn limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Abandons the operation after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets or clears the timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name used in logs and worker thread names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker guarding this call site, if any.
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.breaker.as_ref()
    }

    /// The limiter guarding this call site, if any.
    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_ref()
    }

    /// Runs `operation` under the configured limiter, breaker and timeout.
    ///
    /// With a timeout the operation runs on a dedicated worker thread; once
    /// the timeout fires the worker is abandoned and its late result is
    /// discarded. Without a timeout it runs on the calling thread. A panic in
    /// the operation resolves to the fallback either way.
    pub fn execute<T, E, F, FB>(&self, operation: F, fallback: FB) -> T
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        FB: FnOnce(FallbackCause<E>) -> T,
    {
        let permit = match self.admit() {
            Ok(permit) => permit,
            Err(cause) => return fallback(cause),
        };

        let started = self.now();
        let attempt = match self.timeout {
            Some(timeout) => run_with_timeout(&self.name, operation, timeout),
            None => run_inline(&self.name, operation),
        };
        let elapsed = self.now().saturating_duration_since(started);

        self.settle(permit, attempt, elapsed, fallback)
    }

    /// Checks the limiter, then the breaker.
    fn admit<E>(&self) -> Result<Option<Permit>, FallbackCause<E>> {
        if let Some(limiter) = &self.limiter {
            if !limiter.acquire() {
                return Err(FallbackCause::RateLimited);
            }
        }

        match &self.breaker {
            Some(breaker) => breaker
                .try_permit()
                .map(Some)
                .ok_or(FallbackCause::CircuitOpen),
            None => Ok(None),
        }
    }

    /// Records the attempt on the breaker and resolves it to a value.
    fn settle<T, E, FB>(
        &self,
        permit: Option<Permit>,
        attempt: Attempt<T, E>,
        elapsed: Duration,
        fallback: FB,
    ) -> T
    where
        FB: FnOnce(FallbackCause<E>) -> T,
    {
        let (outcome, resolved) = match attempt {
            Attempt::Finished(Ok(value)) => (CallOutcome::success(elapsed), Ok(value)),
            Attempt::Finished(Err(e)) => (CallOutcome::failure(elapsed), Err(FallbackCause::Remote(e))),
            Attempt::TimedOut(after) => (CallOutcome::timeout(after), Err(FallbackCause::Timeout(after))),
            Attempt::Lost(e) => (CallOutcome::failure(elapsed), Err(FallbackCause::Internal(e))),
        };

        if let (Some(breaker), Some(permit)) = (&self.breaker, permit) {
            breaker.record_permitted(permit, outcome);
        }

        match resolved {
            Ok(value) => value,
            Err(cause) => {
                debug!(call = %self.name, cause = cause.kind(), "resolving to fallback");
                fallback(cause)
            }
        }
    }

    fn now(&self) -> Instant {
        match &self.breaker {
            Some(breaker) => breaker.now(),
            None => Instant::now(),
        }
    }
}

fn run_inline<T, E, F>(name: &str, operation: F) -> Attempt<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(result) => Attempt::Finished(result),
        Err(_) => {
            warn!(call = %name, "guarded call panicked");
            Attempt::Lost(InternalError::WorkerPanicked)
        }
    }
}

fn run_with_timeout<T, E, F>(name: &str, operation: F, timeout: Duration) -> Attempt<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    // Capacity 1 so a late worker never blocks on a receiver that is gone.
    let (tx, rx) = mpsc::sync_channel(1);
    let spawned = thread::Builder::new()
        .name(format!("guarded-{}", name))
        .spawn(move || {
            let _ = tx.send(operation());
        });

    if let Err(err) = spawned {
        warn!(call = %name, error = %err, "failed to spawn guarded call worker");
        return Attempt::Lost(InternalError::WorkerSpawn);
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => Attempt::Finished(result),
        Err(RecvTimeoutError::Timeout) => {
            warn!(call = %name, ?timeout, "guarded call timed out");
            Attempt::TimedOut(timeout)
        }
        Err(RecvTimeoutError::Disconnected) => {
            warn!(call = %name, "guarded call worker panicked");
            Attempt::Lost(InternalError::WorkerPanicked)
        }
    }
}

#[cfg(feature = "async")]
mod async_guard {
    use super::{Attempt, GuardedCall};
    use crate::error::{FallbackCause, InternalError};
    use futures::FutureExt;
    use std::future::Future;
    use std::panic::AssertUnwindSafe;

    impl GuardedCall {
        /// Async counterpart of [`execute`](GuardedCall::execute).
        ///
        /// The timeout is enforced with `tokio::time::timeout`, so this must
        /// run inside a Tokio runtime. A timed-out future is dropped.
        pub async fn execute_async<T, E, F, Fut, FB>(&self, operation: F, fallback: FB) -> T
        where
            F: FnOnce() -> Fut,
            Fut: Future<Output = Result<T, E>>,
            FB: FnOnce(FallbackCause<E>) -> T,
        {
            let permit = match self.admit() {
                Ok(permit) => permit,
                Err(cause) => return fallback(cause),
            };

            let started = self.now();
            let guarded = AssertUnwindSafe(operation()).catch_unwind();
            let attempt = match self.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, guarded).await {
                    Ok(finished) => finished_or_lost(finished),
                    Err(_) => {
                        tracing::warn!(call = %self.name, ?timeout, "guarded call timed out");
                        Attempt::TimedOut(timeout)
                    }
                },
                None => finished_or_lost(guarded.await),
            };
            let elapsed = self.now().saturating_duration_since(started);

            self.settle(permit, attempt, elapsed, fallback)
        }
    }

    fn finished_or_lost<T, E>(
        result: std::thread::Result<Result<T, E>>,
    ) -> Attempt<T, E> {
        match result {
            Ok(finished) => Attempt::Finished(finished),
            Err(_) => Attempt::Lost(InternalError::WorkerPanicked),
        }
    }
}
