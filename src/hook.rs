//! Hook registry for breaker and limiter events.

use crate::state::State;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Duration;

type HookFn<Ev> = Arc<dyn Fn(&Ev) + Send + Sync + 'static>;

/// Events published by a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Debug, Clone, PartialEq)]
pub enum BreakerEvent {
    /// The breaker moved between states.
    StateTransition {
        /// Previous state.
        from: State,
        /// New state.
        to: State,
    },

    /// A successful call was recorded.
    Success {
        /// How long the call took.
        duration: Duration,
    },

    /// A failed or timed-out call was recorded.
    Error {
        /// How long the call took before failing.
        duration: Duration,
    },

    /// A call was rejected without being attempted.
    NotPermitted,

    /// The failure rate reached its threshold.
    FailureRateExceeded {
        /// Observed failure rate in percent.
        rate_pct: f32,
    },

    /// The slow-call rate reached its threshold.
    SlowCallRateExceeded {
        /// Observed slow-call rate in percent.
        rate_pct: f32,
    },

    /// The breaker was forced closed and its window cleared.
    Reset,
}

/// Events published by a [`RateLimiter`](crate::RateLimiter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterEvent {
    /// A permit was granted.
    Acquired,

    /// No permit was available.
    Rejected,
}

/// A registry of observers for one event type.
///
/// Observers run synchronously on the thread that produced the event, after
/// the producer has released its internal lock.
pub struct HookRegistry<Ev> {
    hooks: RwLock<SmallVec<[HookFn<Ev>; 4]>>,
}

impl<Ev> Default for HookRegistry<Ev> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ev> HookRegistry<Ev> {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(SmallVec::new()),
        }
    }

    /// Registers an observer for every event.
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(&Ev) + Send + Sync + 'static,
    {
        self.hooks.write().push(Arc::new(f));
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Delivers an event to every observer.
    pub fn emit(&self, event: &Ev) {
        // Clone the handles so an observer may subscribe without deadlocking.
        let hooks: SmallVec<[HookFn<Ev>; 4]> = self.hooks.read().iter().cloned().collect();
        for hook in hooks {
            hook(event);
        }
    }
}

impl HookRegistry<BreakerEvent> {
    /// Sets a hook called with `(from, to)` on every state transition.
    pub fn on_state_transition<F>(&self, f: F)
    where
        F: Fn(State, State) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let BreakerEvent::StateTransition { from, to } = event {
                f(*from, *to);
            }
        });
    }

    /// Sets the hook to call when the circuit breaker opens.
    pub fn on_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_state_transition(move |_, to| {
            if to == State::Open {
                f();
            }
        });
    }

    /// Sets the hook to call when a call is rejected.
    pub fn on_not_permitted<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if matches!(event, BreakerEvent::NotPermitted) {
                f();
            }
        });
    }
}

impl HookRegistry<LimiterEvent> {
    /// Sets the hook to call when a permit is denied.
    pub fn on_rejected<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if *event == LimiterEvent::Rejected {
                f();
            }
        });
    }
}
