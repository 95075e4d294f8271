//! Core circuit breaker implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::config::{BreakerBuilder, BreakerConfig};
use crate::error::{BreakerError, BreakerResult};
use crate::hook::{BreakerEvent, HookRegistry};
use crate::metrics::{CallOutcome, MetricSink, SlidingWindow, WindowSnapshot};
use crate::policy::{BreakerPolicy, Verdict};
use crate::state::State;

/// Mutable state, only touched under the breaker's lock.
struct BreakerCore {
    state: State,
    /// Bumped on every transition; permits carry the value they were issued under.
    generation: u64,
    window: SlidingWindow,
    opened_at: Option<Instant>,
    trial_issued: u32,
    trial_completed: u32,
}

impl BreakerCore {
    fn issue(&self) -> Permit {
        Permit {
            generation: self.generation,
        }
    }

    fn trip(&mut self, now: Instant) {
        self.generation = self.generation.wrapping_add(1);
        self.state = State::Open;
        self.opened_at = Some(now);
        self.trial_issued = 0;
        self.trial_completed = 0;
    }

    fn enter_half_open(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.state = State::HalfOpen;
        self.window.clear();
        self.trial_issued = 0;
        self.trial_completed = 0;
    }

    fn close(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.state = State::Closed;
        self.window.clear();
        self.opened_at = None;
        self.trial_issued = 0;
        self.trial_completed = 0;
    }
}

/// Admission granted by [`CircuitBreaker::try_permit`].
///
/// Hand it back through [`CircuitBreaker::record_permitted`] once the call
/// completes.
#[derive(Debug)]
pub struct Permit {
    generation: u64,
}

/// Inner state of the circuit breaker, shared between handles.
struct BreakerInner {
    name: String,
    config: BreakerConfig,
    policy: Box<dyn BreakerPolicy>,
    core: Mutex<BreakerCore>,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry<BreakerEvent>>,
}

/// Events collected under the lock and published after it is released.
type Pending = SmallVec<[BreakerEvent; 3]>;

/// A circuit breaker guarding one named operation.
///
/// Handles are cheap to clone and all clones share the same state.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the specified policy and settings.
    pub fn new(
        name: String,
        config: BreakerConfig,
        policy: Box<dyn BreakerPolicy>,
        clock: Arc<dyn Clock>,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry<BreakerEvent>>,
    ) -> Self {
        let window = SlidingWindow::new(
            config.sliding_window_size,
            config.slow_call_duration_threshold(),
        );
        let core = BreakerCore {
            state: State::Closed,
            generation: 0,
            window,
            opened_at: None,
            trial_issued: 0,
            trial_completed: 0,
        };

        Self {
            inner: Arc::new(BreakerInner {
                name,
                config,
                policy,
                core: Mutex::new(core),
                clock,
                metric_sink,
                hooks,
            }),
        }
    }

    /// Creates a new builder for customizing a circuit breaker.
    pub fn builder(name: impl Into<String>) -> BreakerBuilder {
        BreakerBuilder::new(name)
    }

    /// Name of the protected operation.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Effective configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.inner.config
    }

    /// Observers notified of this breaker's events.
    pub fn hooks(&self) -> &HookRegistry<BreakerEvent> {
        &self.inner.hooks
    }

    /// Gets the current state of the circuit breaker.
    pub fn current_state(&self) -> State {
        self.inner.core.lock().state
    }

    /// Aggregate counts over the outcomes currently buffered.
    pub fn snapshot(&self) -> WindowSnapshot {
        self.inner.core.lock().window.snapshot()
    }

    pub(crate) fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// Decides whether a call may proceed.
    ///
    /// Shorthand for [`try_permit`](Self::try_permit) when the caller reports
    /// its outcome through the untagged [`record_outcome`](Self::record_outcome).
    pub fn permit(&self) -> bool {
        self.try_permit().is_some()
    }

    /// Decides whether a call may proceed, returning a [`Permit`] to hand back
    /// with the call's outcome.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open here and
    /// admits the caller as the first trial call. Rejections are never
    /// recorded in the window.
    pub fn try_permit(&self) -> Option<Permit> {
        let now = self.inner.clock.now();
        let wait = self.inner.config.wait_duration_in_open_state();
        let trial_calls = self.inner.config.half_open_permitted_calls;

        let (permit, half_opened) = {
            let mut core = self.inner.core.lock();
            let state = core.state;
            match state {
                State::Closed => (Some(core.issue()), false),
                State::Open => {
                    let elapsed = core
                        .opened_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or(Duration::MAX);
                    if elapsed >= wait {
                        core.enter_half_open();
                        core.trial_issued = 1;
                        (Some(core.issue()), true)
                    } else {
                        (None, false)
                    }
                }
                State::HalfOpen => {
                    if core.trial_issued < trial_calls {
                        core.trial_issued += 1;
                        (Some(core.issue()), false)
                    } else {
                        (None, false)
                    }
                }
            }
        };

        if half_opened {
            self.announce_transition(State::Open, State::HalfOpen);
        }

        if permit.is_none() {
            debug!(breaker = %self.inner.name, "call not permitted");
            self.inner.metric_sink.record_not_permitted(&self.inner.name);
            self.inner.hooks.emit(&BreakerEvent::NotPermitted);
        }

        permit
    }

    /// Records the outcome of the call admitted with `permit`.
    ///
    /// Outcomes of calls admitted before the latest state transition are
    /// dropped, so a call that outlives a trip never counts as a half-open
    /// trial.
    pub fn record_permitted(&self, permit: Permit, outcome: CallOutcome) {
        self.apply_outcome(Some(permit.generation), outcome);
    }

    /// Records the outcome of a call admitted by [`permit`](Self::permit).
    ///
    /// Without a [`Permit`] the breaker cannot tell when the call was
    /// admitted: outcomes arriving while open are dropped, and half-open
    /// accepts no more outcomes than it issued trial calls. Prefer
    /// [`record_permitted`](Self::record_permitted).
    pub fn record_outcome(&self, outcome: CallOutcome) {
        self.apply_outcome(None, outcome);
    }

    fn apply_outcome(&self, generation: Option<u64>, outcome: CallOutcome) {
        let now = self.inner.clock.now();
        let mut pending = Pending::new();

        // None when the outcome is ignored, otherwise the transition it caused.
        let applied = {
            let mut core = self.inner.core.lock();
            let state = core.state;
            match state {
                _ if matches!(generation, Some(g) if g != core.generation) => None,
                State::Open => None,
                State::Closed => {
                    core.window.record(outcome, now);
                    if core.window.len() < self.inner.config.minimum_sample_size {
                        Some(None)
                    } else {
                        let verdict = self.inner.policy.evaluate(&core.window.snapshot());
                        if verdict.is_tripped() {
                            core.trip(now);
                            push_verdict(&mut pending, verdict);
                            Some(Some((State::Closed, State::Open)))
                        } else {
                            Some(None)
                        }
                    }
                }
                State::HalfOpen if core.trial_completed >= core.trial_issued => None,
                State::HalfOpen => {
                    core.window.record(outcome, now);
                    core.trial_completed += 1;
                    if core.trial_completed < self.inner.config.half_open_permitted_calls {
                        Some(None)
                    } else {
                        let verdict = self.inner.policy.evaluate(&core.window.snapshot());
                        if verdict.is_tripped() {
                            core.trip(now);
                            push_verdict(&mut pending, verdict);
                            Some(Some((State::HalfOpen, State::Open)))
                        } else {
                            core.close();
                            Some(Some((State::HalfOpen, State::Closed)))
                        }
                    }
                }
            }
        };

        let Some(transition) = applied else {
            trace!(breaker = %self.inner.name, "ignoring outcome of an untracked call");
            return;
        };

        // Execute hooks outside the lock path
        self.inner.metric_sink.record_call(&self.inner.name, &outcome);
        let call_event = if outcome.succeeded() {
            BreakerEvent::Success {
                duration: outcome.duration,
            }
        } else {
            BreakerEvent::Error {
                duration: outcome.duration,
            }
        };
        self.inner.hooks.emit(&call_event);

        for event in &pending {
            match event {
                BreakerEvent::FailureRateExceeded { rate_pct } => {
                    warn!(breaker = %self.inner.name, rate_pct, "failure rate exceeded");
                }
                BreakerEvent::SlowCallRateExceeded { rate_pct } => {
                    warn!(breaker = %self.inner.name, rate_pct, "slow call rate exceeded");
                }
                _ => {}
            }
            self.inner.hooks.emit(event);
        }

        if let Some((from, to)) = transition {
            self.announce_transition(from, to);
        }
    }

    /// Executes a function wrapped by the circuit breaker.
    pub fn call<F, T, E>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let permit = self.try_permit().ok_or(BreakerError::Open)?;

        let start = self.inner.clock.now();
        let result = f();
        let duration = self.inner.clock.now().saturating_duration_since(start);

        self.record_permitted(
            permit,
            match &result {
                Ok(_) => CallOutcome::success(duration),
                Err(_) => CallOutcome::failure(duration),
            },
        );

        result.map_err(BreakerError::Operation)
    }

    /// Forces the circuit breaker to the open state.
    pub fn force_open(&self) -> bool {
        let now = self.inner.clock.now();
        let from = {
            let mut core = self.inner.core.lock();
            let from = core.state;
            if from == State::Open {
                return false;
            }
            core.trip(now);
            from
        };

        self.announce_transition(from, State::Open);
        true
    }

    /// Forces the circuit breaker to the closed state.
    pub fn force_closed(&self) -> bool {
        let from = {
            let mut core = self.inner.core.lock();
            let from = core.state;
            if from == State::Closed {
                return false;
            }
            core.close();
            from
        };

        self.announce_transition(from, State::Closed);
        true
    }

    /// Returns to closed with an empty window, whatever the current state.
    pub fn reset(&self) {
        let from = {
            let mut core = self.inner.core.lock();
            let from = core.state;
            core.close();
            from
        };

        info!(breaker = %self.inner.name, "circuit breaker reset");
        self.inner.hooks.emit(&BreakerEvent::Reset);
        if from != State::Closed {
            self.announce_transition(from, State::Closed);
        }
    }

    fn announce_transition(&self, from: State, to: State) {
        match to {
            State::Open => warn!(breaker = %self.inner.name, %from, %to, "circuit breaker state transition"),
            _ => info!(breaker = %self.inner.name, %from, %to, "circuit breaker state transition"),
        }

        self.inner
            .metric_sink
            .record_state_transition(&self.inner.name, from, to);
        self.inner
            .hooks
            .emit(&BreakerEvent::StateTransition { from, to });
    }
}

fn push_verdict(pending: &mut Pending, verdict: Verdict) {
    match verdict {
        Verdict::FailureRateExceeded(rate_pct) => {
            pending.push(BreakerEvent::FailureRateExceeded { rate_pct })
        }
        Verdict::SlowCallRateExceeded(rate_pct) => {
            pending.push(BreakerEvent::SlowCallRateExceeded { rate_pct })
        }
        Verdict::Healthy => {}
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.current_state())
            .finish()
    }
}
