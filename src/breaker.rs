//! Core circuit breaker implementation.

use std::fmt;
use std::future::{Future, Ready};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BreakerBuilder, BreakerConfig};
use crate::error::{BreakerError, BreakerResult};
use crate::hook::{FallbackReason, HookRegistry, Transition};
use crate::metrics::{BreakerMetrics, MetricSink};
use crate::policy::{CycleCounters, TripPolicy};
use crate::state::{State, StateChange};

/// Mutable breaker state. Always accessed under the breaker's mutex,
/// which is never held across an `.await`.
struct BreakerCore {
    state: State,
    counters: CycleCounters,
    last_transition: Instant,
    metrics: BreakerMetrics,
}

/// Inner state of the circuit breaker, shared between clones.
struct BreakerInner {
    name: String,
    config: BreakerConfig,
    policy: Arc<dyn TripPolicy>,
    core: Mutex<BreakerCore>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

/// A named circuit breaker guarding one remote dependency.
///
/// Clones share state, so a breaker can be handed to every component
/// that talks to the same dependency.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

enum Admission {
    Proceed,
    Reject,
}

type NoFallback<T, E> = fn() -> Ready<Result<T, E>>;

impl CircuitBreaker {
    /// Creates a new circuit breaker with the specified policy and settings.
    pub fn new(
        name: impl Into<String>,
        config: BreakerConfig,
        policy: Arc<dyn TripPolicy>,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        let core = BreakerCore {
            state: State::Closed,
            counters: CycleCounters::default(),
            last_transition: Instant::now(),
            metrics: BreakerMetrics::default(),
        };

        Self {
            inner: Arc::new(BreakerInner {
                name: name.into(),
                config,
                policy,
                core: Mutex::new(core),
                metric_sink,
                hooks,
            }),
        }
    }

    /// Creates a new builder for customizing a circuit breaker.
    pub fn builder(name: impl Into<String>) -> BreakerBuilder {
        BreakerBuilder::new(name)
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The breaker's tunables.
    pub fn config(&self) -> &BreakerConfig {
        &self.inner.config
    }

    /// Gets the current state of the circuit breaker.
    pub fn state(&self) -> State {
        self.inner.core.lock().state
    }

    /// A breaker is healthy only while CLOSED.
    pub fn is_healthy(&self) -> bool {
        self.state() == State::Closed
    }

    /// Time elapsed since the last state transition.
    pub fn time_in_state(&self) -> Duration {
        self.inner.core.lock().last_transition.elapsed()
    }

    /// Snapshot of the lifetime metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        let core = self.inner.core.lock();
        let mut metrics = core.metrics.clone();
        metrics.current_failures = core.counters.failures;
        metrics
    }

    /// Runs `primary` under breaker protection, without a fallback.
    ///
    /// Fails with [`BreakerError::Open`] while the circuit is open and not yet
    /// due for a probe, [`BreakerError::Timeout`] when the attempt exceeds the
    /// configured timeout, and [`BreakerError::Operation`] otherwise.
    pub async fn call<F, Fut, T, E>(&self, primary: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute(primary, None::<NoFallback<T, E>>).await
    }

    /// Runs `primary` under breaker protection, answering from `fallback`
    /// when the circuit is open or the attempt fails.
    ///
    /// The fallback never runs while a primary attempt is in flight.
    pub async fn call_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        primary: F,
        fallback: G,
    ) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.execute(primary, Some(fallback)).await
    }

    async fn execute<F, Fut, G, GFut, T, E>(
        &self,
        primary: F,
        fallback: Option<G>,
    ) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if let Admission::Reject = self.admit() {
            let rejected = BreakerError::Open {
                breaker: self.inner.name.clone(),
            };
            return match fallback {
                Some(fallback) => {
                    self.run_fallback(rejected, FallbackReason::CircuitOpen, fallback)
                        .await
                }
                None => {
                    self.inner.core.lock().metrics.rejected_calls += 1;
                    debug!(breaker = %self.inner.name, "circuit open, call rejected");
                    Err(rejected)
                }
            };
        }

        let timeout = self.inner.config.timeout;
        let start = Instant::now();
        // Dropping the timed-out future cancels whatever request it owns.
        let outcome = tokio::time::timeout(timeout, primary()).await;
        let duration = start.elapsed();

        let (error, reason) = match outcome {
            Ok(Ok(value)) => {
                self.on_success(duration);
                return Ok(value);
            }
            Ok(Err(err)) => {
                self.on_failure(err.to_string(), duration);
                (BreakerError::Operation(err), FallbackReason::PrimaryFailed)
            }
            Err(_) => {
                let error = BreakerError::Timeout {
                    breaker: self.inner.name.clone(),
                    after: timeout,
                };
                self.on_failure(error.to_string(), duration);
                (error, FallbackReason::Timeout)
            }
        };

        match fallback {
            Some(fallback) => self.run_fallback(error, reason, fallback).await,
            None => Err(error),
        }
    }

    /// Decides whether a primary attempt may proceed, moving OPEN to
    /// HALF_OPEN once the reset timeout has elapsed.
    fn admit(&self) -> Admission {
        let transition = {
            let mut core = self.inner.core.lock();
            if core.state != State::Open {
                return Admission::Proceed;
            }
            if core.last_transition.elapsed() < self.inner.config.reset_timeout {
                return Admission::Reject;
            }
            self.advance(&mut core, State::HalfOpen)
        };

        info!(breaker = %self.inner.name, "reset timeout elapsed, probing");
        self.announce(transition);
        Admission::Proceed
    }

    async fn run_fallback<G, GFut, T, E>(
        &self,
        primary: BreakerError<E>,
        reason: FallbackReason,
        fallback: G,
    ) -> BreakerResult<T, E>
    where
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.inner.core.lock().metrics.fallback_calls += 1;
        warn!(breaker = %self.inner.name, error = %primary, "using fallback");
        self.inner.metric_sink.record_fallback(&self.inner.name, reason);
        self.inner.hooks.execute_fallback_hook(&self.inner.name, reason);

        fallback()
            .await
            .map_err(|fallback| BreakerError::FallbackFailed {
                primary: Box::new(primary),
                fallback,
            })
    }

    fn on_success(&self, duration: Duration) {
        let transition = {
            let mut core = self.inner.core.lock();
            core.metrics.total_calls += 1;
            core.metrics.successful_calls += 1;
            core.counters.record(true);

            if core.state == State::HalfOpen {
                core.counters.record_half_open_success();
                if self.inner.policy.should_close(&core.counters) {
                    Some(self.advance(&mut core, State::Closed))
                } else {
                    None
                }
            } else {
                None
            }
        };

        self.inner
            .metric_sink
            .record_call(&self.inner.name, true, duration);
        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    fn on_failure(&self, error: String, duration: Duration) {
        let transition = {
            let mut core = self.inner.core.lock();
            core.metrics.total_calls += 1;
            core.metrics.failed_calls += 1;
            core.metrics.last_error = Some(error);
            core.metrics.last_error_time = Some(SystemTime::now());
            core.counters.record(false);

            match core.state {
                // A single failed probe reopens the circuit.
                State::HalfOpen => Some(self.advance(&mut core, State::Open)),
                State::Closed if self.inner.policy.should_trip(&core.counters) => {
                    warn!(
                        breaker = %self.inner.name,
                        failures = core.counters.failures,
                        threshold = self.inner.config.failure_threshold,
                        "failure threshold reached"
                    );
                    Some(self.advance(&mut core, State::Open))
                }
                // Already open: a concurrent call tripped it first.
                _ => None,
            }
        };

        self.inner
            .metric_sink
            .record_call(&self.inner.name, false, duration);
        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    /// Applies an automatic transition. Must be called with the lock held.
    fn advance(&self, core: &mut BreakerCore, to: State) -> (State, State) {
        debug_assert!(core.state.can_transition_to(to));
        Self::enter(core, to)
    }

    fn enter(core: &mut BreakerCore, to: State) -> (State, State) {
        let from = core.state;
        core.state = to;
        core.last_transition = Instant::now();

        match to {
            State::Open => {
                core.metrics.opened_at = Some(SystemTime::now());
                core.counters = CycleCounters::default();
            }
            State::Closed => core.counters = CycleCounters::default(),
            State::HalfOpen => core.counters.half_open_successes = 0,
        }

        core.metrics.state_changes.push(StateChange::now(to));
        (from, to)
    }

    /// Logs and publishes a transition. Runs outside the lock.
    fn announce(&self, (from, to): (State, State)) {
        info!(breaker = %self.inner.name, %from, %to, "circuit state changed");
        self.inner
            .metric_sink
            .record_state_transition(&self.inner.name, from, to);
        self.inner.hooks.execute_transition_hook(&Transition {
            breaker: &self.inner.name,
            from,
            to,
        });
    }

    /// Forces the circuit open. Returns false if it already was.
    pub fn force_open(&self) -> bool {
        let transition = {
            let mut core = self.inner.core.lock();
            if core.state == State::Open {
                return false;
            }
            Self::enter(&mut core, State::Open)
        };

        self.announce(transition);
        true
    }

    /// Manually closes the circuit and clears the cycle counters.
    ///
    /// Every reset appends a CLOSED history entry. Hooks and sinks only
    /// hear about it when the state actually changed.
    pub fn reset(&self) {
        let transition = {
            let mut core = self.inner.core.lock();
            if core.state == State::Closed {
                core.counters = CycleCounters::default();
                core.last_transition = Instant::now();
                core.metrics.state_changes.push(StateChange::now(State::Closed));
                None
            } else {
                Some(Self::enter(&mut core, State::Closed))
            }
        };

        info!(breaker = %self.inner.name, "manual reset");
        if let Some(transition) = transition {
            self.announce(transition);
        }
    }
}

impl fmt::Display for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core.lock();
        write!(
            f,
            "CircuitBreaker[{}:{}] Calls:{} Success:{} Failed:{}",
            self.inner.name,
            core.state,
            core.metrics.total_calls,
            core.metrics.successful_calls,
            core.metrics.failed_calls
        )
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish()
    }
}
