//! Call accounting and metric export for circuit breakers.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::hook::FallbackReason;
use crate::state::{State, StateChange};

/// Trait for metrics sinks that can receive circuit breaker events.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event.
    fn record_state_transition(&self, breaker: &str, from: State, to: State);

    /// Records the outcome and latency of a primary call attempt.
    fn record_call(&self, breaker: &str, success: bool, duration: Duration);

    /// Records a call served by the fallback.
    fn record_fallback(&self, breaker: &str, reason: FallbackReason);
}

/// A null metrics sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _breaker: &str, _from: State, _to: State) {}
    fn record_call(&self, _breaker: &str, _success: bool, _duration: Duration) {}
    fn record_fallback(&self, _breaker: &str, _reason: FallbackReason) {}
}

/// Point-in-time copy of a breaker's lifetime metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BreakerMetrics {
    /// Primary attempts that settled (success, failure or timeout).
    pub total_calls: u64,
    /// Primary attempts that succeeded.
    pub successful_calls: u64,
    /// Primary attempts that failed or timed out.
    pub failed_calls: u64,
    /// Calls answered by a fallback.
    pub fallback_calls: u64,
    /// Calls rejected because the circuit was open and no fallback was given.
    pub rejected_calls: u64,
    /// Failures in the current cycle; restarts when the circuit opens or closes.
    pub current_failures: u64,
    /// Text of the most recent primary failure.
    pub last_error: Option<String>,
    /// When the most recent primary failure happened.
    pub last_error_time: Option<SystemTime>,
    /// When the circuit last entered OPEN.
    pub opened_at: Option<SystemTime>,
    /// Every transition since the breaker was created.
    pub state_changes: Vec<StateChange>,
}

impl BreakerMetrics {
    /// Share of settled primary attempts that failed.
    pub fn error_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failed_calls as f64 / self.total_calls as f64
    }
}

#[cfg(feature = "prometheus")]
pub use prom::PrometheusSink;

#[cfg(feature = "prometheus")]
mod prom {
    use super::*;
    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::gauge::Gauge;
    use prometheus_client::registry::Registry;

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct BreakerLabels {
        breaker: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct CallLabels {
        breaker: String,
        outcome: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct TransitionLabels {
        breaker: String,
        from: String,
        to: String,
    }

    /// Exports breaker events as Prometheus counters and a state gauge.
    ///
    /// The gauge reads 0 for CLOSED, 1 for OPEN and 2 for HALF_OPEN.
    #[derive(Clone)]
    pub struct PrometheusSink {
        calls: Family<CallLabels, Counter>,
        fallbacks: Family<CallLabels, Counter>,
        transitions: Family<TransitionLabels, Counter>,
        state: Family<BreakerLabels, Gauge>,
    }

    impl PrometheusSink {
        /// Creates the metric families and registers them under `swarm_breaker_*`.
        pub fn new(registry: &mut Registry) -> Self {
            let sink = Self {
                calls: Family::default(),
                fallbacks: Family::default(),
                transitions: Family::default(),
                state: Family::default(),
            };

            registry.register(
                "swarm_breaker_calls",
                "Primary call attempts by outcome",
                sink.calls.clone(),
            );
            registry.register(
                "swarm_breaker_fallbacks",
                "Calls answered by a fallback, by reason",
                sink.fallbacks.clone(),
            );
            registry.register(
                "swarm_breaker_transitions",
                "Circuit state transitions",
                sink.transitions.clone(),
            );
            registry.register(
                "swarm_breaker_state",
                "Current circuit state (0 closed, 1 open, 2 half-open)",
                sink.state.clone(),
            );

            sink
        }
    }

    impl MetricSink for PrometheusSink {
        fn record_state_transition(&self, breaker: &str, from: State, to: State) {
            self.transitions
                .get_or_create(&TransitionLabels {
                    breaker: breaker.to_string(),
                    from: from.as_str().to_string(),
                    to: to.as_str().to_string(),
                })
                .inc();

            let level = match to {
                State::Closed => 0,
                State::Open => 1,
                State::HalfOpen => 2,
            };
            self.state
                .get_or_create(&BreakerLabels {
                    breaker: breaker.to_string(),
                })
                .set(level);
        }

        fn record_call(&self, breaker: &str, success: bool, _duration: Duration) {
            let outcome = if success { "success" } else { "failure" };
            self.calls
                .get_or_create(&CallLabels {
                    breaker: breaker.to_string(),
                    outcome: outcome.to_string(),
                })
                .inc();
        }

        fn record_fallback(&self, breaker: &str, reason: FallbackReason) {
            let outcome = match reason {
                FallbackReason::CircuitOpen => "circuit_open",
                FallbackReason::Timeout => "timeout",
                FallbackReason::PrimaryFailed => "primary_failed",
            };
            self.fallbacks
                .get_or_create(&CallLabels {
                    breaker: breaker.to_string(),
                    outcome: outcome.to_string(),
                })
                .inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_handles_no_calls() {
        assert_eq!(BreakerMetrics::default().error_rate(), 0.0);

        let metrics = BreakerMetrics {
            total_calls: 4,
            failed_calls: 1,
            ..Default::default()
        };
        assert!((metrics.error_rate() - 0.25).abs() < f64::EPSILON);
    }
}
