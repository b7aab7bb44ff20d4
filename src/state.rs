//! Circuit breaker states and transition history.

use std::fmt;
use std::time::SystemTime;

use serde::Serialize;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    /// Circuit is closed and calls pass through to the remote dependency.
    Closed,

    /// Circuit is open and calls short-circuit to the fallback.
    Open,

    /// Circuit is letting probe calls through to test recovery.
    HalfOpen,
}

impl State {
    /// Upper-case label used in logs, metrics and dashboards.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Closed => "CLOSED",
            State::Open => "OPEN",
            State::HalfOpen => "HALF_OPEN",
        }
    }

    /// Whether a transition from `self` to `to` is part of the state machine.
    ///
    /// CLOSED only ever moves to OPEN, OPEN only to HALF_OPEN, and HALF_OPEN
    /// resolves to either CLOSED or OPEN. Manual resets to CLOSED are handled
    /// separately by the breaker.
    pub fn can_transition_to(self, to: State) -> bool {
        matches!(
            (self, to),
            (State::Closed, State::Open)
                | (State::Open, State::HalfOpen)
                | (State::HalfOpen, State::Closed)
                | (State::HalfOpen, State::Open)
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a breaker's state-change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    /// State that was entered.
    pub state: State,
    /// Wall-clock time of the transition.
    pub timestamp: SystemTime,
}

impl StateChange {
    pub(crate) fn now(state: State) -> Self {
        Self {
            state,
            timestamp: SystemTime::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_dashboard_names() {
        assert_eq!(State::Closed.to_string(), "CLOSED");
        assert_eq!(State::Open.to_string(), "OPEN");
        assert_eq!(State::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn only_machine_edges_are_allowed() {
        assert!(State::Closed.can_transition_to(State::Open));
        assert!(State::Open.can_transition_to(State::HalfOpen));
        assert!(State::HalfOpen.can_transition_to(State::Closed));
        assert!(State::HalfOpen.can_transition_to(State::Open));

        assert!(!State::Closed.can_transition_to(State::HalfOpen));
        assert!(!State::Open.can_transition_to(State::Closed));
        assert!(!State::Open.can_transition_to(State::Open));
    }
}
