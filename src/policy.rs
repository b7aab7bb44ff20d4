//! Policy engine for circuit breaker trip and close decisions.

/// Number of recent outcomes kept for rate-based decisions.
pub const OUTCOME_WINDOW: u32 = 64;

/// Counters for the current breaker cycle.
///
/// `failures` and `calls` restart whenever the circuit opens or closes;
/// `half_open_successes` only moves while HALF_OPEN. The counters saturate
/// instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCounters {
    /// Failed primary attempts since the cycle started.
    pub failures: u64,
    /// Settled primary attempts since the cycle started.
    pub calls: u64,
    /// Consecutive successful probes while HALF_OPEN.
    pub half_open_successes: u32,
    // Bit 0 is the latest call, set when it failed.
    recent: u64,
}

impl CycleCounters {
    /// Records one settled primary attempt.
    pub fn record(&mut self, success: bool) {
        self.calls = self.calls.saturating_add(1);
        self.recent <<= 1;
        if !success {
            self.failures = self.failures.saturating_add(1);
            self.recent |= 1;
        }
    }

    /// Records one success while HALF_OPEN.
    pub fn record_half_open_success(&mut self) {
        self.half_open_successes = self.half_open_successes.saturating_add(1);
    }

    /// Failures among the last `window` attempts of this cycle.
    /// `window` is capped at [`OUTCOME_WINDOW`].
    pub fn recent_failures(&self, window: u32) -> u32 {
        let mask = match window.min(OUTCOME_WINDOW) {
            OUTCOME_WINDOW => u64::MAX,
            n => (1u64 << n) - 1,
        };
        (self.recent & mask).count_ones()
    }
}

/// Decides when a circuit trips open and when a half-open circuit closes.
pub trait TripPolicy: Send + Sync + 'static {
    /// Checked after a failure while CLOSED.
    fn should_trip(&self, counters: &CycleCounters) -> bool;

    /// Checked after a successful probe while HALF_OPEN.
    fn should_close(&self, counters: &CycleCounters) -> bool;
}

/// Trips after a fixed number of failures in the cycle. This is the default.
#[derive(Debug, Clone, Copy)]
pub struct CountPolicy {
    failure_threshold: u32,
    success_threshold: u32,
}

impl CountPolicy {
    /// Creates a count-based policy.
    pub fn new(failure_threshold: u32, success_threshold: u32) -> Self {
        Self {
            failure_threshold,
            success_threshold,
        }
    }
}

impl TripPolicy for CountPolicy {
    fn should_trip(&self, counters: &CycleCounters) -> bool {
        counters.failures >= u64::from(self.failure_threshold)
    }

    fn should_close(&self, counters: &CycleCounters) -> bool {
        counters.half_open_successes >= self.success_threshold
    }
}

/// Trips when the failure ratio of the most recent calls crosses a threshold.
///
/// The ratio is taken over the last `min_calls` attempts (at most
/// [`OUTCOME_WINDOW`]), and only once that many attempts have settled in
/// the current cycle.
#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    failure_rate: f64,
    window: u32,
    success_threshold: u32,
}

impl RatePolicy {
    /// Creates a rate-based policy. `failure_rate` is clamped to `0.0..=1.0`
    /// and `min_calls` to `1..=OUTCOME_WINDOW`.
    pub fn new(failure_rate: f64, min_calls: u32, success_threshold: u32) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            window: min_calls.clamp(1, OUTCOME_WINDOW),
            success_threshold,
        }
    }
}

impl TripPolicy for RatePolicy {
    fn should_trip(&self, counters: &CycleCounters) -> bool {
        if counters.calls < u64::from(self.window) {
            return false;
        }
        f64::from(counters.recent_failures(self.window)) / f64::from(self.window)
            >= self.failure_rate
    }

    fn should_close(&self, counters: &CycleCounters) -> bool {
        counters.half_open_successes >= self.success_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counters(outcomes: &[bool]) -> CycleCounters {
        let mut counters = CycleCounters::default();
        for &success in outcomes {
            counters.record(success);
        }
        counters
    }

    #[test]
    fn count_policy_trips_at_threshold() {
        let policy = CountPolicy::new(3, 2);
        let mut counters = CycleCounters::default();

        counters.failures = 2;
        assert!(!policy.should_trip(&counters));
        counters.failures = 3;
        assert!(policy.should_trip(&counters));
    }

    #[test]
    fn rate_policy_waits_for_volume() {
        let policy = RatePolicy::new(0.5, 10, 1);
        assert!(!policy.should_trip(&counters(&[false; 5])));

        let mut outcomes = [true; 10];
        outcomes[5..].fill(false);
        assert!(policy.should_trip(&counters(&outcomes)));
    }

    #[test]
    fn rate_policy_forgets_old_successes() {
        let policy = RatePolicy::new(0.5, 10, 1);
        let mut counters = counters(&[true; 1000]);
        for _ in 0..4 {
            counters.record(false);
            assert!(!policy.should_trip(&counters));
        }
        counters.record(false);
        assert!(policy.should_trip(&counters));
    }

    #[test]
    fn counters_saturate() {
        let mut counters = CycleCounters {
            failures: u64::MAX,
            calls: u64::MAX,
            half_open_successes: u32::MAX,
            recent: 0,
        };
        counters.record(false);
        counters.record_half_open_success();
        assert_eq!(counters.calls, u64::MAX);
        assert_eq!(counters.failures, u64::MAX);
        assert_eq!(counters.half_open_successes, u32::MAX);
        assert_eq!(counters.recent_failures(OUTCOME_WINDOW), 1);
    }

    proptest! {
        #[test]
        fn count_policy_matches_threshold_comparison(threshold in 1u32..50, failures in 0u64..100) {
            let policy = CountPolicy::new(threshold, 1);
            let counters = CycleCounters { failures, calls: failures, ..Default::default() };
            prop_assert_eq!(policy.should_trip(&counters), failures >= u64::from(threshold));
        }

        #[test]
        fn recent_failures_never_exceed_window(outcomes in proptest::collection::vec(any::<bool>(), 0..200), window in 0u32..100) {
            let counters = counters(&outcomes);
            let recent = counters.recent_failures(window);
            prop_assert!(recent <= window.min(OUTCOME_WINDOW));
            let expected = outcomes.iter().rev().take(window.min(OUTCOME_WINDOW) as usize).filter(|s| !**s).count();
            prop_assert_eq!(recent as usize, expected);
        }
    }
}
