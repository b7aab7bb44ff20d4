use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use swarm_breaker::{
    BreakerError, CircuitBreaker, FallbackReason, HookRegistry, MetricSink, RatePolicy, State,
};
use tokio_test::{assert_err, assert_ok};

#[derive(Debug)]
struct TestError(String);

impl TestError {
    fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "test error: {}", self.0)
    }
}

impl std::error::Error for TestError {}

fn breaker(failure_threshold: u32, reset_timeout_ms: u64) -> CircuitBreaker {
    CircuitBreaker::builder("test")
        .failure_threshold(failure_threshold)
        .success_threshold(2)
        .timeout(Duration::from_millis(500))
        .reset_timeout(Duration::from_millis(reset_timeout_ms))
        .build()
}

async fn fail(breaker: &CircuitBreaker) {
    let result = breaker
        .call(|| async { Err::<(), _>(TestError::new("boom")) })
        .await;
    assert_err!(result);
}

async fn succeed(breaker: &CircuitBreaker) {
    let result = breaker.call(|| async { Ok::<_, TestError>(()) }).await;
    assert_ok!(result);
}

#[tokio::test(start_paused = true)]
async fn trips_after_exactly_threshold_failures() {
    let breaker = breaker(3, 1_000);

    fail(&breaker).await;
    fail(&breaker).await;
    assert_eq!(breaker.state(), State::Closed);

    fail(&breaker).await;
    assert_eq!(breaker.state(), State::Open);
}

#[tokio::test(start_paused = true)]
async fn successes_in_closed_do_not_clear_failures() {
    let breaker = breaker(3, 1_000);

    fail(&breaker).await;
    succeed(&breaker).await;
    fail(&breaker).await;
    succeed(&breaker).await;
    assert_eq!(breaker.state(), State::Closed);

    fail(&breaker).await;
    assert_eq!(breaker.state(), State::Open);
}

#[tokio::test(start_paused = true)]
async fn open_circuit_uses_fallback_until_reset_timeout() {
    let breaker = breaker(1, 1_000);
    fail(&breaker).await;
    assert_eq!(breaker.state(), State::Open);

    let primary_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&primary_calls);
    let result = breaker
        .call_with_fallback(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>("primary")
            },
            || async { Ok("fallback") },
        )
        .await;

    assert_eq!(result.unwrap(), "fallback");
    assert_eq!(primary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(breaker.state(), State::Open);

    let rejected = breaker.call(|| async { Ok::<_, TestError>(()) }).await;
    match rejected {
        Err(BreakerError::Open { breaker }) => assert_eq!(breaker, "test"),
        other => panic!("expected open error, got {other:?}"),
    }
    assert_eq!(breaker.metrics().rejected_calls, 1);
    assert_eq!(breaker.metrics().fallback_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn probe_after_reset_timeout_then_recover() {
    let breaker = breaker(3, 1_000);
    for _ in 0..3 {
        fail(&breaker).await;
    }
    assert_eq!(breaker.state(), State::Open);

    tokio::time::advance(Duration::from_millis(1_001)).await;

    succeed(&breaker).await;
    assert_eq!(breaker.state(), State::HalfOpen);

    succeed(&breaker).await;
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().current_failures, 0);

    let history: Vec<State> = breaker
        .metrics()
        .state_changes
        .iter()
        .map(|change| change.state)
        .collect();
    assert_eq!(history, vec![State::Open, State::HalfOpen, State::Closed]);
}

#[tokio::test(start_paused = true)]
async fn failed_probe_reopens_and_restarts_the_clock() {
    let breaker = breaker(1, 1_000);
    fail(&breaker).await;

    tokio::time::advance(Duration::from_millis(1_000)).await;
    fail(&breaker).await;
    assert_eq!(breaker.state(), State::Open);

    // The reset timeout is measured from the latest transition.
    tokio::time::advance(Duration::from_millis(500)).await;
    let result = breaker.call(|| async { Ok::<_, TestError>(()) }).await;
    assert!(matches!(result, Err(BreakerError::Open { .. })));

    tokio::time::advance(Duration::from_millis(500)).await;
    succeed(&breaker).await;
    assert_eq!(breaker.state(), State::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn half_open_success_counter_resets_after_regression() {
    let breaker = breaker(1, 100);
    fail(&breaker).await;

    tokio::time::advance(Duration::from_millis(100)).await;
    succeed(&breaker).await;
    assert_eq!(breaker.state(), State::HalfOpen);
    fail(&breaker).await;
    assert_eq!(breaker.state(), State::Open);

    tokio::time::advance(Duration::from_millis(100)).await;
    succeed(&breaker).await;
    // One success after reopening is not enough to close.
    assert_eq!(breaker.state(), State::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn slow_calls_time_out_and_are_cancelled() {
    struct DropFlag(Arc<AtomicBool>);
    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let breaker = breaker(5, 1_000);
    let dropped = Arc::new(AtomicBool::new(false));
    let flag = DropFlag(Arc::clone(&dropped));

    let result = breaker
        .call(move || async move {
            let _flag = flag;
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, TestError>(())
        })
        .await;

    match result {
        Err(err @ BreakerError::Timeout { .. }) => {
            assert!(err.to_string().contains("500ms"));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(dropped.load(Ordering::SeqCst));
    assert_eq!(breaker.metrics().failed_calls, 1);
    assert!(breaker
        .metrics()
        .last_error
        .unwrap()
        .contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn fallback_failure_wraps_both_errors() {
    let breaker = breaker(5, 1_000);
    let result = breaker
        .call_with_fallback(
            || async { Err::<(), _>(TestError::new("primary")) },
            || async { Err(TestError::new("fallback")) },
        )
        .await;

    match result {
        Err(BreakerError::FallbackFailed { primary, fallback }) => {
            assert!(matches!(*primary, BreakerError::Operation(TestError(ref m)) if m == "primary"));
            assert_eq!(fallback.0, "fallback");
        }
        other => panic!("expected fallback failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn fallback_is_not_used_when_primary_succeeds() {
    let breaker = breaker(5, 1_000);
    let fallback_used = Arc::new(AtomicBool::new(false));
    let used = Arc::clone(&fallback_used);

    let value = breaker
        .call_with_fallback(
            || async { Ok::<_, TestError>(1) },
            move || async move {
                used.store(true, Ordering::SeqCst);
                Ok(2)
            },
        )
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert!(!fallback_used.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn concurrent_failures_trip_once() {
    let breaker = breaker(1, 1_000);
    let slow_failure = || async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err::<(), _>(TestError::new("boom"))
    };

    let (a, b) = tokio::join!(breaker.call(slow_failure), breaker.call(slow_failure));
    assert_err!(a);
    assert_err!(b);

    assert_eq!(breaker.state(), State::Open);
    let metrics = breaker.metrics();
    assert_eq!(metrics.failed_calls, 2);
    assert_eq!(
        metrics
            .state_changes
            .iter()
            .filter(|c| c.state == State::Open)
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn hooks_and_sinks_observe_transitions() {
    #[derive(Default)]
    struct RecordingSink {
        transitions: Mutex<Vec<(State, State)>>,
        fallbacks: Mutex<Vec<FallbackReason>>,
    }

    impl MetricSink for RecordingSink {
        fn record_state_transition(&self, _breaker: &str, from: State, to: State) {
            self.transitions.lock().push((from, to));
        }
        fn record_call(&self, _breaker: &str, _success: bool, _duration: Duration) {}
        fn record_fallback(&self, _breaker: &str, reason: FallbackReason) {
            self.fallbacks.lock().push(reason);
        }
    }

    let sink = Arc::new(RecordingSink::default());
    let hooks = HookRegistry::new();
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);
    hooks.set_on_open(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let breaker = CircuitBreaker::builder("observed")
        .failure_threshold(1)
        .reset_timeout(Duration::from_millis(100))
        .shared_metric_sink(Arc::clone(&sink) as Arc<dyn MetricSink>)
        .hooks(hooks)
        .build();

    let _ = breaker
        .call_with_fallback(
            || async { Err::<(), _>(TestError::new("x")) },
            || async { Ok(()) },
        )
        .await;
    let _ = breaker
        .call_with_fallback(|| async { Ok::<_, TestError>(()) }, || async { Ok(()) })
        .await;

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(*sink.transitions.lock(), vec![(State::Closed, State::Open)]);
    assert_eq!(
        *sink.fallbacks.lock(),
        vec![FallbackReason::PrimaryFailed, FallbackReason::CircuitOpen]
    );
}

#[tokio::test(start_paused = true)]
async fn rate_policy_trips_on_failure_ratio() {
    let breaker = CircuitBreaker::builder("rate")
        .policy(RatePolicy::new(0.5, 4, 1))
        .build();

    succeed(&breaker).await;
    fail(&breaker).await;
    succeed(&breaker).await;
    assert_eq!(breaker.state(), State::Closed);

    fail(&breaker).await;
    assert_eq!(breaker.state(), State::Open);
}

#[tokio::test]
async fn rate_policy_trips_on_outage_after_long_healthy_run() {
    let breaker = CircuitBreaker::builder("rate")
        .policy(RatePolicy::new(0.5, 10, 1))
        .build();

    for _ in 0..1_000 {
        succeed(&breaker).await;
    }
    for _ in 0..4 {
        fail(&breaker).await;
    }
    assert_eq!(breaker.state(), State::Closed);

    fail(&breaker).await;
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.metrics().total_calls, 1_005);
}
