use fusebox::{
    BreakerConfig, BreakerError, BreakerRegistry, CircuitBreaker, EventKind, State, NO_DATA,
};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct TestError(String);

impl TestError {
    fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test error: {}", self.0)
    }
}

impl Error for TestError {}

fn config(
    threshold: f32,
    wait: Duration,
    closed: usize,
    half_open: usize,
) -> Arc<BreakerConfig<TestError>> {
    Arc::new(
        BreakerConfig::builder()
            .failure_rate_threshold(threshold)
            .wait_in_open(wait)
            .closed_buffer_size(closed)
            .half_open_buffer_size(half_open)
            .build()
            .expect("valid test configuration"),
    )
}

fn fail(breaker: &CircuitBreaker<TestError>) {
    let result = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("boom")) });
    assert!(matches!(result, Err(BreakerError::Operation(_))));
}

fn succeed(breaker: &CircuitBreaker<TestError>) {
    let result = breaker.call(|| -> Result<&str, TestError> { Ok("ok") });
    assert!(result.is_ok());
}

#[test]
fn trips_open_when_the_closed_ring_fills_over_threshold() {
    let breaker = CircuitBreaker::new(
        "trip",
        config(50.0, Duration::from_secs(60), 4, 2),
    );
    assert_eq!(breaker.state(), State::Closed);

    // [F, F, S, S] fills the ring at exactly 50% failures.
    fail(&breaker);
    fail(&breaker);
    succeed(&breaker);
    assert_eq!(breaker.state(), State::Closed);
    succeed(&breaker);
    assert_eq!(breaker.state(), State::Open);

    // Calls are short-circuited while open.
    let result = breaker.call(|| -> Result<&str, TestError> { Ok("unreachable") });
    assert!(matches!(result, Err(BreakerError::NotPermitted)));
    assert_eq!(breaker.metrics().not_permitted_calls, 1);
}

#[test]
fn stays_closed_while_under_threshold() {
    let breaker = CircuitBreaker::new(
        "calm",
        config(50.0, Duration::from_secs(60), 4, 2),
    );

    for _ in 0..3 {
        succeed(&breaker);
    }
    fail(&breaker);
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().failure_rate, 25.0);
}

#[test]
fn open_denies_until_the_wait_elapses_then_probes() {
    let breaker = CircuitBreaker::new(
        "recovery",
        config(50.0, Duration::from_millis(150), 2, 2),
    );
    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    // Before the deadline every check is denied and counted.
    assert!(!breaker.try_acquire_permission());
    assert!(!breaker.try_acquire_permission());
    assert_eq!(breaker.metrics().not_permitted_calls, 2);

    thread::sleep(Duration::from_millis(200));

    // The first check past the deadline transitions and is itself permitted.
    assert!(breaker.try_acquire_permission());
    assert_eq!(breaker.state(), State::HalfOpen);
    breaker.on_success(Duration::from_millis(1));
}

#[test]
fn half_open_closes_after_successful_probes() {
    let breaker = CircuitBreaker::new(
        "probe-ok",
        config(50.0, Duration::ZERO, 2, 2),
    );
    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);

    // Zero wait: the next calls probe immediately. [S, S] -> 0% < 50%.
    succeed(&breaker);
    assert_eq!(breaker.state(), State::HalfOpen);
    succeed(&breaker);
    assert_eq!(breaker.state(), State::Closed);

    // The closed ring restarts empty.
    let metrics = breaker.metrics();
    assert_eq!(metrics.buffered_calls, 0);
    assert_eq!(metrics.failure_rate, NO_DATA);
}

#[test]
fn half_open_reopens_when_probes_keep_failing() {
    let breaker = CircuitBreaker::new(
        "probe-bad",
        config(50.0, Duration::ZERO, 2, 2),
    );
    fail(&breaker);
    fail(&breaker);

    // [S, F] -> 50% >= 50% sends the breaker back to open.
    succeed(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn half_open_quota_bounds_concurrent_probes() {
    let breaker = CircuitBreaker::new(
        "quota",
        config(50.0, Duration::ZERO, 2, 3),
    );
    fail(&breaker);
    fail(&breaker);

    // Three permits: the transition winner plus two more. Outcomes are not
    // reported yet, so the breaker stays half-open and denies the rest.
    assert!(breaker.try_acquire_permission());
    assert!(breaker.try_acquire_permission());
    assert!(breaker.try_acquire_permission());
    assert!(!breaker.try_acquire_permission());
    assert_eq!(breaker.state(), State::HalfOpen);
}

#[test]
fn reset_returns_to_closed_and_clears_metrics() {
    let breaker = CircuitBreaker::new(
        "reset",
        config(50.0, Duration::from_secs(60), 2, 2),
    );
    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);
    assert!(!breaker.try_acquire_permission());

    breaker.reset();
    assert_eq!(breaker.state(), State::Closed);
    let metrics = breaker.metrics();
    assert_eq!(metrics.buffered_calls, 0);
    assert_eq!(metrics.failed_calls, 0);
    assert_eq!(metrics.not_permitted_calls, 0);
    assert_eq!(metrics.failure_rate, NO_DATA);
}

#[test]
fn disabled_permits_everything_and_records_nothing() {
    let breaker = CircuitBreaker::new(
        "disabled",
        config(50.0, Duration::from_secs(60), 2, 2),
    );
    assert!(breaker.transition_to_disabled());

    // Failures that would normally trip the breaker are not recorded.
    for _ in 0..10 {
        fail(&breaker);
    }
    assert_eq!(breaker.state(), State::Disabled);
    assert_eq!(breaker.metrics().buffered_calls, 0);

    // Exits only through an explicit transition.
    assert!(breaker.transition_to_closed());
    assert_eq!(breaker.state(), State::Closed);
}

#[test]
fn forced_open_denies_everything_and_never_times_out() {
    let breaker = CircuitBreaker::new(
        "forced",
        config(50.0, Duration::from_millis(1), 2, 2),
    );
    assert!(breaker.transition_to_forced_open());

    thread::sleep(Duration::from_millis(20));
    // No wait-duration escape hatch applies to the forced state.
    for _ in 0..5 {
        assert!(!breaker.try_acquire_permission());
    }
    assert_eq!(breaker.state(), State::ForcedOpen);
    assert_eq!(breaker.metrics().not_permitted_calls, 5);
}

#[test]
fn administrative_transitions_report_whether_anything_changed() {
    let breaker = CircuitBreaker::new(
        "manual",
        config(50.0, Duration::from_secs(60), 2, 2),
    );

    assert!(!breaker.transition_to_closed());
    assert!(breaker.transition_to_forced_open());
    assert!(!breaker.transition_to_forced_open());
    assert!(breaker.transition_to_disabled());
    assert!(breaker.transition_to_closed());
}

#[test]
fn ignored_errors_do_not_count_toward_the_failure_rate() {
    let config = Arc::new(
        BreakerConfig::<TestError>::builder()
            .failure_rate_threshold(50.0)
            .closed_buffer_size(2)
            .half_open_buffer_size(2)
            .ignore_if(|e| e.0.contains("expected"))
            .build()
            .unwrap(),
    );
    let breaker = CircuitBreaker::new("classified", config);

    let ignored = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&ignored);
    breaker.on_event(EventKind::IgnoredError, move |_| {
        counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    });

    // Ignored failures generate events but never enter the ring.
    for _ in 0..6 {
        let result =
            breaker.call(|| -> Result<(), TestError> { Err(TestError::new("expected miss")) });
        assert!(matches!(result, Err(BreakerError::Operation(_))));
    }
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().buffered_calls, 0);
    assert_eq!(ignored.load(std::sync::atomic::Ordering::Relaxed), 6);

    // Recorded failures still trip it.
    fail(&breaker);
    fail(&breaker);
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn event_stream_reflects_the_breaker_lifecycle() {
    let breaker = CircuitBreaker::new(
        "events",
        config(50.0, Duration::ZERO, 2, 2),
    );
    let ring = breaker.retain_events(32);

    fail(&breaker);
    fail(&breaker); // trips open
    breaker.try_acquire_permission(); // first probe, open -> half-open
    breaker.on_success(Duration::from_millis(2));
    breaker.reset();

    let kinds: Vec<_> = ring.events().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Error,
            EventKind::Error,
            EventKind::StateTransition,
            EventKind::StateTransition,
            EventKind::Success,
            EventKind::Reset,
        ]
    );

    let transitions: Vec<_> = ring
        .events()
        .iter()
        .filter_map(|e| e.transition())
        .collect();
    assert_eq!(
        transitions,
        vec![(State::Closed, State::Open), (State::Open, State::HalfOpen)]
    );
}

#[test]
fn concurrent_failures_open_the_breaker_exactly_once() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    let breaker = Arc::new(CircuitBreaker::new(
        "hammer",
        config(50.0, Duration::from_secs(60), 32, 4),
    ));
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);
    breaker.on_event(EventKind::StateTransition, move |event| {
        if event.transition() == Some((State::Closed, State::Open)) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    let barrier = Arc::new(Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let breaker = Arc::clone(&breaker);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..200 {
                let _ = breaker.call(|| -> Result<(), TestError> {
                    Err(TestError::new("always failing"))
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(breaker.state(), State::Open);
    assert_eq!(opened.load(Ordering::Relaxed), 1);
}

#[test]
fn registry_shares_instances_across_call_sites() {
    let registry = Arc::new(BreakerRegistry::<TestError>::with_config(config(
        50.0,
        Duration::from_secs(60),
        2,
        2,
    )));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let registry = Arc::clone(&registry);
        handles.push(thread::spawn(move || {
            let breaker = registry.get_or_create("upstream");
            // Later threads may find the shared breaker already open.
            let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("boom")) });
            let _ = breaker.call(|| -> Result<(), TestError> { Err(TestError::new("boom")) });
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // All failures flowed through one shared instance and tripped it.
    let breaker = registry.get_or_create("upstream");
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.all().len(), 1);
}

#[cfg(feature = "async")]
mod async_tests {
    use super::*;

    #[tokio::test]
    async fn async_calls_drive_the_same_state_machine() {
        let breaker = CircuitBreaker::new(
            "async",
            config(50.0, Duration::from_secs(60), 2, 2),
        );

        let result = breaker
            .call_async(|| async { Result::<&str, TestError>::Ok("ok") })
            .await;
        assert!(result.is_ok());

        for _ in 0..2 {
            let result = breaker
                .call_async(|| async { Result::<(), TestError>::Err(TestError::new("boom")) })
                .await;
            assert!(matches!(result, Err(BreakerError::Operation(_))));
        }
        assert_eq!(breaker.state(), State::Open);

        let result = breaker
            .call_async(|| async { Result::<&str, TestError>::Ok("unreachable") })
            .await;
        assert!(matches!(result, Err(BreakerError::NotPermitted)));
    }
}
