//! Core circuit breaker implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{BreakerConfig, Classification};
use crate::error::{BreakerError, BreakerResult};
use crate::event::{BreakerEvent, EventKind, EventPublisher, EventRing};
use crate::state::{Acquire, Forced, State, StateMachine, Transition};
use crate::window::NO_DATA;

/// Read-only snapshot of a breaker's metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    /// Failure rate percentage over the active ring buffer, or
    /// [`NO_DATA`](crate::NO_DATA) until the buffer has been filled since
    /// the state was entered or last reset.
    pub failure_rate: f32,
    /// Number of outcomes currently held by the active ring buffer.
    pub buffered_calls: usize,
    /// Number of buffered outcomes classified as failures.
    pub failed_calls: usize,
    /// Number of permission checks denied since creation or the last reset.
    pub not_permitted_calls: u64,
}

struct BreakerInner<E> {
    name: Arc<str>,
    config: Arc<BreakerConfig<E>>,
    machine: StateMachine,
    publisher: EventPublisher,
    not_permitted: AtomicU64,
}

/// A named circuit breaker protecting one dependency.
///
/// The core contract is ask-then-report: the caller requests permission with
/// [`try_acquire_permission`](Self::try_acquire_permission), executes the
/// protected work itself, then reports exactly one of
/// [`on_success`](Self::on_success) or [`on_error`](Self::on_error) with the
/// duration it measured. [`call`](Self::call) wraps that sequence for
/// closures. The breaker never invokes the protected work and holds no
/// internal threads or timers; all decisions happen on the calling thread.
pub struct CircuitBreaker<E> {
    inner: Arc<BreakerInner<E>>,
}

impl<E> CircuitBreaker<E>
where
    E: std::error::Error + 'static,
{
    /// Creates a breaker with the given name and shared configuration.
    pub fn new(name: impl Into<String>, config: Arc<BreakerConfig<E>>) -> Self {
        let machine = StateMachine::new(
            config.failure_rate_threshold(),
            config.wait_in_open(),
            config.closed_buffer_size(),
            config.half_open_buffer_size(),
        );
        Self {
            inner: Arc::new(BreakerInner {
                name: name.into().into(),
                config,
                machine,
                publisher: EventPublisher::new(),
                not_permitted: AtomicU64::new(0),
            }),
        }
    }

    /// The breaker's name, unique within its registry.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The configuration this breaker runs under.
    pub fn config(&self) -> &Arc<BreakerConfig<E>> {
        &self.inner.config
    }

    /// The current state tag.
    pub fn state(&self) -> State {
        self.inner.machine.current()
    }

    /// Asks whether one call may proceed right now.
    ///
    /// A denial increments the not-permitted counter and emits a
    /// [`NotPermitted`](BreakerEvent::NotPermitted) event. The first check
    /// arriving after the open-state deadline transitions the breaker to
    /// half-open and is itself permitted as the first probe.
    pub fn try_acquire_permission(&self) -> bool {
        match self.inner.machine.try_acquire() {
            Acquire::Permitted => true,
            Acquire::PermittedWithTransition(transition) => {
                self.emit_transition(transition);
                true
            }
            Acquire::Denied => {
                self.inner.not_permitted.fetch_add(1, Ordering::Relaxed);
                self.inner.publisher.publish(&BreakerEvent::NotPermitted {
                    at: Instant::now(),
                });
                false
            }
        }
    }

    /// Reports a successful call with the duration measured by the caller.
    pub fn on_success(&self, duration: Duration) {
        if self.state() == State::Disabled {
            return;
        }

        self.inner.publisher.publish(&BreakerEvent::Success {
            duration,
            at: Instant::now(),
        });
        if let Some(transition) = self.inner.machine.on_outcome(false) {
            self.emit_transition(transition);
        }
    }

    /// Reports a failed call. The configured predicates classify the error;
    /// ignored errors are excluded from the failure rate (and hand back a
    /// half-open probe permit) but still emit an
    /// [`IgnoredError`](BreakerEvent::IgnoredError) event.
    pub fn on_error(&self, duration: Duration, error: &E) {
        if self.state() == State::Disabled {
            return;
        }

        match self.inner.config.classify(error) {
            Classification::Failure => {
                self.inner.publisher.publish(&BreakerEvent::Error {
                    duration,
                    at: Instant::now(),
                });
                if let Some(transition) = self.inner.machine.on_outcome(true) {
                    self.emit_transition(transition);
                }
            }
            Classification::Ignored => {
                self.inner.publisher.publish(&BreakerEvent::IgnoredError {
                    duration,
                    at: Instant::now(),
                });
                self.inner.machine.release_permit();
            }
        }
    }

    /// Executes a closure under the breaker: acquire permission, run, report.
    pub fn call<F, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.try_acquire_permission() {
            return Err(BreakerError::NotPermitted);
        }

        let start = Instant::now();
        let result = f();
        let duration = start.elapsed();

        match &result {
            Ok(_) => self.on_success(duration),
            Err(error) => self.on_error(duration, error),
        }

        result.map_err(BreakerError::Operation)
    }

    /// Snapshot of the breaker's metrics. States without a ring buffer
    /// (open, disabled, forced open) report empty counts and the
    /// insufficient-data sentinel.
    pub fn metrics(&self) -> Metrics {
        let totals = self.inner.machine.totals();
        let failure_rate = if totals.capacity == 0 {
            NO_DATA
        } else {
            totals.failure_rate()
        };
        Metrics {
            failure_rate,
            buffered_calls: totals.buffered,
            failed_calls: totals.failed,
            not_permitted_calls: self.inner.not_permitted.load(Ordering::Relaxed),
        }
    }

    /// Administratively returns the breaker to closed with a fresh buffer.
    /// Returns false if it was already closed.
    pub fn transition_to_closed(&self) -> bool {
        self.apply_forced(Forced::Closed)
    }

    /// Administratively disables the breaker: all calls permitted, nothing
    /// recorded, no automatic transitions. Returns false if already disabled.
    pub fn transition_to_disabled(&self) -> bool {
        self.apply_forced(Forced::Disabled)
    }

    /// Administratively forces the breaker open: all calls denied until an
    /// explicit transition. Returns false if already forced open.
    pub fn transition_to_forced_open(&self) -> bool {
        self.apply_forced(Forced::ForcedOpen)
    }

    /// Discards all history: returns to closed from any state, clears the
    /// ring buffer and the not-permitted counter, and emits a
    /// [`Reset`](BreakerEvent::Reset) event.
    pub fn reset(&self) {
        let from = self.inner.machine.reset();
        self.inner.not_permitted.store(0, Ordering::Relaxed);
        tracing::debug!(breaker = %self.inner.name, %from, "breaker reset to closed");
        self.inner.publisher.publish(&BreakerEvent::Reset {
            at: Instant::now(),
        });
    }

    /// Registers a consumer for one event kind.
    pub fn on_event<F>(&self, kind: EventKind, consumer: F)
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.inner.publisher.subscribe(kind, Arc::new(consumer));
    }

    /// Registers a catch-all consumer receiving every event.
    pub fn on_any_event<F>(&self, consumer: F)
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.inner.publisher.subscribe_any(Arc::new(consumer));
    }

    /// Attaches and returns a bounded ring retaining the most recent
    /// `capacity` events, for inspection without unbounded memory.
    pub fn retain_events(&self, capacity: usize) -> Arc<EventRing> {
        let ring = Arc::new(EventRing::new(capacity));
        let sink = Arc::clone(&ring);
        self.on_any_event(move |event| sink.push(event.clone()));
        ring
    }

    fn apply_forced(&self, target: Forced) -> bool {
        match self.inner.machine.force(target) {
            Some(transition) => {
                self.emit_transition(transition);
                true
            }
            None => false,
        }
    }

    fn emit_transition(&self, transition: Transition) {
        tracing::debug!(
            breaker = %self.inner.name,
            from = %transition.from,
            to = %transition.to,
            "state transition"
        );
        self.inner.publisher.publish(&BreakerEvent::StateTransition {
            from: transition.from,
            to: transition.to,
            at: Instant::now(),
        });
    }
}

// Cloning is cheap: the inner state is Arc'd and shared.
impl<E> Clone for CircuitBreaker<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(feature = "async")]
impl<E> CircuitBreaker<E>
where
    E: std::error::Error + 'static,
{
    /// Executes an async operation under the breaker: acquire permission,
    /// await, report.
    pub async fn call_async<F, Fut, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.try_acquire_permission() {
            return Err(BreakerError::NotPermitted);
        }

        let start = Instant::now();
        let result = f().await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => self.on_success(duration),
            Err(error) => self.on_error(duration, error),
        }

        result.map_err(BreakerError::Operation)
    }
}
