//! Typed lifecycle and outcome events with per-breaker fan-out.
//!
//! Delivery is synchronous on the thread that produced the event, in the
//! order events are produced for that breaker. A slow consumer therefore
//! delays the caller that triggered the event; that cost is deliberate and
//! caller-visible. A panicking consumer is isolated and logged so it can
//! never corrupt breaker state or starve the remaining consumers.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::state::State;

/// Subscription key for [`BreakerEvent`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A permitted call completed successfully.
    Success,
    /// A permitted call failed and the failure was recorded.
    Error,
    /// A permitted call failed but the error kind is excluded from the
    /// failure rate.
    IgnoredError,
    /// A permission check was denied.
    NotPermitted,
    /// The breaker moved from one state to another.
    StateTransition,
    /// The breaker was reset to closed with all metrics discarded.
    Reset,
}

/// A single event produced by a circuit breaker.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// A recorded success, with the duration measured by the caller.
    Success {
        /// Elapsed duration of the protected call.
        duration: Duration,
        /// When the outcome was reported.
        at: Instant,
    },
    /// A recorded failure.
    Error {
        /// Elapsed duration of the protected call.
        duration: Duration,
        /// When the outcome was reported.
        at: Instant,
    },
    /// A failure excluded from the failure rate by classification.
    IgnoredError {
        /// Elapsed duration of the protected call.
        duration: Duration,
        /// When the outcome was reported.
        at: Instant,
    },
    /// A denied permission check.
    NotPermitted {
        /// When the check was denied.
        at: Instant,
    },
    /// A state transition, automatic or administrative.
    StateTransition {
        /// State before the transition.
        from: State,
        /// State after the transition.
        to: State,
        /// When the transition was applied.
        at: Instant,
    },
    /// A reset back to the closed state.
    Reset {
        /// When the reset was applied.
        at: Instant,
    },
}

impl BreakerEvent {
    /// The subscription key this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            BreakerEvent::Success { .. } => EventKind::Success,
            BreakerEvent::Error { .. } => EventKind::Error,
            BreakerEvent::IgnoredError { .. } => EventKind::IgnoredError,
            BreakerEvent::NotPermitted { .. } => EventKind::NotPermitted,
            BreakerEvent::StateTransition { .. } => EventKind::StateTransition,
            BreakerEvent::Reset { .. } => EventKind::Reset,
        }
    }

    /// When the event was produced.
    pub fn timestamp(&self) -> Instant {
        match self {
            BreakerEvent::Success { at, .. }
            | BreakerEvent::Error { at, .. }
            | BreakerEvent::IgnoredError { at, .. }
            | BreakerEvent::NotPermitted { at }
            | BreakerEvent::StateTransition { at, .. }
            | BreakerEvent::Reset { at } => *at,
        }
    }

    /// Elapsed call duration for call outcome events.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            BreakerEvent::Success { duration, .. }
            | BreakerEvent::Error { duration, .. }
            | BreakerEvent::IgnoredError { duration, .. } => Some(*duration),
            _ => None,
        }
    }

    /// Previous and new state for transition events.
    pub fn transition(&self) -> Option<(State, State)> {
        match self {
            BreakerEvent::StateTransition { from, to, .. } => Some((*from, *to)),
            _ => None,
        }
    }
}

type Consumer = Arc<dyn Fn(&BreakerEvent) + Send + Sync + 'static>;
type Consumers = SmallVec<[Consumer; 2]>;

/// Per-breaker fan-out of events to registered consumers.
pub(crate) struct EventPublisher {
    success: RwLock<Consumers>,
    error: RwLock<Consumers>,
    ignored_error: RwLock<Consumers>,
    not_permitted: RwLock<Consumers>,
    state_transition: RwLock<Consumers>,
    reset: RwLock<Consumers>,
    any: RwLock<Consumers>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            success: RwLock::new(SmallVec::new()),
            error: RwLock::new(SmallVec::new()),
            ignored_error: RwLock::new(SmallVec::new()),
            not_permitted: RwLock::new(SmallVec::new()),
            state_transition: RwLock::new(SmallVec::new()),
            reset: RwLock::new(SmallVec::new()),
            any: RwLock::new(SmallVec::new()),
        }
    }

    fn list(&self, kind: EventKind) -> &RwLock<Consumers> {
        match kind {
            EventKind::Success => &self.success,
            EventKind::Error => &self.error,
            EventKind::IgnoredError => &self.ignored_error,
            EventKind::NotPermitted => &self.not_permitted,
            EventKind::StateTransition => &self.state_transition,
            EventKind::Reset => &self.reset,
        }
    }

    pub fn subscribe(&self, kind: EventKind, consumer: Consumer) {
        self.list(kind).write().push(consumer);
    }

    pub fn subscribe_any(&self, consumer: Consumer) {
        self.any.write().push(consumer);
    }

    /// Delivers the event to the kind-specific consumers, then the catch-all
    /// consumers, on the calling thread. The lists are snapshotted before
    /// delivery so a consumer may subscribe without deadlocking.
    pub fn publish(&self, event: &BreakerEvent) {
        let targets: Consumers = {
            let kind = self.list(event.kind()).read();
            let any = self.any.read();
            kind.iter().chain(any.iter()).cloned().collect()
        };

        for consumer in targets {
            if catch_unwind(AssertUnwindSafe(|| consumer(event))).is_err() {
                tracing::warn!(kind = ?event.kind(), "event consumer panicked; continuing delivery");
            }
        }
    }
}

/// A bounded circular record of the most recent events.
///
/// Attached as a catch-all consumer, it retains at most its capacity of
/// events, overwriting the oldest. Useful for inspection without unbounded
/// retention and independent of the live subscription fan-out.
pub struct EventRing {
    events: Mutex<VecDeque<BreakerEvent>>,
    capacity: usize,
}

impl EventRing {
    /// Creates an empty ring retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Appends an event, dropping the oldest when the ring is full.
    pub fn push(&self, event: BreakerEvent) {
        let mut events = self.events.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// The retained events, oldest first.
    pub fn events(&self) -> Vec<BreakerEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when no events are retained.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Maximum number of retained events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
