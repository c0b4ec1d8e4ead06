//! Circuit breaker state machine.
//!
//! The machine keeps the per-state data in a private tagged union, so a
//! state can never carry another state's buffer or deadline. The hot path
//! (permission checks, outcome records) only takes the read lock; every
//! transition takes the write lock and re-verifies the expected variant, so
//! exactly one racer wins a transition and losers observe the new state.
//! There are no internal timers: the open-state deadline is checked on the
//! permission path of whichever caller arrives.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::window::{Totals, Window};

/// The possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Normal operation: calls are permitted and every outcome is recorded.
    Closed,

    /// Calls are denied until the configured wait duration has elapsed.
    Open,

    /// A limited number of probe calls are permitted to sample recovery.
    HalfOpen,

    /// Administrative: all calls permitted, nothing recorded, no automatic
    /// transitions.
    Disabled,

    /// Administrative: all calls denied, never times out.
    ForcedOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half_open",
            State::Disabled => "disabled",
            State::ForcedOpen => "forced_open",
        };
        f.write_str(name)
    }
}

/// A state change that actually happened, reported to the caller so exactly
/// one transition event is emitted per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub from: State,
    pub to: State,
}

/// Valid targets for administrative transitions.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Forced {
    Closed,
    Disabled,
    ForcedOpen,
}

/// Outcome of a permission check.
pub(crate) enum Acquire {
    Permitted,
    /// Permitted, and this caller won the open-to-half-open race. The caller
    /// already holds one of the probe permits.
    PermittedWithTransition(Transition),
    Denied,
}

enum Inner {
    Closed { window: Window },
    Open { opened_at: Instant },
    HalfOpen { window: Window, permits: AtomicI64 },
    Disabled,
    ForcedOpen,
}

impl Inner {
    fn tag(&self) -> State {
        match self {
            Inner::Closed { .. } => State::Closed,
            Inner::Open { .. } => State::Open,
            Inner::HalfOpen { .. } => State::HalfOpen,
            Inner::Disabled => State::Disabled,
            Inner::ForcedOpen => State::ForcedOpen,
        }
    }
}

pub(crate) struct StateMachine {
    inner: RwLock<Inner>,
    failure_rate_threshold: f32,
    wait_in_open: Duration,
    closed_buffer_size: usize,
    half_open_buffer_size: usize,
}

impl StateMachine {
    pub fn new(
        failure_rate_threshold: f32,
        wait_in_open: Duration,
        closed_buffer_size: usize,
        half_open_buffer_size: usize,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner::Closed {
                window: Window::new(closed_buffer_size),
            }),
            failure_rate_threshold,
            wait_in_open,
            closed_buffer_size,
            half_open_buffer_size,
        }
    }

    pub fn current(&self) -> State {
        self.inner.read().tag()
    }

    /// Totals of the active window; empty for states without one.
    pub fn totals(&self) -> Totals {
        match &*self.inner.read() {
            Inner::Closed { window } | Inner::HalfOpen { window, .. } => window.totals(),
            _ => Totals::empty(),
        }
    }

    /// Decides whether one call may proceed right now.
    pub fn try_acquire(&self) -> Acquire {
        loop {
            {
                let inner = self.inner.read();
                match &*inner {
                    Inner::Closed { .. } | Inner::Disabled => return Acquire::Permitted,
                    Inner::ForcedOpen => return Acquire::Denied,
                    Inner::HalfOpen { permits, .. } => {
                        return if take_permit(permits) {
                            Acquire::Permitted
                        } else {
                            Acquire::Denied
                        };
                    }
                    Inner::Open { opened_at } => {
                        if opened_at.elapsed() < self.wait_in_open {
                            return Acquire::Denied;
                        }
                        // Deadline passed; race for the transition below.
                    }
                }
            }

            let mut inner = self.inner.write();
            if let Inner::Open { opened_at } = &*inner {
                if opened_at.elapsed() >= self.wait_in_open {
                    // The winner consumes the first probe permit itself.
                    *inner = Inner::HalfOpen {
                        window: Window::new(self.half_open_buffer_size),
                        permits: AtomicI64::new(self.half_open_buffer_size as i64 - 1),
                    };
                    return Acquire::PermittedWithTransition(Transition {
                        from: State::Open,
                        to: State::HalfOpen,
                    });
                }
            }
            // Lost the race; re-evaluate under whatever state won.
        }
    }

    /// Records one classified outcome into the active window and applies any
    /// threshold-driven transition. Outcomes reported while the state owns
    /// no window are dropped.
    pub fn on_outcome(&self, failure: bool) -> Option<Transition> {
        enum Pending {
            TripOpen,
            Resolve { reopen: bool },
        }

        let pending = {
            let inner = self.inner.read();
            match &*inner {
                Inner::Closed { window } => {
                    let totals = window.record(failure);
                    if totals.is_full() && totals.failure_rate() >= self.failure_rate_threshold {
                        Some(Pending::TripOpen)
                    } else {
                        None
                    }
                }
                Inner::HalfOpen { window, .. } => {
                    let totals = window.record(failure);
                    if totals.is_full() {
                        Some(Pending::Resolve {
                            reopen: totals.failure_rate() >= self.failure_rate_threshold,
                        })
                    } else {
                        None
                    }
                }
                _ => None,
            }
        }?;

        let mut inner = self.inner.write();
        match (pending, inner.tag()) {
            (Pending::TripOpen, State::Closed) => {
                *inner = Inner::Open {
                    opened_at: Instant::now(),
                };
                Some(Transition {
                    from: State::Closed,
                    to: State::Open,
                })
            }
            (Pending::Resolve { reopen: true }, State::HalfOpen) => {
                *inner = Inner::Open {
                    opened_at: Instant::now(),
                };
                Some(Transition {
                    from: State::HalfOpen,
                    to: State::Open,
                })
            }
            (Pending::Resolve { reopen: false }, State::HalfOpen) => {
                *inner = Inner::Closed {
                    window: Window::new(self.closed_buffer_size),
                };
                Some(Transition {
                    from: State::HalfOpen,
                    to: State::Closed,
                })
            }
            // A racing thread already applied the transition.
            _ => None,
        }
    }

    /// Returns a probe permit taken by a call whose outcome was classified
    /// as ignored, so ignored probes cannot strand the half-open state.
    pub fn release_permit(&self) {
        if let Inner::HalfOpen { permits, .. } = &*self.inner.read() {
            permits.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Applies an administrative transition. Returns `None` when the breaker
    /// is already in the target state.
    pub fn force(&self, target: Forced) -> Option<Transition> {
        let mut inner = self.inner.write();
        let from = inner.tag();
        let (next, to) = match target {
            Forced::Closed => (
                Inner::Closed {
                    window: Window::new(self.closed_buffer_size),
                },
                State::Closed,
            ),
            Forced::Disabled => (Inner::Disabled, State::Disabled),
            Forced::ForcedOpen => (Inner::ForcedOpen, State::ForcedOpen),
        };
        if from == to {
            return None;
        }
        *inner = next;
        Some(Transition { from, to })
    }

    /// Discards all history and returns to closed with a fresh window,
    /// regardless of the current state. Returns the state left behind.
    pub fn reset(&self) -> State {
        let mut inner = self.inner.write();
        let from = inner.tag();
        *inner = Inner::Closed {
            window: Window::new(self.closed_buffer_size),
        };
        from
    }
}

fn take_permit(permits: &AtomicI64) -> bool {
    let mut available = permits.load(Ordering::Acquire);
    loop {
        if available <= 0 {
            return false;
        }
        match permits.compare_exchange_weak(
            available,
            available - 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return true,
            Err(actual) => available = actual,
        }
    }
}
