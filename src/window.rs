//! Sliding-window outcome tracking for circuit breakers.
//!
//! Each state that samples outcomes (closed, half-open) owns a [`Window`]: a
//! fixed-capacity ring of call outcomes where the oldest entry is overwritten
//! once the ring is full. Success/failure counts are maintained incrementally
//! next to the slots, so recording and reading are O(1) and never scan the
//! ring. Snapshots are eventually consistent with the true call order; the
//! threshold comparison is advisory and re-checked on every record.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Sentinel returned by [`Metrics::failure_rate`](crate::Metrics::failure_rate)
/// while the active ring buffer has not yet been filled since the state was
/// entered or last reset. Callers may branch on this exact value; it is never
/// reported as a zero rate.
pub const NO_DATA: f32 = -1.0;

const SLOT_EMPTY: u8 = 0;
const SLOT_SUCCESS: u8 = 1;
const SLOT_FAILURE: u8 = 2;

/// Fixed-capacity circular record of recent call outcomes.
///
/// Slots are claimed through an atomic cursor and updated with a single
/// `swap`, so concurrent recorders only ever contend on one slot. The counts
/// are adjusted from the evicted slot value, keeping `buffered` capped at
/// capacity without a lock.
pub(crate) struct Window {
    slots: Box<[AtomicU8]>,
    cursor: AtomicUsize,
    buffered: AtomicUsize,
    failed: AtomicUsize,
}

/// Post-update totals of a window, captured after a record or on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Totals {
    pub buffered: usize,
    pub failed: usize,
    pub capacity: usize,
}

impl Totals {
    /// True once the ring has received at least capacity-many outcomes.
    pub fn is_full(&self) -> bool {
        self.buffered >= self.capacity
    }

    /// Failure rate as a percentage, or [`NO_DATA`] until the ring is full.
    pub fn failure_rate(&self) -> f32 {
        if self.buffered == 0 || !self.is_full() {
            return NO_DATA;
        }
        (self.failed as f32 / self.buffered as f32) * 100.0
    }

    /// Totals of an empty window with zero capacity, used by states that do
    /// not sample outcomes.
    pub fn empty() -> Self {
        Totals {
            buffered: 0,
            failed: 0,
            capacity: 0,
        }
    }
}

impl Window {
    /// Creates an empty window. Capacity must be at least 1, enforced by
    /// configuration validation.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= 1);
        let slots = (0..capacity).map(|_| AtomicU8::new(SLOT_EMPTY)).collect();
        Self {
            slots,
            cursor: AtomicUsize::new(0),
            buffered: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Records one outcome, overwriting the oldest entry when full, and
    /// returns the totals as visible right after the update.
    pub fn record(&self, failure: bool) -> Totals {
        let index = self.cursor.fetch_add(1, Ordering::AcqRel) % self.slots.len();
        let value = if failure { SLOT_FAILURE } else { SLOT_SUCCESS };

        match self.slots[index].swap(value, Ordering::AcqRel) {
            SLOT_EMPTY => {
                self.buffered.fetch_add(1, Ordering::AcqRel);
            }
            SLOT_FAILURE => {
                self.failed.fetch_sub(1, Ordering::AcqRel);
            }
            _ => {}
        }
        if failure {
            self.failed.fetch_add(1, Ordering::AcqRel);
        }

        self.totals()
    }

    /// Current totals without recording.
    pub fn totals(&self) -> Totals {
        Totals {
            buffered: self.buffered.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            capacity: self.slots.len(),
        }
    }

    /// Clears the ring and counters back to empty.
    pub fn reset(&self) {
        for slot in self.slots.iter() {
            slot.store(SLOT_EMPTY, Ordering::Release);
        }
        self.cursor.store(0, Ordering::Release);
        self.buffered.store(0, Ordering::Release);
        self.failed.store(0, Ordering::Release);
    }
}
