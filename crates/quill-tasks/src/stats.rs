//! In-process counters for the task service.
//!
//! Counters are updated with relaxed atomics from submitters and workers and
//! read as a point-in-time [`StatsSnapshot`]. Individual counters are exact;
//! a snapshot taken while work is in flight may be mid-update across fields.

use portable_atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ServiceStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    delivery_failures: AtomicU64,
}

impl ServiceStats {
    /// A job was placed on the queue.
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A job was answered with `ServiceShutdown` without running.
    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A job ran; `ok` tells whether the backend succeeded.
    pub(crate) fn record_outcome(&self, ok: bool) {
        if ok {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A result could not be handed to its caller.
    pub(crate) fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ServiceStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub delivery_failures: u64,
}

impl StatsSnapshot {
    /// Jobs that ran to an outcome, successful or not.
    pub const fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }
}
