//! Counters for bus traffic and handler failures.
//!
//! Every [`Bus`](crate::Bus) owns one [`BusMetrics`]. The counters are
//! relaxed atomics: they are monotonic tallies, not synchronization.
//!
//! ```ignore
//! let snapshot = smsg_bus::bus().metrics().snapshot();
//! println!("{} broadcasts, {} dropped", snapshot.events_published, snapshot.events_dropped);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Thread-safe counters for one bus.
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// `publish` calls that reached at least one listener
    pub events_published: AtomicU64,
    /// `publish` calls on a topic with no listeners
    pub events_dropped: AtomicU64,
    /// Individual broadcast handler runs
    pub deliveries: AtomicU64,
    /// Broadcast handler runs that failed
    pub broadcast_failures: AtomicU64,
    /// `invoke` calls that scheduled a handler
    pub calls_deferred: AtomicU64,
    /// `invoke_sync` calls that ran a handler
    pub calls_sync: AtomicU64,
    /// Call handler runs that failed
    pub call_failures: AtomicU64,
    /// `invoke`/`invoke_sync` on a topic without a handler
    pub calls_unhandled: AtomicU64,
    /// `register` calls refused because the slot was taken
    pub duplicate_registrations: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_publish(&self, delivered: usize, failed: usize) {
        if delivered == 0 {
            self.events_dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.events_published.fetch_add(1, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
        self.broadcast_failures
            .fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred_call(&self) {
        self.calls_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sync_call(&self) {
        self.calls_sync.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_call_failure(&self) {
        self.call_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unhandled_call(&self) {
        self.calls_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate_registration(&self) {
        self.duplicate_registrations.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures.load(Ordering::Relaxed),
            calls_deferred: self.calls_deferred.load(Ordering::Relaxed),
            calls_sync: self.calls_sync.load(Ordering::Relaxed),
            call_failures: self.call_failures.load(Ordering::Relaxed),
            calls_unhandled: self.calls_unhandled.load(Ordering::Relaxed),
            duplicate_registrations: self.duplicate_registrations.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`BusMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMetricsSnapshot {
    pub events_published: u64,
    pub events_dropped: u64,
    pub deliveries: u64,
    pub broadcast_failures: u64,
    pub calls_deferred: u64,
    pub calls_sync: u64,
    pub call_failures: u64,
    pub calls_unhandled: u64,
    pub duplicate_registrations: u64,
}

impl BusMetricsSnapshot {
    /// Handler runs of either channel that completed without failing.
    pub fn successful_handler_runs(&self) -> u64 {
        let runs = self
            .deliveries
            .saturating_add(self.calls_deferred)
            .saturating_add(self.calls_sync);
        runs.saturating_sub(self.broadcast_failures.saturating_add(self.call_failures))
    }
}
