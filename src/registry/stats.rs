use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Point-in-time view of a registry's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Entries currently stored, expired ones included.
    pub entries: usize,
    /// Entries whose subscriber is still alive.
    pub live: usize,
    /// Completed notify passes.
    pub notifications: u64,
    /// Callbacks invoked across all passes.
    pub delivered: u64,
    /// Expired entries removed by sweeps.
    pub reclaimed: u64,
    /// When the last notify pass started.
    pub last_notified_at: Option<DateTime<Utc>>,
}

/// Outcome of one notify pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    /// Subscribers whose callback ran.
    pub delivered: usize,
    /// Expired entries encountered during the walk.
    pub expired: usize,
    /// Expired entries removed by this pass.
    pub reclaimed: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    notifications: AtomicU64,
    delivered: AtomicU64,
    reclaimed: AtomicU64,
    last_notified_at: Mutex<Option<DateTime<Utc>>>,
}

impl StatsCounters {
    pub(crate) fn record_notify(&self, started_at: DateTime<Utc>, report: &NotifyReport) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.record_reclaimed(report.reclaimed);

        let mut last = self.last_notified_at.lock();
        if last.map_or(true, |prev| prev < started_at) {
            *last = Some(started_at);
        }
    }

    pub(crate) fn record_reclaimed(&self, count: usize) {
        if count > 0 {
            self.reclaimed.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, entries: usize, live: usize) -> RegistryStats {
        RegistryStats {
            entries,
            live,
            notifications: self.notifications.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            last_notified_at: *self.last_notified_at.lock(),
        }
    }
}
