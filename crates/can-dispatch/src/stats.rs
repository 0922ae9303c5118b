use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-registry frame counters, updated from the receive context.
#[derive(Debug, Default)]
pub struct DispatchStats {
    delivered: AtomicU64,
    unmatched: AtomicU64,
    malformed: AtomicU64,
    stale: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub unmatched: u64,
    pub malformed: u64,
    pub stale: u64,
}

impl DispatchStats {
    pub(crate) fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unmatched(&self) {
        self.unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
        }
    }
}
