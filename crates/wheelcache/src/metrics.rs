//! Atomic counters queried on demand — a plain queryable snapshot rather
//! than an emitted log line, since this crate carries no `tracing`/`log`
//! dependency.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated on the hot path. Not constructible outside this
/// crate; read through [`Metrics::snapshot`].
#[derive(Debug, Default)]
pub struct Metrics {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) loads: AtomicU64,
    pub(crate) load_coalesced: AtomicU64,
    pub(crate) expirations: AtomicU64,
    pub(crate) wheel_ticks: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_load(&self, coalesced: bool) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        if coalesced {
            self.load_coalesced.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_expirations(&self, count: u64) {
        if count > 0 {
            self.expirations.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_wheel_tick(&self) {
        self.wheel_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshots every counter with a relaxed load — these are diagnostic
    /// aggregates, not used for synchronization.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_coalesced: self.load_coalesced.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            wheel_ticks: self.wheel_ticks.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`Metrics`], returned by `Cache::metrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_coalesced: u64,
    pub expirations: u64,
    pub wheel_ticks: u64,
}
