//! Process-wide counters for one engine handle.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotone counters accumulated across runs. Reset only with the handle.
#[derive(Debug, Default)]
pub struct Metrics {
    pub files_discovered: AtomicU64,
    pub files_filtered_out: AtomicU64,
    pub files_processed: AtomicU64,
    pub bytes_read: AtomicU64,
    pub fuzzy_searches: AtomicU64,
    pub near_evaluations: AtomicU64,
    pub regex_compiles: AtomicU64,
    pub backpressure_pauses: AtomicU64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_discovered: self.files_discovered.load(Ordering::Relaxed),
            files_filtered_out: self.files_filtered_out.load(Ordering::Relaxed),
            files_processed: self.files_processed.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            fuzzy_searches: self.fuzzy_searches.load(Ordering::Relaxed),
            near_evaluations: self.near_evaluations.load(Ordering::Relaxed),
            regex_compiles: self.regex_compiles.load(Ordering::Relaxed),
            backpressure_pauses: self.backpressure_pauses.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        Self::add(counter, 1);
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub files_discovered: u64,
    pub files_filtered_out: u64,
    pub files_processed: u64,
    pub bytes_read: u64,
    pub fuzzy_searches: u64,
    pub near_evaluations: u64,
    pub regex_compiles: u64,
    pub backpressure_pauses: u64,
}
