//! Subscription performance tracker.
//!
//! Counts lifecycle events with lock-free atomics. The registry notifies the
//! tracker on every registration; the lifecycle, revalidation and sweeper
//! paths record removals and rate limiting. A snapshot is returned as the
//! `performance_stats` of the caller-facing stats endpoint, so it carries
//! process-wide totals only, never per-user data.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide subscription counters.
#[derive(Debug, Default)]
pub struct SubscriptionMetrics {
    established: AtomicU64,
    terminated: AtomicU64,
    revalidations: AtomicU64,
    rate_limited: AtomicU64,
    evicted_on_revalidation: AtomicU64,
    evicted_stale: AtomicU64,
}

/// Snapshot of [`SubscriptionMetrics`] at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerformanceSnapshot {
    pub established_total: u64,
    pub terminated_total: u64,
    pub revalidations_total: u64,
    pub rate_limited_total: u64,
    pub evicted_on_revalidation_total: u64,
    pub evicted_stale_total: u64,
}

impl SubscriptionMetrics {
    /// Create a new shared tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_established(&self) {
        self.established.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminated(&self, count: u64) {
        self.terminated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_revalidation(&self) {
        self.revalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted_on_revalidation(&self) {
        self.evicted_on_revalidation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted_stale(&self, count: u64) {
        self.evicted_stale.fetch_add(count, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            established_total: self.established.load(Ordering::Relaxed),
            terminated_total: self.terminated.load(Ordering::Relaxed),
            revalidations_total: self.revalidations.load(Ordering::Relaxed),
            rate_limited_total: self.rate_limited.load(Ordering::Relaxed),
            evicted_on_revalidation_total: self.evicted_on_revalidation.load(Ordering::Relaxed),
            evicted_stale_total: self.evicted_stale.load(Ordering::Relaxed),
        }
    }
}
