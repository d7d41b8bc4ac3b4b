//! Cleanup Metrics
//!
//! Thread-safe counters for monitoring retention cleanup runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Thread-safe metrics for tracking cleanup operations
#[derive(Debug, Clone)]
pub struct CleanupMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Records matched by a retention rule
    records_evaluated: AtomicUsize,
    /// Records deleted (or that would be, in dry-run)
    records_deleted: AtomicUsize,
    /// Records whose deletion failed
    records_failed: AtomicUsize,
    /// Artifact bytes freed
    bytes_freed: AtomicU64,
    /// Total duration in milliseconds
    total_duration_ms: AtomicU64,
}

impl Default for CleanupMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanupMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                records_evaluated: AtomicUsize::new(0),
                records_deleted: AtomicUsize::new(0),
                records_failed: AtomicUsize::new(0),
                bytes_freed: AtomicU64::new(0),
                total_duration_ms: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_evaluated(&self, count: usize) {
        self.inner
            .records_evaluated
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_deleted(&self) {
        self.inner.records_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.inner.records_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_freed(&self, bytes: u64) {
        self.inner.bytes_freed.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_duration_ms(&self, duration_ms: u64) {
        self.inner
            .total_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn records_evaluated(&self) -> usize {
        self.inner.records_evaluated.load(Ordering::Relaxed)
    }

    pub fn records_deleted(&self) -> usize {
        self.inner.records_deleted.load(Ordering::Relaxed)
    }

    pub fn records_failed(&self) -> usize {
        self.inner.records_failed.load(Ordering::Relaxed)
    }

    pub fn bytes_freed(&self) -> u64 {
        self.inner.bytes_freed.load(Ordering::Relaxed)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.inner.total_duration_ms.load(Ordering::Relaxed)
    }
}
