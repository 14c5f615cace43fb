//! Execution metrics
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing the engine's work since construction.
///
/// All counters use Relaxed ordering; they are observational only and never
/// feed back into scheduling decisions.
#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    blocks_executed: AtomicU64,
    blocks_cancelled: AtomicU64,
    blocks_aborted: AtomicU64,
    transactions: AtomicU64,
    incarnations: AtomicU64,
    dependency_aborts: AtomicU64,
    validation_failures: AtomicU64,
    revalidations: AtomicU64,
    application_failures: AtomicU64,
    versions_published: AtomicU64,
    versions_removed: AtomicU64,
    keys_flushed: AtomicU64,
}

impl ExecutionMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// A block reached its final flush.
    pub fn record_block(&self, transactions: u64, keys_flushed: u64) {
        self.blocks_executed.fetch_add(1, Ordering::Relaxed);
        self.transactions.fetch_add(transactions, Ordering::Relaxed);
        self.keys_flushed.fetch_add(keys_flushed, Ordering::Relaxed);
    }

    pub fn increment_blocks_cancelled(&self) {
        self.blocks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_blocks_aborted(&self) {
        self.blocks_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// One execution attempt started.
    pub fn increment_incarnations(&self) {
        self.incarnations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dependency_aborts(&self) {
        self.dependency_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `count` cascaded re-validations.
    pub fn add_revalidations(&self, count: u64) {
        self.revalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_application_failures(&self) {
        self.application_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// One writeset published: `written` versions installed, `removed`
    /// left over from an earlier incarnation dropped.
    pub fn record_publication(&self, written: u64, removed: u64) {
        self.versions_published.fetch_add(written, Ordering::Relaxed);
        self.versions_removed.fetch_add(removed, Ordering::Relaxed);
    }

    /// Get all metrics as a JSON object string
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"{{"blocks_executed":{},"blocks_cancelled":{},"blocks_aborted":{},"transactions":{},"incarnations":{},"dependency_aborts":{},"validation_failures":{},"revalidations":{},"application_failures":{},"versions_published":{},"versions_removed":{},"keys_flushed":{}}}"#,
            s.blocks_executed,
            s.blocks_cancelled,
            s.blocks_aborted,
            s.transactions,
            s.incarnations,
            s.dependency_aborts,
            s.validation_failures,
            s.revalidations,
            s.application_failures,
            s.versions_published,
            s.versions_removed,
            s.keys_flushed,
        )
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_executed: self.blocks_executed.load(Ordering::Relaxed),
            blocks_cancelled: self.blocks_cancelled.load(Ordering::Relaxed),
            blocks_aborted: self.blocks_aborted.load(Ordering::Relaxed),
            transactions: self.transactions.load(Ordering::Relaxed),
            incarnations: self.incarnations.load(Ordering::Relaxed),
            dependency_aborts: self.dependency_aborts.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            application_failures: self.application_failures.load(Ordering::Relaxed),
            versions_published: self.versions_published.load(Ordering::Relaxed),
            versions_removed: self.versions_removed.load(Ordering::Relaxed),
            keys_flushed: self.keys_flushed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_executed: u64,
    pub blocks_cancelled: u64,
    pub blocks_aborted: u64,
    pub transactions: u64,
    pub incarnations: u64,
    pub dependency_aborts: u64,
    pub validation_failures: u64,
    pub revalidations: u64,
    pub application_failures: u64,
    pub versions_published: u64,
    pub versions_removed: u64,
    pub keys_flushed: u64,
}
