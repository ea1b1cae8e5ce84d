//! Counters for monitoring a billing session.
//!
//! # Example
//!
//! ```rust
//! use billing_bridge::metrics::BillingMetrics;
//!
//! let metrics = BillingMetrics::new();
//! metrics.record_purchase_started();
//! metrics.record_purchase_succeeded();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.purchases_started, 1);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Collected metrics for billing operations.
///
/// Thread-safe via atomic operations.
#[derive(Debug)]
pub struct BillingMetrics {
    // Purchase flow
    purchases_started: AtomicU64,
    purchases_succeeded: AtomicU64,
    purchases_failed: AtomicU64,
    purchases_rejected_busy: AtomicU64,
    activity_results_ignored: AtomicU64,

    // Consume flow
    consumes_requested: AtomicU64,
    consumes_succeeded: AtomicU64,
    consumes_failed: AtomicU64,

    // Queries
    owned_queries: AtomicU64,
    catalog_batches: AtomicU64,
    catalog_failures: AtomicU64,

    // Connection
    connection_changes: AtomicU64,
    service_unavailable: AtomicU64,

    start_time: Instant,
}

impl Default for BillingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingMetrics {
    pub fn new() -> Self {
        Self {
            purchases_started: AtomicU64::new(0),
            purchases_succeeded: AtomicU64::new(0),
            purchases_failed: AtomicU64::new(0),
            purchases_rejected_busy: AtomicU64::new(0),
            activity_results_ignored: AtomicU64::new(0),
            consumes_requested: AtomicU64::new(0),
            consumes_succeeded: AtomicU64::new(0),
            consumes_failed: AtomicU64::new(0),
            owned_queries: AtomicU64::new(0),
            catalog_batches: AtomicU64::new(0),
            catalog_failures: AtomicU64::new(0),
            connection_changes: AtomicU64::new(0),
            service_unavailable: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    // === Purchase ===

    pub fn record_purchase_started(&self) {
        self.purchases_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purchase_succeeded(&self) {
        self.purchases_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_purchase_failed(&self) {
        self.purchases_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a purchase rejected because the pending table was full.
    pub fn record_purchase_rejected_busy(&self) {
        self.purchases_rejected_busy.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an activity result whose tag matched no pending purchase.
    pub fn record_activity_result_ignored(&self) {
        self.activity_results_ignored.fetch_add(1, Ordering::Relaxed);
    }

    // === Consume ===

    pub fn record_consume_requested(&self) {
        self.consumes_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_consume_succeeded(&self) {
        self.consumes_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_consume_failed(&self) {
        self.consumes_failed.fetch_add(1, Ordering::Relaxed);
    }

    // === Queries ===

    pub fn record_owned_query(&self) {
        self.owned_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_catalog_batch(&self) {
        self.catalog_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_catalog_failure(&self) {
        self.catalog_failures.fetch_add(1, Ordering::Relaxed);
    }

    // === Connection ===

    pub fn record_connection_change(&self) {
        self.connection_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an operation that found no connection handle.
    pub fn record_service_unavailable(&self) {
        self.service_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),

            purchases_started: self.purchases_started.load(Ordering::Relaxed),
            purchases_succeeded: self.purchases_succeeded.load(Ordering::Relaxed),
            purchases_failed: self.purchases_failed.load(Ordering::Relaxed),
            purchases_rejected_busy: self.purchases_rejected_busy.load(Ordering::Relaxed),
            activity_results_ignored: self.activity_results_ignored.load(Ordering::Relaxed),

            consumes_requested: self.consumes_requested.load(Ordering::Relaxed),
            consumes_succeeded: self.consumes_succeeded.load(Ordering::Relaxed),
            consumes_failed: self.consumes_failed.load(Ordering::Relaxed),

            owned_queries: self.owned_queries.load(Ordering::Relaxed),
            catalog_batches: self.catalog_batches.load(Ordering::Relaxed),
            catalog_failures: self.catalog_failures.load(Ordering::Relaxed),

            connection_changes: self.connection_changes.load(Ordering::Relaxed),
            service_unavailable: self.service_unavailable.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.purchases_started.store(0, Ordering::Relaxed);
        self.purchases_succeeded.store(0, Ordering::Relaxed);
        self.purchases_failed.store(0, Ordering::Relaxed);
        self.purchases_rejected_busy.store(0, Ordering::Relaxed);
        self.activity_results_ignored.store(0, Ordering::Relaxed);

        self.consumes_requested.store(0, Ordering::Relaxed);
        self.consumes_succeeded.store(0, Ordering::Relaxed);
        self.consumes_failed.store(0, Ordering::Relaxed);

        self.owned_queries.store(0, Ordering::Relaxed);
        self.catalog_batches.store(0, Ordering::Relaxed);
        self.catalog_failures.store(0, Ordering::Relaxed);

        self.connection_changes.store(0, Ordering::Relaxed);
        self.service_unavailable.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of all metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the collector was created.
    pub uptime_secs: u64,

    pub purchases_started: u64,
    pub purchases_succeeded: u64,
    pub purchases_failed: u64,
    pub purchases_rejected_busy: u64,
    pub activity_results_ignored: u64,

    pub consumes_requested: u64,
    pub consumes_succeeded: u64,
    pub consumes_failed: u64,

    pub owned_queries: u64,
    pub catalog_batches: u64,
    pub catalog_failures: u64,

    pub connection_changes: u64,
    pub service_unavailable: u64,
}

impl MetricsSnapshot {
    /// Purchase success rate over finished flows (0.0 to 1.0).
    pub fn purchase_success_rate(&self) -> f64 {
        let finished = self.purchases_succeeded + self.purchases_failed;
        if finished == 0 {
            return 1.0;
        }
        self.purchases_succeeded as f64 / finished as f64
    }

    pub fn total_failures(&self) -> u64 {
        self.purchases_failed + self.consumes_failed + self.catalog_failures
    }

    /// Format as JSON for logging/monitoring.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = BillingMetrics::new();

        metrics.record_purchase_started();
        metrics.record_purchase_started();
        metrics.record_purchase_succeeded();
        metrics.record_purchase_rejected_busy();
        metrics.record_consume_requested();
        metrics.record_catalog_batch();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.purchases_started, 2);
        assert_eq!(snapshot.purchases_succeeded, 1);
        assert_eq!(snapshot.purchases_rejected_busy, 1);
        assert_eq!(snapshot.consumes_requested, 1);
        assert_eq!(snapshot.catalog_batches, 1);
    }

    #[test]
    fn test_success_rate() {
        let snapshot = MetricsSnapshot {
            purchases_succeeded: 3,
            purchases_failed: 1,
            ..Default::default()
        };
        assert!((snapshot.purchase_success_rate() - 0.75).abs() < 0.001);
        assert_eq!(MetricsSnapshot::default().purchase_success_rate(), 1.0);
    }

    #[test]
    fn test_reset() {
        let metrics = BillingMetrics::new();
        metrics.record_owned_query();
        metrics.record_service_unavailable();

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.owned_queries, 0);
        assert_eq!(snapshot.service_unavailable, 0);
    }

    #[test]
    fn test_to_json() {
        let metrics = BillingMetrics::new();
        metrics.record_consume_failed();
        let json: serde_json::Value = serde_json::from_str(&metrics.snapshot().to_json()).unwrap();
        assert_eq!(json["consumes_failed"], 1);
    }
}
