//! Service metrics, served as JSON on `/metrics`.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

use rng_coordinator::CoordinatorEvent;

/// Aggregated metrics for the coordinator service.
///
/// Thread-safe via atomics; cloneable via `Arc<Metrics>`.
#[derive(Default)]
pub struct Metrics {
    /// Requests accepted and stored.
    pub requests_received: AtomicU64,
    /// Requests whose words have been stored.
    pub requests_fulfilled: AtomicU64,
    /// Deliveries skipped as unknown, already fulfilled or malformed.
    pub fulfillments_skipped: AtomicU64,
    /// Calls refused with an error.
    pub calls_rejected: AtomicU64,
    /// Attached values handed back to the sender's rail.
    pub refunds_returned: AtomicU64,
    /// Attached values that ended up held.
    pub refunds_held: AtomicU64,
    /// Payouts the rail gave up on.
    pub payouts_failed: AtomicU64,
    /// Push-mode hook failures, in-process or over HTTP.
    pub hook_failures: AtomicU64,
    /// Sum of fulfillment latencies in milliseconds (for computing average).
    pub fulfillment_latency_sum_ms: AtomicU64,
    /// Number of fulfilled requests contributing to latency sum.
    pub fulfillment_count: AtomicU64,
}

impl Metrics {
    /// Create a new zeroed metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update counters from events drained after a coordinator call.
    pub fn observe(&self, event: &CoordinatorEvent) {
        let counter = match event {
            CoordinatorEvent::RandomRequested(_) => &self.requests_received,
            CoordinatorEvent::RandomWordsFulfilled(_) => &self.requests_fulfilled,
            CoordinatorEvent::ValueRefunded(_) => &self.refunds_returned,
            CoordinatorEvent::RefundFailed(_) => &self.refunds_held,
            CoordinatorEvent::ConsumerHookFailed(_) => &self.hook_failures,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the oracle round trip of a fulfilled request.
    pub fn record_latency(&self, latency_ms: u64) {
        self.fulfillment_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.fulfillment_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.fulfillments_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.calls_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_payout_failure(&self) {
        self.payouts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hook_failure(&self) {
        self.hook_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Compute average fulfillment latency in milliseconds, or 0 if none.
    pub fn avg_latency_ms(&self) -> u64 {
        let count = self.fulfillment_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.fulfillment_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Serialize metrics as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "requests_received": self.requests_received.load(Ordering::Relaxed),
            "requests_fulfilled": self.requests_fulfilled.load(Ordering::Relaxed),
            "fulfillments_skipped": self.fulfillments_skipped.load(Ordering::Relaxed),
            "calls_rejected": self.calls_rejected.load(Ordering::Relaxed),
            "refunds_returned": self.refunds_returned.load(Ordering::Relaxed),
            "refunds_held": self.refunds_held.load(Ordering::Relaxed),
            "payouts_failed": self.payouts_failed.load(Ordering::Relaxed),
            "hook_failures": self.hook_failures.load(Ordering::Relaxed),
            "avg_fulfillment_latency_ms": self.avg_latency_ms(),
            "fulfillment_count": self.fulfillment_count.load(Ordering::Relaxed),
        })
    }
}
