//! In-process decision counters

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use promptwall_core::DecisionStatus;
use serde::Serialize;

/// Cheap-to-clone counters shared by the pipeline and the `/stats` route
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    total_decisions: AtomicU64,
    allowed: AtomicU64,
    redacted: AtomicU64,
    blocked: AtomicU64,
    oracle_failures: AtomicU64,
    sink_failures: AtomicU64,
    engine_warnings: AtomicU64,
    total_latency_us: AtomicU64,
    classifier_latency_us: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished decision and its end-to-end latency
    pub fn record_decision(&self, status: DecisionStatus, latency_us: u64) {
        let inner = &self.inner;
        inner.total_decisions.fetch_add(1, Ordering::Relaxed);
        inner.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);

        let counter = match status {
            DecisionStatus::Allowed => &inner.allowed,
            DecisionStatus::Redacted => &inner.redacted,
            DecisionStatus::Blocked => &inner.blocked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classifier_latency(&self, latency_us: u64) {
        self.inner
            .classifier_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_oracle_failure(&self) {
        self.inner.oracle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.inner.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_engine_warnings(&self, count: u64) {
        self.inner.engine_warnings.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            total_decisions: inner.total_decisions.load(Ordering::Relaxed),
            allowed: inner.allowed.load(Ordering::Relaxed),
            redacted: inner.redacted.load(Ordering::Relaxed),
            blocked: inner.blocked.load(Ordering::Relaxed),
            oracle_failures: inner.oracle_failures.load(Ordering::Relaxed),
            sink_failures: inner.sink_failures.load(Ordering::Relaxed),
            engine_warnings: inner.engine_warnings.load(Ordering::Relaxed),
            total_latency_us: inner.total_latency_us.load(Ordering::Relaxed),
            classifier_latency_us: inner.classifier_latency_us.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_decisions: u64,
    pub allowed: u64,
    pub redacted: u64,
    pub blocked: u64,
    pub oracle_failures: u64,
    pub sink_failures: u64,
    pub engine_warnings: u64,
    pub total_latency_us: u64,
    pub classifier_latency_us: u64,
}

impl MetricsSnapshot {
    pub fn avg_latency_us(&self) -> u64 {
        if self.total_decisions == 0 {
            0
        } else {
            self.total_latency_us / self.total_decisions
        }
    }

    pub fn block_rate(&self) -> f64 {
        if self.total_decisions == 0 {
            0.0
        } else {
            self.blocked as f64 / self.total_decisions as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        let metrics = MetricsCollector::new();

        metrics.record_decision(DecisionStatus::Allowed, 1000);
        metrics.record_decision(DecisionStatus::Blocked, 3000);
        metrics.record_sink_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_decisions, 2);
        assert_eq!(snapshot.blocked, 1);
        assert_eq!(snapshot.sink_failures, 1);
        assert_eq!(snapshot.avg_latency_us(), 2000);
        assert!((snapshot.block_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = MetricsCollector::new();
        let clone = metrics.clone();
        clone.record_decision(DecisionStatus::Redacted, 10);
        assert_eq!(metrics.snapshot().redacted, 1);
    }
}
