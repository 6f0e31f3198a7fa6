//! Observability sink
//!
//! Append-only recorder of decisions plus the queries dashboards read.

use std::collections::VecDeque;

use parking_lot::RwLock;
use promptwall_core::{Decision, Result};

use crate::record::{aggregate, recent, LogQuery, LogRecord, MetricsQuery, MetricsSummary};

/// Destination for decision records
pub trait ObservabilitySink: Send + Sync {
    /// Persist one record. Implementations may buffer; an `Err` means the
    /// record was lost.
    fn append(&self, record: LogRecord) -> Result<()>;

    /// Aggregate counts over a time window
    fn query(&self, query: &MetricsQuery) -> Result<MetricsSummary>;

    /// Most recent records first
    fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>>;

    /// Record a decision made for `agent_id`
    fn record(&self, decision: &Decision, agent_id: Option<&str>) -> Result<()> {
        self.append(LogRecord::from_decision(decision, agent_id))
    }
}

/// Bounded in-process sink; the oldest records are dropped once full
#[derive(Debug)]
pub struct InMemorySink {
    records: RwLock<VecDeque<LogRecord>>,
    capacity: usize,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Copy of every stored record, oldest first
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.read().iter().cloned().collect()
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservabilitySink for InMemorySink {
    fn append(&self, record: LogRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }

    fn query(&self, query: &MetricsQuery) -> Result<MetricsSummary> {
        Ok(aggregate(self.records.read().iter(), query))
    }

    fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogRecord>> {
        Ok(recent(self.records.read().iter().cloned(), query))
    }
}
