//! PromptWall Telemetry
//!
//! Decision logging and aggregation for PromptWall.
//!
//! Provides:
//! - [`ObservabilitySink`] with file-backed ([`LogService`]) and in-memory implementations
//! - Aggregate counts by time window, agent, and status
//! - In-process counters for the stats endpoint

pub mod metrics;
pub mod persistence;
pub mod record;
pub mod service;
pub mod sink;

pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use persistence::{LogReader, LogWriter, PersistenceConfig};
pub use record::{
    aggregate, Breakdown, GroupBy, LogQuery, LogRecord, MetricsQuery, MetricsSummary, StatusTally, TimeRange,
};
pub use service::LogService;
pub use sink::{InMemorySink, ObservabilitySink};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::MetricsCollector;
    pub use crate::record::{LogQuery, LogRecord, MetricsQuery, MetricsSummary};
    pub use crate::service::LogService;
    pub use crate::sink::{InMemorySink, ObservabilitySink};
}
