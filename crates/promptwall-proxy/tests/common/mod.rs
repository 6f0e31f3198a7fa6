//! Mock oracles and sinks shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use promptwall_classifiers::IntentClassifier;
use promptwall_core::{Error, Result};
use promptwall_policy::{InMemoryPolicyStore, PolicyCatalog};
use promptwall_proxy::{FragmentStream, GenerationOracle};
use promptwall_telemetry::{LogQuery, LogRecord, MetricsQuery, MetricsSummary, ObservabilitySink};

/// Classifier returning a fixed label, or failing like an unreachable oracle
pub struct MockClassifier {
    label: Option<String>,
    call_count: AtomicU32,
}

impl MockClassifier {
    pub fn labelled(label: &str) -> Self {
        Self {
            label: Some(label.to_string()),
            call_count: AtomicU32::new(0),
        }
    }

    pub fn safe() -> Self {
        Self::labelled("safe")
    }

    pub fn malicious() -> Self {
        Self::labelled("malicious")
    }

    pub fn unavailable() -> Self {
        Self {
            label: None,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl IntentClassifier for MockClassifier {
    async fn classify(&self, _text: &str) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.label
            .clone()
            .ok_or_else(|| Error::oracle("connection refused by 10.0.0.7:443"))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Sink whose writes always fail
pub struct FailingSink;

impl ObservabilitySink for FailingSink {
    fn append(&self, _record: LogRecord) -> Result<()> {
        Err(Error::sink("disk full"))
    }

    fn query(&self, _query: &MetricsQuery) -> Result<MetricsSummary> {
        Err(Error::sink("disk full"))
    }

    fn query_logs(&self, _query: &LogQuery) -> Result<Vec<LogRecord>> {
        Err(Error::sink("disk full"))
    }
}

/// Generation backend that cannot be reached
pub struct UnreachableGenerator;

#[async_trait]
impl GenerationOracle for UnreachableGenerator {
    async fn generate(&self, _prompt: &str) -> Result<FragmentStream> {
        Err(Error::oracle("generation backend unreachable"))
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}

/// Store seeded with the built-in catalog
pub async fn seeded_store() -> Arc<InMemoryPolicyStore> {
    let store = InMemoryPolicyStore::new();
    PolicyCatalog::builtin().unwrap().seed(&store).await.unwrap();
    Arc::new(store)
}
