//! Application state and start-up wiring

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use promptwall_classifiers::{IntentClassifier, KeywordIntentClassifier, RemoteIntentClassifier};
use promptwall_policy::{InMemoryPolicyStore, PolicyCatalog, PolicyStore};
use promptwall_telemetry::{InMemorySink, LogService, MetricsCollector, ObservabilitySink};
use tracing::info;

use crate::config::{ClassifierKind, GenerationKind, ProxyConfig, SinkKind};
use crate::generation::{EchoGenerator, GenerationOracle, OpenAiGenerator};
use crate::pipeline::SanitizationPipeline;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SanitizationPipeline>,

    /// Downstream model for `/chat`
    pub generator: Arc<dyn GenerationOracle>,

    /// Prometheus handle for `/metrics/prometheus`; absent when no recorder is installed
    pub prometheus: Option<PrometheusHandle>,

    /// Largest accepted request body in bytes
    pub body_limit: usize,
}

impl AppState {
    pub fn new(pipeline: SanitizationPipeline, generator: Arc<dyn GenerationOracle>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            generator,
            prometheus: None,
            body_limit: 64 * 1024,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Build every collaborator from configuration and seed the policy store
    pub async fn from_config(config: &ProxyConfig) -> Result<Self> {
        info!("Initializing application state");

        config.validate_endpoints()?;

        let store = build_store(config).await?;
        let classifier = build_classifier(config)?;
        let sink = build_sink(config)?;
        let generator = build_generator(config)?;

        let pipeline = SanitizationPipeline::new(classifier, store, sink)
            .with_unrecognized_label(config.classifier.unrecognized_label);

        let mut state = Self::new(pipeline, generator);
        state.body_limit = config.server.max_body_bytes;
        Ok(state)
    }

    pub fn store(&self) -> &dyn PolicyStore {
        self.pipeline.store().as_ref()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        self.pipeline.metrics()
    }
}

/// In-memory store seeded from the configured catalog
pub async fn build_store(config: &ProxyConfig) -> Result<Arc<dyn PolicyStore>> {
    let catalog = PolicyCatalog::load_or_builtin(&config.policy_catalog)
        .with_context(|| format!("loading policy catalog {}", config.policy_catalog.display()))?;

    let store = InMemoryPolicyStore::new();
    catalog.seed(&store).await?;

    Ok(Arc::new(store))
}

pub fn build_classifier(config: &ProxyConfig) -> Result<Arc<dyn IntentClassifier>> {
    let classifier: Arc<dyn IntentClassifier> = match config.classifier.kind {
        ClassifierKind::Keyword => Arc::new(KeywordIntentClassifier::with_phrases(
            config.classifier.extra_phrases.iter().cloned(),
        )?),
        ClassifierKind::Remote => Arc::new(RemoteIntentClassifier::new(config.classifier.remote())?),
    };
    info!(classifier = classifier.name(), "Classifier ready");
    Ok(classifier)
}

pub fn build_sink(config: &ProxyConfig) -> Result<Arc<dyn ObservabilitySink>> {
    let telemetry = &config.telemetry;
    let sink: Arc<dyn ObservabilitySink> = match telemetry.sink {
        SinkKind::File => Arc::new(
            LogService::new(telemetry.persistence.clone())
                .context("failed to initialize decision log service")?,
        ),
        SinkKind::Memory => Arc::new(InMemorySink::with_capacity(telemetry.memory_capacity)),
    };
    Ok(sink)
}

pub fn build_generator(config: &ProxyConfig) -> Result<Arc<dyn GenerationOracle>> {
    let generation = &config.generation;
    let generator: Arc<dyn GenerationOracle> = match generation.kind {
        GenerationKind::Echo => Arc::new(EchoGenerator::new()),
        GenerationKind::OpenAi => Arc::new(OpenAiGenerator::new(
            &generation.endpoint,
            &generation.model,
            generation.api_key.clone(),
            Duration::from_secs(generation.connect_timeout_secs),
            Duration::from_secs(generation.read_timeout_secs),
        )?),
    };
    info!(generator = generator.name(), "Generation oracle ready");
    Ok(generator)
}
