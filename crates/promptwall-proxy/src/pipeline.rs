//! Sanitization pipeline
//!
//! classify → resolve group → evaluate policies → Decision. Every finished
//! decision is handed to the observability sink before it is returned; a sink
//! failure is logged and counted but never changes the outcome.

use std::sync::Arc;
use std::time::Instant;

use promptwall_classifiers::IntentClassifier;
use promptwall_core::{Decision, Error, Intent, Result};
use promptwall_policy::{resolve, FirewallEngine, GroupSelector, PolicyStore};
use promptwall_telemetry::{MetricsCollector, ObservabilitySink};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One prompt to sanitize
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeRequest {
    #[serde(default)]
    pub prompt: String,

    #[serde(flatten)]
    pub selector: GroupSelector,

    #[serde(default)]
    pub agent_id: Option<String>,
}

impl SanitizeRequest {
    pub fn new(prompt: impl Into<String>, selector: GroupSelector) -> Self {
        Self {
            prompt: prompt.into(),
            selector,
            agent_id: None,
        }
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// Collaborators are fixed at construction; a run holds no shared mutable state
pub struct SanitizationPipeline {
    classifier: Arc<dyn IntentClassifier>,
    store: Arc<dyn PolicyStore>,
    sink: Arc<dyn ObservabilitySink>,
    engine: FirewallEngine,
    metrics: MetricsCollector,
    unrecognized: Intent,
}

impl SanitizationPipeline {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        store: Arc<dyn PolicyStore>,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            classifier,
            store,
            sink,
            engine: FirewallEngine::new(),
            metrics: MetricsCollector::new(),
            unrecognized: Intent::Safe,
        }
    }

    /// Intent to assume for labels other than safe/malicious
    pub fn with_unrecognized_label(mut self, intent: Intent) -> Self {
        self.unrecognized = intent;
        self
    }

    /// Share counters with another component
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn ObservabilitySink> {
        &self.sink
    }

    /// Run one prompt through the pipeline and record the decision.
    ///
    /// Errors are returned only when no decision could be made: an empty
    /// prompt, an unreachable classifier, or a failing policy store. Nothing
    /// is recorded in those cases.
    pub async fn process(&self, request: &SanitizeRequest) -> Result<Decision> {
        let started = Instant::now();

        let decision = self.decide(&request.prompt, &request.selector).await?;
        let latency_us = started.elapsed().as_micros() as u64;

        self.metrics.record_decision(decision.status, latency_us);
        metrics::counter!(
            "promptwall_decisions_total",
            "status" => decision.status.as_str(),
            "reason" => reason_label(&decision),
        )
        .increment(1);
        metrics::histogram!("promptwall_pipeline_latency_us", "stage" => "total").record(latency_us as f64);

        info!(
            status = %decision.status,
            reason = %decision.reason_code,
            group = decision.group_ref.as_ref().map(|g| g.name.as_str()).unwrap_or("-"),
            matches = decision.matched_policies.len(),
            agent_id = request.agent_id.as_deref().unwrap_or("-"),
            latency_us,
            "Prompt decision"
        );

        if let Err(e) = self.sink.record(&decision, request.agent_id.as_deref()) {
            self.metrics.record_sink_failure();
            metrics::counter!("promptwall_sink_failures_total").increment(1);
            warn!(error = %e, "Failed to record decision");
        }

        Ok(decision)
    }

    async fn decide(&self, prompt: &str, selector: &GroupSelector) -> Result<Decision> {
        if prompt.trim().is_empty() {
            return Err(Error::invalid_input("prompt must not be empty"));
        }

        let intent = self.classify(prompt).await?;
        if intent == Intent::Malicious {
            return Ok(Decision::blocked_by_intent(prompt));
        }

        let Some(group) = resolve(self.store.as_ref(), selector).await? else {
            debug!(selector = ?selector.parts(), "No group resolved");
            return Ok(Decision::blocked_without_group(intent, prompt));
        };

        let started = Instant::now();
        let evaluation = self.engine.evaluate(prompt, &group.policies)?;
        metrics::histogram!("promptwall_pipeline_latency_us", "stage" => "evaluate")
            .record(started.elapsed().as_micros() as f64);

        if !evaluation.warnings.is_empty() {
            self.metrics.record_engine_warnings(evaluation.warnings.len() as u64);
        }
        debug!(
            group = %group.group.name,
            policies = group.policies.len(),
            matches = evaluation.matches.len(),
            "Policies evaluated"
        );

        Ok(match evaluation.blocked_by {
            Some(blocker) => {
                Decision::blocked_by_policy(intent, prompt, group.group, blocker.policy_name, evaluation.matches)
            }
            None => Decision::passed(intent, prompt, evaluation.redacted_text, group.group, evaluation.matches),
        })
    }

    async fn classify(&self, prompt: &str) -> Result<Intent> {
        let started = Instant::now();
        let label = self.classifier.classify(prompt).await.map_err(|e| {
            self.metrics.record_oracle_failure();
            metrics::counter!("promptwall_oracle_failures_total", "oracle" => "classifier").increment(1);
            warn!(classifier = self.classifier.name(), error = %e, "Classifier unavailable");
            match e {
                Error::OracleUnavailable(_) => e,
                other => Error::oracle(other.to_string()),
            }
        })?;

        let latency_us = started.elapsed().as_micros() as u64;
        self.metrics.record_classifier_latency(latency_us);
        metrics::histogram!("promptwall_pipeline_latency_us", "stage" => "classify").record(latency_us as f64);

        Ok(self.interpret(&label))
    }

    fn interpret(&self, label: &str) -> Intent {
        Intent::from_label(label).unwrap_or_else(|| {
            metrics::counter!("promptwall_unrecognized_labels_total").increment(1);
            warn!(
                classifier = self.classifier.name(),
                label = label.trim(),
                assumed = %self.unrecognized,
                "Unrecognized classifier label"
            );
            self.unrecognized
        })
    }
}

/// Bounded-cardinality reason for metric labels; policy names are folded
fn reason_label(decision: &Decision) -> &'static str {
    use promptwall_core::ReasonCode;

    match decision.reason_code {
        ReasonCode::Intent => "intent",
        ReasonCode::NoGroup => "no_group",
        ReasonCode::Policy(_) => "policy",
        ReasonCode::Redacted => "redacted",
        ReasonCode::Clean => "clean",
    }
}
