//! Remote LLM intent classifier
//!
//! Asks an OpenAI-compatible chat completions endpoint for a one-word label.

use std::time::Duration;

use async_trait::async_trait;
use promptwall_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::IntentClassifier;

pub const SYSTEM_INSTRUCTION: &str =
    "You are a security classifier. Return ONLY 'malicious' or 'safe'. No other text.";

/// Connection settings for a remote classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteClassifierConfig {
    /// Full chat completions URL
    pub endpoint: String,

    pub model: String,

    /// Sent as a bearer token when present
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Intent classifier backed by a chat completions API
#[derive(Debug, Clone)]
pub struct RemoteIntentClassifier {
    name: String,
    client: reqwest::Client,
    config: RemoteClassifierConfig,
}

impl RemoteIntentClassifier {
    pub fn new(config: RemoteClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::config(format!("failed to build classifier client: {}", e)))?;

        Ok(Self {
            name: format!("remote:{}", config.model),
            client,
            config,
        })
    }

    fn request_body<'a>(&'a self, text: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            temperature: 0.0,
            max_tokens: 5,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION,
                },
                ChatMessage { role: "user", content: text },
            ],
        }
    }
}

#[async_trait]
impl IntentClassifier for RemoteIntentClassifier {
    async fn classify(&self, text: &str) -> Result<String> {
        let mut request = self.client.post(&self.config.endpoint).json(&self.request_body(text));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(classifier = %self.name, error = %e, "Classifier request failed");
            Error::oracle(format!("classifier request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(classifier = %self.name, status = %status, "Classifier returned error status");
            return Err(Error::oracle(format!("classifier returned HTTP {}", status)));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::oracle(format!("unreadable classifier response: {}", e)))?;

        let label = extract_label(body)?;
        debug!(classifier = %self.name, label = %label, "Classifier responded");
        Ok(label)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// First choice's message content, as returned
fn extract_label(body: ChatResponse) -> Result<String> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::oracle("classifier response had no content"))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
