//! Proxy configuration

use std::path::{Path, PathBuf};

use promptwall_classifiers::RemoteClassifierConfig;
use promptwall_core::Intent;
use promptwall_telemetry::PersistenceConfig;
use serde::{Deserialize, Serialize};

use crate::security::{EndpointError, EndpointPolicy};

/// Proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Policy catalog seeded into the store at start-up
    #[serde(default = "default_catalog")]
    pub policy_catalog: PathBuf,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Permit http and private/loopback oracle endpoints (local model servers)
    #[serde(default)]
    pub allow_insecure_endpoints: bool,

    /// Restrict oracle hosts to these domains and their subdomains
    #[serde(default)]
    pub allowed_oracle_domains: Option<Vec<String>>,
}

/// Values supplied on the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub policy_catalog: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub api_key: Option<String>,
    pub allow_insecure_endpoints: bool,
}

impl ProxyConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();
        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply(overrides);
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(catalog) = &overrides.policy_catalog {
            self.policy_catalog = catalog.clone();
        }
        if let Some(dir) = &overrides.log_dir {
            self.telemetry.persistence.log_dir = dir.clone();
        }
        // A key from the environment fills whichever oracle has none configured.
        if let Some(key) = &overrides.api_key {
            self.classifier.api_key.get_or_insert_with(|| key.clone());
            self.generation.api_key.get_or_insert_with(|| key.clone());
        }
        if overrides.allow_insecure_endpoints {
            self.allow_insecure_endpoints = true;
        }
    }

    /// Check every configured remote endpoint
    pub fn validate_endpoints(&self) -> Result<(), EndpointError> {
        let policy = EndpointPolicy {
            allowed_domains: self.allowed_oracle_domains.clone(),
            ..EndpointPolicy::for_insecure(self.allow_insecure_endpoints)
        };

        if self.classifier.kind == ClassifierKind::Remote {
            policy.check("classifier", &self.classifier.endpoint)?;
        }
        if self.generation.kind == GenerationKind::OpenAi {
            policy.check("generation", &self.generation.endpoint)?;
        }
        Ok(())
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            policy_catalog: default_catalog(),
            classifier: ClassifierConfig::default(),
            generation: GenerationConfig::default(),
            telemetry: TelemetryConfig::default(),
            allow_insecure_endpoints: false,
            allowed_oracle_domains: None,
        }
    }
}

fn default_catalog() -> PathBuf {
    PathBuf::from("./policies/default.yaml")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Offline phrase matching
    #[default]
    Keyword,
    /// OpenAI-compatible chat completions endpoint
    Remote,
}

/// Intent classification oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub kind: ClassifierKind,

    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,

    /// Intent assumed when the oracle answers something other than safe/malicious
    #[serde(default = "default_unrecognized_label")]
    pub unrecognized_label: Intent,

    /// Added to the keyword classifier's built-in phrases
    #[serde(default)]
    pub extra_phrases: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: ClassifierKind::default(),
            endpoint: default_chat_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_ms: default_classifier_timeout_ms(),
            unrecognized_label: default_unrecognized_label(),
            extra_phrases: Vec::new(),
        }
    }
}

impl ClassifierConfig {
    pub fn remote(&self) -> RemoteClassifierConfig {
        RemoteClassifierConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            timeout_ms: self.timeout_ms,
        }
    }
}

fn default_chat_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_classifier_timeout_ms() -> u64 {
    5_000
}

fn default_unrecognized_label() -> Intent {
    Intent::Safe
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    /// Echo the sanitized prompt back
    #[default]
    Echo,
    /// Streaming OpenAI-compatible chat completions
    OpenAi,
}

/// Downstream generation oracle used by `/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub kind: GenerationKind,

    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Longest silence tolerated between streamed chunks
    #[serde(default = "default_read_timeout_secs", alias = "timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            kind: GenerationKind::default(),
            endpoint: default_chat_endpoint(),
            model: default_model(),
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// JSON-lines files with rotation
    #[default]
    File,
    /// Bounded in-process buffer, lost on restart
    Memory,
}

/// Decision log configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub sink: SinkKind,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Records kept by the memory sink
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            persistence: PersistenceConfig::default(),
            memory_capacity: default_memory_capacity(),
        }
    }
}

fn default_memory_capacity() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ProxyConfig::load("/nonexistent/promptwall.yaml", &ConfigOverrides::default()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_body_bytes, 65536);
        assert_eq!(config.classifier.kind, ClassifierKind::Keyword);
        assert_eq!(config.classifier.unrecognized_label, Intent::Safe);
        assert_eq!(config.generation.kind, GenerationKind::Echo);
        assert_eq!(config.telemetry.sink, SinkKind::File);
        assert_eq!(config.policy_catalog, PathBuf::from("./policies/default.yaml"));
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
server:
  port: 9000
classifier:
  kind: remote
  endpoint: http://localhost:11434/v1/chat/completions
  model: llama3
  unrecognized_label: malicious
generation:
  kind: openai
  timeout_secs: 120
telemetry:
  sink: memory
allow_insecure_endpoints: true
"#;
        let config: ProxyConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.classifier.kind, ClassifierKind::Remote);
        assert_eq!(config.classifier.timeout_ms, 5000);
        assert_eq!(config.classifier.unrecognized_label, Intent::Malicious);
        assert_eq!(config.generation.kind, GenerationKind::OpenAi);
        assert_eq!(config.generation.read_timeout_secs, 120);
        assert_eq!(config.generation.connect_timeout_secs, 10);
        assert_eq!(config.telemetry.sink, SinkKind::Memory);
        assert!(config.validate_endpoints().is_ok());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promptwall.yaml");
        std::fs::write(&path, "server:\n  port: 9000\nclassifier:\n  api_key: from-file\n").unwrap();

        let overrides = ConfigOverrides {
            port: Some(7000),
            log_dir: Some(PathBuf::from("/var/log/promptwall")),
            api_key: Some("from-env".to_string()),
            ..Default::default()
        };
        let config = ProxyConfig::load(&path, &overrides).unwrap();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.telemetry.persistence.log_dir, PathBuf::from("/var/log/promptwall"));
        assert_eq!(config.classifier.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.generation.api_key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_local_endpoint_needs_insecure_flag() {
        let mut config = ProxyConfig::default();
        config.classifier.kind = ClassifierKind::Remote;
        config.classifier.endpoint = "http://localhost:11434/v1/chat/completions".to_string();
        assert!(config.validate_endpoints().is_err());

        config.allow_insecure_endpoints = true;
        assert!(config.validate_endpoints().is_ok());
    }

    #[test]
    fn test_oracle_domain_allowlist() {
        let yaml = r#"
classifier:
  kind: remote
  endpoint: https://api.openai.com/v1/chat/completions
generation:
  kind: openai
  endpoint: https://llm.example.net/v1/chat/completions
allowed_oracle_domains: [openai.com]
"#;
        let mut config: ProxyConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate_endpoints().unwrap_err();
        assert!(err.to_string().starts_with("generation endpoint"));

        config.allowed_oracle_domains = Some(vec!["openai.com".to_string(), "example.net".to_string()]);
        assert!(config.validate_endpoints().is_ok());
    }

    #[test]
    fn test_unused_endpoints_are_not_checked() {
        let mut config = ProxyConfig::default();
        config.generation.endpoint = "http://10.0.0.1/".to_string();
        assert!(config.validate_endpoints().is_ok());
    }
}
