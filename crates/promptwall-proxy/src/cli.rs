//! Command line interface

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use promptwall_policy::GroupSelector;
use promptwall_telemetry::{InMemorySink, LogReader};

use crate::config::{ConfigOverrides, ProxyConfig};
use crate::pipeline::{SanitizationPipeline, SanitizeRequest};
use crate::routes::{LogParams, MetricsParams};
use crate::state::{build_classifier, build_store};

#[derive(Parser, Debug)]
#[command(name = "promptwall")]
#[command(about = "PromptWall prompt firewall", long_about = None, version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "promptwall.yaml", global = true)]
    pub config: PathBuf,

    /// Policy catalog seeded at start-up
    #[arg(short, long, global = true)]
    pub policies: Option<PathBuf>,

    /// Decision log directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// API key for remote oracles
    #[arg(long, env = "PROMPTWALL_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Allow http and private-network oracle endpoints
    #[arg(long, global = true)]
    pub allow_insecure_endpoints: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Listen address
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Listen port
        #[arg(short = 'P', long)]
        port: Option<u16>,
    },

    /// Run one prompt through the pipeline and print the decision
    Check {
        prompt: String,

        /// Group name
        #[arg(short, long)]
        group: Option<String>,

        #[arg(long)]
        group_id: Option<String>,

        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Print recent decision log records
    Logs {
        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long)]
        agent: Option<String>,

        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Print aggregate decision counts
    Metrics {
        /// 1h, 24h, 7d or all
        #[arg(short, long, default_value = "all")]
        range: String,

        /// agent_id or status
        #[arg(short, long)]
        group_by: Option<String>,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen: None,
            port: None,
        })
    }

    pub fn overrides(&self) -> ConfigOverrides {
        let (host, port) = match &self.command {
            Some(Command::Serve { listen, port }) => (listen.clone(), *port),
            _ => (None, None),
        };

        ConfigOverrides {
            host,
            port,
            policy_catalog: self.policies.clone(),
            log_dir: self.log_dir.clone(),
            api_key: self.api_key.clone(),
            allow_insecure_endpoints: self.allow_insecure_endpoints,
        }
    }
}

/// Evaluate a prompt without touching the decision log
pub async fn check(
    config: &ProxyConfig,
    prompt: String,
    selector: GroupSelector,
    agent_id: Option<String>,
) -> Result<String> {
    config.validate_endpoints()?;

    let pipeline = SanitizationPipeline::new(
        build_classifier(config)?,
        build_store(config).await?,
        Arc::new(InMemorySink::with_capacity(1)),
    )
    .with_unrecognized_label(config.classifier.unrecognized_label);

    let request = SanitizeRequest {
        prompt,
        selector,
        agent_id,
    };
    let decision = pipeline.process(&request).await?;
    Ok(serde_json::to_string_pretty(&decision)?)
}

/// Persisted records as JSON lines, newest first
pub fn logs(config: &ProxyConfig, params: LogParams) -> Result<String> {
    let query = params.into_query()?;
    let reader = LogReader::new(config.telemetry.persistence.clone());

    let mut out = String::new();
    for record in reader.query_logs(&query)? {
        out.push_str(&serde_json::to_string(&record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Aggregate counts over persisted records
pub fn metrics(config: &ProxyConfig, params: MetricsParams) -> Result<String> {
    let query = params.into_query(Utc::now())?;
    let reader = LogReader::new(config.telemetry.persistence.clone());
    Ok(serde_json::to_string_pretty(&reader.summarize(&query)?)?)
}
