//! PromptWall
//!
//! Prompt firewall server and operator commands.

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use promptwall_policy::GroupSelector;
use promptwall_proxy::cli::{self, Cli, Command};
use promptwall_proxy::routes::{LogParams, MetricsParams};
use promptwall_proxy::{create_router, AppState, ProxyConfig};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let config = ProxyConfig::load(&cli.config, &cli.overrides())?;

    match cli.command() {
        Command::Serve { .. } => serve(config).await,
        Command::Check {
            prompt,
            group,
            group_id,
            agent,
        } => {
            let selector = GroupSelector { id: group_id, name: group };
            println!("{}", cli::check(&config, prompt, selector, agent).await?);
            Ok(())
        }
        Command::Logs { status, agent, limit } => {
            let params = LogParams {
                status,
                agent_id: agent,
                limit: Some(limit),
            };
            print!("{}", cli::logs(&config, params)?);
            Ok(())
        }
        Command::Metrics { range, group_by } => {
            let params = MetricsParams {
                range: Some(range),
                group_by,
                ..Default::default()
            };
            println!("{}", cli::metrics(&config, params)?);
            Ok(())
        }
    }
}

async fn serve(config: ProxyConfig) -> Result<()> {
    info!("Starting PromptWall");
    info!(
        classifier = ?config.classifier.kind,
        generation = ?config.generation.kind,
        sink = ?config.telemetry.sink,
        catalog = %config.policy_catalog.display(),
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;
    let state = AppState::from_config(&config).await?.with_prometheus(metrics_handle);
    info!("Application state initialized");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("PromptWall listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("promptwall=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("promptwall=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "promptwall_decisions_total",
        "Pipeline decisions by status and reason"
    );
    metrics::describe_histogram!(
        "promptwall_pipeline_latency_us",
        metrics::Unit::Microseconds,
        "Pipeline latency in microseconds by stage"
    );
    metrics::describe_counter!(
        "promptwall_oracle_failures_total",
        "Classifier and generation calls that failed"
    );
    metrics::describe_counter!(
        "promptwall_unrecognized_labels_total",
        "Classifier labels outside safe/malicious"
    );
    metrics::describe_counter!("promptwall_sink_failures_total", "Decisions that could not be recorded");
    metrics::describe_counter!("promptwall_log_records_written_total", "Decision log lines written");
    metrics::describe_counter!("promptwall_log_write_errors_total", "Decision log write failures");

    info!("Metrics exporter initialized");
    Ok(handle)
}
