//! Vigilis
//!
//! Tiered log-line classification: rules first, then a semantic model,
//! then a generative reasoning service for whatever is left.
//!
//! `vigilis serve` runs the HTTP API; `vigilis label` classifies a CSV file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use vigilis_classifiers::build_cascade_from_file;
use vigilis_server::{csv_io, create_router, AppState, ServerConfig, ServerOverrides};
use vigilis_telemetry::MetricsCollector;

#[derive(Parser, Debug)]
#[command(name = "vigilis")]
#[command(about = "Tiered log classification service", long_about = None)]
struct Cli {
    /// Server configuration file path
    #[arg(short, long, default_value = "config/server.yaml", global = true)]
    config: PathBuf,

    /// Cascade configuration (catalog, rules, tiers)
    #[arg(long, env = "VIGILIS_CLASSIFIERS", global = true)]
    classifiers: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Listen address
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Listen port
        #[arg(short = 'P', long)]
        port: Option<u16>,
    },

    /// Classify a CSV file with `source` and `log_message` columns
    Label {
        /// Input CSV
        input: PathBuf,

        /// Output CSV
        #[arg(short, long, default_value = "artifacts/labelled_logs.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    match cli.command {
        Command::Serve { listen, port } => {
            let overrides = ServerOverrides {
                listen,
                port,
                classifiers_config: cli.classifiers,
            };
            serve(&cli.config, &overrides).await
        }
        Command::Label { input, output } => {
            let overrides = ServerOverrides {
                classifiers_config: cli.classifiers,
                ..Default::default()
            };
            label(&cli.config, &overrides, &input, &output).await
        }
    }
}

async fn serve(config_path: &Path, overrides: &ServerOverrides) -> Result<()> {
    info!("Starting Vigilis server");

    let config = ServerConfig::load(config_path, overrides)?;
    info!("Configuration loaded successfully");
    info!("Classifiers: {}", config.classifiers_config.display());

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = config.bind_address().parse()?;
    let state = AppState::new(config, Some(metrics_handle))?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn label(
    config_path: &Path,
    overrides: &ServerOverrides,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let config = ServerConfig::load(config_path, overrides)?;
    let metrics = MetricsCollector::new();
    let cascade = build_cascade_from_file(&config.classifiers_config, Arc::new(metrics.clone()))?;

    let reader = File::open(input).with_context(|| format!("cannot open {}", input.display()))?;
    let records = csv_io::read_records(BufReader::new(reader))?;
    info!(records = records.len(), input = %input.display(), "Classifying CSV");

    let outcome = cascade.classify_batch(&records).await;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let writer = File::create(output).with_context(|| format!("cannot create {}", output.display()))?;
    csv_io::write_labelled(BufWriter::new(writer), &records, &outcome.results)?;

    let summary = &outcome.summary;
    info!(
        total = summary.total,
        pattern = summary.pattern,
        semantic = summary.semantic,
        reasoning = summary.reasoning,
        cache = summary.cache,
        errors = summary.errors,
        elapsed_ms = summary.elapsed_us / 1000,
        "Labelled logs written to {}",
        output.display()
    );
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("vigilis=debug,tower=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigilis=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    vigilis_telemetry::describe_metrics();

    info!("Metrics exporter initialized");
    Ok(handle)
}
