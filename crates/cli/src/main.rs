//! Container discovery CLI
//!
//! Queries a Prometheus-compatible server for the containers of a Kubernetes
//! cluster and writes config, attributes and workload CSV files.

mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use discovery_lib::config::{
    parse_protocol, Aggregator, CollectionMethod, Interval, RunMode, Settings, SslVerify,
};
use discovery_lib::{AuditLog, Discovery, PrometheusClient, RunLogger, RunReport, AUDIT_LOG_FILE, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Container discovery for Prometheus-monitored Kubernetes clusters
#[derive(Parser)]
#[command(name = "discover")]
#[command(author, version, about = "Container discovery for Prometheus-monitored Kubernetes clusters", long_about = None)]
pub struct Cli {
    /// Metrics server host name
    #[arg(long, env = "DISCOVER_ADDRESS", default_value = "")]
    pub address: String,

    /// Cluster name written to the exports; defaults to the address
    #[arg(long = "clusterName", env = "DISCOVER_CLUSTER_NAME")]
    pub cluster_name: Option<String>,

    /// Metrics server port
    #[arg(long, env = "DISCOVER_PORT")]
    pub port: Option<u16>,

    /// Number of intervals of history to collect
    #[arg(long, env = "DISCOVER_HISTORY", default_value_t = 1)]
    pub history: u32,

    /// Overlay file of `key value` lines
    #[arg(long, env = "DISCOVER_CONFIG_FILE")]
    pub file: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, env = "DISCOVER_TIMEOUT", default_value_t = 3600)]
    pub timeout: u64,

    /// Collection method
    #[arg(long = "collectMethod", env = "DISCOVER_COLLECT_METHOD", default_value = "kubernetes")]
    pub collection: CollectionMethod,

    /// current: containers running now; all: every container seen over the history
    #[arg(long, env = "DISCOVER_MODE", default_value = "current")]
    pub mode: RunMode,

    /// http or https
    #[arg(long, env = "DISCOVER_PROTOCOL", default_value = "http", value_parser = parse_protocol)]
    pub protocol: String,

    /// True, False, or a directory of trusted PEM certificates
    #[arg(long = "sslCertVerify", env = "DISCOVER_SSL_CERT_VERIFY", default_value = "True")]
    pub ssl_verify: SslVerify,

    /// Aggregation across pods of one controller: max, avg or min
    #[arg(long, env = "DISCOVER_AGGREGATOR", default_value = "max")]
    pub aggregator: Aggregator,

    /// Unit of one history step: days, hours or minutes
    #[arg(long, env = "DISCOVER_INTERVAL", default_value = "days")]
    pub interval: Interval,

    /// Number of units per step
    #[arg(long = "intervalSize", env = "DISCOVER_INTERVAL_SIZE", default_value_t = 1)]
    pub interval_size: u32,

    /// Log query URLs and registry dumps to the audit log
    #[arg(long, env = "DISCOVER_DEBUG", default_value_t = false, action = clap::ArgAction::Set)]
    pub debug: bool,

    /// Directory the exports and audit log are written to
    #[arg(long, env = "DISCOVER_OUTPUT_DIR", default_value = "./data")]
    pub output_dir: PathBuf,

    /// Log output format
    #[arg(long, env = "DISCOVER_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Run summary format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Do not print the run summary
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn init_tracing(format: LogFormat, debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
}

async fn run(settings: &Settings, audit: Arc<AuditLog>) -> Result<RunReport> {
    let client = PrometheusClient::new(settings, Arc::clone(&audit))
        .context("Failed to create metrics client")?;
    Discovery::new(settings, &client, &audit).run().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::build_settings(&cli)?;

    init_tracing(cli.log_format, settings.debug);
    info!(url = %settings.base_url(), output_dir = %settings.output_dir.display(), "Starting container discovery");

    std::fs::create_dir_all(&settings.output_dir).with_context(|| {
        format!("Failed to create output directory {}", settings.output_dir.display())
    })?;
    let audit = Arc::new(AuditLog::create(
        &settings.output_dir.join(AUDIT_LOG_FILE),
        settings.debug,
    )?);
    audit.record_version(VERSION);

    let result = run(&settings, Arc::clone(&audit)).await;
    if let Err(e) = audit.flush() {
        warn!(error = %e, "Failed to flush audit log");
    }

    match result {
        Ok(report) => {
            if !cli.quiet {
                output::print_report(&report, &settings, cli.format);
            }
            Ok(())
        }
        Err(e) => {
            RunLogger::new(settings.cluster()).log_failure(&format!("{:#}", e));
            Err(e)
        }
    }
}
