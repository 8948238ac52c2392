//! Container discovery library
//!
//! This crate provides the core functionality for:
//! - Querying a Prometheus-compatible metrics API
//! - Building the namespace → owner → container registry
//! - Folding labels and merging kube-state-metrics values into it
//! - Writing the config, attributes and workload CSV exports

pub mod config;
pub mod export;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod queries;
pub mod registry;
pub mod source;
pub mod window;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, Settings};
pub use export::ExportSummary;
pub use models::{QueryMode, Sample, SamplePoint};
pub use observability::{AuditLog, RunLogger, AUDIT_LOG_FILE};
pub use pipeline::{Discovery, RunReport};
pub use source::{FetchError, MetricsSource, PrometheusClient};

/// Version recorded in the audit log and startup event
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
