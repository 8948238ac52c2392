//! Observability for a discovery run
//!
//! Provides:
//! - `AuditLog`, the `log.txt` artifact: version line, query URLs and state
//!   dumps in debug mode, and the detail of a fatal fetch failure
//! - `RunLogger`, structured tracing events for the run lifecycle

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

/// File name of the audit log inside the output directory
pub const AUDIT_LOG_FILE: &str = "log.txt";

/// Line-oriented audit log written next to the CSV exports
pub struct AuditLog {
    sink: Mutex<Option<BufWriter<File>>>,
    debug: bool,
}

impl AuditLog {
    /// Create (truncating) the audit log at `path`
    pub fn create(path: &Path, debug: bool) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create audit log {}", path.display()))?;
        Ok(Self {
            sink: Mutex::new(Some(BufWriter::new(file))),
            debug,
        })
    }

    /// An audit log that records nothing
    pub fn disabled() -> Self {
        Self {
            sink: Mutex::new(None),
            debug: false,
        }
    }

    pub fn record_version(&self, version: &str) {
        self.write_line(&format!("Version {}", version));
    }

    /// Record a constructed query URL (debug mode only)
    pub fn record_query(&self, url: &str) {
        if self.debug {
            self.write_line(url);
        }
    }

    /// Record the request and response of a failed fetch
    pub fn record_failure(&self, url: &str, status: Option<u16>, detail: &str) {
        self.write_line(url);
        if let Some(status) = status {
            self.write_line(&status.to_string());
        }
        self.write_line(detail);
    }

    /// Dump a JSON snapshot of run state (debug mode only)
    pub fn dump<T: Serialize>(&self, stage: &str, state: &T) {
        if !self.debug {
            return;
        }
        match serde_json::to_string(state) {
            Ok(json) => {
                self.write_line(stage);
                self.write_line(&json);
            }
            Err(e) => warn!(error = %e, stage = %stage, "Failed to serialize state dump"),
        }
    }

    pub fn flush(&self) -> Result<()> {
        if let Ok(mut guard) = self.sink.lock() {
            if let Some(writer) = guard.as_mut() {
                writer.flush().context("Failed to flush audit log")?;
            }
        }
        Ok(())
    }

    fn write_line(&self, line: &str) {
        let Ok(mut guard) = self.sink.lock() else {
            return;
        };
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writeln!(writer, "{}", line) {
                warn!(error = %e, "Failed to write audit log");
            }
        }
    }
}

impl Drop for AuditLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Structured logger for run lifecycle events
#[derive(Clone)]
pub struct RunLogger {
    cluster: String,
}

impl RunLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_startup(&self, version: &str, mode: &str, history: u32) {
        info!(
            event = "run_started",
            cluster = %self.cluster,
            version = %version,
            mode = %mode,
            history = history,
            "Container discovery started"
        );
    }

    pub fn log_registry_seeded(&self, namespaces: usize, owners: usize, containers: usize) {
        info!(
            event = "registry_seeded",
            cluster = %self.cluster,
            namespaces = namespaces,
            owners = owners,
            containers = containers,
            "Registry seeded"
        );
    }

    pub fn log_merge(&self, field: &str, merged: usize) {
        debug!(
            event = "registry_merge",
            cluster = %self.cluster,
            field = %field,
            merged = merged,
            "Merged samples into registry"
        );
    }

    pub fn log_export(&self, file: &str, rows: usize) {
        info!(
            event = "export_written",
            cluster = %self.cluster,
            file = %file,
            rows = rows,
            "Export written"
        );
    }

    pub fn log_failure(&self, reason: &str) {
        error!(
            event = "run_aborted",
            cluster = %self.cluster,
            reason = %reason,
            "Container discovery aborted"
        );
    }

    pub fn log_completed(&self, exports: usize) {
        info!(
            event = "run_completed",
            cluster = %self.cluster,
            exports = exports,
            "Container discovery completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_audit_log_debug_records_queries_and_dumps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(AUDIT_LOG_FILE);
        let audit = AuditLog::create(&path, true).unwrap();

        audit.record_version("0.2.0");
        audit.record_query("http://h:9090/api/v1/query?query=up");
        let mut state = BTreeMap::new();
        state.insert("ns1", 1);
        audit.dump("Dump systems", &state);
        audit.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Version 0.2.0\nhttp://h:9090/api/v1/query?query=up\nDump systems\n{\"ns1\":1}\n"
        );
    }

    #[test]
    fn test_audit_log_without_debug_keeps_failures_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(AUDIT_LOG_FILE);
        let audit = AuditLog::create(&path, false).unwrap();

        audit.record_query("http://h/api/v1/query?query=up");
        audit.dump("Dump systems", &1);
        audit.record_failure("http://h/api/v1/query?query=bad", Some(400), "parse error");
        drop(audit);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "http://h/api/v1/query?query=bad\n400\nparse error\n");
    }

    #[test]
    fn test_run_logger_creation() {
        let logger = RunLogger::new("prom.example");
        assert_eq!(logger.cluster, "prom.example");
    }
}
