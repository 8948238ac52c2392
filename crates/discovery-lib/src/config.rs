//! Run configuration
//!
//! `Settings` is assembled once at startup from command-line values and an
//! optional overlay file, validated, and then only ever borrowed.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HISTORY: u32 = 1;
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_PROTOCOL: &str = "http";
pub const DEFAULT_INTERVAL_SIZE: u32 = 1;
pub const DEFAULT_OUTPUT_DIR: &str = "./data";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Which containers a run reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Only containers present right now (instant queries)
    #[default]
    Current,
    /// Every container seen over the history window (range queries)
    All,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current" => Ok(RunMode::Current),
            "all" => Ok(RunMode::All),
            other => Err(invalid("mode", other, "current|all")),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Current => "current",
            RunMode::All => "all",
        })
    }
}

/// Aggregation applied when several pods collapse onto one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregator {
    #[default]
    Max,
    Avg,
    Min,
}

impl Aggregator {
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregator::Max => "max",
            Aggregator::Avg => "avg",
            Aggregator::Min => "min",
        }
    }
}

impl FromStr for Aggregator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(Aggregator::Max),
            "avg" => Ok(Aggregator::Avg),
            "min" => Ok(Aggregator::Min),
            other => Err(invalid("aggregator", other, "max|avg|min")),
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of one history step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[default]
    Days,
    Hours,
    Minutes,
}

impl FromStr for Interval {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "days" => Ok(Interval::Days),
            "hours" => Ok(Interval::Hours),
            "minutes" => Ok(Interval::Minutes),
            other => Err(invalid("interval", other, "days|hours|minutes")),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Interval::Days => "days",
            Interval::Hours => "hours",
            Interval::Minutes => "minutes",
        })
    }
}

/// Collection method; only Kubernetes label conventions are supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionMethod {
    #[default]
    Kubernetes,
}

impl FromStr for CollectionMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kubernetes" => Ok(CollectionMethod::Kubernetes),
            other => Err(invalid("collection", other, "kubernetes")),
        }
    }
}

impl fmt::Display for CollectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("kubernetes")
    }
}

/// Server certificate verification policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum SslVerify {
    #[default]
    Verify,
    Skip,
    /// Trust the PEM certificates found in this directory
    CaDirectory(PathBuf),
}

impl FromStr for SslVerify {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(invalid("ssl_certificate_verify", s, "True|False|<directory>")),
            "True" | "true" => Ok(SslVerify::Verify),
            "False" | "false" => Ok(SslVerify::Skip),
            dir => Ok(SslVerify::CaDirectory(PathBuf::from(dir))),
        }
    }
}

impl fmt::Display for SslVerify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SslVerify::Verify => f.write_str("True"),
            SslVerify::Skip => f.write_str("False"),
            SslVerify::CaDirectory(dir) => write!(f, "{}", dir.display()),
        }
    }
}

fn invalid(key: &'static str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        expected,
    }
}

/// Settings for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Metrics server host name
    pub address: String,
    /// Cluster column of every export; the address when unset
    pub cluster_name: Option<String>,
    pub port: Option<u16>,
    pub protocol: String,
    /// Number of interval units to look back
    pub history: u32,
    pub timeout_secs: u64,
    pub collection: CollectionMethod,
    pub mode: RunMode,
    pub ssl_verify: SslVerify,
    pub aggregator: Aggregator,
    pub interval: Interval,
    pub interval_size: u32,
    pub debug: bool,
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: String::new(),
            cluster_name: None,
            port: None,
            protocol: DEFAULT_PROTOCOL.to_string(),
            history: DEFAULT_HISTORY,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            collection: CollectionMethod::default(),
            mode: RunMode::default(),
            ssl_verify: SslVerify::default(),
            aggregator: Aggregator::default(),
            interval: Interval::default(),
            interval_size: DEFAULT_INTERVAL_SIZE,
            debug: false,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl Settings {
    /// Base URL of the query API, without the `/api/v1` path
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.protocol, self.address, port),
            None => format!("{}://{}", self.protocol, self.address),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Cluster name written into every export row
    pub fn cluster(&self) -> &str {
        match self.cluster_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.address,
        }
    }

    /// Apply a `key value` overlay file
    pub fn with_overlay_file(self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        self.with_overlay(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply `key value` lines; a key only takes effect while its option
    /// still holds the built-in default
    pub fn with_overlay(mut self, content: &str) -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };

            match key {
                "history" if self.history == defaults.history => {
                    self.history = parse_number("history", value)?;
                }
                "prometheus_address" if self.address == defaults.address => {
                    self.address = value.to_string();
                }
                "cluster_name" if self.cluster_name == defaults.cluster_name => {
                    self.cluster_name = Some(value.to_string());
                }
                "prometheus_port" if self.port == defaults.port => {
                    self.port = Some(parse_number("prometheus_port", value)?);
                }
                "timeout" if self.timeout_secs == defaults.timeout_secs => {
                    self.timeout_secs = parse_number("timeout", value)?;
                }
                "collection" if self.collection == defaults.collection => {
                    self.collection = value.parse()?;
                }
                "mode" if self.mode == defaults.mode => {
                    self.mode = value.parse()?;
                }
                "prometheus_protocol" if self.protocol == defaults.protocol => {
                    self.protocol = parse_protocol(value)?;
                }
                "ssl_certificate_verify" if self.ssl_verify == defaults.ssl_verify => {
                    self.ssl_verify = value.parse()?;
                }
                "aggregator" if self.aggregator == defaults.aggregator => {
                    self.aggregator = value.parse()?;
                }
                "interval" if self.interval == defaults.interval => {
                    self.interval = value.parse()?;
                }
                "interval_size" if self.interval_size == defaults.interval_size => {
                    self.interval_size = parse_number("interval_size", value)?;
                }
                "debug" if self.debug == defaults.debug => {
                    self.debug = parse_bool("debug", value)?;
                }
                _ => {}
            }
        }

        Ok(self)
    }

    /// Reject settings no query could succeed with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::Invalid(
                "metrics server address is required".to_string(),
            ));
        }
        if self.interval_size == 0 {
            return Err(ConfigError::Invalid(
                "interval size must be at least 1".to_string(),
            ));
        }
        parse_protocol(&self.protocol)?;
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(key, value, "a non-negative integer"))
}

pub fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(invalid(key, value, "true|false")),
    }
}

pub fn parse_protocol(value: &str) -> Result<String, ConfigError> {
    match value {
        "http" | "https" => Ok(value.to_string()),
        other => Err(invalid("protocol", other, "http|https")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_fills_defaults() {
        let overlay = "\
prometheus_address prom.example
prometheus_port 9090
history 7
mode all
interval hours
interval_size 2
aggregator avg
debug true
ssl_certificate_verify False
";
        let settings = Settings::default().with_overlay(overlay).unwrap();

        assert_eq!(settings.address, "prom.example");
        assert_eq!(settings.port, Some(9090));
        assert_eq!(settings.history, 7);
        assert_eq!(settings.mode, RunMode::All);
        assert_eq!(settings.interval, Interval::Hours);
        assert_eq!(settings.interval_size, 2);
        assert_eq!(settings.aggregator, Aggregator::Avg);
        assert!(settings.debug);
        assert_eq!(settings.ssl_verify, SslVerify::Skip);
        assert_eq!(settings.base_url(), "http://prom.example:9090");
    }

    #[test]
    fn test_explicit_values_win_over_overlay() {
        let explicit = Settings {
            address: "cli-host".to_string(),
            history: 3,
            mode: RunMode::All,
            ..Settings::default()
        };

        let settings = explicit
            .with_overlay("prometheus_address file-host\nhistory 9\nmode current\n")
            .unwrap();

        assert_eq!(settings.address, "cli-host");
        assert_eq!(settings.history, 3);
        assert_eq!(settings.mode, RunMode::All);
    }

    #[test]
    fn test_overlay_ignores_unknown_keys_and_blank_lines() {
        let settings = Settings::default()
            .with_overlay("\n\nunknown_key 12\nlonely\nprometheus_address h\n")
            .unwrap();
        assert_eq!(settings.address, "h");
    }

    #[test]
    fn test_overlay_rejects_malformed_values() {
        let err = Settings::default()
            .with_overlay("interval weeks\n")
            .unwrap_err();
        assert!(err.to_string().contains("interval"));

        assert!(Settings::default().with_overlay("history -1\n").is_err());
    }

    #[test]
    fn test_cluster_name_overrides_address() {
        let settings = Settings {
            address: "prom.example".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.cluster(), "prom.example");

        let named = settings.clone().with_overlay("cluster_name prod-east\n").unwrap();
        assert_eq!(named.cluster(), "prod-east");
        assert_eq!(named.base_url(), "http://prom.example");

        let blank = Settings {
            cluster_name: Some(String::new()),
            ..settings
        };
        assert_eq!(blank.cluster(), "prom.example");
    }

    #[test]
    fn test_ssl_verify_directory() {
        let verify: SslVerify = "/etc/certs".parse().unwrap();
        assert_eq!(verify, SslVerify::CaDirectory(PathBuf::from("/etc/certs")));
        assert_eq!("True".parse::<SslVerify>().unwrap(), SslVerify::Verify);
    }

    #[test]
    fn test_validate() {
        assert!(Settings::default().validate().is_err());

        let zero_step = Settings {
            address: "h".to_string(),
            interval_size: 0,
            ..Settings::default()
        };
        assert!(zero_step.validate().is_err());

        let ok = Settings {
            address: "h".to_string(),
            ..Settings::default()
        };
        assert!(ok.validate().is_ok());
        assert_eq!(ok.base_url(), "http://h");
    }
}
