//! Metrics source access
//!
//! A `MetricsSource` answers one query with the array found at
//! `data.<result_field>` of the response envelope. `PrometheusClient` is the
//! HTTP implementation; any failure is returned to the caller, never retried.

mod prometheus;

#[cfg(test)]
mod tests;

pub use prometheus::{extract_result, PrometheusClient};

use crate::models::{QueryMode, Sample};
use thiserror::Error;

pub use async_trait::async_trait;

/// Errors from a single query
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid query URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("query {url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response from {url} has no data.{field} array")]
    MissingField { url: String, field: String },

    #[error("unexpected sample shape in data.{field} from {url}: {source}")]
    Sample {
        url: String,
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load TLS certificate {path}: {message}")]
    Tls { path: String, message: String },
}

/// Trait for query API implementations
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Run one query and return the result array
    async fn fetch(
        &self,
        query: &str,
        result_field: &str,
        mode: QueryMode,
    ) -> Result<Vec<Sample>, FetchError>;
}
