//! HTTP client for the Prometheus query API

use super::{async_trait, FetchError, MetricsSource};
use crate::config::{Settings, SslVerify};
use crate::models::{QueryMode, Sample};
use crate::observability::AuditLog;
use reqwest::{Certificate, Client, StatusCode};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Query API client
pub struct PrometheusClient {
    client: Client,
    base_url: String,
    audit: Arc<AuditLog>,
}

impl PrometheusClient {
    /// Create a client from run settings
    pub fn new(settings: &Settings, audit: Arc<AuditLog>) -> Result<Self, FetchError> {
        let base_url = settings.base_url();
        let mut builder = Client::builder().timeout(settings.timeout());

        match &settings.ssl_verify {
            SslVerify::Verify => {}
            SslVerify::Skip => {
                warn!("TLS certificate verification disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }
            SslVerify::CaDirectory(dir) => {
                for cert in load_certificates(dir)? {
                    builder = builder.add_root_certificate(cert);
                }
            }
        }

        let client = builder.build().map_err(|source| FetchError::Request {
            url: base_url.clone(),
            source,
        })?;

        Ok(Self {
            client,
            base_url,
            audit,
        })
    }

    /// Create a client against an explicit base URL (for testing)
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
        audit: Arc<AuditLog>,
    ) -> Result<Self, FetchError> {
        let base_url = base_url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Request {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url,
            audit,
        })
    }

    /// Full request URL; range parameters are already part of `query`
    pub fn query_url(&self, query: &str, mode: QueryMode) -> String {
        format!(
            "{}/api/v1/{}?query={}",
            self.base_url.trim_end_matches('/'),
            mode.endpoint(),
            query
        )
    }

    fn fail(&self, url: &str, status: Option<u16>, err: FetchError) -> FetchError {
        let detail = match &err {
            FetchError::Status { body, .. } => body.clone(),
            other => other.to_string(),
        };
        self.audit.record_failure(url, status, &detail);
        err
    }
}

#[async_trait]
impl MetricsSource for PrometheusClient {
    async fn fetch(
        &self,
        query: &str,
        result_field: &str,
        mode: QueryMode,
    ) -> Result<Vec<Sample>, FetchError> {
        let raw = self.query_url(query, mode);
        self.audit.record_query(&raw);
        debug!(url = %raw, "Querying metrics source");

        let url = Url::parse(&raw).map_err(|source| {
            self.fail(
                &raw,
                None,
                FetchError::InvalidUrl {
                    url: raw.clone(),
                    source,
                },
            )
        })?;

        let response = self.client.get(url).send().await.map_err(|source| {
            self.fail(
                &raw,
                None,
                FetchError::Request {
                    url: raw.clone(),
                    source,
                },
            )
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(self.fail(
                &raw,
                Some(status.as_u16()),
                FetchError::Status {
                    url: raw.clone(),
                    status: status.as_u16(),
                    body,
                },
            ));
        }

        let body = response.text().await.map_err(|source| {
            self.fail(
                &raw,
                None,
                FetchError::Request {
                    url: raw.clone(),
                    source,
                },
            )
        })?;

        extract_result(&raw, &body, result_field).map_err(|e| self.fail(&raw, None, e))
    }
}

/// Pull `data.<result_field>` out of a response body
pub fn extract_result(url: &str, body: &str, result_field: &str) -> Result<Vec<Sample>, FetchError> {
    let mut envelope: Value = serde_json::from_str(body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })?;

    let result = envelope
        .get_mut("data")
        .and_then(|data| data.get_mut(result_field))
        .filter(|result| result.is_array())
        .map(Value::take)
        .ok_or_else(|| FetchError::MissingField {
            url: url.to_string(),
            field: result_field.to_string(),
        })?;

    serde_json::from_value(result).map_err(|source| FetchError::Sample {
        url: url.to_string(),
        field: result_field.to_string(),
        source,
    })
}

/// Read every `*.pem` / `*.crt` file in `dir` as a trusted root
fn load_certificates(dir: &Path) -> Result<Vec<Certificate>, FetchError> {
    let tls_error = |path: &Path, message: String| FetchError::Tls {
        path: path.display().to_string(),
        message,
    };

    let entries = std::fs::read_dir(dir).map_err(|e| tls_error(dir, e.to_string()))?;
    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("pem") | Some("crt")
            )
        })
        .collect();
    paths.sort();

    let mut certs = Vec::with_capacity(paths.len());
    for path in paths {
        let pem = std::fs::read(&path).map_err(|e| tls_error(&path, e.to_string()))?;
        let cert = Certificate::from_pem(&pem).map_err(|e| tls_error(&path, e.to_string()))?;
        debug!(path = %path.display(), "Loaded trusted certificate");
        certs.push(cert);
    }

    Ok(certs)
}
