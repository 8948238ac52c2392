//! Core data models for a discovery run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label names that carry entity identity in query results
pub mod label {
    pub const NAMESPACE: &str = "namespace";
    pub const OWNER_NAME: &str = "owner_name";
    pub const OWNER_KIND: &str = "owner_kind";
    /// kube-state-metrics pod label
    pub const POD: &str = "pod";
    /// cadvisor pod label
    pub const POD_NAME: &str = "pod_name";
    /// kube-state-metrics container label
    pub const CONTAINER: &str = "container";
    /// cadvisor container label
    pub const CONTAINER_NAME: &str = "container_name";
    pub const INSTANCE: &str = "instance";
}

/// Label set attached to a series
pub type Labels = BTreeMap<String, String>;

/// Which query endpoint a request goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// `/api/v1/query`, one value per series
    Instant,
    /// `/api/v1/query_range`, a value sequence per series
    Range,
}

impl QueryMode {
    pub fn endpoint(self) -> &'static str {
        match self {
            QueryMode::Instant => "query",
            QueryMode::Range => "query_range",
        }
    }
}

/// A `[<unix seconds>, "<value>"]` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint(pub f64, pub String);

impl SamplePoint {
    pub fn new(timestamp: f64, value: impl Into<String>) -> Self {
        Self(timestamp, value.into())
    }

    pub fn timestamp(&self) -> f64 {
        self.0
    }

    pub fn value(&self) -> &str {
        &self.1
    }

    /// Timestamp in whole milliseconds, used as a join key between series
    pub fn timestamp_millis(&self) -> i64 {
        (self.0 * 1000.0).round() as i64
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp_millis())
    }
}

/// One series from a query result
///
/// Instant queries fill `value`, range queries fill `values` in increasing
/// timestamp order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub metric: Labels,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SamplePoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<SamplePoint>,
}

impl Sample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.metric.get(name).map(String::as_str)
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.metric.contains_key(name)
    }

    /// The authoritative point: the instant value, or the last point of a range
    pub fn latest(&self) -> Option<&SamplePoint> {
        self.value.as_ref().or_else(|| self.values.last())
    }

    pub fn latest_value(&self) -> Option<&str> {
        self.latest().map(SamplePoint::value)
    }

    /// Every point in the series, oldest first
    pub fn points(&self) -> impl Iterator<Item = &SamplePoint> {
        self.value.iter().chain(self.values.iter())
    }
}

/// Format a timestamp the way every export renders it
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_instant_sample() {
        let raw = r#"{"metric":{"namespace":"ns1","container":"web"},"value":[1700000000.5,"128"]}"#;
        let sample: Sample = serde_json::from_str(raw).unwrap();

        assert_eq!(sample.label("namespace"), Some("ns1"));
        assert_eq!(sample.latest_value(), Some("128"));
        assert!(sample.values.is_empty());
    }

    #[test]
    fn test_range_sample_latest_is_last_point() {
        let raw = r#"{"metric":{},"values":[[1,"a"],[2,"b"],[3,"c"]]}"#;
        let sample: Sample = serde_json::from_str(raw).unwrap();

        assert_eq!(sample.latest_value(), Some("c"));
        assert_eq!(sample.points().count(), 3);
    }

    #[test]
    fn test_point_datetime_has_millisecond_precision() {
        let point = SamplePoint::new(1_700_000_000.123, "1");
        let dt = point.datetime().unwrap();
        assert_eq!(format_datetime(&dt), "2023-11-14 22:13:20.123");
    }
}
