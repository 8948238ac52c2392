//! Per-window workload exports

use super::{sanitize_container, sanitize_pod, CsvFile, ExportSummary};
use crate::models::{format_datetime, label, Sample};
use crate::queries::{NetworkTotal, WorkloadMetric};
use crate::registry::{EntityRef, Registry};
use crate::window::TimeWindow;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

const NETWORK_HEADER: &str = "HOSTNAME,PROPERTY,INSTANCE,DT,VAL";

/// Network values per host and timestamp (unix millis)
pub type NetworkSeries = BTreeMap<String, BTreeMap<i64, f64>>;

/// `<prefix><window start>.csv`
pub fn workload_file_name(prefix: &str, window: &TimeWindow) -> String {
    format!("{}{}.csv", prefix, window.file_suffix())
}

/// Locate the registry container a workload series belongs to
///
/// Owned series carry `owner_name`; standalone series only `pod_name`.
/// Series with an empty `container_name` are pod-level totals and match
/// nothing.
pub fn resolve_entity<'r>(registry: &'r Registry, sample: &Sample) -> Option<EntityRef<'r>> {
    let namespace = sample.label(label::NAMESPACE)?;
    let container = sample.label(label::CONTAINER_NAME).filter(|c| !c.is_empty())?;
    let owner = sample
        .label(label::OWNER_NAME)
        .or_else(|| sample.label(label::POD_NAME))?;
    registry.entity(namespace, owner, container)
}

fn render_timestamp(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| format_datetime(&dt))
}

/// Write one utilisation file: a row per point of every registry series
pub fn write_workload(
    dir: &Path,
    file: &str,
    metric: WorkloadMetric,
    registry: &Registry,
    cluster: &str,
    samples: &[Sample],
) -> Result<ExportSummary> {
    let header = format!("cluster,namespace,pod,container,Datetime,{}", metric.property());
    let mut csv = CsvFile::create(dir, file, &header)?;

    for sample in samples {
        let Some(entity) = resolve_entity(registry, sample) else {
            continue;
        };
        let pod = sanitize_pod(entity.pod_identity());
        let container = sanitize_container(entity.container_name);

        for point in sample.points() {
            let Some(dt) = point.datetime() else {
                continue;
            };
            csv.row(&[
                cluster,
                entity.namespace_name,
                &pod,
                &container,
                &format_datetime(&dt),
                point.value(),
            ])?;
        }
    }

    csv.finish()
}

/// Write one network file and return its values for the totals
///
/// Hosts are named `namespace__pod__container`. Values that do not parse as
/// numbers are still written but left out of the returned series.
pub fn write_network(
    dir: &Path,
    file: &str,
    metric: WorkloadMetric,
    registry: &Registry,
    samples: &[Sample],
) -> Result<(ExportSummary, NetworkSeries)> {
    let mut csv = CsvFile::create(dir, file, NETWORK_HEADER)?;
    let mut series = NetworkSeries::new();

    for sample in samples {
        let Some(entity) = resolve_entity(registry, sample) else {
            continue;
        };
        let host = format!(
            "{}__{}__{}",
            entity.namespace_name,
            sanitize_pod(entity.pod_identity()),
            sanitize_container(entity.container_name)
        );
        let values = series.entry(host.clone()).or_default();

        for point in sample.points() {
            let millis = point.timestamp_millis();
            let Some(dt) = render_timestamp(millis) else {
                continue;
            };
            csv.row(&[&host, metric.property(), "", &dt, point.value()])?;
            if let Ok(value) = point.value().trim().parse::<f64>() {
                values.insert(millis, value);
            }
        }
    }

    Ok((csv.finish()?, series))
}

/// Write the sum of a sent and a received series
///
/// Only host/timestamp pairs present in both series are written.
pub fn write_network_total(
    dir: &Path,
    file: &str,
    total: NetworkTotal,
    sent: &NetworkSeries,
    received: &NetworkSeries,
) -> Result<ExportSummary> {
    let mut csv = CsvFile::create(dir, file, NETWORK_HEADER)?;

    for (host, sent_values) in sent {
        let Some(received_values) = received.get(host) else {
            continue;
        };
        for (millis, sent_value) in sent_values {
            let (Some(received_value), Some(dt)) = (received_values.get(millis), render_timestamp(*millis))
            else {
                continue;
            };
            let sum = format!("{:?}", sent_value + received_value);
            csv.row(&[host, total.property(), "", &dt, &sum])?;
        }
    }

    csv.finish()
}
