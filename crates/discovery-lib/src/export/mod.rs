//! CSV exports
//!
//! `config.csv` and `attributes.csv` describe every registry container once;
//! the workload files (see [`workload`]) hold one row per sample point.
//! Every file is created (truncated), fully written and flushed before the
//! next one is opened.

mod workload;


pub use workload::{
    resolve_entity, workload_file_name, write_network, write_network_total, write_workload,
    NetworkSeries,
};

use crate::models::format_datetime;
use crate::registry::{EntityRef, Registry};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "config.csv";
pub const ATTRIBUTES_FILE: &str = "attributes.csv";

const CONFIG_HEADER: &str =
    "cluster,namespace,pod,container,HW Total Memory,OS Name,HW Manufacturer,HW Model,HW Serial Number";

const ATTRIBUTES_HEADER: &str = "cluster,namespace,pod,container,Virtual Technology,Virtual Domain,\
Virtual Datacenter,Virtual Cluster,Container Labels,Container Info,Pod Info,Pod Labels,\
Existing CPU Limit,Existing CPU Request,Existing Memory Limit,Existing Memory Request,\
Container Name,Current Nodes,Power State,Created By Kind,Created By Name,Current Size,\
Create Time,Container Restarts,Namespace Labels,Namespace CPU Request,Namespace CPU Limit,\
Namespace Memory Request,Namespace Memory Limit";

/// One written artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub file: String,
    pub rows: usize,
}

/// Line-oriented CSV writer; fields are written as given
pub(crate) struct CsvFile {
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl CsvFile {
    pub(crate) fn create(dir: &Path, name: &str, header: &str) -> Result<Self> {
        let path = dir.join(name);
        let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", header).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Self {
            name: name.to_string(),
            path,
            writer,
            rows: 0,
        })
    }

    pub(crate) fn row(&mut self, fields: &[&str]) -> Result<()> {
        writeln!(self.writer, "{}", fields.join(","))
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        self.rows += 1;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<ExportSummary> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        debug!(file = %self.name, rows = self.rows, "Export written");
        Ok(ExportSummary {
            file: self.name,
            rows: self.rows,
        })
    }
}

/// Pod column value
pub fn sanitize_pod(pod: &str) -> String {
    pod.replace(';', ".")
}

/// Container column value
pub fn sanitize_container(container: &str) -> String {
    container.replace(':', ".")
}

/// Render a unix-seconds creation time; empty if it is not a number
pub fn format_creation_time(raw: &str) -> String {
    let Ok(seconds) = raw.trim().parse::<f64>() else {
        return String::new();
    };
    DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0).round() as i64)
        .map(|dt| format_datetime(&dt))
        .unwrap_or_default()
}

fn current_nodes(entity: &EntityRef<'_>) -> String {
    let instances = &entity.container.con_instance;
    instances.strip_suffix('|').unwrap_or(instances).to_string()
}

/// Write `config.csv`
pub fn write_config(dir: &Path, registry: &Registry, cluster: &str) -> Result<ExportSummary> {
    let mut csv = CsvFile::create(dir, CONFIG_FILE, CONFIG_HEADER)?;

    for entity in registry.entities() {
        let pod = sanitize_pod(entity.pod_identity());
        let container = sanitize_container(entity.container_name);
        csv.row(&[
            cluster,
            entity.namespace_name,
            &pod,
            &container,
            &entity.container.memory,
            "Linux",
            "CONTAINERS",
            entity.namespace_name,
            entity.namespace_name,
        ])?;
    }

    csv.finish()
}

/// Write `attributes.csv`
pub fn write_attributes(dir: &Path, registry: &Registry, cluster: &str) -> Result<ExportSummary> {
    let mut csv = CsvFile::create(dir, ATTRIBUTES_FILE, ATTRIBUTES_HEADER)?;

    for entity in registry.entities() {
        let identity = entity.pod_identity();
        let pod = sanitize_pod(identity);
        let container = sanitize_container(entity.container_name);
        let nodes = current_nodes(&entity);
        let created = format_creation_time(&entity.owner.creation_time);
        let (c, o, ns) = (entity.container, entity.owner, entity.namespace);

        csv.row(&[
            cluster,
            entity.namespace_name,
            &pod,
            &container,
            "Containers",
            cluster,
            entity.namespace_name,
            identity,
            &c.attr,
            &c.con_info,
            &o.pod_info,
            &o.pod_labels,
            &c.cpu_limit,
            &c.cpu_request,
            &c.mem_limit,
            &c.mem_request,
            entity.container_name,
            &nodes,
            c.state.as_str(),
            o.ownership.kind(),
            o.ownership.name(),
            &o.current_size,
            &created,
            &c.restarts,
            &ns.labels,
            &ns.cpu_request,
            &ns.cpu_limit,
            &ns.mem_request,
            &ns.mem_limit,
        ])?;
    }

    csv.finish()
}
