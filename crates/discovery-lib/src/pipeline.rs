//! Run orchestration
//!
//! A run seeds the registry, enriches it pass by pass, writes the config and
//! attributes exports and then one workload file per metric and window. Every
//! query is awaited before the next is sent; the first failure ends the run
//! and leaves already-written files in place.

use crate::config::Settings;
use crate::export::{
    self, workload_file_name, write_network, write_network_total, write_workload, ExportSummary,
    NetworkSeries,
};
use crate::models::{label, QueryMode, Sample};
use crate::observability::{AuditLog, RunLogger};
use crate::queries::{
    cadvisor_keys, kube_state_keys, pod_owner_label, KubeStateMetric, NetworkTotal, QueryCatalog,
    WorkloadMetric, CONTROLLER_SIZES, LIMIT_RANGES, NAMESPACE_LABELS,
};
use crate::registry::{
    fold_container_attributes, fold_namespace_labels, fold_pod_attributes, merge_container_scalar,
    merge_limit_ranges, merge_owner_scalar, merge_termination_state, seed, Branch,
    ContainerAttribute, OwnerField, PodAttribute, Registry,
};
use crate::source::MetricsSource;
use crate::window::{export_windows, HistoryCollector, TimeWindow};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Result array every query is read from
const RESULT_FIELD: &str = "result";

const BRANCHES: [Branch; 2] = [Branch::Owned, Branch::Standalone];

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub containers: usize,
    pub exports: Vec<ExportSummary>,
}

/// One discovery run against a metrics source
pub struct Discovery<'a> {
    settings: &'a Settings,
    source: &'a dyn MetricsSource,
    audit: &'a AuditLog,
    logger: RunLogger,
    queries: QueryCatalog,
    reference: DateTime<Utc>,
}

impl<'a> Discovery<'a> {
    pub fn new(settings: &'a Settings, source: &'a dyn MetricsSource, audit: &'a AuditLog) -> Self {
        Self {
            settings,
            source,
            audit,
            logger: RunLogger::new(settings.cluster()),
            queries: QueryCatalog::new(settings.aggregator),
            reference: Utc::now(),
        }
    }

    /// Pin the time windows are computed from
    pub fn with_reference(mut self, reference: DateTime<Utc>) -> Self {
        self.reference = reference;
        self
    }

    pub async fn run(&self) -> Result<RunReport> {
        self.logger
            .log_startup(crate::VERSION, &self.settings.mode.to_string(), self.settings.history);

        let dir = &self.settings.output_dir;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        let history = HistoryCollector::new(self.source, self.settings, self.reference)
            .context("Invalid history window")?;
        let windows = export_windows(
            self.reference,
            self.settings.history,
            self.settings.interval,
            self.settings.interval_size,
        )
        .context("Invalid history window")?;

        let mut registry = self.build_registry(&history).await?;
        self.merge_resources(&history, &mut registry).await?;
        self.merge_termination(&history, &mut registry).await?;
        self.fold_attributes(&history, &mut registry).await?;
        self.merge_namespaces(&history, &mut registry).await?;
        self.merge_owners(&history, &mut registry).await?;

        let mut exports = Vec::new();
        let cluster = self.settings.cluster();
        exports.push(self.record(export::write_config(dir, &registry, cluster)?));
        exports.push(self.record(export::write_attributes(dir, &registry, cluster)?));

        for window in &windows {
            exports.extend(self.export_window(&registry, window).await?);
        }

        self.logger.log_completed(exports.len());
        Ok(RunReport {
            containers: registry.len(),
            exports,
        })
    }

    fn record(&self, summary: ExportSummary) -> ExportSummary {
        self.logger.log_export(&summary.file, summary.rows);
        summary
    }

    async fn build_registry(&self, history: &HistoryCollector<'_>) -> Result<Registry> {
        let mut registry = Registry::new();
        for branch in BRANCHES {
            let samples = history
                .collect(&self.queries.memory_limit(branch), RESULT_FIELD)
                .await
                .context("Failed to collect container memory limits")?;
            seed(&mut registry, &samples, &cadvisor_keys(branch), branch);
        }

        self.logger.log_registry_seeded(
            registry.namespace_count(),
            registry.owner_count(),
            registry.len(),
        );
        self.audit.dump("Dump systems", &registry);
        Ok(registry)
    }

    async fn merge_resources(&self, history: &HistoryCollector<'_>, registry: &mut Registry) -> Result<()> {
        for metric in KubeStateMetric::ALL {
            let field = metric.field();
            let mut merged = 0;
            for branch in BRANCHES {
                let samples = history
                    .collect(&self.queries.resource(metric, branch), RESULT_FIELD)
                    .await
                    .with_context(|| format!("Failed to collect {}", field.name()))?;
                merged += merge_container_scalar(registry, &samples, &kube_state_keys(branch), field);
            }
            self.logger.log_merge(field.name(), merged);
        }
        Ok(())
    }

    /// Termination status reflects the present only, so it is never windowed
    async fn merge_termination(&self, history: &HistoryCollector<'_>, registry: &mut Registry) -> Result<()> {
        let mut merged = 0;
        for branch in BRANCHES {
            let samples = history
                .collect_instant(&self.queries.termination_state(branch), RESULT_FIELD)
                .await
                .context("Failed to collect container termination state")?;
            merged += merge_termination_state(registry, &samples, &kube_state_keys(branch));
        }
        self.logger.log_merge("state", merged);
        Ok(())
    }

    async fn fold_attributes(&self, history: &HistoryCollector<'_>, registry: &mut Registry) -> Result<()> {
        for branch in BRANCHES {
            let samples = history
                .collect(&self.queries.container_labels(branch), RESULT_FIELD)
                .await
                .context("Failed to collect container labels")?;
            let folded =
                fold_container_attributes(registry, &samples, &cadvisor_keys(branch), ContainerAttribute::Labels);
            self.logger.log_merge("attr", folded);
        }
        self.audit.dump("Dump systems Additional Attributes", &*registry);

        for branch in BRANCHES {
            let samples = history
                .collect(&self.queries.container_info(branch), RESULT_FIELD)
                .await
                .context("Failed to collect container info")?;
            let folded =
                fold_container_attributes(registry, &samples, &kube_state_keys(branch), ContainerAttribute::Info);
            self.logger.log_merge("con_info", folded);
        }
        self.audit.dump("Dump systems kube state", &*registry);

        for (target, name) in [(PodAttribute::Info, "pod_info"), (PodAttribute::Labels, "pod_labels")] {
            for branch in BRANCHES {
                let query = match target {
                    PodAttribute::Info => self.queries.pod_info(branch),
                    PodAttribute::Labels => self.queries.pod_labels(branch),
                };
                let samples = history
                    .collect(&query, RESULT_FIELD)
                    .await
                    .with_context(|| format!("Failed to collect {}", name))?;
                let folded =
                    fold_pod_attributes(registry, &samples, label::NAMESPACE, pod_owner_label(branch), target);
                self.logger.log_merge(name, folded);
            }
        }
        Ok(())
    }

    async fn merge_namespaces(&self, history: &HistoryCollector<'_>, registry: &mut Registry) -> Result<()> {
        let samples = history
            .collect(NAMESPACE_LABELS, RESULT_FIELD)
            .await
            .context("Failed to collect namespace labels")?;
        let folded = fold_namespace_labels(registry, &samples, label::NAMESPACE);
        self.logger.log_merge("namespace_labels", folded);

        let samples = history
            .collect(LIMIT_RANGES, RESULT_FIELD)
            .await
            .context("Failed to collect namespace limit ranges")?;
        let merged = merge_limit_ranges(registry, &samples);
        self.logger.log_merge("limit_ranges", merged);
        Ok(())
    }

    async fn merge_owners(&self, history: &HistoryCollector<'_>, registry: &mut Registry) -> Result<()> {
        for size in CONTROLLER_SIZES {
            let samples = history
                .collect(size.query, RESULT_FIELD)
                .await
                .with_context(|| format!("Failed to collect {}", size.query))?;
            let merged =
                merge_owner_scalar(registry, &samples, label::NAMESPACE, size.owner_label, OwnerField::CurrentSize);
            self.logger.log_merge(size.owner_label, merged);
        }

        for branch in BRANCHES {
            let samples = history
                .collect(&self.queries.creation_time(branch), RESULT_FIELD)
                .await
                .context("Failed to collect pod creation time")?;
            let merged = merge_owner_scalar(
                registry,
                &samples,
                label::NAMESPACE,
                pod_owner_label(branch),
                OwnerField::CreationTime,
            );
            self.logger.log_merge(OwnerField::CreationTime.name(), merged);
        }
        Ok(())
    }

    /// Range samples of one workload metric, both branches
    async fn collect_workload(&self, metric: WorkloadMetric, window: &TimeWindow) -> Result<Vec<Sample>> {
        let mut samples = Vec::new();
        for branch in BRANCHES {
            let query = format!("{}{}", self.queries.workload(metric, branch), window.range_params());
            samples.extend(
                self.source
                    .fetch(&query, RESULT_FIELD, QueryMode::Range)
                    .await
                    .with_context(|| format!("Failed to collect {}", metric.file_prefix()))?,
            );
        }
        Ok(samples)
    }

    async fn export_window(&self, registry: &Registry, window: &TimeWindow) -> Result<Vec<ExportSummary>> {
        info!(start = %window.start_param(), end = %window.end_param(), "Exporting workload window");
        let dir = &self.settings.output_dir;
        let cluster = self.settings.cluster();
        let mut exports = Vec::new();
        let mut network: HashMap<WorkloadMetric, NetworkSeries> = HashMap::new();

        for metric in WorkloadMetric::ALL {
            let samples = self.collect_workload(metric, window).await?;
            let file = workload_file_name(metric.file_prefix(), window);
            debug!(file = %file, series = samples.len(), "Collected workload series");

            let summary = if metric.is_network() {
                let (summary, series) = write_network(dir, &file, metric, registry, &samples)?;
                network.insert(metric, series);
                summary
            } else {
                write_workload(dir, &file, metric, registry, cluster, &samples)?
            };
            exports.push(self.record(summary));
        }

        let empty = NetworkSeries::new();
        for total in NetworkTotal::ALL {
            let file = workload_file_name(total.file_prefix(), window);
            let sent = network.get(&total.sent()).unwrap_or(&empty);
            let received = network.get(&total.received()).unwrap_or(&empty);
            exports.push(self.record(write_network_total(dir, &file, total, sent, received)?));
        }

        Ok(exports)
    }
}
