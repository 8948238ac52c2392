//! PromQL catalogue for the Kubernetes collection method
//!
//! cadvisor series carry `pod_name`/`container_name`; they are joined to
//! kube-state-metrics' `kube_pod_owner` on `(namespace, pod_name)` to learn
//! the owning controller. Every query comes in an owned and a standalone
//! form, selected by [`Branch`].

use crate::config::Aggregator;
use crate::models::label;
use crate::registry::{Branch, ContainerField, EntityKeys};

/// Excludes the pause containers cadvisor reports for every pod
const CADVISOR_FILTER: &str = r#"{name!~"k8s_POD_.*"}"#;

const CADVISOR_GROUP_BY: &str = "instance,pod_name,namespace,container_name,owner_name,owner_kind";

const OWNED_JOIN: &str = r#"* on (namespace,pod_name) group_left (owner_name,owner_kind) label_replace(kube_pod_owner{owner_kind!="<none>"}, "pod_name", "$1", "pod", "(.*)")) by (owner_name,owner_kind,namespace,container_name)"#;

const STANDALONE_JOIN: &str = r#"* on (namespace,pod_name) group_left (owner_name,owner_kind) label_replace(kube_pod_owner{owner_kind="<none>"}, "pod_name", "$1", "pod", "(.*)")) by (pod_name,namespace,container_name)"#;

fn owner_selector(branch: Branch) -> &'static str {
    match branch {
        Branch::Owned => r#"kube_pod_owner{owner_kind!="<none>"}"#,
        Branch::Standalone => r#"kube_pod_owner{owner_kind="<none>"}"#,
    }
}

fn cadvisor_join(branch: Branch) -> &'static str {
    match branch {
        Branch::Owned => OWNED_JOIN,
        Branch::Standalone => STANDALONE_JOIN,
    }
}

/// Grouping applied to kube-state-metrics series after the owner join
fn kube_state_group_by(branch: Branch) -> &'static str {
    match branch {
        Branch::Owned => "owner_name,owner_kind,namespace,container",
        Branch::Standalone => "pod,namespace,container",
    }
}

/// Labels locating an entity in cadvisor results
pub fn cadvisor_keys(branch: Branch) -> EntityKeys {
    match branch {
        Branch::Owned => EntityKeys::new(label::OWNER_NAME, label::CONTAINER_NAME),
        Branch::Standalone => EntityKeys::new(label::POD_NAME, label::CONTAINER_NAME),
    }
}

/// Labels locating an entity in kube-state-metrics results
pub fn kube_state_keys(branch: Branch) -> EntityKeys {
    match branch {
        Branch::Owned => EntityKeys::new(label::OWNER_NAME, label::CONTAINER),
        Branch::Standalone => EntityKeys::new(label::POD, label::CONTAINER),
    }
}

/// Label carrying the owner key in pod-level kube-state-metrics results
pub fn pod_owner_label(branch: Branch) -> &'static str {
    match branch {
        Branch::Owned => label::OWNER_NAME,
        Branch::Standalone => label::POD,
    }
}

/// Container resource settings reported by kube-state-metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KubeStateMetric {
    CpuLimit,
    CpuRequest,
    MemLimit,
    MemRequest,
    Restarts,
}

impl KubeStateMetric {
    pub const ALL: [KubeStateMetric; 5] = [
        KubeStateMetric::CpuLimit,
        KubeStateMetric::CpuRequest,
        KubeStateMetric::MemLimit,
        KubeStateMetric::MemRequest,
        KubeStateMetric::Restarts,
    ];

    /// Registry slot the metric is merged into
    pub fn field(self) -> ContainerField {
        match self {
            KubeStateMetric::CpuLimit => ContainerField::CpuLimit,
            KubeStateMetric::CpuRequest => ContainerField::CpuRequest,
            KubeStateMetric::MemLimit => ContainerField::MemLimit,
            KubeStateMetric::MemRequest => ContainerField::MemRequest,
            KubeStateMetric::Restarts => ContainerField::Restarts,
        }
    }

    fn base_query(self) -> &'static str {
        match self {
            KubeStateMetric::CpuLimit => {
                "sum(kube_pod_container_resource_limits_cpu_cores) by (pod,namespace,container)*1000"
            }
            KubeStateMetric::CpuRequest => {
                "sum(kube_pod_container_resource_requests_cpu_cores) by (pod,namespace,container)*1000"
            }
            KubeStateMetric::MemLimit => {
                "sum(kube_pod_container_resource_limits_memory_bytes) by (pod,namespace,container)/1024/1024"
            }
            KubeStateMetric::MemRequest => {
                "sum(kube_pod_container_resource_requests_memory_bytes) by (pod,namespace,container)/1024/1024"
            }
            KubeStateMetric::Restarts => {
                "sum(kube_pod_container_status_restarts_total) by (pod,namespace,container)"
            }
        }
    }
}

/// Controller size series and the label naming the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSize {
    pub query: &'static str,
    pub owner_label: &'static str,
}

pub const CONTROLLER_SIZES: [ControllerSize; 3] = [
    ControllerSize {
        query: "kube_replicaset_spec_replicas",
        owner_label: "replicaset",
    },
    ControllerSize {
        query: "kube_replicationcontroller_spec_replicas",
        owner_label: "replicationcontroller",
    },
    ControllerSize {
        query: "kube_daemonset_status_number_available",
        owner_label: "daemonset",
    },
];

pub const NAMESPACE_LABELS: &str = "kube_namespace_labels";

pub const LIMIT_RANGES: &str = "kube_limitrange";

/// Per-container utilisation series exported once per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadMetric {
    Cpu,
    Memory,
    Rss,
    Disk,
    NetBytesSent,
    NetBytesReceived,
    NetPacketsSent,
    NetPacketsReceived,
}

impl WorkloadMetric {
    pub const ALL: [WorkloadMetric; 8] = [
        WorkloadMetric::Cpu,
        WorkloadMetric::Memory,
        WorkloadMetric::Rss,
        WorkloadMetric::Disk,
        WorkloadMetric::NetBytesSent,
        WorkloadMetric::NetBytesReceived,
        WorkloadMetric::NetPacketsSent,
        WorkloadMetric::NetPacketsReceived,
    ];

    /// Export file name before the window suffix
    pub fn file_prefix(self) -> &'static str {
        match self {
            WorkloadMetric::Cpu => "cpu_mCores_workload",
            WorkloadMetric::Memory => "mem_workload",
            WorkloadMetric::Rss => "rss_workload",
            WorkloadMetric::Disk => "disk_workload",
            WorkloadMetric::NetBytesSent => "net_bytes_s_workload",
            WorkloadMetric::NetBytesReceived => "net_bytes_r_workload",
            WorkloadMetric::NetPacketsSent => "net_pkts_s_workload",
            WorkloadMetric::NetPacketsReceived => "net_pkts_r_workload",
        }
    }

    /// Value column header
    pub fn property(self) -> &'static str {
        match self {
            WorkloadMetric::Cpu => "CPU Utilization in mCores",
            WorkloadMetric::Memory => "Raw Mem Utilization",
            WorkloadMetric::Rss => "Actual Memory Utilization",
            WorkloadMetric::Disk => "Raw Disk Utilization",
            WorkloadMetric::NetBytesSent => "Network Interface Bytes Sent per sec",
            WorkloadMetric::NetBytesReceived => "Network Interface Bytes Received per sec",
            WorkloadMetric::NetPacketsSent => "Network Interface Packets Sent per sec",
            WorkloadMetric::NetPacketsReceived => "Network Interface Packets Received per sec",
        }
    }

    pub fn is_network(self) -> bool {
        !matches!(
            self,
            WorkloadMetric::Cpu | WorkloadMetric::Memory | WorkloadMetric::Rss | WorkloadMetric::Disk
        )
    }

    fn expression(self) -> String {
        let summed = |series: &str| format!("sum({}{}) by ({})", series, CADVISOR_FILTER, CADVISOR_GROUP_BY);
        let rated = |series: &str| {
            format!(
                "sum(rate({}{}[5m])) by ({})",
                series, CADVISOR_FILTER, CADVISOR_GROUP_BY
            )
        };

        match self {
            WorkloadMetric::Cpu => format!(
                "round(sum(rate(container_cpu_usage_seconds_total{}[5m])) by ({})*1000,1)",
                CADVISOR_FILTER, CADVISOR_GROUP_BY
            ),
            WorkloadMetric::Memory => summed("container_memory_usage_bytes"),
            WorkloadMetric::Rss => summed("container_memory_rss"),
            WorkloadMetric::Disk => summed("container_fs_usage_bytes"),
            WorkloadMetric::NetBytesSent => rated("container_network_transmit_bytes_total"),
            WorkloadMetric::NetBytesReceived => rated("container_network_receive_bytes_total"),
            WorkloadMetric::NetPacketsSent => rated("container_network_transmit_packets_total"),
            WorkloadMetric::NetPacketsReceived => rated("container_network_receive_packets_total"),
        }
    }
}

/// Sum of a sent and a received network series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTotal {
    Bytes,
    Packets,
}

impl NetworkTotal {
    pub const ALL: [NetworkTotal; 2] = [NetworkTotal::Bytes, NetworkTotal::Packets];

    pub fn sent(self) -> WorkloadMetric {
        match self {
            NetworkTotal::Bytes => WorkloadMetric::NetBytesSent,
            NetworkTotal::Packets => WorkloadMetric::NetPacketsSent,
        }
    }

    pub fn received(self) -> WorkloadMetric {
        match self {
            NetworkTotal::Bytes => WorkloadMetric::NetBytesReceived,
            NetworkTotal::Packets => WorkloadMetric::NetPacketsReceived,
        }
    }

    pub fn file_prefix(self) -> &'static str {
        match self {
            NetworkTotal::Bytes => "net_bytes_workload",
            NetworkTotal::Packets => "net_pkts_workload",
        }
    }

    pub fn property(self) -> &'static str {
        match self {
            NetworkTotal::Bytes => "Network Interface Bytes Total per sec",
            NetworkTotal::Packets => "Network Interface Packets per sec",
        }
    }
}

/// Builds every query a run issues, for one aggregation function
#[derive(Debug, Clone, Copy)]
pub struct QueryCatalog {
    aggregator: Aggregator,
}

impl QueryCatalog {
    pub fn new(aggregator: Aggregator) -> Self {
        Self { aggregator }
    }

    fn agg(&self) -> &'static str {
        self.aggregator.as_str()
    }

    /// Wrap a cadvisor expression in the aggregator and the owner join
    fn cadvisor(&self, expression: &str, branch: Branch) -> String {
        format!("{}({} {}", self.agg(), expression, cadvisor_join(branch))
    }

    /// Wrap a kube-state-metrics expression in the aggregator and the owner join
    fn kube_state(&self, expression: &str, branch: Branch) -> String {
        format!(
            "{}({} * on (namespace,pod) group_left (owner_name,owner_kind) {}) by ({})",
            self.agg(),
            expression,
            owner_selector(branch),
            kube_state_group_by(branch)
        )
    }

    /// Container memory limits in MiB; seeds the registry
    pub fn memory_limit(&self, branch: Branch) -> String {
        self.cadvisor(
            &format!(
                "sum(container_spec_memory_limit_bytes{}) by ({})/1024/1024",
                CADVISOR_FILTER, CADVISOR_GROUP_BY
            ),
            branch,
        )
    }

    pub fn resource(&self, metric: KubeStateMetric, branch: Branch) -> String {
        self.kube_state(metric.base_query(), branch)
    }

    /// Termination status; always run as an instant query
    pub fn termination_state(&self, branch: Branch) -> String {
        self.kube_state(
            "sum(kube_pod_container_status_terminated) by (pod,namespace,container)",
            branch,
        )
    }

    pub fn creation_time(&self, branch: Branch) -> String {
        self.kube_state("kube_pod_created", branch)
    }

    /// `container_spec_cpu_shares` with every container label attached
    pub fn container_labels(&self, branch: Branch) -> String {
        format!(
            "(sum(container_spec_cpu_shares{}) by (pod_name,namespace,container_name)) * on (namespace,pod_name,container_name) group_right container_spec_cpu_shares * on (namespace,pod_name) group_left (owner_name,owner_kind) label_replace({}, \"pod_name\", \"$1\", \"pod\", \"(.*)\")",
            CADVISOR_FILTER,
            owner_selector(branch)
        )
    }

    pub fn container_info(&self, branch: Branch) -> String {
        format!(
            "sum(kube_pod_container_info) by (pod,namespace,container) * on (namespace,pod,container) group_right kube_pod_container_info * on (namespace,pod) group_left (owner_name,owner_kind) {}",
            owner_selector(branch)
        )
    }

    pub fn pod_info(&self, branch: Branch) -> String {
        format!(
            "sum(kube_pod_container_info) by (pod,namespace) * on (namespace,pod) group_right {}",
            owner_selector(branch)
        )
    }

    pub fn pod_labels(&self, branch: Branch) -> String {
        format!(
            "sum(kube_pod_container_info) by (pod,namespace) * on (namespace,pod) group_right kube_pod_labels * on (namespace,pod) group_left (owner_name,owner_kind) {}",
            owner_selector(branch)
        )
    }

    pub fn workload(&self, metric: WorkloadMetric, branch: Branch) -> String {
        self.cadvisor(&metric.expression(), branch)
    }
}
