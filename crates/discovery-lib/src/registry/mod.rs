//! Entity registry
//!
//! The registry is the set of containers a run reports on, nested as
//! namespace → owner → container. It is seeded once from the memory-limit
//! query; every later pass only enriches entries that already exist.
//!
//! An owner is either a controller (deployment, replica set, daemon set...)
//! or a standalone pod. Both kinds share one owner map per namespace, so a
//! key has exactly one entry whichever seed pass created it.

mod aggregate;
mod merge;
mod seed;


pub use aggregate::{
    append_if_absent, escape_value, fold_container_attributes, fold_namespace_labels,
    fold_pod_attributes, render_multi_value, render_segment, ContainerAttribute, PodAttribute,
    MAX_KEY_LEN, MAX_SEGMENT_LEN,
};
pub use merge::{
    merge_container_scalar, merge_limit_ranges, merge_owner_scalar, merge_termination_state,
    ContainerField, OwnerField,
};
pub use seed::seed;

use crate::models::{label, Sample};
use serde::Serialize;
use std::collections::BTreeMap;

/// Owner key and `owner_kind` value used for pods without a controller
pub const STANDALONE_OWNER: &str = "<none>";

/// Which half of the owned/standalone split a query result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Pods owned by a controller, keyed by controller name
    Owned,
    /// Pods without an owner, keyed by pod name
    Standalone,
}

/// Label names that locate an entity within one branch's results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityKeys {
    pub namespace: &'static str,
    pub owner: &'static str,
    pub container: &'static str,
}

impl EntityKeys {
    pub const fn new(owner: &'static str, container: &'static str) -> Self {
        Self {
            namespace: label::NAMESPACE,
            owner,
            container,
        }
    }
}

/// How an owner entry came to exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Ownership {
    Owned { kind: String, name: String },
    Standalone,
}

impl Ownership {
    /// Resolve ownership for a sample of the given branch
    pub fn resolve(sample: &Sample, branch: Branch) -> Self {
        match branch {
            Branch::Owned => Ownership::Owned {
                kind: sample.label(label::OWNER_KIND).unwrap_or_default().to_string(),
                name: sample.label(label::OWNER_NAME).unwrap_or_default().to_string(),
            },
            Branch::Standalone => Ownership::Standalone,
        }
    }

    /// Value of the "Created By Kind" column
    pub fn kind(&self) -> &str {
        match self {
            Ownership::Owned { kind, .. } => kind,
            Ownership::Standalone => STANDALONE_OWNER,
        }
    }

    /// Value of the "Created By Name" column
    pub fn name(&self) -> &str {
        match self {
            Ownership::Owned { name, .. } => name,
            Ownership::Standalone => "",
        }
    }

    pub fn is_standalone(&self) -> bool {
        matches!(self, Ownership::Standalone)
    }
}

/// Container power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ContainerState {
    /// Assumed until a termination-status sample says otherwise
    #[default]
    Terminated,
    Running,
}

impl ContainerState {
    /// Interpret a `kube_pod_container_status_terminated` value
    pub fn from_terminated_value(value: &str) -> Option<Self> {
        let terminated: f64 = value.trim().parse().ok()?;
        Some(if terminated == 0.0 {
            ContainerState::Running
        } else {
            ContainerState::Terminated
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerState::Terminated => "Terminated",
            ContainerState::Running => "Running",
        }
    }
}

/// Leaf entry: one container
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Container {
    /// Memory limit in MiB from the seed query
    pub memory: String,
    /// Multi-value container labels
    pub attr: String,
    /// Pipe-terminated list of instances the container was seen on
    pub con_instance: String,
    /// Multi-value container info
    pub con_info: String,
    pub cpu_limit: String,
    pub cpu_request: String,
    pub mem_limit: String,
    pub mem_request: String,
    pub restarts: String,
    /// Pod name, backfilled by the attribute pass
    pub pod_name: String,
    pub state: ContainerState,
}

/// Controller or standalone pod
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Owner {
    pub ownership: Ownership,
    pub pod_info: String,
    pub pod_labels: String,
    pub current_size: String,
    /// Pod creation time as unix seconds
    pub creation_time: String,
    pub containers: BTreeMap<String, Container>,
}

impl Owner {
    pub fn new(ownership: Ownership) -> Self {
        Self {
            ownership,
            pod_info: String::new(),
            pod_labels: String::new(),
            current_size: String::new(),
            creation_time: String::new(),
            containers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Namespace {
    pub labels: String,
    /// Default limit-range values
    pub cpu_limit: String,
    pub cpu_request: String,
    pub mem_limit: String,
    pub mem_request: String,
    pub owners: BTreeMap<String, Owner>,
}

/// Borrowed view of one container together with its parents
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    pub namespace_name: &'a str,
    pub namespace: &'a Namespace,
    pub owner_key: &'a str,
    pub owner: &'a Owner,
    pub container_name: &'a str,
    pub container: &'a Container,
}

impl<'a> EntityRef<'a> {
    /// Human-readable pod column
    ///
    /// Standalone entries (and the sentinel key) report the backfilled pod
    /// name; controllers report their own name.
    pub fn pod_identity(&self) -> &'a str {
        let standalone =
            self.owner.ownership.is_standalone() || self.owner_key == STANDALONE_OWNER;
        if standalone && !self.container.pod_name.is_empty() {
            &self.container.pod_name
        } else {
            self.owner_key
        }
    }
}

/// The full registry for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Registry {
    namespaces: BTreeMap<String, Namespace>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(&self, namespace: &str) -> Option<&Namespace> {
        self.namespaces.get(namespace)
    }

    pub fn namespace_mut(&mut self, namespace: &str) -> Option<&mut Namespace> {
        self.namespaces.get_mut(namespace)
    }

    pub fn owner(&self, namespace: &str, owner: &str) -> Option<&Owner> {
        self.namespace(namespace)?.owners.get(owner)
    }

    pub fn owner_mut(&mut self, namespace: &str, owner: &str) -> Option<&mut Owner> {
        self.namespace_mut(namespace)?.owners.get_mut(owner)
    }

    pub fn container(&self, namespace: &str, owner: &str, container: &str) -> Option<&Container> {
        self.owner(namespace, owner)?.containers.get(container)
    }

    pub fn container_mut(
        &mut self,
        namespace: &str,
        owner: &str,
        container: &str,
    ) -> Option<&mut Container> {
        self.owner_mut(namespace, owner)?.containers.get_mut(container)
    }

    /// Namespace entry, created empty if absent
    pub(crate) fn namespace_entry(&mut self, namespace: &str) -> &mut Namespace {
        self.namespaces.entry(namespace.to_string()).or_default()
    }

    pub fn entity(&self, namespace: &str, owner: &str, container: &str) -> Option<EntityRef<'_>> {
        let (namespace_name, ns) = self.namespaces.get_key_value(namespace)?;
        let (owner_key, owner_entry) = ns.owners.get_key_value(owner)?;
        let (container_name, container_entry) = owner_entry.containers.get_key_value(container)?;
        Some(EntityRef {
            namespace_name,
            namespace: ns,
            owner_key,
            owner: owner_entry,
            container_name,
            container: container_entry,
        })
    }

    /// Every container in namespace, owner, container order
    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.namespaces.iter().flat_map(|(namespace_name, ns)| {
            ns.owners.iter().flat_map(move |(owner_key, owner)| {
                owner
                    .containers
                    .iter()
                    .map(move |(container_name, container)| EntityRef {
                        namespace_name,
                        namespace: ns,
                        owner_key,
                        owner,
                        container_name,
                        container,
                    })
            })
        })
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    pub fn owner_count(&self) -> usize {
        self.namespaces.values().map(|ns| ns.owners.len()).sum()
    }

    /// Number of containers
    pub fn len(&self) -> usize {
        self.namespaces
            .values()
            .flat_map(|ns| ns.owners.values())
            .map(|owner| owner.containers.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
