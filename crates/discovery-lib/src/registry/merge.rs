//! Single-valued metric merging
//!
//! Each sample's latest point (the instant value, or the last point of a
//! range) is written into a named field of an existing entry. Samples for
//! entities outside the registry are skipped.

use super::{Container, ContainerState, EntityKeys, Owner, Registry};
use crate::models::Sample;

/// Container-level scalar slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerField {
    CpuLimit,
    CpuRequest,
    MemLimit,
    MemRequest,
    Restarts,
}

impl ContainerField {
    pub fn name(self) -> &'static str {
        match self {
            ContainerField::CpuLimit => "cpu_limit",
            ContainerField::CpuRequest => "cpu_request",
            ContainerField::MemLimit => "mem_limit",
            ContainerField::MemRequest => "mem_request",
            ContainerField::Restarts => "restarts",
        }
    }

    fn slot(self, container: &mut Container) -> &mut String {
        match self {
            ContainerField::CpuLimit => &mut container.cpu_limit,
            ContainerField::CpuRequest => &mut container.cpu_request,
            ContainerField::MemLimit => &mut container.mem_limit,
            ContainerField::MemRequest => &mut container.mem_request,
            ContainerField::Restarts => &mut container.restarts,
        }
    }
}

/// Owner-level scalar slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerField {
    CurrentSize,
    CreationTime,
}

impl OwnerField {
    pub fn name(self) -> &'static str {
        match self {
            OwnerField::CurrentSize => "current_size",
            OwnerField::CreationTime => "creation_time",
        }
    }

    fn slot(self, owner: &mut Owner) -> &mut String {
        match self {
            OwnerField::CurrentSize => &mut owner.current_size,
            OwnerField::CreationTime => &mut owner.creation_time,
        }
    }
}

fn container_for<'r>(
    registry: &'r mut Registry,
    sample: &Sample,
    keys: &EntityKeys,
) -> Option<&'r mut Container> {
    registry.container_mut(
        sample.label(keys.namespace)?,
        sample.label(keys.owner)?,
        sample.label(keys.container)?,
    )
}

/// Merge a container scalar; returns the number of containers written
pub fn merge_container_scalar(
    registry: &mut Registry,
    samples: &[Sample],
    keys: &EntityKeys,
    field: ContainerField,
) -> usize {
    let mut merged = 0;
    for sample in samples {
        let Some(value) = sample.latest_value() else {
            continue;
        };
        if let Some(container) = container_for(registry, sample, keys) {
            *field.slot(container) = value.to_string();
            merged += 1;
        }
    }
    merged
}

/// Merge `kube_pod_container_status_terminated` into container state
pub fn merge_termination_state(registry: &mut Registry, samples: &[Sample], keys: &EntityKeys) -> usize {
    let mut merged = 0;
    for sample in samples {
        let Some(state) = sample
            .latest_value()
            .and_then(ContainerState::from_terminated_value)
        else {
            continue;
        };
        if let Some(container) = container_for(registry, sample, keys) {
            container.state = state;
            merged += 1;
        }
    }
    merged
}

/// Merge an owner scalar keyed by `owner_label`
pub fn merge_owner_scalar(
    registry: &mut Registry,
    samples: &[Sample],
    namespace_label: &str,
    owner_label: &str,
    field: OwnerField,
) -> usize {
    let mut merged = 0;
    for sample in samples {
        let (Some(namespace), Some(owner), Some(value)) = (
            sample.label(namespace_label),
            sample.label(owner_label),
            sample.latest_value(),
        ) else {
            continue;
        };
        if let Some(entry) = registry.owner_mut(namespace, owner) {
            *field.slot(entry) = value.to_string();
            merged += 1;
        }
    }
    merged
}

/// Merge `kube_limitrange` defaults into namespace entries
///
/// `constraint=default` feeds the limits, `constraint=defaultRequest` the
/// requests. Memory is reported in MiB.
pub fn merge_limit_ranges(registry: &mut Registry, samples: &[Sample]) -> usize {
    let mut merged = 0;
    for sample in samples {
        let (Some(namespace), Some(constraint), Some(resource), Some(value)) = (
            sample.label(crate::models::label::NAMESPACE),
            sample.label("constraint"),
            sample.label("resource"),
            sample.latest_value(),
        ) else {
            continue;
        };
        let Some(entry) = registry.namespace_mut(namespace) else {
            continue;
        };

        let slot = match (constraint, resource) {
            ("default", "cpu") => &mut entry.cpu_limit,
            ("default", "memory") => &mut entry.mem_limit,
            ("defaultRequest", "cpu") => &mut entry.cpu_request,
            ("defaultRequest", "memory") => &mut entry.mem_request,
            _ => continue,
        };

        let rendered = if resource == "memory" {
            match bytes_to_mib(value) {
                Some(mib) => mib,
                None => continue,
            }
        } else {
            value.to_string()
        };

        *slot = rendered;
        merged += 1;
    }
    merged
}

/// Rendered with a trailing `.0` for whole numbers (`512.0`)
fn bytes_to_mib(value: &str) -> Option<String> {
    let bytes: f64 = value.trim().parse().ok()?;
    Some(format!("{:?}", bytes / 1024.0 / 1024.0))
}
