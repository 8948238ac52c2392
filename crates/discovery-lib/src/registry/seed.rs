//! Registry seeding

use super::{Branch, Container, EntityKeys, Owner, Ownership, Registry};
use crate::models::Sample;
use tracing::debug;

/// Seed the registry from one branch's memory-limit samples
///
/// Namespaces and owners are created only when absent. A container entry is
/// created on first sight; every later sample for the same key only replaces
/// `memory`, so seeding the same batch twice changes nothing. Returns the
/// number of containers created.
pub fn seed(registry: &mut Registry, samples: &[Sample], keys: &EntityKeys, branch: Branch) -> usize {
    let mut created = 0;

    for sample in samples {
        let (Some(namespace), Some(owner_key)) = (sample.label(keys.namespace), sample.label(keys.owner))
        else {
            continue;
        };

        let ns = registry.namespace_entry(namespace);
        let owner = ns.owners.entry(owner_key.to_string()).or_insert_with(|| {
            debug!(namespace = %namespace, owner = %owner_key, labels = ?sample.metric, "Initialize owner");
            Owner::new(Ownership::resolve(sample, branch))
        });

        let Some(container_name) = sample.label(keys.container) else {
            continue;
        };

        let container = owner
            .containers
            .entry(container_name.to_string())
            .or_insert_with(|| {
                created += 1;
                Container::default()
            });

        if let Some(memory) = sample.latest_value() {
            container.memory = memory.to_string();
        }
    }

    created
}
