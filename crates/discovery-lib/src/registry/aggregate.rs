//! Multi-value attribute folding
//!
//! Every label observed for an entity is accumulated as `key → values`, the
//! values `;`-joined, then rendered into one `key : value|key : value` string.
//! Each segment is capped at `MAX_SEGMENT_LEN` bytes; keys of `MAX_KEY_LEN`
//! bytes or more are dropped.

use super::{EntityKeys, Registry};
use crate::models::{label, Labels, Sample};
use std::collections::BTreeMap;

/// Keys at or above this length are left out of the rendered string
pub const MAX_KEY_LEN: usize = 250;

/// Upper bound on one rendered `key : value` segment
pub const MAX_SEGMENT_LEN: usize = 255;

const SEGMENT_SEPARATOR: &str = " : ";

/// Container-level attribute slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAttribute {
    /// `attr`, the container labels
    Labels,
    /// `con_info`
    Info,
}

/// Owner-level attribute slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodAttribute {
    /// `pod_info`
    Info,
    /// `pod_labels`
    Labels,
}

/// Commas delimit CSV fields, so values carry `;` instead
pub fn escape_value(value: &str) -> String {
    value.replace(',', ";")
}

/// Append `value` to a `;`-joined list unless it already occurs in it.
///
/// This is a substring test, not set membership: `web` is never appended to
/// `web-1`. Exports depend on this behavior staying as it is.
pub fn append_if_absent(existing: &mut String, value: &str) {
    if !existing.contains(value) {
        existing.push(';');
        existing.push_str(value);
    }
}

/// Render one `key : value` segment, truncating the value to fit
pub fn render_segment(key: &str, value: &str) -> Option<String> {
    if key.len() >= MAX_KEY_LEN {
        return None;
    }
    let budget = MAX_SEGMENT_LEN - key.len() - SEGMENT_SEPARATOR.len();
    Some(format!("{}{}{}", key, SEGMENT_SEPARATOR, truncate(value, budget)))
}

/// Render `key : value` segments joined by `|`
pub fn render_multi_value<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    pairs
        .into_iter()
        .filter_map(|(key, value)| render_segment(key, value))
        .collect::<Vec<_>>()
        .join("|")
}

fn truncate(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Label values seen for one entity, in first-seen key order
#[derive(Debug, Default)]
struct LabelAccumulator {
    entries: Vec<(String, String)>,
}

impl LabelAccumulator {
    fn absorb(&mut self, labels: &Labels) {
        for (key, value) in labels {
            let value = escape_value(value);
            match self.entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, existing)) => append_if_absent(existing, &value),
                None => self.entries.push((key.clone(), value)),
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn render(&self) -> String {
        render_multi_value(self.iter())
    }
}

/// Fold sample labels into a container-level attribute
///
/// While folding, an `instance` label is appended to `con_instance` (for the
/// `Labels` slot only) and a `pod` label overwrites `pod_name`. Returns the
/// number of containers updated.
pub fn fold_container_attributes(
    registry: &mut Registry,
    samples: &[Sample],
    keys: &EntityKeys,
    target: ContainerAttribute,
) -> usize {
    let mut pending: BTreeMap<(&str, &str, &str), LabelAccumulator> = BTreeMap::new();

    for sample in samples {
        let (Some(namespace), Some(owner), Some(container)) = (
            sample.label(keys.namespace),
            sample.label(keys.owner),
            sample.label(keys.container),
        ) else {
            continue;
        };
        if registry.container(namespace, owner, container).is_none() {
            continue;
        }
        pending
            .entry((namespace, owner, container))
            .or_default()
            .absorb(&sample.metric);
    }

    let mut folded = 0;
    for ((namespace, owner, container), acc) in &pending {
        let Some(entry) = registry.container_mut(namespace, owner, container) else {
            continue;
        };

        for (key, value) in acc.iter() {
            if key == label::INSTANCE {
                if target == ContainerAttribute::Labels {
                    entry.con_instance.push_str(&value.replace(';', "|"));
                    entry.con_instance.push('|');
                }
            } else if key == label::POD {
                entry.pod_name = value.to_string();
            }
        }

        let rendered = acc.render();
        match target {
            ContainerAttribute::Labels => entry.attr = rendered,
            ContainerAttribute::Info => entry.con_info = rendered,
        }
        folded += 1;
    }

    folded
}

/// Fold sample labels into an owner-level attribute
pub fn fold_pod_attributes(
    registry: &mut Registry,
    samples: &[Sample],
    namespace_label: &str,
    owner_label: &str,
    target: PodAttribute,
) -> usize {
    let mut pending: BTreeMap<(&str, &str), LabelAccumulator> = BTreeMap::new();

    for sample in samples {
        let (Some(namespace), Some(owner)) = (sample.label(namespace_label), sample.label(owner_label))
        else {
            continue;
        };
        if registry.owner(namespace, owner).is_none() {
            continue;
        }
        pending
            .entry((namespace, owner))
            .or_default()
            .absorb(&sample.metric);
    }

    let mut folded = 0;
    for ((namespace, owner), acc) in &pending {
        if let Some(entry) = registry.owner_mut(namespace, owner) {
            let rendered = acc.render();
            match target {
                PodAttribute::Info => entry.pod_info = rendered,
                PodAttribute::Labels => entry.pod_labels = rendered,
            }
            folded += 1;
        }
    }

    folded
}

/// Fold sample labels into the namespace labels attribute
pub fn fold_namespace_labels(registry: &mut Registry, samples: &[Sample], namespace_label: &str) -> usize {
    let mut pending: BTreeMap<&str, LabelAccumulator> = BTreeMap::new();

    for sample in samples {
        let Some(namespace) = sample.label(namespace_label) else {
            continue;
        };
        if registry.namespace(namespace).is_none() {
            continue;
        }
        pending.entry(namespace).or_default().absorb(&sample.metric);
    }

    let mut folded = 0;
    for (namespace, acc) in &pending {
        if let Some(entry) = registry.namespace_mut(namespace) {
            entry.labels = acc.render();
            folded += 1;
        }
    }

    folded
}
