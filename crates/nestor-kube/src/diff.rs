//! Ordered diff of name-keyed status lists
//!
//! Both lists are sorted by key and walked with two cursors: keys only in
//! the previous list are removed, keys only in the new list are added, and
//! keys in both are handed to a comparator that reports field changes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

use crate::status::{CronJobStatus, DeploymentStatus, EnvVarStatus, ProcessStatus};

/// Old and new value of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: JsonValue,
    pub new: JsonValue,
}

/// Field changes of one entry present on both sides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub name: String,
    pub values: IndexMap<String, FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff<T> {
    pub added: Vec<T>,
    pub modified: Vec<Modification>,
    pub removed: Vec<T>,
}

impl<T> Default for Diff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            modified: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> Diff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Diff two lists keyed by `key`, using `compare` for common entries
pub fn compute_diff<T, K, FK, FC>(previous: &[T], new: &[T], key: FK, compare: FC) -> Diff<T>
where
    T: Clone,
    K: Ord,
    FK: Fn(&T) -> K,
    FC: Fn(&T, &T) -> Option<Modification>,
{
    let mut previous: Vec<&T> = previous.iter().collect();
    let mut new: Vec<&T> = new.iter().collect();
    previous.sort_by_key(|item| key(item));
    new.sort_by_key(|item| key(item));

    let mut diff = Diff::default();
    let (mut i, mut j) = (0, 0);

    while i < previous.len() && j < new.len() {
        match key(previous[i]).cmp(&key(new[j])) {
            Ordering::Less => {
                diff.removed.push(previous[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                diff.added.push(new[j].clone());
                j += 1;
            }
            Ordering::Equal => {
                if let Some(modification) = compare(previous[i], new[j]) {
                    diff.modified.push(modification);
                }
                i += 1;
                j += 1;
            }
        }
    }

    diff.removed.extend(previous[i..].iter().map(|item| (*item).clone()));
    diff.added.extend(new[j..].iter().map(|item| (*item).clone()));
    diff
}

/// Compare every serialized field except `name`
///
/// A field missing on one side counts as `null`.
pub fn compare_fields<T: Serialize>(name: &str, old: &T, new: &T) -> Option<Modification> {
    let as_object = |value: &T| match serde_json::to_value(value) {
        Ok(JsonValue::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    let old = as_object(old);
    let new = as_object(new);

    let mut fields: Vec<&String> = old.keys().chain(new.keys()).filter(|k| *k != "name").collect();
    fields.sort();
    fields.dedup();

    let values: IndexMap<String, FieldChange> = fields
        .into_iter()
        .filter_map(|field| {
            let before = old.get(field).cloned().unwrap_or(JsonValue::Null);
            let after = new.get(field).cloned().unwrap_or(JsonValue::Null);
            (before != after).then(|| (field.clone(), FieldChange { old: before, new: after }))
        })
        .collect();

    (!values.is_empty()).then(|| Modification {
        name: name.to_string(),
        values,
    })
}

/// Environment variables compare on their literal value or their source
fn compare_env(old: &EnvVarStatus, new: &EnvVarStatus) -> Option<Modification> {
    let before = old.effective_value();
    let after = new.effective_value();
    if before == after {
        return None;
    }
    let mut values = IndexMap::new();
    values.insert("value".to_string(), FieldChange { old: before, new: after });
    Some(Modification {
        name: new.name.clone(),
        values,
    })
}

/// What changed between two statuses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatusDiff {
    pub processes: Diff<ProcessStatus>,
    pub cronjobs: Diff<CronJobStatus>,
    pub env: Diff<EnvVarStatus>,
}

impl DeploymentStatusDiff {
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty() && self.cronjobs.is_empty() && self.env.is_empty()
    }
}

pub fn get_deployment_statuses_diff(
    previous: &DeploymentStatus,
    new: &DeploymentStatus,
) -> DeploymentStatusDiff {
    DeploymentStatusDiff {
        processes: compute_diff(
            &previous.processes,
            &new.processes,
            |p| p.name.clone(),
            |old, new| compare_fields(&new.name, old, new),
        ),
        cronjobs: compute_diff(
            &previous.cronjobs,
            &new.cronjobs,
            |c| c.name.clone(),
            |old, new| compare_fields(&new.name, old, new),
        ),
        env: compute_diff(&previous.env, &new.env, |e| e.name.clone(), compare_env),
    }
}
