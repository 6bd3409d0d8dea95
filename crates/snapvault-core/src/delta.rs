// ABOUTME: Structural delta engine computing and applying differences between payloads.
// ABOUTME: Mappings diff key-wise; scalar sequences diff as sets; everything else is replaced whole.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::{Payload, Scalar};

/// Old and new value of a modified mapping key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub old: Payload,
    pub new: Payload,
}

/// The difference between two payloads.
///
/// Nested mappings are not diffed recursively: a changed nested value is
/// recorded whole under `modified`. Sequences containing composite elements
/// are recorded verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diff {
    Mapping {
        added: BTreeMap<String, Payload>,
        modified: BTreeMap<String, Change>,
        deleted: BTreeMap<String, Payload>,
    },
    Sequence {
        added: Vec<Payload>,
        removed: Vec<Payload>,
        length_change: i64,
    },
    SequenceReplaced {
        old_list: Vec<Payload>,
        new_list: Vec<Payload>,
        length_change: i64,
    },
    Replacement {
        old_value: Payload,
        new_value: Payload,
    },
}

/// Counts summarizing a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub has_changes: bool,
    pub added_count: usize,
    pub modified_count: usize,
    pub deleted_count: usize,
}

/// A mapping key whose value changed shape between versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindChange {
    pub from: String,
    pub to: String,
}

/// Field-level shape changes for mapping payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChanges {
    pub added_fields: Vec<String>,
    pub removed_fields: Vec<String>,
    pub retyped_fields: BTreeMap<String, KindChange>,
    /// Set when the top-level payload itself changed shape.
    pub root: Option<KindChange>,
}

impl SchemaChanges {
    pub fn is_empty(&self) -> bool {
        self.added_fields.is_empty()
            && self.removed_fields.is_empty()
            && self.retyped_fields.is_empty()
            && self.root.is_none()
    }
}

/// Result of comparing two stored versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub from_version: String,
    pub to_version: String,
    pub diff: Diff,
    pub summary: DiffSummary,
    pub schema_changes: SchemaChanges,
    pub compared_at: DateTime<Utc>,
}

impl VersionComparison {
    pub fn new(from_version: String, to_version: String, diff: Diff) -> Self {
        Self {
            from_version,
            to_version,
            summary: diff.summary(),
            schema_changes: diff.schema_changes(),
            diff,
            compared_at: Utc::now(),
        }
    }
}

/// Set-comparable identity of a scalar element.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum ScalarKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

fn scalar_key(payload: &Payload) -> Option<ScalarKey> {
    match payload {
        Payload::Scalar(Scalar::Null) => Some(ScalarKey::Null),
        Payload::Scalar(Scalar::Bool(b)) => Some(ScalarKey::Bool(*b)),
        Payload::Scalar(Scalar::Int(i)) => Some(ScalarKey::Int(*i)),
        Payload::Scalar(Scalar::Float(f)) => Some(ScalarKey::Float(f.to_bits())),
        Payload::Scalar(Scalar::Text(s)) => Some(ScalarKey::Text(s.clone())),
        Payload::Mapping(_) | Payload::Sequence(_) | Payload::Bytes(_) => None,
    }
}

fn scalar_keys(items: &[Payload]) -> Option<Vec<ScalarKey>> {
    items.iter().map(scalar_key).collect()
}

/// Elements of `items` whose key is absent from `other`, first occurrence only.
fn set_difference(items: &[Payload], keys: &[ScalarKey], other: &BTreeSet<ScalarKey>) -> Vec<Payload> {
    let mut seen = BTreeSet::new();
    items
        .iter()
        .zip(keys)
        .filter(|(_, key)| !other.contains(*key) && seen.insert((*key).clone()))
        .map(|(item, _)| item.clone())
        .collect()
}

/// Compute the structural difference from `old` to `new`.
///
/// Never fails: mismatched shapes degrade to a replacement.
pub fn diff(old: &Payload, new: &Payload) -> Diff {
    match (old, new) {
        (Payload::Mapping(old_map), Payload::Mapping(new_map)) => {
            let mut added = BTreeMap::new();
            let mut modified = BTreeMap::new();
            for (key, value) in new_map {
                match old_map.get(key) {
                    None => {
                        added.insert(key.clone(), value.clone());
                    }
                    Some(previous) if previous != value => {
                        modified.insert(
                            key.clone(),
                            Change {
                                old: previous.clone(),
                                new: value.clone(),
                            },
                        );
                    }
                    Some(_) => {}
                }
            }
            let deleted = old_map
                .iter()
                .filter(|(key, _)| !new_map.contains_key(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            Diff::Mapping {
                added,
                modified,
                deleted,
            }
        }
        (Payload::Sequence(old_list), Payload::Sequence(new_list)) => {
            let length_change = new_list.len() as i64 - old_list.len() as i64;
            match (scalar_keys(old_list), scalar_keys(new_list)) {
                (Some(old_keys), Some(new_keys)) => {
                    let old_set: BTreeSet<_> = old_keys.iter().cloned().collect();
                    let new_set: BTreeSet<_> = new_keys.iter().cloned().collect();
                    Diff::Sequence {
                        added: set_difference(new_list, &new_keys, &old_set),
                        removed: set_difference(old_list, &old_keys, &new_set),
                        length_change,
                    }
                }
                _ => Diff::SequenceReplaced {
                    old_list: old_list.clone(),
                    new_list: new_list.clone(),
                    length_change,
                },
            }
        }
        _ => Diff::Replacement {
            old_value: old.clone(),
            new_value: new.clone(),
        },
    }
}

/// Apply a diff onto a copy of `base`.
///
/// Exact inverse of [`diff`] for mapping, verbatim-sequence and replacement
/// diffs. Scalar-set sequence diffs lose order and multiplicity, so applying
/// one is best effort: removed elements are dropped and added ones appended.
pub fn apply(base: &Payload, diff: &Diff) -> Payload {
    match diff {
        Diff::Mapping {
            added,
            modified,
            deleted,
        } => {
            let mut result = base.as_mapping().cloned().unwrap_or_default();
            result.extend(added.iter().map(|(k, v)| (k.clone(), v.clone())));
            for (key, change) in modified {
                result.insert(key.clone(), change.new.clone());
            }
            for key in deleted.keys() {
                result.remove(key);
            }
            Payload::Mapping(result)
        }
        Diff::Sequence { added, removed, .. } => {
            let removed: BTreeSet<_> = removed.iter().filter_map(scalar_key).collect();
            let mut result: Vec<Payload> = base
                .as_sequence()
                .unwrap_or_default()
                .iter()
                .filter(|item| scalar_key(item).is_none_or(|key| !removed.contains(&key)))
                .cloned()
                .collect();
            for item in added {
                if !result.contains(item) {
                    result.push(item.clone());
                }
            }
            Payload::Sequence(result)
        }
        Diff::SequenceReplaced { new_list, .. } => Payload::Sequence(new_list.clone()),
        Diff::Replacement { new_value, .. } => new_value.clone(),
    }
}

impl Diff {
    pub fn summary(&self) -> DiffSummary {
        let (added_count, modified_count, deleted_count) = match self {
            Diff::Mapping {
                added,
                modified,
                deleted,
            } => (added.len(), modified.len(), deleted.len()),
            Diff::Sequence { added, removed, .. } => (added.len(), 0, removed.len()),
            Diff::SequenceReplaced {
                old_list, new_list, ..
            } => (0, usize::from(old_list != new_list), 0),
            Diff::Replacement {
                old_value,
                new_value,
            } => (0, usize::from(old_value != new_value), 0),
        };
        let has_changes = added_count + modified_count + deleted_count > 0
            || matches!(self, Diff::Sequence { length_change, .. } if *length_change != 0);
        DiffSummary {
            has_changes,
            added_count,
            modified_count,
            deleted_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.summary().has_changes
    }

    pub fn schema_changes(&self) -> SchemaChanges {
        match self {
            Diff::Mapping {
                added,
                modified,
                deleted,
            } => SchemaChanges {
                added_fields: added.keys().cloned().collect(),
                removed_fields: deleted.keys().cloned().collect(),
                retyped_fields: modified
                    .iter()
                    .filter(|(_, change)| change.old.kind() != change.new.kind())
                    .map(|(key, change)| {
                        (
                            key.clone(),
                            KindChange {
                                from: change.old.kind().to_string(),
                                to: change.new.kind().to_string(),
                            },
                        )
                    })
                    .collect(),
                root: None,
            },
            Diff::Replacement {
                old_value,
                new_value,
            } if old_value.kind() != new_value.kind() => SchemaChanges {
                root: Some(KindChange {
                    from: old_value.kind().to_string(),
                    to: new_value.kind().to_string(),
                }),
                ..SchemaChanges::default()
            },
            _ => SchemaChanges::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(value: serde_json::Value) -> Payload {
        Payload::try_from(value).unwrap()
    }

    #[test]
    fn mapping_diff_matches_documented_scenario() {
        let old = p(json!({"a": 1, "b": 2}));
        let new = p(json!({"a": 1, "b": 3, "c": 4}));

        let d = diff(&old, &new);
        let Diff::Mapping {
            added,
            modified,
            deleted,
        } = &d
        else {
            panic!("expected mapping diff, got {d:?}");
        };

        assert_eq!(added.len(), 1);
        assert_eq!(added["c"], p(json!(4)));
        assert_eq!(
            modified["b"],
            Change {
                old: p(json!(2)),
                new: p(json!(3)),
            }
        );
        assert!(deleted.is_empty());
        assert_eq!(apply(&old, &d), new);
    }

    #[test]
    fn mapping_apply_inverts_diff_with_deletions() {
        let old = p(json!({"keep": true, "drop": "x", "change": [1, 2]}));
        let new = p(json!({"keep": true, "change": {"now": "mapping"}, "fresh": null}));

        let d = diff(&old, &new);
        assert_eq!(apply(&old, &d), new);

        let summary = d.summary();
        assert!(summary.has_changes);
        assert_eq!(summary.added_count, 1);
        assert_eq!(summary.modified_count, 1);
        assert_eq!(summary.deleted_count, 1);
    }

    #[test]
    fn signed_zero_change_is_recorded() {
        let old = Payload::Mapping(BTreeMap::from([(
            "x".to_string(),
            Payload::Scalar(Scalar::Float(-0.0)),
        )]));
        let new = Payload::Mapping(BTreeMap::from([(
            "x".to_string(),
            Payload::Scalar(Scalar::Float(0.0)),
        )]));

        let d = diff(&old, &new);
        assert_eq!(d.summary().modified_count, 1);
        assert_eq!(apply(&old, &d), new);

        let seq_old = Payload::Sequence(vec![Payload::Scalar(Scalar::Float(-0.0))]);
        let seq_new = Payload::Sequence(vec![Payload::Scalar(Scalar::Float(0.0))]);
        assert_eq!(apply(&seq_old, &diff(&seq_old, &seq_new)), seq_new);
    }

    #[test]
    fn nested_mappings_are_replaced_whole() {
        let old = p(json!({"outer": {"x": 1, "y": 2}}));
        let new = p(json!({"outer": {"x": 1, "y": 3}}));

        let Diff::Mapping { modified, .. } = diff(&old, &new) else {
            panic!("expected mapping diff");
        };
        assert_eq!(modified["outer"].old, p(json!({"x": 1, "y": 2})));
        assert_eq!(modified["outer"].new, p(json!({"x": 1, "y": 3})));
    }

    #[test]
    fn scalar_sequences_diff_as_sets() {
        let old = p(json!(["a", "b", "c"]));
        let new = p(json!(["b", "c", "d", "d"]));

        let d = diff(&old, &new);
        assert_eq!(
            d,
            Diff::Sequence {
                added: vec![p(json!("d"))],
                removed: vec![p(json!("a"))],
                length_change: 1,
            }
        );
        assert_eq!(apply(&old, &d), p(json!(["b", "c", "d"])));
    }

    #[test]
    fn composite_sequences_are_recorded_verbatim() {
        let old = p(json!([{"id": 1}]));
        let new = p(json!([{"id": 1}, {"id": 2}]));

        let d = diff(&old, &new);
        assert!(matches!(d, Diff::SequenceReplaced { length_change: 1, .. }));
        assert_eq!(apply(&p(json!("unrelated base")), &d), new);
    }

    #[test]
    fn type_mismatch_degrades_to_replacement() {
        let old = p(json!({"a": 1}));
        let new = p(json!([1, 2]));

        let d = diff(&old, &new);
        assert!(matches!(d, Diff::Replacement { .. }));
        assert_eq!(apply(&old, &d), new);

        let schema = d.schema_changes();
        assert_eq!(
            schema.root,
            Some(KindChange {
                from: "mapping".to_string(),
                to: "sequence".to_string(),
            })
        );
    }

    #[test]
    fn scalar_change_is_replacement() {
        let d = diff(&p(json!(1)), &p(json!(2)));
        assert_eq!(
            d,
            Diff::Replacement {
                old_value: p(json!(1)),
                new_value: p(json!(2)),
            }
        );
        assert!(d.schema_changes().is_empty());
    }

    #[test]
    fn identical_payloads_produce_empty_diff() {
        let value = p(json!({"a": [1, 2], "b": "x"}));
        assert!(diff(&value, &value).is_empty());
        assert!(diff(&p(json!(5)), &p(json!(5))).is_empty());
        assert!(diff(&p(json!([1, 2])), &p(json!([2, 1]))).is_empty());
    }

    #[test]
    fn schema_changes_report_retyped_fields() {
        let old = p(json!({"amount": 10, "tags": ["x"], "gone": 1}));
        let new = p(json!({"amount": "10", "tags": ["y"], "new": 2}));

        let schema = diff(&old, &new).schema_changes();
        assert_eq!(schema.added_fields, vec!["new".to_string()]);
        assert_eq!(schema.removed_fields, vec!["gone".to_string()]);
        assert_eq!(schema.retyped_fields.len(), 1);
        assert_eq!(schema.retyped_fields["amount"].from, "int");
        assert_eq!(schema.retyped_fields["amount"].to, "text");
    }

    #[test]
    fn diff_survives_cbor_round_trip() {
        let d = diff(&p(json!({"a": 1})), &p(json!({"a": 2, "b": [1, {"c": null}]})));
        let bytes = crate::payload::to_cbor(&d).unwrap();
        let decoded: Diff = crate::payload::from_cbor(&bytes).unwrap();
        assert_eq!(decoded, d);
    }
}
