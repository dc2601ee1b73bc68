//! Field-level diff between two JSON projections.
//!
//! Paths use `.key` for object members and `[i]` for array positions, e.g.
//! `conditions[0].value` or `actions[1].params.days_before`. An element
//! present on only one side is reported against `null`, even when the
//! present value is itself `null`.

use crate::model::rule::FieldChange;
use serde_json::Value;
use std::collections::BTreeSet;

/// Every leaf-level difference between `old` and `new`, in path order.
pub fn diff_values(old: &Value, new: &Value) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    walk(String::new(), Some(old), Some(new), &mut changes);
    changes
}

/// `None` marks a member or element missing on that side, which differs
/// from a present `null`.
fn walk(
    path: String,
    old: Option<&Value>,
    new: Option<&Value>,
    changes: &mut Vec<FieldChange>,
) {
    match (old, new) {
        (Some(Value::Object(old_map)), Some(Value::Object(new_map))) => {
            let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
            for key in keys {
                walk(join_key(&path, key), old_map.get(key), new_map.get(key), changes);
            }
        }
        (Some(Value::Array(old_items)), Some(Value::Array(new_items))) => {
            for index in 0..old_items.len().max(new_items.len()) {
                walk(
                    format!("{path}[{index}]"),
                    old_items.get(index),
                    new_items.get(index),
                    changes,
                );
            }
        }
        (None, None) => {}
        (Some(old), Some(new)) if old == new => {}
        _ => changes.push(FieldChange {
            field: path,
            old_value: old.cloned().unwrap_or(Value::Null),
            new_value: new.cloned().unwrap_or(Value::Null),
        }),
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
