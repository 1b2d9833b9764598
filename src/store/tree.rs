// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON tree helpers shared by the store adapters.
//!
//! The realtime store has no notion of an empty object or an explicit null:
//! writing `null` removes the key and any parent left empty disappears too.

use serde_json::{Map, Value};

/// Value at `segs`, treating `null` as absent.
pub(crate) fn value_at<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segs {
        node = node.as_object()?.get(*seg)?;
    }
    (!node.is_null()).then_some(node)
}

/// Write `value` at `segs`, creating intermediate objects and pruning
/// anything left empty.
pub(crate) fn write_at(root: &mut Value, segs: &[&str], value: Value) {
    let value = normalize(value);
    let Some((last, parents)) = segs.split_last() else {
        *root = value;
        return;
    };

    if value.is_null() {
        remove_at(root, parents, last);
        return;
    }

    let mut node = root;
    for seg in parents {
        node = ensure_object(node)
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.to_string(), value);
}

fn remove_at(node: &mut Value, parents: &[&str], last: &str) {
    let Some(map) = node.as_object_mut() else {
        return;
    };

    match parents.split_first() {
        None => {
            map.remove(last);
        }
        Some((head, rest)) => {
            if let Some(child) = map.get_mut(*head) {
                remove_at(child, rest, last);
                if is_empty(child) {
                    map.remove(*head);
                }
            }
        }
    }

    if is_empty(node) {
        *node = Value::Null;
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

/// Drop nulls and empty objects from a value about to be stored.
fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

fn is_empty(node: &Value) -> bool {
    match node {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
