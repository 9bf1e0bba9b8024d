//! Piece metadata: deep merge with forward and inverse patches.
//!
//! Metadata is an order-preserving JSON object. Merging a source map into a
//! target produces the merged map plus two JSON-patch-style lists: the
//! forward patches turn the old target into the merged map, the inverse
//! patches turn it back. Patch order is deterministic: within an object,
//! nested objects are fully emitted before sibling scalars, and keys are
//! visited in insertion order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to a piece: an order-preserving map of JSON values.
pub type PieceMeta = serde_json::Map<String, Value>;

/// One step of a metadata diff, addressed by a key path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MetaPatch {
    /// Insert `value` at `path`; the key was absent.
    Add {
        /// Key path from the map root.
        path: Vec<String>,
        /// Value to insert.
        value: Value,
    },
    /// Remove the key at `path`.
    Remove {
        /// Key path from the map root.
        path: Vec<String>,
    },
    /// Overwrite the value at `path`.
    Replace {
        /// Key path from the map root.
        path: Vec<String>,
        /// New value.
        value: Value,
    },
}

/// Result of [`merge_meta`]: the merged map and both patch directions.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaMerge {
    /// Target with the source overlaid.
    pub merged: PieceMeta,
    /// Patches that turn the old target into `merged`.
    pub forward: Vec<MetaPatch>,
    /// Patches that turn `merged` back into the old target.
    pub inverse: Vec<MetaPatch>,
}

/// Recursively overlay `source` onto a copy of `target`.
///
/// Returns `None` when the overlay changes nothing (every source entry
/// already present with an equal value).
pub fn merge_meta(target: &PieceMeta, source: &PieceMeta) -> Option<MetaMerge> {
    let mut merged = target.clone();
    let mut forward = Vec::new();
    let mut inverse = Vec::new();
    let mut path = Vec::new();
    merge_into(&mut merged, source, &mut path, &mut forward, &mut inverse);

    if forward.is_empty() { None } else { Some(MetaMerge { merged, forward, inverse }) }
}

fn merge_into(
    target: &mut PieceMeta,
    source: &PieceMeta,
    path: &mut Vec<String>,
    forward: &mut Vec<MetaPatch>,
    inverse: &mut Vec<MetaPatch>,
) {
    // Nested objects first, then sibling scalars.
    for (key, value) in source {
        let Value::Object(source_child) = value else { continue };
        path.push(key.clone());
        if let Some(Value::Object(target_child)) = target.get_mut(key) {
            merge_into(target_child, source_child, path, forward, inverse);
        } else {
            overlay_entry(target, key, value, path, forward, inverse);
        }
        path.pop();
    }
    for (key, value) in source {
        if value.is_object() {
            continue;
        }
        path.push(key.clone());
        overlay_entry(target, key, value, path, forward, inverse);
        path.pop();
    }
}

fn overlay_entry(
    target: &mut PieceMeta,
    key: &str,
    value: &Value,
    path: &[String],
    forward: &mut Vec<MetaPatch>,
    inverse: &mut Vec<MetaPatch>,
) {
    match target.get(key) {
        Some(old) if old == value => {}
        Some(old) => {
            forward.push(MetaPatch::Replace { path: path.to_vec(), value: value.clone() });
            inverse.push(MetaPatch::Replace { path: path.to_vec(), value: old.clone() });
            target.insert(key.to_owned(), value.clone());
        }
        None => {
            forward.push(MetaPatch::Add { path: path.to_vec(), value: value.clone() });
            inverse.push(MetaPatch::Remove { path: path.to_vec() });
            target.insert(key.to_owned(), value.clone());
        }
    }
}

/// Apply patches to a metadata map, in order. Missing intermediate objects
/// are created for `add`/`replace`; `remove` of an absent key is a no-op.
pub fn apply_patches(meta: &mut PieceMeta, patches: &[MetaPatch]) {
    for patch in patches {
        match patch {
            MetaPatch::Add { path, value } | MetaPatch::Replace { path, value } => {
                set_at(meta, path, value.clone());
            }
            MetaPatch::Remove { path } => {
                remove_at(meta, path);
            }
        }
    }
}

fn set_at(meta: &mut PieceMeta, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else { return };
    let mut current = meta;
    for key in parents {
        if !matches!(current.get(key), Some(Value::Object(_))) {
            current.insert(key.clone(), Value::Object(PieceMeta::new()));
        }
        let Some(Value::Object(child)) = current.get_mut(key) else { return };
        current = child;
    }
    current.insert(last.clone(), value);
}

fn remove_at(meta: &mut PieceMeta, path: &[String]) {
    let Some((last, parents)) = path.split_last() else { return };
    let mut current = meta;
    for key in parents {
        match current.get_mut(key) {
            Some(Value::Object(child)) => current = child,
            _ => return,
        }
    }
    current.remove(last);
}
