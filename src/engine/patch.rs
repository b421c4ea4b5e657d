//! Merge-patch persistence protocol
//!
//! Every write the engine performs is a merge-style patch (RFC 7386) computed
//! as the delta between the snapshot fetched at the start of the pass and the
//! locally mutated copy. The two write channels are kept independent: the
//! metadata channel carries finalizer (and other meta) changes and never
//! touches status, the status channel carries only the status subtree. An
//! empty delta means the store already holds the derived state and no write
//! is issued.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Compute the merge patch that turns `base` into `desired`.
///
/// Returns `None` when the two values are already identical. Object fields
/// present in `base` but absent from `desired` are tombstoned with `null`;
/// arrays and scalars are replaced wholesale.
pub fn merge_patch(base: &Value, desired: &Value) -> Option<Value> {
    match (base, desired) {
        (Value::Object(base_map), Value::Object(desired_map)) => {
            let mut delta = serde_json::Map::new();
            for (key, desired_value) in desired_map {
                match base_map.get(key) {
                    Some(base_value) => {
                        if let Some(child) = merge_patch(base_value, desired_value) {
                            delta.insert(key.clone(), child);
                        }
                    }
                    None => {
                        delta.insert(key.clone(), desired_value.clone());
                    }
                }
            }
            for key in base_map.keys() {
                if !desired_map.contains_key(key) {
                    delta.insert(key.clone(), Value::Null);
                }
            }
            if delta.is_empty() {
                None
            } else {
                Some(Value::Object(delta))
            }
        }
        _ if base == desired => None,
        _ => Some(desired.clone()),
    }
}

/// Delta for the metadata/spec channel, with the status subtree masked out
pub fn meta_patch<K: Serialize>(base: &K, desired: &K) -> Result<Option<Value>> {
    let mut base_value = serde_json::to_value(base)?;
    let mut desired_value = serde_json::to_value(desired)?;
    if let Some(map) = base_value.as_object_mut() {
        map.remove("status");
    }
    if let Some(map) = desired_value.as_object_mut() {
        map.remove("status");
    }
    Ok(merge_patch(&base_value, &desired_value))
}

/// Delta for the status channel, covering only the status subtree
pub fn status_patch<K: Serialize>(base: &K, desired: &K) -> Result<Option<Value>> {
    let base_value = serde_json::to_value(base)?;
    let desired_value = serde_json::to_value(desired)?;
    let base_status = base_value.get("status").cloned().unwrap_or(Value::Null);
    let desired_status = desired_value.get("status").cloned().unwrap_or(Value::Null);
    Ok(merge_patch(&base_status, &desired_status)
        .map(|delta| serde_json::json!({ "status": delta })))
}
