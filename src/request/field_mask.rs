//! Update field masks
//!
//! An update only touches the fields named in its mask. The mask is derived by
//! comparing the entity against its default form: every field holding a
//! non-default value is included, nested messages contribute dotted paths.

use prost_types::FieldMask;
use serde_json::{Map, Value};

/// Identifier field, never part of an update mask
const RESOURCE_NAME: &str = "resource_name";

/// True for values equal to their protobuf default
pub fn is_default(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        // An explicitly present message is set, even when empty
        Value::Object(_) => false,
    }
}

/// Field mask for an update of `entity` (keys already snake_case)
pub fn field_mask(entity: &Value) -> FieldMask {
    let mut paths = Vec::new();
    if let Value::Object(map) = entity {
        collect_paths(map, "", &mut paths);
    }
    FieldMask { paths }
}

fn collect_paths(map: &Map<String, Value>, prefix: &str, paths: &mut Vec<String>) {
    for (key, value) in map {
        if prefix.is_empty() && key == RESOURCE_NAME {
            continue;
        }
        if is_default(value) {
            continue;
        }

        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match value {
            Value::Object(inner) if !inner.is_empty() => collect_paths(inner, &path, paths),
            _ => paths.push(path),
        }
    }
}

/// Remove null fields so unset optionals never reach the wire
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, inner)| !inner.is_null())
                .map(|(key, inner)| (key, strip_nulls(inner)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}
