//! Recursive structural merge of worker verdict fragments.
//!
//! A fragment is a JSON document restricted to three shapes: mapping,
//! sequence, scalar. Merge rules per shape pair:
//!
//! - missing key: insert the incoming value as-is
//! - mapping + mapping: merge recursively
//! - sequence + sequence: concatenate, accumulator first
//! - scalar + scalar: join as text separated by a blank line
//! - anything else: shape mismatch, fatal (a worker broke its contract,
//!   and silently dropping data would turn into silently wrong reviews)

use serde_json::{Map, Value};

/// Errors raised while merging worker fragments.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("conflicting shapes for {key}: cannot merge {existing} with {incoming}")]
    ShapeMismatch {
        key: String,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("worker fragment must be a mapping, got a {0}")]
    FragmentShape(&'static str),

    #[error("merged field {key} must be a {expected}, got a {got}")]
    FieldShape {
        key: &'static str,
        expected: &'static str,
        got: &'static str,
    },
}

pub(crate) fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "mapping",
        Value::Array(_) => "sequence",
        _ => "scalar",
    }
}

/// Render a scalar for the scalar + scalar join.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge one worker fragment into the accumulator.
pub fn merge_fragment(acc: &mut Map<String, Value>, fragment: Value) -> Result<(), MergeError> {
    match fragment {
        Value::Object(map) => merge_maps("", acc, map),
        other => Err(MergeError::FragmentShape(shape_name(&other))),
    }
}

fn merge_maps(
    path: &str,
    acc: &mut Map<String, Value>,
    incoming: Map<String, Value>,
) -> Result<(), MergeError> {
    for (key, value) in incoming {
        let full = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        match acc.remove(&key) {
            None => {
                acc.insert(key, value);
            }
            Some(existing) => {
                let merged = merge_value(&full, existing, value)?;
                acc.insert(key, merged);
            }
        }
    }
    Ok(())
}

fn merge_value(path: &str, existing: Value, incoming: Value) -> Result<Value, MergeError> {
    match (existing, incoming) {
        (Value::Object(mut a), Value::Object(b)) => {
            merge_maps(path, &mut a, b)?;
            Ok(Value::Object(a))
        }
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (a, b) if is_scalar(&a) && is_scalar(&b) => {
            Ok(Value::String(format!("{}\n\n{}", scalar_text(&a), scalar_text(&b))))
        }
        (a, b) => Err(MergeError::ShapeMismatch {
            key: path.to_string(),
            existing: shape_name(&a),
            incoming: shape_name(&b),
        }),
    }
}

fn is_scalar(value: &Value) -> bool {
    !value.is_object() && !value.is_array()
}
