//! Merge algorithm
//!
//! Objects merge field by field. Arrays declared in [`KeyedArrays`] merge
//! element by element on their identity field; every other value is
//! replaced. Merging never fails: a shape mismatch between the existing
//! value and the patch resolves in favour of the patch.

use mkt_document::timestamp::parse_timestamp;
use mkt_document::{Document, FieldPath};
use serde_json::{Map, Value};
use tracing::trace;

use crate::keyed::KeyedArrays;
use crate::patch::{FieldPatch, Patch, PatchError};

/// Merge `patch` into a copy of `existing`
///
/// Pure and deterministic. `merge(d, &Patch::new(), _) == d` for every `d`.
#[must_use]
pub fn merge(existing: &Document, patch: &Patch, arrays: &KeyedArrays) -> Document {
    let mut out = existing.as_map().clone();
    merge_object(&mut out, patch, &FieldPath::root(), arrays);
    Document::from_map(out)
}

/// Merge a raw JSON partial into a raw JSON document
///
/// # Errors
/// Returns [`PatchError::NotAnObject`] if either side is not an object
pub fn merge_json(existing: &Value, partial: Value, arrays: &KeyedArrays) -> Result<Value, PatchError> {
    let Value::Object(base) = existing else {
        return Err(PatchError::NotAnObject(existing.to_string()));
    };
    let patch = Patch::from_json(partial)?;
    let mut out = base.clone();
    merge_object(&mut out, &patch, &FieldPath::root(), arrays);
    Ok(Value::Object(out))
}

fn merge_object(target: &mut Map<String, Value>, patch: &Patch, path: &FieldPath, arrays: &KeyedArrays) {
    for (key, field) in patch.iter() {
        let field_path = path.child(key);
        match field {
            FieldPatch::Keep => {}
            FieldPatch::Clear => {
                target.remove(key);
            }
            FieldPatch::Set(value) => {
                let merged = match (arrays.identity_for(&field_path), value) {
                    (Some(identity), Value::Array(incoming)) => {
                        let current = match target.get(key) {
                            Some(Value::Array(current)) => current.as_slice(),
                            _ => &[],
                        };
                        Value::Array(merge_keyed(current, incoming, identity, &field_path, arrays))
                    }
                    _ => value.clone(),
                };
                target.insert(key.to_string(), merged);
            }
            FieldPatch::Merge(nested) => match target.get_mut(key) {
                Some(Value::Object(inner)) => merge_object(inner, nested, &field_path, arrays),
                _ => {
                    let mut fresh = Map::new();
                    merge_object(&mut fresh, nested, &field_path, arrays);
                    target.insert(key.to_string(), Value::Object(fresh));
                }
            },
        }
    }
}

/// Element-wise merge of a keyed array
///
/// Existing elements keep their positions; unmatched incoming elements are
/// appended in patch order. Incoming elements also match elements appended
/// earlier in the same call, so duplicates within one patch collapse.
fn merge_keyed(
    current: &[Value],
    incoming: &[Value],
    identity: &str,
    path: &FieldPath,
    arrays: &KeyedArrays,
) -> Vec<Value> {
    let mut out = current.to_vec();

    for element in incoming {
        let Some(partial) = element.as_object() else {
            trace!(path = %path, "appending non-object element to keyed array");
            out.push(element.clone());
            continue;
        };

        let key = partial.get(identity).filter(|v| !v.is_null());
        let position = key.and_then(|key| out.iter().position(|existing| has_identity(existing, identity, key)));

        let element_patch = Patch::from_map(partial.clone());
        match position {
            Some(idx) => {
                if let Value::Object(target) = &mut out[idx] {
                    merge_object(target, &element_patch, path, arrays);
                }
            }
            None => {
                if key.is_none() {
                    trace!(path = %path, identity, "element lacks identity field, appending");
                }
                let mut fresh = Map::new();
                merge_object(&mut fresh, &element_patch, path, arrays);
                out.push(Value::Object(fresh));
            }
        }
    }

    out
}

fn has_identity(element: &Value, identity: &str, key: &Value) -> bool {
    element
        .as_object()
        .and_then(|obj| obj.get(identity))
        .is_some_and(|candidate| identity_eq(candidate, key))
}

/// Identity comparison; dates match across representations
fn identity_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::String(_) | Value::Object(_), Value::String(_) | Value::Object(_)) => {
            match (parse_timestamp(a), parse_timestamp(b)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => false,
    }
}
