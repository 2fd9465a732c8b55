//! Value conversion between attribute trees and records.
//!
//! serde is the generic mapping layer: decode builds a JSON object keyed by
//! serde key and deserializes it, encode serializes the record and walks the
//! result against the record's descriptor.
pub mod decode;
pub mod encode;

use serde_json::Value;

pub use self::decode::{decode, decode_to_map};
pub use self::encode::{encode, encode_with_fallback};
use crate::descriptor::{FieldType, Record, RecordType};
use crate::error::PathError;

/// Dotted lookup by wire name through records and string-keyed maps,
/// returning the serialized value found there.
pub fn select_path<R: Record>(record: &R, path: &str) -> Result<Value, PathError> {
    let mut current = serde_json::to_value(record).map_err(PathError::Serialize)?;
    let mut ty = FieldType::Record(RecordType::of::<R>());
    let mut walked = String::new();
    for segment in path.split('.') {
        let not_found = || PathError::NotFound {
            segment: segment.to_string(),
            path: walked.clone(),
        };
        let (next, next_ty) = match ty.strip_optional() {
            FieldType::Record(record) => {
                let descriptor = record.descriptor()?;
                let field = descriptor.field(segment).ok_or_else(not_found)?;
                let next = current.get(&field.serde_key).cloned().unwrap_or(Value::Null);
                (next, field.ty.clone())
            }
            FieldType::Map { value, .. } => {
                let next = current.get(segment).cloned().ok_or_else(not_found)?;
                (next, value.as_ref().clone())
            }
            FieldType::Interface if current.is_object() => {
                let next = current.get(segment).cloned().ok_or_else(not_found)?;
                (next, FieldType::Interface)
            }
            other => {
                return Err(PathError::NotTraversable {
                    segment: segment.to_string(),
                    found: other.to_string(),
                });
            }
        };
        current = next;
        ty = next_ty;
        if !walked.is_empty() {
            walked.push('.');
        }
        walked.push_str(segment);
    }
    Ok(current)
}
