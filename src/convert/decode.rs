//! Attribute value tree → generic JSON mapping → record.
use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::descriptor::{FieldType, Record, TypeDescriptor, describe_record};
use crate::error::DecodeError;
use crate::path;
use crate::value::{AttributeValue, Scalar};

/// Decode an object value into a fresh `R`.
///
/// Unknown attributes leave the field at its default. Null sets optional
/// fields to `None` and leaves other fields at their default. Zero scalars
/// are dropped for non-optional fields, so those cannot carry an explicit
/// zero through decode.
pub fn decode<R: Record>(value: &AttributeValue) -> Result<R, DecodeError> {
    let attrs = root_attributes(value)?;
    let descriptor = describe_record::<R>()?;
    let map = object_to_map(attrs, &descriptor)?;
    path::from_value_with_path(Value::Object(map))
}

/// The generic mapping `decode` feeds to serde, keyed by serde key.
pub fn decode_to_map<R: Record>(value: &AttributeValue) -> Result<Map<String, Value>, DecodeError> {
    let attrs = root_attributes(value)?;
    object_to_map(attrs, &*describe_record::<R>()?)
}

fn root_attributes(
    value: &AttributeValue,
) -> Result<&BTreeMap<String, AttributeValue>, DecodeError> {
    match value {
        AttributeValue::Null => Err(DecodeError::NullRoot),
        AttributeValue::Unknown => Err(DecodeError::UnknownRoot),
        AttributeValue::Object { attrs, .. } => Ok(attrs),
        other => Err(DecodeError::NotAnObject { found: other.kind_name() }),
    }
}

fn object_to_map(
    attrs: &BTreeMap<String, AttributeValue>,
    descriptor: &TypeDescriptor,
) -> Result<Map<String, Value>, DecodeError> {
    let mut out = Map::new();
    for (name, value) in attrs {
        let field = descriptor.field(name);
        let key = field.map_or(name.as_str(), |f| f.serde_key.as_str());
        match value {
            AttributeValue::Unknown => {
                tracing::debug!(
                    attribute = %name,
                    record = descriptor.type_name,
                    "skipping unknown attribute"
                );
            }
            AttributeValue::Null => {
                if field.is_some_and(|f| f.is_optional()) {
                    out.insert(key.to_string(), Value::Null);
                }
            }
            value => {
                let ty = field.map_or(&FieldType::Interface, |f| &f.ty);
                let json = to_json(value, ty).map_err(|e| DecodeError::within(name.as_str(), e))?;
                let optional = field.is_none_or(|f| f.is_optional());
                if optional || !is_zero_scalar(&json) {
                    out.insert(key.to_string(), json);
                }
            }
        }
    }
    Ok(out)
}

/// Zero string and number. Booleans always count as set.
fn is_zero_scalar(v: &Value) -> bool {
    match v {
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

/// Convert one value, using the declared field type to find nested record
/// descriptors.
fn to_json(value: &AttributeValue, ty: &FieldType) -> Result<Value, DecodeError> {
    let ty = ty.strip_optional();
    Ok(match value {
        AttributeValue::Null | AttributeValue::Unknown => Value::Null,
        AttributeValue::Scalar(s) => scalar(s),
        AttributeValue::Dynamic(inner) => match inner.as_ref() {
            AttributeValue::Scalar(Scalar::String(text)) => {
                serde_json::from_str(text).map_err(DecodeError::DynamicJson)?
            }
            other => to_json(other, ty)?,
        },
        AttributeValue::List { items, .. } => sequence(items.iter(), ty)?,
        AttributeValue::Set { items, .. } => sequence(items.iter(), ty)?,
        AttributeValue::Tuple { items, .. } => {
            let elems: &[FieldType] = match ty {
                FieldType::Tuple(ts) => ts,
                _ => &[],
            };
            let out = items
                .iter()
                .enumerate()
                .map(|(i, item)| to_json(item, elems.get(i).unwrap_or(&FieldType::Interface)))
                .collect::<Result<Vec<_>, _>>()?;
            Value::Array(out)
        }
        AttributeValue::Map { entries, .. } => {
            let elem = match ty {
                FieldType::Map { value, .. } => value.as_ref(),
                _ => &FieldType::Interface,
            };
            let mut out = Map::new();
            for (key, item) in entries {
                if skips_element(item, elem) {
                    continue;
                }
                let json = to_json(item, elem).map_err(|e| DecodeError::within(key.as_str(), e))?;
                out.insert(key.clone(), json);
            }
            Value::Object(out)
        }
        AttributeValue::Object { attrs, .. } => match ty {
            FieldType::Record(record) => {
                Value::Object(object_to_map(attrs, &*record.descriptor()?)?)
            }
            _ => {
                let mut out = Map::new();
                for (name, item) in attrs {
                    if item.is_unknown() {
                        continue;
                    }
                    let json = to_json(item, &FieldType::Interface)
                        .map_err(|e| DecodeError::within(name.as_str(), e))?;
                    out.insert(name.clone(), json);
                }
                Value::Object(out)
            }
        },
    })
}

fn sequence<'a>(
    items: impl Iterator<Item = &'a AttributeValue>,
    ty: &FieldType,
) -> Result<Value, DecodeError> {
    let elem = match ty {
        FieldType::Slice(e) | FieldType::Set(e) => e.as_ref(),
        _ => &FieldType::Interface,
    };
    items
        .filter(|item| !skips_element(item, elem))
        .map(|item| to_json(item, elem))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Unknown elements never reach serde; null ones only when the element type
/// takes `None`.
fn skips_element(item: &AttributeValue, elem: &FieldType) -> bool {
    match item {
        AttributeValue::Unknown => true,
        AttributeValue::Null => !elem.is_optional(),
        _ => false,
    }
}

fn scalar(s: &Scalar) -> Value {
    match s {
        Scalar::String(s) => Value::String(s.clone()),
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int64(i) => Value::from(*i),
        Scalar::Float64(x) => Number::from_f64(x.0).map_or(Value::Null, Value::Number),
    }
}
