//! Record → attribute value tree.
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::descriptor::{FieldType, Record, TypeDescriptor, describe_record};
use crate::error::EncodeError;
use crate::value::{AttributeType, AttributeValue, ObjectType};

/// Encode `record` as an object of type `ty`.
///
/// Record fields the type does not declare are logged and skipped; declared
/// attributes with no record field come out as Null.
pub fn encode<R: Record>(record: &R, ty: &ObjectType) -> Result<AttributeValue, EncodeError> {
    let json = serde_json::to_value(record).map_err(EncodeError::Serialize)?;
    let descriptor = describe_record::<R>()?;
    let Value::Object(map) = json else {
        return Err(EncodeError::TypeMismatch {
            expected: "object".into(),
            found: json_kind(&json).into(),
        });
    };
    encode_object(&map, &descriptor, ty)
}

/// Like [`encode`], but declared attributes the record type does not carry
/// are taken from the plan, then from the state, and only then null-filled.
/// Unknown plan values are not carried over.
pub fn encode_with_fallback<R: Record>(
    record: &R,
    ty: &ObjectType,
    plan: Option<&AttributeValue>,
    state: Option<&AttributeValue>,
) -> Result<AttributeValue, EncodeError> {
    let descriptor = describe_record::<R>()?;
    let mut encoded = encode(record, ty)?;
    if let AttributeValue::Object { attrs, .. } = &mut encoded {
        for name in ty.names() {
            if descriptor.field(name).is_some() {
                continue;
            }
            let fallback = [plan, state]
                .into_iter()
                .flatten()
                .filter_map(|tree| tree.attribute(name))
                .find(|v| !v.is_unknown());
            if let Some(value) = fallback {
                attrs.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(encoded)
}

fn encode_object(
    map: &Map<String, Value>,
    descriptor: &TypeDescriptor,
    ty: &ObjectType,
) -> Result<AttributeValue, EncodeError> {
    let mut attrs = BTreeMap::new();
    for field in descriptor.fields() {
        let Some(attr_ty) = ty.get(&field.wire_name) else {
            tracing::warn!(
                field = %field.wire_name,
                record = descriptor.type_name,
                "field not found in schema attributes"
            );
            continue;
        };
        let json = map.get(&field.serde_key).unwrap_or(&Value::Null);
        let value = to_attr(json, &field.ty, attr_ty)
            .map_err(|e| EncodeError::within(field.wire_name.as_str(), e))?;
        attrs.insert(field.wire_name.clone(), value);
    }
    for name in ty.names() {
        attrs.entry(name.clone()).or_insert(AttributeValue::Null);
    }
    Ok(AttributeValue::Object { ty: ty.clone(), attrs })
}

fn to_attr(
    json: &Value,
    field: &FieldType,
    ty: &AttributeType,
) -> Result<AttributeValue, EncodeError> {
    let field = field.strip_optional();
    if json.is_null() {
        return Ok(AttributeValue::Null);
    }
    let mismatch = || EncodeError::TypeMismatch {
        expected: ty.to_string(),
        found: json_kind(json).into(),
    };
    Ok(match (ty, json) {
        (AttributeType::Dynamic, v) => AttributeValue::dynamic_json(v.to_string()),
        (AttributeType::String, Value::String(s)) => AttributeValue::string(s.as_str()),
        (AttributeType::Bool, Value::Bool(b)) => AttributeValue::bool(*b),
        (AttributeType::Int64, Value::Number(n)) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => AttributeValue::int64(i),
            (None, Some(u)) => return Err(EncodeError::IntOverflow(u)),
            _ => return Err(mismatch()),
        },
        (AttributeType::Float64, Value::Number(n)) => {
            AttributeValue::float64(n.as_f64().ok_or_else(mismatch)?)
        }
        (AttributeType::List(elem), Value::Array(items)) => AttributeValue::List {
            elem: elem.as_ref().clone(),
            items: elements(items, element_field(field), elem)?,
        },
        (AttributeType::Set(elem), Value::Array(items)) => {
            let mut out = BTreeSet::new();
            let converted = elements(items, element_field(field), elem)?;
            for (item, json) in converted.into_iter().zip(items) {
                if !out.insert(item) {
                    return Err(EncodeError::DuplicateSetElement(json.to_string()));
                }
            }
            AttributeValue::Set { elem: elem.as_ref().clone(), items: out }
        }
        (AttributeType::Tuple(elems), Value::Array(items)) => {
            if elems.len() != items.len() {
                return Err(EncodeError::TupleArity { expected: elems.len(), found: items.len() });
            }
            let fields: &[FieldType] = match field {
                FieldType::Tuple(ts) => ts,
                _ => &[],
            };
            let items = items
                .iter()
                .zip(elems)
                .enumerate()
                .map(|(i, (v, t))| {
                    to_attr(v, fields.get(i).unwrap_or(&FieldType::Interface), t)
                        .map_err(|e| EncodeError::within(format!("[{i}]"), e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            AttributeValue::Tuple { elems: elems.clone(), items }
        }
        (AttributeType::Map(elem), Value::Object(entries)) => {
            let value_field = match field {
                FieldType::Map { value, .. } => value.as_ref(),
                _ => &FieldType::Interface,
            };
            let mut out = BTreeMap::new();
            for (key, v) in entries {
                let item = to_attr(v, value_field, elem)
                    .map_err(|e| EncodeError::within(key.as_str(), e))?;
                out.insert(key.clone(), item);
            }
            AttributeValue::Map { elem: elem.as_ref().clone(), entries: out }
        }
        (AttributeType::Object(obj), Value::Object(map)) => match field {
            FieldType::Record(record) => encode_object(map, &*record.descriptor()?, obj)?,
            _ => {
                let mut attrs = BTreeMap::new();
                for (name, attr_ty) in obj.iter() {
                    let v = map.get(name).unwrap_or(&Value::Null);
                    let item = to_attr(v, &FieldType::Interface, attr_ty)
                        .map_err(|e| EncodeError::within(name.as_str(), e))?;
                    attrs.insert(name.clone(), item);
                }
                AttributeValue::Object { ty: obj.clone(), attrs }
            }
        },
        _ => return Err(mismatch()),
    })
}

fn element_field(field: &FieldType) -> &FieldType {
    match field {
        FieldType::Slice(e) | FieldType::Set(e) => e,
        _ => &FieldType::Interface,
    }
}

fn elements(
    items: &[Value],
    field: &FieldType,
    ty: &AttributeType,
) -> Result<Vec<AttributeValue>, EncodeError> {
    items
        .iter()
        .enumerate()
        .map(|(i, v)| to_attr(v, field, ty).map_err(|e| EncodeError::within(format!("[{i}]"), e)))
        .collect()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
