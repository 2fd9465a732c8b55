//! Plain JSON interchange for attribute values.
//!
//! `null` is Null, `{"$unknown": true}` is Unknown. A dynamic attribute is
//! written as the JSON it carries and stored internally as JSON text.
use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use super::{AttributeType, AttributeValue, Scalar};
use crate::error::ValueError;
use crate::path::AttributePath;

pub const UNKNOWN_MARKER: &str = "$unknown";

fn is_unknown_marker(v: &Value) -> bool {
    match v {
        Value::Object(map) => map.len() == 1 && map.get(UNKNOWN_MARKER) == Some(&Value::Bool(true)),
        _ => false,
    }
}

fn unknown_marker() -> Value {
    let mut map = Map::new();
    map.insert(UNKNOWN_MARKER.to_string(), Value::Bool(true));
    Value::Object(map)
}

impl AttributeValue {
    /// Read a value of type `ty` from its JSON interchange form.
    ///
    /// Declared object attributes missing from the JSON are read as Null.
    pub fn from_json(json: &Value, ty: &AttributeType) -> Result<Self, ValueError> {
        read(json, ty, &AttributePath::root())
    }

    /// Write the JSON interchange form.
    ///
    /// Dynamic text that does not parse is written as a JSON string.
    pub fn to_json(&self) -> Value {
        match self {
            AttributeValue::Null => Value::Null,
            AttributeValue::Unknown => unknown_marker(),
            AttributeValue::Scalar(s) => scalar_to_json(s),
            AttributeValue::List { items, .. } | AttributeValue::Tuple { items, .. } => {
                Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Set { items, .. } => {
                Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Map { entries, .. } => Value::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            AttributeValue::Object { attrs, .. } => Value::Object(
                attrs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            AttributeValue::Dynamic(inner) => match inner.as_ref() {
                AttributeValue::Scalar(Scalar::String(text)) => match serde_json::from_str(text) {
                    Ok(json) => json,
                    Err(error) => {
                        tracing::warn!(
                            %error,
                            "dynamic value is not valid JSON, writing it as a string"
                        );
                        Value::String(text.clone())
                    }
                },
                other => other.to_json(),
            },
        }
    }
}

fn scalar_to_json(s: &Scalar) -> Value {
    match s {
        Scalar::String(s) => Value::String(s.clone()),
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Int64(i) => Value::from(*i),
        Scalar::Float64(x) => serde_json::Number::from_f64(x.0)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

fn mismatch(path: &AttributePath, ty: &AttributeType) -> ValueError {
    ValueError::Mismatch { path: path.clone(), expected: ty.to_string() }
}

fn read(
    json: &Value,
    ty: &AttributeType,
    path: &AttributePath,
) -> Result<AttributeValue, ValueError> {
    if json.is_null() {
        return Ok(AttributeValue::Null);
    }
    if is_unknown_marker(json) {
        return Ok(AttributeValue::Unknown);
    }
    match (ty, json) {
        (AttributeType::String, Value::String(s)) => Ok(AttributeValue::string(s.as_str())),
        (AttributeType::Bool, Value::Bool(b)) => Ok(AttributeValue::bool(*b)),
        (AttributeType::Int64, Value::Number(n)) => {
            n.as_i64().map(AttributeValue::int64).ok_or_else(|| mismatch(path, ty))
        }
        (AttributeType::Float64, Value::Number(n)) => {
            n.as_f64().map(AttributeValue::float64).ok_or_else(|| mismatch(path, ty))
        }
        (AttributeType::List(elem), Value::Array(items)) => {
            let items = items
                .iter()
                .enumerate()
                .map(|(i, v)| read(v, elem, &path.join_index(i)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AttributeValue::List { elem: elem.as_ref().clone(), items })
        }
        (AttributeType::Set(elem), Value::Array(items)) => {
            let mut out = BTreeSet::new();
            for (i, v) in items.iter().enumerate() {
                let item_path = path.join_index(i);
                if !out.insert(read(v, elem, &item_path)?) {
                    return Err(ValueError::DuplicateSetElement { path: item_path });
                }
            }
            Ok(AttributeValue::Set { elem: elem.as_ref().clone(), items: out })
        }
        (AttributeType::Tuple(elems), Value::Array(items)) => {
            if elems.len() != items.len() {
                return Err(mismatch(path, ty));
            }
            let items = items
                .iter()
                .zip(elems)
                .enumerate()
                .map(|(i, (v, t))| read(v, t, &path.join_index(i)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AttributeValue::Tuple { elems: elems.clone(), items })
        }
        (AttributeType::Map(elem), Value::Object(map)) => {
            let entries = map
                .iter()
                .map(|(k, v)| Ok((k.clone(), read(v, elem, &path.join_key(k.as_str()))?)))
                .collect::<Result<BTreeMap<_, _>, ValueError>>()?;
            Ok(AttributeValue::Map { elem: elem.as_ref().clone(), entries })
        }
        (AttributeType::Object(obj), Value::Object(map)) => {
            if let Some(extra) = map.keys().find(|k| !obj.contains(k)) {
                return Err(ValueError::UndeclaredAttribute(extra.clone()));
            }
            let mut attrs = BTreeMap::new();
            for (name, attr_ty) in obj.iter() {
                let value = match map.get(name) {
                    Some(v) => read(v, attr_ty, &path.join_attribute(name.as_str()))?,
                    None => AttributeValue::Null,
                };
                attrs.insert(name.clone(), value);
            }
            Ok(AttributeValue::Object { ty: obj.clone(), attrs })
        }
        (AttributeType::Dynamic, other) => Ok(AttributeValue::dynamic_json(other.to_string())),
        _ => Err(mismatch(path, ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn service_type() -> AttributeType {
        AttributeType::Object(
            ObjectType::new()
                .with("name", AttributeType::String)
                .with("port", AttributeType::Int64)
                .with("tags", AttributeType::set(AttributeType::String))
                .with("extra", AttributeType::Dynamic),
        )
    }

    #[test]
    fn reads_unknown_marker_and_fills_missing_attributes() {
        let value = AttributeValue::from_json(
            &json!({"name": "db1", "port": {"$unknown": true}}),
            &service_type(),
        )
        .unwrap();
        assert_eq!(value.attribute("port"), Some(&AttributeValue::Unknown));
        assert_eq!(value.attribute("tags"), Some(&AttributeValue::Null));
        assert!(value.conforms_to(&service_type()));
    }

    #[test]
    fn dynamic_round_trips_through_text() {
        let src = json!({"name": "a", "port": 1, "tags": ["x"], "extra": {"k": [1, "two"]}});
        let value = AttributeValue::from_json(&src, &service_type()).unwrap();
        match value.attribute("extra") {
            Some(AttributeValue::Dynamic(inner)) => {
                assert_eq!(inner.as_str(), Some(r#"{"k":[1,"two"]}"#));
            }
            other => panic!("expected dynamic, got {other:?}"),
        }
        assert_eq!(value.to_json(), src);
    }

    #[test]
    fn unparsable_dynamic_text_is_written_as_a_string() {
        let value = AttributeValue::dynamic_json("{not json");
        assert_eq!(value.to_json(), json!("{not json"));
    }

    #[test]
    fn rejects_mismatch_with_path() {
        let err = AttributeValue::from_json(&json!({"port": "80"}), &service_type()).unwrap_err();
        assert_eq!(err.to_string(), "at port: value does not conform to int64");
    }

    #[test]
    fn rejects_undeclared_attribute() {
        let err = AttributeValue::from_json(&json!({"nope": 1}), &service_type()).unwrap_err();
        assert_eq!(err, ValueError::UndeclaredAttribute("nope".into()));
    }
}
