//! Wire-level deep merge of an incoming attribute tree into an existing one.
//!
//! Incoming Null and Unknown never overwrite. Objects merge attribute by
//! attribute; maps and lists of objects merge per key / per index; sets and
//! everything else are replaced.
mod list;
mod map;
mod object;
mod set;

use std::collections::BTreeMap;

use crate::value::{AttributeValue, ObjectType};

// ------------------------------- Front API -------------------------------- //

/// Merge `incoming` into `existing`. Both are expected to be objects; any
/// other known `incoming` replaces `existing`.
pub fn merge_into(existing: &mut AttributeValue, incoming: &AttributeValue) {
    if !incoming.is_known() {
        return;
    }
    match (existing, incoming) {
        (AttributeValue::Object { ty, attrs }, AttributeValue::Object { attrs: inc, .. }) => {
            merge_attributes(attrs, inc);
            null_fill(attrs, ty);
        }
        (slot, _) => *slot = incoming.clone(),
    }
}

/// Fold a plan into the values an external action returned.
///
/// Null and Unknown result attributes are dropped first so the plan can fill
/// them. Declared attributes still missing afterwards become Null and
/// undeclared ones are removed.
pub fn merge_plan_into_state(
    plan: &AttributeValue,
    state_result: &AttributeValue,
    schema: &ObjectType,
) -> AttributeValue {
    let mut attrs: BTreeMap<String, AttributeValue> = state_result
        .attributes()
        .map(|a| {
            a.iter()
                .filter(|(_, v)| v.is_known())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();
    if let Some(planned) = plan.attributes() {
        merge_attributes(&mut attrs, planned);
    }
    null_fill(&mut attrs, schema);
    attrs.retain(|name, _| {
        let declared = schema.contains(name);
        if !declared {
            tracing::debug!(attribute = %name, "dropping undeclared attribute after merge");
        }
        declared
    });
    AttributeValue::Object { ty: schema.clone(), attrs }
}

// ------------------------------- Dispatch --------------------------------- //

pub(crate) fn merge_attributes(
    existing: &mut BTreeMap<String, AttributeValue>,
    incoming: &BTreeMap<String, AttributeValue>,
) {
    for (key, value) in incoming {
        match value {
            AttributeValue::Null | AttributeValue::Unknown => continue,
            AttributeValue::Object { .. } => object::merge(existing, key, value),
            AttributeValue::Map { .. } => map::merge(existing, key, value),
            AttributeValue::List { .. } => list::merge(existing, key, value),
            AttributeValue::Set { .. } => set::merge(existing, key, value),
            _ => {
                existing.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Merge two objects in place; false when either side is not an object.
fn merge_objects(existing: &mut AttributeValue, incoming: &AttributeValue) -> bool {
    match (existing, incoming) {
        (AttributeValue::Object { ty, attrs }, AttributeValue::Object { attrs: inc, .. }) => {
            merge_attributes(attrs, inc);
            null_fill(attrs, ty);
            true
        }
        _ => false,
    }
}

fn null_fill(attrs: &mut BTreeMap<String, AttributeValue>, ty: &ObjectType) {
    for name in ty.names() {
        attrs.entry(name.clone()).or_insert(AttributeValue::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AttributeType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn server_type() -> ObjectType {
        ObjectType::new()
            .with("name", AttributeType::String)
            .with("port", AttributeType::Int64)
            .with(
                "nested",
                AttributeType::Object(
                    ObjectType::new()
                        .with("a", AttributeType::String)
                        .with("b", AttributeType::String),
                ),
            )
    }

    fn tree(v: serde_json::Value) -> AttributeValue {
        AttributeValue::from_json(&v, &AttributeType::Object(server_type())).unwrap()
    }

    #[test]
    fn nulls_and_unknowns_keep_existing() {
        let mut existing = tree(json!({"name": "a", "port": 80, "nested": {"a": "x", "b": "y"}}));
        let incoming = tree(json!({"name": {"$unknown": true}, "port": 81, "nested": {"a": null, "b": "z"}}));
        merge_into(&mut existing, &incoming);
        assert_eq!(existing.to_json(), json!({"name": "a", "port": 81, "nested": {"a": "x", "b": "z"}}));
    }

    #[test]
    fn plan_fills_what_the_result_left_empty() {
        let result = tree(json!({"name": "a", "port": null}));
        let plan = tree(json!({"port": 8080, "nested": {"a": "p"}}));
        let merged = merge_plan_into_state(&plan, &result, &server_type());
        assert_eq!(merged.to_json(), json!({"name": "a", "port": 8080, "nested": {"a": "p", "b": null}}));
        assert!(merged.conforms_to(&AttributeType::Object(server_type())));
    }

    #[test]
    fn undeclared_result_attributes_are_dropped() {
        let wide = server_type().with("extra", AttributeType::Bool);
        let result =
            AttributeValue::from_json(&json!({"name": "a", "extra": true}), &AttributeType::Object(wide))
                .unwrap();
        let merged = merge_plan_into_state(&AttributeValue::Null, &result, &server_type());
        assert_eq!(merged.to_json(), json!({"name": "a", "port": null, "nested": null}));
    }
}
