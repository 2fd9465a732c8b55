use std::collections::BTreeMap;

use crate::value::AttributeValue;

/// Maps of objects merge key by key; other maps are replaced.
pub(super) fn merge(
    existing: &mut BTreeMap<String, AttributeValue>,
    key: &str,
    incoming: &AttributeValue,
) {
    let AttributeValue::Map { elem, entries: incoming_entries } = incoming else { return };
    if elem.as_object().is_none() {
        existing.insert(key.to_string(), incoming.clone());
        return;
    }
    let Some(AttributeValue::Map { entries, .. }) = existing.get_mut(key) else {
        existing.insert(key.to_string(), incoming.clone());
        return;
    };
    for (k, value) in incoming_entries {
        if !value.is_known() {
            continue;
        }
        let merged = entries.get_mut(k).is_some_and(|current| super::merge_objects(current, value));
        if !merged {
            entries.insert(k.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{AttributeType, ObjectType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn status_map() -> AttributeType {
        AttributeType::map(AttributeType::Object(ObjectType::new().with("status", AttributeType::String)))
    }

    #[test]
    fn object_entries_merge_per_key() {
        let ty = status_map();
        let mut attrs = BTreeMap::from([(
            "svc".to_string(),
            AttributeValue::from_json(&json!({"k1": {"status": "running"}}), &ty).unwrap(),
        )]);
        let incoming = AttributeValue::from_json(
            &json!({"k1": {"status": "stopped"}, "k2": {"status": "running"}, "k3": null}),
            &ty,
        )
        .unwrap();
        merge(&mut attrs, "svc", &incoming);
        assert_eq!(attrs["svc"].to_json(), json!({"k1": {"status": "stopped"}, "k2": {"status": "running"}}));
    }

    #[test]
    fn scalar_maps_are_replaced() {
        let ty = AttributeType::map(AttributeType::String);
        let mut attrs = BTreeMap::from([(
            "labels".to_string(),
            AttributeValue::from_json(&json!({"a": "1", "b": "2"}), &ty).unwrap(),
        )]);
        let incoming = AttributeValue::from_json(&json!({"a": "9"}), &ty).unwrap();
        merge(&mut attrs, "labels", &incoming);
        assert_eq!(attrs["labels"].to_json(), json!({"a": "9"}));
    }
}
