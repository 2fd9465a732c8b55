use std::collections::BTreeMap;

use crate::value::AttributeValue;

/// No stable identity for set elements: drop unresolved ones and replace.
pub(super) fn merge(
    existing: &mut BTreeMap<String, AttributeValue>,
    key: &str,
    incoming: &AttributeValue,
) {
    let AttributeValue::Set { elem, items } = incoming else { return };
    let items = items.iter().filter(|v| v.is_known()).cloned().collect();
    existing.insert(key.to_string(), AttributeValue::Set { elem: elem.clone(), items });
}
