use std::collections::BTreeMap;

use crate::value::AttributeValue;

/// Recursive when the existing value is an object too, replace otherwise.
pub(super) fn merge(
    existing: &mut BTreeMap<String, AttributeValue>,
    key: &str,
    incoming: &AttributeValue,
) {
    if let Some(current) = existing.get_mut(key) {
        if super::merge_objects(current, incoming) {
            return;
        }
    }
    existing.insert(key.to_string(), incoming.clone());
}
