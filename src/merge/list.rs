use std::collections::BTreeMap;

use crate::value::AttributeValue;

/// Lists of objects merge index by index and take the incoming length;
/// other lists are replaced.
pub(super) fn merge(
    existing: &mut BTreeMap<String, AttributeValue>,
    key: &str,
    incoming: &AttributeValue,
) {
    let AttributeValue::List { elem, items: incoming_items } = incoming else { return };
    if elem.as_object().is_none() {
        existing.insert(key.to_string(), incoming.clone());
        return;
    }
    let Some(AttributeValue::List { items: current, .. }) = existing.get(key) else {
        existing.insert(key.to_string(), incoming.clone());
        return;
    };
    let merged = incoming_items
        .iter()
        .enumerate()
        .map(|(i, item)| match current.get(i) {
            // unresolved incoming element keeps what was there
            Some(prior) if !item.is_known() => prior.clone(),
            Some(prior) if prior.is_known() => {
                let mut prior = prior.clone();
                if super::merge_objects(&mut prior, item) {
                    prior
                } else {
                    item.clone()
                }
            }
            _ => item.clone(),
        })
        .collect();
    existing.insert(key.to_string(), AttributeValue::List { elem: elem.clone(), items: merged });
}
