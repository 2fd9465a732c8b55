//! Disjoint copies of record graphs.
//!
//! Copies go through `Clone`, so every field survives, `#[serde(skip)]`
//! ones and values JSON cannot carry (NaN, non-string map keys) included.
//! Owned containers (`Vec`, maps, `Box`, `serde_json::Value`) are rebuilt at
//! every depth. `Arc`/`Rc` targets stay shared between original and copy;
//! writes go through `Arc::make_mut`, which detaches the copy first. Interior
//! mutability behind a shared pointer (`Arc<Mutex<_>>`) is shared as well.
use std::sync::Arc;

pub fn deep_copy<T: Clone>(value: &T) -> T {
    value.clone()
}

/// A cached value handed out as independent mutable instances.
#[derive(Debug)]
pub struct Prototype<T> {
    original: Arc<T>,
}

impl<T> Clone for Prototype<T> {
    fn clone(&self) -> Self {
        Self { original: Arc::clone(&self.original) }
    }
}

impl<T: Clone> Prototype<T> {
    pub fn new(value: T) -> Self {
        Self { original: Arc::new(value) }
    }

    /// Read-only view of the cached original.
    pub fn original(&self) -> &T {
        &self.original
    }

    pub fn instance(&self) -> T {
        deep_copy(self.original.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Template {
        name: String,
        ports: Vec<u16>,
        env: BTreeMap<String, String>,
        child: Option<Box<Template>>,
        extra: serde_json::Value,
        shared: Arc<Vec<String>>,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct WithScratch {
        name: String,
        #[serde(skip)]
        scratch: u32,
    }

    fn template() -> Template {
        Template {
            name: "base".into(),
            ports: vec![80],
            env: BTreeMap::from([("MODE".to_string(), "prod".to_string())]),
            child: Some(Box::new(Template { name: "child".into(), ..Default::default() })),
            extra: json!({"list": [1, 2]}),
            shared: Arc::new(vec!["x".into()]),
        }
    }

    #[test]
    fn copy_is_equal_and_disjoint() {
        let original = template();
        let mut copy = deep_copy(&original);
        assert_eq!(copy, original);

        copy.ports.push(443);
        copy.env.insert("MODE".into(), "dev".into());
        copy.child.as_mut().unwrap().name = "changed".into();
        copy.extra["list"][0] = json!(99);
        Arc::make_mut(&mut copy.shared).push("y".into());
        assert_eq!(original, template());
        assert_eq!(*copy.shared, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn skipped_fields_are_copied() {
        let original = WithScratch { name: "a".into(), scratch: 7 };
        assert_eq!(deep_copy(&original), original);
    }

    #[test]
    fn values_json_cannot_carry_are_copied() {
        let original: BTreeMap<(i32, i32), f64> = BTreeMap::from([((1, 2), f64::NAN)]);
        let copy = deep_copy(&original);
        assert!(copy[&(1, 2)].is_nan());
    }

    #[test]
    fn prototype_instances_do_not_leak_into_the_original() {
        let proto = Prototype::new(template());
        let mut first = proto.instance();
        first.name = "mutated".into();
        let second = proto.instance();
        assert_eq!(second.name, "base");
        assert_eq!(proto.original().name, "base");
    }
}
