//! Tri-state attribute values and their type-only projection.
//!
//! No serde_json::Value in the tree itself; dynamic content travels as JSON
//! text inside a `Dynamic` wrapper.
pub mod json;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::ValueError;
use crate::path::AttributePath;

// ------------------------------- Types ------------------------------------ //

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Bool,
    Int64,
    Float64,
    List(Box<AttributeType>),
    Set(Box<AttributeType>),
    Tuple(Vec<AttributeType>),
    Map(Box<AttributeType>),
    Object(ObjectType),
    Dynamic,
}

/// Fixed attribute set of an object, name → type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectType {
    attrs: BTreeMap<String, AttributeType>,
}

impl ObjectType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, ty: AttributeType) -> Self {
        self.attrs.insert(name.into(), ty);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: AttributeType) -> Option<AttributeType> {
        self.attrs.insert(name.into(), ty)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeType> {
        self.attrs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeType)> {
        self.attrs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.attrs.keys()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl FromIterator<(String, AttributeType)> for ObjectType {
    fn from_iter<I: IntoIterator<Item = (String, AttributeType)>>(iter: I) -> Self {
        Self { attrs: iter.into_iter().collect() }
    }
}

impl AttributeType {
    pub fn list(elem: AttributeType) -> Self {
        Self::List(Box::new(elem))
    }

    pub fn set(elem: AttributeType) -> Self {
        Self::Set(Box::new(elem))
    }

    pub fn map(elem: AttributeType) -> Self {
        Self::Map(Box::new(elem))
    }

    /// The type-appropriate null. Nulls are untyped in this tree, the
    /// declaring slot carries the type.
    pub fn null_value(&self) -> AttributeValue {
        AttributeValue::Null
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&AttributeType> {
        match self {
            Self::List(e) | Self::Set(e) | Self::Map(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::String | Self::Bool | Self::Int64 | Self::Float64)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Bool => f.write_str("bool"),
            Self::Int64 => f.write_str("int64"),
            Self::Float64 => f.write_str("float64"),
            Self::List(e) => write!(f, "list({e})"),
            Self::Set(e) => write!(f, "set({e})"),
            Self::Map(e) => write!(f, "map({e})"),
            Self::Tuple(es) => {
                f.write_str("tuple([")?;
                for (i, e) in es.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    write!(f, "{e}")?;
                }
                f.write_str("])")
            }
            Self::Object(o) => {
                f.write_str("object({")?;
                for (i, (k, t)) in o.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    write!(f, "{k}: {t}")?;
                }
                f.write_str("})")
            }
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

// ------------------------------- Values ----------------------------------- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind { String, Bool, Int64, Float64 }

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    String(String),
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::String(_) => ScalarKind::String,
            Scalar::Bool(_) => ScalarKind::Bool,
            Scalar::Int64(_) => ScalarKind::Int64,
            Scalar::Float64(_) => ScalarKind::Float64,
        }
    }

    pub fn attribute_type(&self) -> AttributeType {
        match self.kind() {
            ScalarKind::String => AttributeType::String,
            ScalarKind::Bool => AttributeType::Bool,
            ScalarKind::Int64 => AttributeType::Int64,
            ScalarKind::Float64 => AttributeType::Float64,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => f.write_str(s),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int64(i) => write!(f, "{i}"),
            Scalar::Float64(x) => write!(f, "{}", x.0),
        }
    }
}

/// A node of the attribute value tree.
///
/// Containers carry their element type so that empty containers stay typed.
/// `Object` values always hold every attribute of their `ObjectType`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeValue {
    Null,
    Unknown,
    Scalar(Scalar),
    List { elem: AttributeType, items: Vec<AttributeValue> },
    Set { elem: AttributeType, items: BTreeSet<AttributeValue> },
    Tuple { elems: Vec<AttributeType>, items: Vec<AttributeValue> },
    Map { elem: AttributeType, entries: BTreeMap<String, AttributeValue> },
    Object { ty: ObjectType, attrs: BTreeMap<String, AttributeValue> },
    Dynamic(Box<AttributeValue>),
}

impl AttributeValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(s.into()))
    }

    pub fn bool(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }

    pub fn int64(i: i64) -> Self {
        Self::Scalar(Scalar::Int64(i))
    }

    pub fn float64(x: f64) -> Self {
        Self::Scalar(Scalar::Float64(OrderedFloat(x)))
    }

    pub fn dynamic_json(text: impl Into<String>) -> Self {
        Self::Dynamic(Box::new(Self::string(text)))
    }

    /// Checked list constructor: every element must conform to `elem`.
    pub fn list(elem: AttributeType, items: Vec<AttributeValue>) -> Result<Self, ValueError> {
        check_elements(&elem, items.iter().enumerate())?;
        Ok(Self::List { elem, items })
    }

    /// Checked set constructor. Duplicates are rejected rather than collapsed.
    pub fn set(elem: AttributeType, items: Vec<AttributeValue>) -> Result<Self, ValueError> {
        check_elements(&elem, items.iter().enumerate())?;
        let mut out = BTreeSet::new();
        for item in items {
            if !out.insert(item) {
                return Err(ValueError::DuplicateSetElement { path: AttributePath::root() });
            }
        }
        Ok(Self::Set { elem, items: out })
    }

    pub fn tuple(
        elems: Vec<AttributeType>,
        items: Vec<AttributeValue>,
    ) -> Result<Self, ValueError> {
        let candidate = Self::Tuple { elems: elems.clone(), items };
        if !candidate.conforms_to(&AttributeType::Tuple(elems.clone())) {
            return Err(ValueError::Mismatch {
                path: AttributePath::root(),
                expected: AttributeType::Tuple(elems).to_string(),
            });
        }
        Ok(candidate)
    }

    pub fn map(
        elem: AttributeType,
        entries: BTreeMap<String, AttributeValue>,
    ) -> Result<Self, ValueError> {
        for (key, value) in &entries {
            if !value.conforms_to(&elem) {
                return Err(ValueError::Mismatch {
                    path: AttributePath::root().join_key(key.as_str()),
                    expected: elem.to_string(),
                });
            }
        }
        Ok(Self::Map { elem, entries })
    }

    /// Checked object constructor: the attribute set must match `ty` exactly.
    pub fn object(
        ty: ObjectType,
        attrs: BTreeMap<String, AttributeValue>,
    ) -> Result<Self, ValueError> {
        for name in attrs.keys() {
            if !ty.contains(name) {
                return Err(ValueError::UndeclaredAttribute(name.clone()));
            }
        }
        for (name, attr_ty) in ty.iter() {
            match attrs.get(name) {
                None => return Err(ValueError::MissingAttribute(name.clone())),
                Some(v) if !v.conforms_to(attr_ty) => {
                    return Err(ValueError::Mismatch {
                        path: AttributePath::attribute(name.as_str()),
                        expected: attr_ty.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(Self::Object { ty, attrs })
    }

    /// Object whose every declared attribute is null.
    pub fn null_object(ty: &ObjectType) -> Self {
        let attrs = ty.names().map(|n| (n.clone(), AttributeValue::Null)).collect();
        Self::Object { ty: ty.clone(), attrs }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Neither null nor unknown.
    pub fn is_known(&self) -> bool {
        !self.is_null() && !self.is_unknown()
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn attributes(&self) -> Option<&BTreeMap<String, AttributeValue>> {
        match self {
            Self::Object { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes().and_then(|attrs| attrs.get(name))
    }

    /// Short label of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unknown => "unknown",
            Self::Scalar(Scalar::String(_)) => "string",
            Self::Scalar(Scalar::Bool(_)) => "bool",
            Self::Scalar(Scalar::Int64(_)) => "int64",
            Self::Scalar(Scalar::Float64(_)) => "float64",
            Self::List { .. } => "list",
            Self::Set { .. } => "set",
            Self::Tuple { .. } => "tuple",
            Self::Map { .. } => "map",
            Self::Object { .. } => "object",
            Self::Dynamic(_) => "dynamic",
        }
    }

    /// Deep structural type check. Null and Unknown conform to every type.
    pub fn conforms_to(&self, ty: &AttributeType) -> bool {
        match (self, ty) {
            (Self::Null | Self::Unknown, _) => true,
            (Self::Scalar(s), t) => s.attribute_type() == *t,
            (Self::List { elem, items }, AttributeType::List(t)) => {
                elem == t.as_ref() && items.iter().all(|i| i.conforms_to(t))
            }
            (Self::Set { elem, items }, AttributeType::Set(t)) => {
                elem == t.as_ref() && items.iter().all(|i| i.conforms_to(t))
            }
            (Self::Map { elem, entries }, AttributeType::Map(t)) => {
                elem == t.as_ref() && entries.values().all(|v| v.conforms_to(t))
            }
            (Self::Tuple { elems, items }, AttributeType::Tuple(ts)) => {
                elems == ts
                    && items.len() == ts.len()
                    && items.iter().zip(ts).all(|(i, t)| i.conforms_to(t))
            }
            (Self::Object { ty: own, attrs }, AttributeType::Object(expected)) => {
                own == expected
                    && attrs.len() == expected.len()
                    && expected.iter().all(|(name, t)| {
                        attrs.get(name).is_some_and(|v| v.conforms_to(t))
                    })
            }
            (Self::Dynamic(_), AttributeType::Dynamic) => true,
            _ => false,
        }
    }
}

fn check_elements<'a>(
    elem: &AttributeType,
    items: impl Iterator<Item = (usize, &'a AttributeValue)>,
) -> Result<(), ValueError> {
    for (i, item) in items {
        if !item.conforms_to(elem) {
            return Err(ValueError::Mismatch {
                path: AttributePath::root().join_index(i),
                expected: elem.to_string(),
            });
        }
    }
    Ok(())
}
