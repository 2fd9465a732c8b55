//! Static reflection over record types.
//!
//! A record lists its fields once through [`Record::fields`]; everything
//! else (wire names, squashing, schema shape) is resolved from that list and
//! cached per type for the life of the process.
pub mod cache;
pub mod naming;

use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SchemaError;

// ----------------------------- Field types -------------------------------- //

/// Host-level shape of a field, before it is lowered to an attribute type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Bool,
    Int,
    Uint,
    Float,
    /// Pointer-optional: `None` is the explicit null state.
    Optional(Box<FieldType>),
    Slice(Box<FieldType>),
    Set(Box<FieldType>),
    Map { key: Box<FieldType>, value: Box<FieldType> },
    Tuple(Vec<FieldType>),
    Record(RecordType),
    /// Runtime-typed content, carried as dynamic.
    Interface,
    Unsupported(&'static str),
}

impl FieldType {
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// The type behind any number of optional layers.
    pub fn strip_optional(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner.strip_optional(),
            other => other,
        }
    }

    pub fn record(&self) -> Option<&RecordType> {
        match self.strip_optional() {
            FieldType::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.strip_optional(),
            FieldType::Slice(_) | FieldType::Set(_) | FieldType::Map { .. } | FieldType::Tuple(_)
        )
    }

    /// Whether an interface value is reachable anywhere below this type,
    /// including through nested records.
    pub fn contains_interface(&self) -> bool {
        let mut seen = HashSet::new();
        self.contains_interface_inner(&mut seen)
    }

    fn contains_interface_inner(&self, seen: &mut HashSet<TypeId>) -> bool {
        match self {
            FieldType::Interface => true,
            FieldType::Optional(t) | FieldType::Slice(t) | FieldType::Set(t) => {
                t.contains_interface_inner(seen)
            }
            FieldType::Map { key, value } => {
                key.contains_interface_inner(seen) || value.contains_interface_inner(seen)
            }
            FieldType::Tuple(ts) => ts.iter().any(|t| t.contains_interface_inner(seen)),
            FieldType::Record(r) => {
                if !seen.insert(r.type_id()) {
                    return false;
                }
                r.field_specs()
                    .iter()
                    .filter(|f| !f.ignored)
                    .any(|f| f.ty.contains_interface_inner(seen))
            }
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::String => f.write_str("string"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Int => f.write_str("int"),
            FieldType::Uint => f.write_str("uint"),
            FieldType::Float => f.write_str("float"),
            FieldType::Optional(t) => write!(f, "optional<{t}>"),
            FieldType::Slice(t) => write!(f, "slice<{t}>"),
            FieldType::Set(t) => write!(f, "set<{t}>"),
            FieldType::Map { key, value } => write!(f, "map<{key}, {value}>"),
            FieldType::Tuple(ts) => {
                f.write_str("(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 { f.write_str(", ")?; }
                    write!(f, "{t}")?;
                }
                f.write_str(")")
            }
            FieldType::Record(r) => f.write_str(r.name),
            FieldType::Interface => f.write_str("interface"),
            FieldType::Unsupported(name) => write!(f, "`{name}`"),
        }
    }
}

/// Handle on a record type, usable without a generic parameter.
#[derive(Clone, Copy)]
pub struct RecordType {
    pub name: &'static str,
    id: fn() -> TypeId,
    fields: fn() -> Vec<FieldSpec>,
}

impl RecordType {
    pub fn of<R: Record>() -> Self {
        RecordType { name: std::any::type_name::<R>(), id: TypeId::of::<R>, fields: R::fields }
    }

    pub fn type_id(&self) -> TypeId {
        (self.id)()
    }

    pub fn field_specs(&self) -> Vec<FieldSpec> {
        (self.fields)()
    }

    /// Resolved, cached descriptor of this record type.
    pub fn descriptor(&self) -> Result<Arc<TypeDescriptor>, SchemaError> {
        cache::descriptor_of(self)
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordType").field(&self.name).finish()
    }
}

// ------------------------------- Traits ----------------------------------- //

/// Maps a host type to its [`FieldType`].
pub trait Describe {
    fn describe() -> FieldType;
}

/// A struct whose fields are exposed to schema derivation and conversion.
///
/// Implementors derive serde with container-level `#[serde(default)]`,
/// `#[serde(flatten)]` on squashed sub-records and `#[serde(skip)]` on
/// ignored fields, so that the generic JSON mapping matches [`Record::fields`].
pub trait Record: Serialize + DeserializeOwned + Default + 'static {
    fn fields() -> Vec<FieldSpec>;
}

/// Implement [`Describe`] for record types so they can be nested inside
/// `Option`, `Vec`, maps and other records.
#[macro_export]
macro_rules! describe_records {
    ($($t:ty),+ $(,)?) => {
        $(
            impl $crate::descriptor::Describe for $t {
                fn describe() -> $crate::descriptor::FieldType {
                    $crate::descriptor::FieldType::Record(
                        $crate::descriptor::RecordType::of::<$t>(),
                    )
                }
            }
        )+
    };
}

macro_rules! describe_as {
    ($variant:ident: $($t:ty),+) => {
        $(impl Describe for $t {
            fn describe() -> FieldType {
                FieldType::$variant
            }
        })+
    };
}

describe_as!(String: String);
describe_as!(Bool: bool);
describe_as!(Int: i8, i16, i32, i64, isize);
describe_as!(Uint: u8, u16, u32, u64, usize);
describe_as!(Float: f32, f64);
describe_as!(Interface: serde_json::Value);

impl Describe for i128 {
    fn describe() -> FieldType {
        FieldType::Unsupported("i128")
    }
}

impl Describe for u128 {
    fn describe() -> FieldType {
        FieldType::Unsupported("u128")
    }
}

impl Describe for char {
    fn describe() -> FieldType {
        FieldType::Unsupported("char")
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> FieldType {
        FieldType::Optional(Box::new(T::describe()))
    }
}

impl<T: Describe> Describe for Box<T> {
    fn describe() -> FieldType {
        T::describe()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> FieldType {
        FieldType::Slice(Box::new(T::describe()))
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn describe() -> FieldType {
        FieldType::Slice(Box::new(T::describe()))
    }
}

impl<T: Describe> Describe for BTreeSet<T> {
    fn describe() -> FieldType {
        FieldType::Set(Box::new(T::describe()))
    }
}

impl<T: Describe, S> Describe for HashSet<T, S> {
    fn describe() -> FieldType {
        FieldType::Set(Box::new(T::describe()))
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn describe() -> FieldType {
        FieldType::Map { key: Box::new(K::describe()), value: Box::new(V::describe()) }
    }
}

impl<K: Describe, V: Describe, S> Describe for HashMap<K, V, S> {
    fn describe() -> FieldType {
        FieldType::Map { key: Box::new(K::describe()), value: Box::new(V::describe()) }
    }
}

impl<K: Describe, V: Describe, S> Describe for IndexMap<K, V, S> {
    fn describe() -> FieldType {
        FieldType::Map { key: Box::new(K::describe()), value: Box::new(V::describe()) }
    }
}

impl Describe for serde_json::Map<String, serde_json::Value> {
    fn describe() -> FieldType {
        FieldType::Map { key: Box::new(FieldType::String), value: Box::new(FieldType::Interface) }
    }
}

impl<A: Describe, B: Describe> Describe for (A, B) {
    fn describe() -> FieldType {
        FieldType::Tuple(vec![A::describe(), B::describe()])
    }
}

impl<A: Describe, B: Describe, C: Describe> Describe for (A, B, C) {
    fn describe() -> FieldType {
        FieldType::Tuple(vec![A::describe(), B::describe(), C::describe()])
    }
}

// ------------------------------ Field specs ------------------------------- //

/// Declarative metadata for one record field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub(crate) ident: &'static str,
    pub(crate) ty: FieldType,
    pub(crate) squash: bool,
    pub(crate) mapping: Option<String>,
    pub(crate) flag: Option<String>,
    pub(crate) serde: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) required: bool,
    pub(crate) sensitive: bool,
    pub(crate) force_replace: bool,
    pub(crate) immutable: bool,
    pub(crate) ignored: bool,
    pub(crate) choices: Vec<String>,
    pub(crate) default_literal: Option<String>,
}

impl FieldSpec {
    pub fn new<T: Describe>(ident: &'static str) -> Self {
        Self::with_type(ident, T::describe())
    }

    /// Embedded record whose fields are lifted into the parent.
    pub fn squash<R: Record>(ident: &'static str) -> Self {
        let mut spec = Self::with_type(ident, FieldType::Record(RecordType::of::<R>()));
        spec.squash = true;
        spec
    }

    pub fn with_type(ident: &'static str, ty: FieldType) -> Self {
        FieldSpec {
            ident,
            ty,
            squash: false,
            mapping: None,
            flag: None,
            serde: None,
            description: None,
            required: false,
            sensitive: false,
            force_replace: false,
            immutable: false,
            ignored: false,
            choices: Vec::new(),
            default_literal: None,
        }
    }

    pub fn mapping(mut self, name: impl Into<String>) -> Self {
        self.mapping = Some(name.into());
        self
    }

    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.flag = Some(name.into());
        self
    }

    /// Serde key of the field, when renamed with `#[serde(rename)]`.
    pub fn serde(mut self, name: impl Into<String>) -> Self {
        self.serde = Some(name.into());
        self
    }

    pub fn desc(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_replace(mut self) -> Self {
        self.force_replace = true;
        self
    }

    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn default_literal(mut self, literal: impl Into<String>) -> Self {
        self.default_literal = Some(literal.into());
        self
    }

    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    fn serde_key(&self) -> String {
        self.serde.clone().unwrap_or_else(|| self.ident.to_string())
    }
}

// ------------------------------ Descriptors ------------------------------- //

/// One resolved field of a flattened record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub ident: &'static str,
    /// Key of the field in the record's serde representation.
    pub serde_key: String,
    pub wire_name: String,
    pub ty: FieldType,
    pub description: Option<String>,
    pub required: bool,
    pub sensitive: bool,
    pub force_replace: bool,
    pub immutable: bool,
    pub choices: Vec<String>,
    pub default_literal: Option<String>,
}

impl FieldDescriptor {
    /// Pointer-optional field (`Option<T>`).
    pub fn is_optional(&self) -> bool {
        self.ty.is_optional()
    }
}

/// Flattened field list of a record type, keyed by unique wire name.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub type_name: &'static str,
    fields: IndexMap<String, FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    pub fn field(&self, wire_name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(wire_name)
    }

    pub fn by_serde_key(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.values().find(|f| f.serde_key == key)
    }

    pub fn by_ident(&self, ident: &str) -> Option<&FieldDescriptor> {
        self.fields.values().find(|f| f.ident == ident)
    }

    pub fn wire_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Resolved descriptor of `R`, cached after the first call.
pub fn describe_record<R: Record>() -> Result<Arc<TypeDescriptor>, SchemaError> {
    RecordType::of::<R>().descriptor()
}

/// Uncached resolution: flatten squashed records and assign wire names.
pub(crate) fn resolve(record: &RecordType) -> Result<TypeDescriptor, SchemaError> {
    let mut fields = IndexMap::new();
    let mut origin: HashMap<String, String> = HashMap::new();
    collect(record, record.name, "", &mut fields, &mut origin, &mut Vec::new())?;
    Ok(TypeDescriptor { type_name: record.name, fields })
}

fn collect(
    record: &RecordType,
    root_name: &'static str,
    prefix: &str,
    fields: &mut IndexMap<String, FieldDescriptor>,
    origin: &mut HashMap<String, String>,
    stack: &mut Vec<TypeId>,
) -> Result<(), SchemaError> {
    if stack.contains(&record.type_id()) {
        return Err(SchemaError::UnsupportedType {
            field: prefix.trim_end_matches('.').to_string(),
            detail: format!("`{}` squashes itself", record.name),
        });
    }
    stack.push(record.type_id());
    for spec in record.field_specs() {
        if spec.ignored {
            continue;
        }
        let qualified = format!("{prefix}{}", spec.ident);
        if spec.squash {
            let FieldType::Record(inner) = spec.ty.strip_optional() else {
                return Err(SchemaError::UnsupportedType {
                    field: qualified,
                    detail: format!("{} cannot be squashed", spec.ty),
                });
            };
            collect(inner, root_name, &format!("{qualified}."), fields, origin, stack)?;
            continue;
        }
        let wire_name = naming::wire_name(
            spec.mapping.as_deref(),
            spec.flag.as_deref(),
            spec.serde.as_deref(),
            spec.ident,
        );
        if let Some(first) = origin.get(&wire_name) {
            return Err(SchemaError::Conflict {
                type_name: root_name,
                wire_name,
                first: first.clone(),
                second: qualified,
            });
        }
        origin.insert(wire_name.clone(), qualified);
        let serde_key = spec.serde_key();
        fields.insert(wire_name.clone(), FieldDescriptor {
            ident: spec.ident,
            serde_key,
            wire_name,
            ty: spec.ty,
            description: spec.description,
            required: spec.required,
            sensitive: spec.sensitive,
            force_replace: spec.force_replace,
            immutable: spec.immutable,
            choices: spec.choices,
            default_literal: spec.default_literal,
        });
    }
    stack.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Base {
        id: String,
        #[serde(rename = "createdAt")]
        created_at: Option<String>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Service {
        #[serde(flatten)]
        base: Base,
        name: String,
        labels: BTreeMap<String, String>,
        extra: Vec<serde_json::Value>,
        #[serde(skip)]
        scratch: u32,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Clash {
        #[serde(flatten)]
        base: Base,
        ident: String,
    }

    impl Record for Base {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::new::<String>("id").immutable(),
                FieldSpec::new::<Option<String>>("created_at").serde("createdAt"),
            ]
        }
    }

    impl Record for Service {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::squash::<Base>("base"),
                FieldSpec::new::<String>("name").mapping("serviceName").required(),
                FieldSpec::new::<BTreeMap<String, String>>("labels"),
                FieldSpec::new::<Vec<serde_json::Value>>("extra"),
                FieldSpec::new::<u32>("scratch").ignored(),
            ]
        }
    }

    impl Record for Clash {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::squash::<Base>("base"),
                FieldSpec::new::<String>("ident").flag("ID"),
            ]
        }
    }

    #[test]
    fn squashed_fields_are_lifted_in_order() {
        let desc = resolve(&RecordType::of::<Service>()).unwrap();
        let names: Vec<_> = desc.wire_names().cloned().collect();
        assert_eq!(names, ["id", "created_at", "service_name", "labels", "extra"]);
        let created = desc.field("created_at").unwrap();
        assert_eq!(created.serde_key, "createdAt");
        assert!(created.is_optional());
        assert!(desc.field("id").unwrap().immutable);
        assert!(desc.by_ident("scratch").is_none());
    }

    #[test]
    fn duplicate_wire_name_is_a_conflict() {
        let err = resolve(&RecordType::of::<Clash>()).unwrap_err();
        match err {
            SchemaError::Conflict { wire_name, first, second, .. } => {
                assert_eq!(wire_name, "id");
                assert_eq!(first, "base.id");
                assert_eq!(second, "ident");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn interface_is_detected_through_containers() {
        assert!(<Vec<serde_json::Value>>::describe().contains_interface());
        let ty = <Option<BTreeMap<String, Vec<serde_json::Value>>>>::describe();
        assert!(ty.contains_interface());
        assert!(!<BTreeMap<String, i64>>::describe().contains_interface());
        assert!(FieldType::Record(RecordType::of::<Service>()).contains_interface());
        assert!(!FieldType::Record(RecordType::of::<Base>()).contains_interface());
    }

    #[test]
    fn box_is_transparent() {
        assert_eq!(<Box<Option<i32>>>::describe(), FieldType::Optional(Box::new(FieldType::Int)));
        assert_eq!(<[u8; 4]>::describe(), FieldType::Slice(Box::new(FieldType::Uint)));
    }
}
