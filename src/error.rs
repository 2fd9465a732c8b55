//! Error taxonomy for schema derivation and value conversion.
//!
//! `ImmutableAttributeViolation` lives in [`crate::guard`] as a structured
//! rejection result.

use crate::guard::ImmutableAttributeViolation;
use crate::path::AttributePath;
use crate::schema::Diagnostic;

/// Failures while resolving a type descriptor or deriving a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Two fields resolve to the same wire name after flattening squashed records.
    #[error("schema conflict in `{type_name}`: wire name `{wire_name}` is declared by both `{first}` and `{second}`")]
    Conflict {
        type_name: &'static str,
        wire_name: String,
        first: String,
        second: String,
    },

    /// A field type has no wire representation and cannot fall back to dynamic.
    #[error("field `{field}`: unsupported type {detail}")]
    UnsupportedType { field: String, detail: String },

    /// A `default` literal that does not parse as the field's type.
    #[error("field `{field}`: invalid default literal `{literal}` ({reason})")]
    InvalidDefault {
        field: String,
        literal: String,
        reason: String,
    },
}

/// Failures while turning an attribute value tree into a record.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("cannot decode a null object")]
    NullRoot,

    #[error("cannot decode an unknown object")]
    UnknownRoot,

    #[error("expected an object value, found {found}")]
    NotAnObject { found: &'static str },

    #[error("attribute `{name}`: {source}")]
    Attribute {
        name: String,
        #[source]
        source: Box<DecodeError>,
    },

    #[error("dynamic value is not valid JSON: {0}")]
    DynamicJson(#[source] serde_json::Error),

    #[error("at {path} → {message}")]
    Deserialize { path: String, message: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl DecodeError {
    pub(crate) fn within(name: impl Into<String>, source: DecodeError) -> Self {
        DecodeError::Attribute { name: name.into(), source: Box::new(source) }
    }
}

/// Failures while turning a record into an attribute value tree.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("uint value {0} overflows int64")]
    IntOverflow(u64),

    #[error("tuple expects {expected} elements, found {found}")]
    TupleArity { expected: usize, found: usize },

    #[error("duplicate set element {0}")]
    DuplicateSetElement(String),

    #[error("field '{name}': {source}")]
    Field {
        name: String,
        #[source]
        source: Box<EncodeError>,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl EncodeError {
    pub(crate) fn within(name: impl Into<String>, source: EncodeError) -> Self {
        EncodeError::Field { name: name.into(), source: Box::new(source) }
    }
}

/// Failures while reconciling a plan record against a state record.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("failed to serialize {which} record: {source}")]
    Serialize {
        which: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("reconciled record does not deserialize: {0}")]
    Rebuild(#[source] DecodeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Failures of a dotted lookup through a record.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("`{segment}` not found at `{path}`")]
    NotFound { segment: String, path: String },

    #[error("cannot descend into {found} with `{segment}`")]
    NotTraversable { segment: String, found: String },

    #[error("failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Failures of the resource pipeline, each stage wrapped as-is.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to convert plan or state: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to convert result to state: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("failed to apply schema path: {0}")]
    Path(#[from] PathError),

    #[error("{} immutable attribute(s) changed: {}", .0.len(), violation_paths(.0))]
    Immutable(Vec<ImmutableAttributeViolation>),

    #[error("plan failed validation: {}", diagnostic_paths(.0))]
    Invalid(Vec<Diagnostic>),
}

fn violation_paths(violations: &[ImmutableAttributeViolation]) -> String {
    violations.iter().map(|v| v.path.to_string()).collect::<Vec<_>>().join(", ")
}

fn diagnostic_paths(diagnostics: &[Diagnostic]) -> String {
    diagnostics.iter().map(|d| d.path.to_string()).collect::<Vec<_>>().join(", ")
}

/// Structural invariant violations of attribute values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("object is missing declared attribute `{0}`")]
    MissingAttribute(String),

    #[error("object carries undeclared attribute `{0}`")]
    UndeclaredAttribute(String),

    #[error("at {path}: value does not conform to {expected}")]
    Mismatch { path: AttributePath, expected: String },

    #[error("at {path}: duplicate set element")]
    DuplicateSetElement { path: AttributePath },
}
