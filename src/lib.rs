//! Typed records ↔ attribute-value trees for declarative resource engines.
//!
//! Record types describe their fields once ([`descriptor::Record`]). From
//! that the crate derives attribute schemas, converts between records and
//! attribute trees, reconciles plans against prior state, deep-merges
//! trees and rejects changes to immutable attributes.
pub mod cli;
pub mod convert;
pub mod deep_copy;
pub mod descriptor;
pub mod error;
pub mod guard;
pub mod merge;
pub mod path;
pub mod reconcile;
pub mod resource;
pub mod schema;
pub mod value;

pub use convert::{decode, encode, encode_with_fallback, select_path};
pub use deep_copy::{Prototype, deep_copy};
pub use descriptor::{
    Describe, FieldSpec, FieldType, Record, RecordType, TypeDescriptor, describe_record,
};
pub use error::{DecodeError, EncodeError, ResourceError, SchemaError, ValueError};
pub use guard::{ImmutableAttributeViolation, PlanCheck, check_immutable, guard_plan};
pub use merge::{merge_into, merge_plan_into_state};
pub use path::AttributePath;
pub use reconcile::reconcile;
pub use resource::ResourceDefinition;
pub use schema::{
    ResourceSchema, SchemaOptions, derive_schema, generate_data_source_schema,
    generate_resource_schema,
};
pub use value::{AttributeType, AttributeValue, ObjectType};
