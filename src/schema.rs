//! Schema derivation: record descriptors lowered to attribute types and to
//! full resource / data-source schemas.
pub mod defaults;
pub mod validators;

use std::any::TypeId;
use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use self::validators::{ChoiceValidator, Diagnostic, Severity};
use crate::descriptor::{FieldDescriptor, FieldType, RecordType};
use crate::error::SchemaError;
use crate::guard::ImmutableKind;
use crate::path::AttributePath;
use crate::value::{AttributeType, AttributeValue, ObjectType};

// ------------------------------- Options ---------------------------------- //

/// Per record-type knobs, always passed explicitly. All entries are wire names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    pub sensitive: Vec<String>,
    pub extra_required: Vec<String>,
    /// Slice fields exposed as sets instead of lists.
    pub set_semantics: Vec<String>,
    pub immutable: Vec<String>,
}

impl SchemaOptions {
    fn has(list: &[String], name: &str) -> bool {
        list.iter().any(|n| n == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// Required/optional, with defaults, validators and plan modifiers.
    Input,
    /// Everything optional and computed.
    Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaFlavor {
    Resource,
    /// No defaults, no plan modifiers.
    DataSource,
}

// --------------------------- Attribute types ------------------------------ //

/// Lower a record type into its object type. This is the attribute type tree
/// used by the converter and the merge.
pub fn derive_schema(
    record: &RecordType,
    options: &SchemaOptions,
) -> Result<ObjectType, SchemaError> {
    Lowering { options, stack: Vec::new() }.record(record, "")
}

/// Lower a single field type. `as_set` turns a top-level slice into a set.
pub fn attribute_type_of(
    field: &str,
    ty: &FieldType,
    as_set: bool,
    options: &SchemaOptions,
) -> Result<AttributeType, SchemaError> {
    Lowering { options, stack: Vec::new() }.field(field, ty, as_set)
}

struct Lowering<'a> {
    options: &'a SchemaOptions,
    stack: Vec<TypeId>,
}

impl Lowering<'_> {
    fn record(&mut self, record: &RecordType, prefix: &str) -> Result<ObjectType, SchemaError> {
        if self.stack.contains(&record.type_id()) {
            return Err(SchemaError::UnsupportedType {
                field: prefix.to_string(),
                detail: format!("`{}` is recursive", record.name),
            });
        }
        self.stack.push(record.type_id());
        let descriptor = record.descriptor()?;
        let mut out = ObjectType::new();
        for field in descriptor.fields() {
            let path = qualify(prefix, &field.wire_name);
            let as_set = SchemaOptions::has(&self.options.set_semantics, &field.wire_name);
            out.insert(field.wire_name.clone(), self.field(&path, &field.ty, as_set)?);
        }
        self.stack.pop();
        Ok(out)
    }

    fn field(
        &mut self,
        path: &str,
        ty: &FieldType,
        as_set: bool,
    ) -> Result<AttributeType, SchemaError> {
        if ty.contains_interface() {
            return Ok(AttributeType::Dynamic);
        }
        self.lower(path, ty, as_set)
    }

    fn lower(
        &mut self,
        path: &str,
        ty: &FieldType,
        as_set: bool,
    ) -> Result<AttributeType, SchemaError> {
        Ok(match ty {
            FieldType::String => AttributeType::String,
            FieldType::Bool => AttributeType::Bool,
            FieldType::Int | FieldType::Uint => AttributeType::Int64,
            FieldType::Float => AttributeType::Float64,
            FieldType::Optional(inner) => self.lower(path, inner, as_set)?,
            FieldType::Slice(elem) if as_set => AttributeType::set(self.lower(path, elem, false)?),
            FieldType::Slice(elem) => AttributeType::list(self.lower(path, elem, false)?),
            FieldType::Set(elem) => AttributeType::set(self.lower(path, elem, false)?),
            FieldType::Map { key, value } => {
                if *key.strip_optional() != FieldType::String {
                    return Err(SchemaError::UnsupportedType {
                        field: path.to_string(),
                        detail: format!("map key {key} (keys must be strings)"),
                    });
                }
                AttributeType::map(self.lower(path, value, false)?)
            }
            FieldType::Tuple(elems) => AttributeType::Tuple(
                elems
                    .iter()
                    .map(|e| self.lower(path, e, false))
                    .collect::<Result<_, _>>()?,
            ),
            FieldType::Record(record) => AttributeType::Object(self.record(record, path)?),
            FieldType::Interface => AttributeType::Dynamic,
            FieldType::Unsupported(_) => {
                return Err(SchemaError::UnsupportedType {
                    field: path.to_string(),
                    detail: ty.to_string(),
                });
            }
        })
    }
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

// ----------------------------- Attribute schema --------------------------- //

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanModifier {
    /// A change to the attribute forces the resource to be replaced.
    RequiresReplace,
    /// A change to the attribute after creation is rejected.
    Immutable(ImmutableKind),
}

impl PlanModifier {
    pub fn description(&self) -> &'static str {
        match self {
            PlanModifier::RequiresReplace => {
                "If the value of this attribute changes, the resource will be replaced."
            }
            PlanModifier::Immutable(_) => {
                "Prevents changes to this attribute after initial creation. Any attempt to modify will result in an error."
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestingMode {
    Single,
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedAttributes {
    pub mode: NestingMode,
    pub attributes: IndexMap<String, AttributeSchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    pub ty: AttributeType,
    pub description: Option<String>,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub default: Option<AttributeValue>,
    pub validators: Vec<ChoiceValidator>,
    pub plan_modifiers: Vec<PlanModifier>,
    pub nested: Option<NestedAttributes>,
}

impl AttributeSchema {
    pub fn is_immutable(&self) -> bool {
        self.plan_modifiers.iter().any(|m| matches!(m, PlanModifier::Immutable(_)))
    }

    pub fn immutable_kind(&self) -> Option<ImmutableKind> {
        self.plan_modifiers.iter().find_map(|m| match m {
            PlanModifier::Immutable(kind) => Some(*kind),
            PlanModifier::RequiresReplace => None,
        })
    }

    pub fn requires_replace(&self) -> bool {
        self.plan_modifiers.contains(&PlanModifier::RequiresReplace)
    }
}

struct Deriver<'a> {
    options: &'a SchemaOptions,
    variant: SchemaVariant,
    flavor: SchemaFlavor,
}

impl Deriver<'_> {
    fn attributes(
        &self,
        record: &RecordType,
        prefix: &str,
    ) -> Result<IndexMap<String, AttributeSchema>, SchemaError> {
        let descriptor = record.descriptor()?;
        let mut out = IndexMap::new();
        for field in descriptor.fields() {
            let path = qualify(prefix, &field.wire_name);
            out.insert(field.wire_name.clone(), self.attribute(field, &path)?);
        }
        Ok(out)
    }

    fn attribute(
        &self,
        field: &FieldDescriptor,
        path: &str,
    ) -> Result<AttributeSchema, SchemaError> {
        let name = field.wire_name.as_str();
        let as_set = SchemaOptions::has(&self.options.set_semantics, name);
        let ty = attribute_type_of(path, &field.ty, as_set, self.options)?;
        let sensitive = field.sensitive || SchemaOptions::has(&self.options.sensitive, name);
        let nested = self.nested(field, &ty, path)?;

        let mut schema = AttributeSchema {
            ty,
            description: field.description.clone(),
            required: false,
            optional: true,
            computed: true,
            sensitive,
            default: None,
            validators: Vec::new(),
            plan_modifiers: Vec::new(),
            nested,
        };
        if self.variant == SchemaVariant::Computed {
            return Ok(schema);
        }

        let required = field.required || SchemaOptions::has(&self.options.extra_required, name);
        schema.required = required;
        schema.optional = !required;
        schema.computed = !required;

        if !field.choices.is_empty() {
            let choices = field.choices.clone();
            match &schema.ty {
                AttributeType::String => schema.validators.push(ChoiceValidator::String(choices)),
                AttributeType::List(e) if **e == AttributeType::String => {
                    schema.validators.push(ChoiceValidator::List(choices))
                }
                AttributeType::Set(e) if **e == AttributeType::String => {
                    schema.validators.push(ChoiceValidator::Set(choices))
                }
                other => tracing::warn!(
                    field = path,
                    ty = %other,
                    "choices ignored on non-string attribute"
                ),
            }
        }

        if self.flavor == SchemaFlavor::DataSource {
            return Ok(schema);
        }

        if let Some(literal) = &field.default_literal {
            let value = defaults::parse_default(literal, &schema.ty).map_err(|reason| {
                SchemaError::InvalidDefault {
                    field: path.to_string(),
                    literal: literal.clone(),
                    reason,
                }
            })?;
            schema.default = Some(value);
            schema.required = false;
            schema.optional = true;
            schema.computed = true;
        }
        if field.force_replace {
            schema.plan_modifiers.push(PlanModifier::RequiresReplace);
        }
        if field.immutable || SchemaOptions::has(&self.options.immutable, name) {
            let kind =
                ImmutableKind::for_type(&schema.ty).ok_or_else(|| SchemaError::UnsupportedType {
                    field: path.to_string(),
                    detail: format!("immutability is not supported for {}", schema.ty),
                })?;
            schema.plan_modifiers.push(PlanModifier::Immutable(kind));
        }
        Ok(schema)
    }

    fn nested(
        &self,
        field: &FieldDescriptor,
        ty: &AttributeType,
        path: &str,
    ) -> Result<Option<NestedAttributes>, SchemaError> {
        let mode = match ty {
            AttributeType::Object(_) => NestingMode::Single,
            AttributeType::List(e) if e.as_object().is_some() => NestingMode::List,
            AttributeType::Set(e) if e.as_object().is_some() => NestingMode::Set,
            AttributeType::Map(e) if e.as_object().is_some() => NestingMode::Map,
            _ => return Ok(None),
        };
        let record = match field.ty.strip_optional() {
            FieldType::Record(r) => r,
            FieldType::Slice(e) | FieldType::Set(e) => match e.record() {
                Some(r) => r,
                None => return Ok(None),
            },
            FieldType::Map { value, .. } => match value.record() {
                Some(r) => r,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        let attributes = self.attributes(record, path)?;
        Ok(Some(NestedAttributes { mode, attributes }))
    }
}

/// Attribute schemas of a single record in the given variant and flavor.
pub fn derive_attributes(
    record: &RecordType,
    variant: SchemaVariant,
    flavor: SchemaFlavor,
    options: &SchemaOptions,
) -> Result<IndexMap<String, AttributeSchema>, SchemaError> {
    Deriver { options, variant, flavor }.attributes(record, "")
}

// ----------------------------- Resource schema ---------------------------- //

/// Top-level schema of a resource or data source.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    pub flavor: SchemaFlavor,
    attributes: IndexMap<String, AttributeSchema>,
}

/// Create record as input; update and state records contribute computed
/// attributes the create record does not declare.
pub fn generate_resource_schema(
    create: &RecordType,
    update: Option<&RecordType>,
    state: Option<&RecordType>,
    options: &SchemaOptions,
) -> Result<ResourceSchema, SchemaError> {
    let flavor = SchemaFlavor::Resource;
    let mut attributes = derive_attributes(create, SchemaVariant::Input, flavor, options)?;
    for extra in [update, state].into_iter().flatten() {
        for (name, attr) in derive_attributes(extra, SchemaVariant::Computed, flavor, options)? {
            attributes.entry(name).or_insert(attr);
        }
    }
    Ok(ResourceSchema { flavor, attributes })
}

/// Input record (when any) as input, state record as computed.
pub fn generate_data_source_schema(
    input: Option<&RecordType>,
    state: &RecordType,
    options: &SchemaOptions,
) -> Result<ResourceSchema, SchemaError> {
    let flavor = SchemaFlavor::DataSource;
    let mut attributes = match input {
        Some(record) => derive_attributes(record, SchemaVariant::Input, flavor, options)?,
        None => IndexMap::new(),
    };
    for (name, attr) in derive_attributes(state, SchemaVariant::Computed, flavor, options)? {
        attributes.entry(name).or_insert(attr);
    }
    Ok(ResourceSchema { flavor, attributes })
}

impl ResourceSchema {
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&String, &AttributeSchema)> {
        self.attributes.iter()
    }

    /// Name → type view, as used by conversion and merge.
    pub fn attribute_types(&self) -> ObjectType {
        self.attributes.iter().map(|(k, a)| (k.clone(), a.ty.clone())).collect()
    }

    pub fn immutable_attributes(&self) -> impl Iterator<Item = (&String, ImmutableKind)> {
        self.attributes.iter().filter_map(|(k, a)| a.immutable_kind().map(|kind| (k, kind)))
    }

    pub fn requires_replace_attributes(&self) -> impl Iterator<Item = &String> {
        self.attributes.iter().filter(|(_, a)| a.requires_replace()).map(|(k, _)| k)
    }

    /// Fill top-level Null attributes that carry a default.
    pub fn apply_defaults(&self, config: AttributeValue) -> AttributeValue {
        match config {
            AttributeValue::Object { ty, mut attrs } => {
                for (name, schema) in &self.attributes {
                    if let (Some(default), Some(slot)) = (&schema.default, attrs.get_mut(name)) {
                        if slot.is_null() {
                            *slot = default.clone();
                        }
                    }
                }
                AttributeValue::Object { ty, attrs }
            }
            other => other,
        }
    }

    /// Structural type check, missing required attributes and choice violations.
    pub fn validate(&self, config: &AttributeValue) -> Vec<Diagnostic> {
        let ty = AttributeType::Object(self.attribute_types());
        if !config.conforms_to(&ty) {
            return vec![Diagnostic::error(
                AttributePath::root(),
                "Value Conversion Error",
                format!("expected {ty}, found {}", config.kind_name()),
            )];
        }
        let mut out = Vec::new();
        if let Some(attrs) = config.attributes() {
            validate_attributes(&self.attributes, attrs, &AttributePath::root(), &mut out);
        }
        out
    }
}

fn validate_attributes(
    schemas: &IndexMap<String, AttributeSchema>,
    attrs: &BTreeMap<String, AttributeValue>,
    at: &AttributePath,
    out: &mut Vec<Diagnostic>,
) {
    for (name, schema) in schemas {
        let path = at.join_attribute(name.as_str());
        let value = attrs.get(name).unwrap_or(&AttributeValue::Null);
        if schema.required && value.is_null() {
            out.push(Diagnostic::error(
                path,
                "Missing Required Attribute",
                format!("The argument \"{name}\" is required, but no definition was found."),
            ));
            continue;
        }
        out.extend(schema.validators.iter().filter_map(|v| v.validate(&path, value)));
        let Some(nested) = &schema.nested else { continue };
        match value {
            AttributeValue::Object { attrs, .. } => {
                validate_attributes(&nested.attributes, attrs, &path, out);
            }
            AttributeValue::List { items, .. } => {
                for (i, item) in items.iter().enumerate() {
                    if let Some(attrs) = item.attributes() {
                        validate_attributes(&nested.attributes, attrs, &path.join_index(i), out);
                    }
                }
            }
            AttributeValue::Map { entries, .. } => {
                for (key, item) in entries {
                    if let Some(attrs) = item.attributes() {
                        let at = path.join_key(key.as_str());
                        validate_attributes(&nested.attributes, attrs, &at, out);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Describe, FieldSpec, Record};
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Endpoint {
        host: String,
        port: u16,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct CreateDb {
        name: String,
        tier: Option<String>,
        zones: Vec<String>,
        replicas: i32,
        endpoints: Vec<Endpoint>,
        labels: BTreeMap<String, String>,
        extra: Option<serde_json::Value>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct DbState {
        name: String,
        id: String,
        status: String,
    }

    crate::describe_records!(Endpoint);

    impl Record for Endpoint {
        fn fields() -> Vec<FieldSpec> {
            vec![FieldSpec::new::<String>("host").required(), FieldSpec::new::<u16>("port")]
        }
    }

    impl Record for CreateDb {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::new::<String>("name").required().immutable().desc("Database name"),
                FieldSpec::new::<Option<String>>("tier").choices(["basic", "premium"]).default_literal("basic"),
                FieldSpec::new::<Vec<String>>("zones").force_replace(),
                FieldSpec::new::<i32>("replicas").default_literal("1"),
                FieldSpec::new::<Vec<Endpoint>>("endpoints"),
                FieldSpec::new::<BTreeMap<String, String>>("labels"),
                FieldSpec::new::<Option<serde_json::Value>>("extra"),
            ]
        }
    }

    impl Record for DbState {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::new::<String>("name"),
                FieldSpec::new::<String>("id"),
                FieldSpec::new::<String>("status"),
            ]
        }
    }

    fn options() -> SchemaOptions {
        SchemaOptions {
            set_semantics: vec!["zones".into()],
            sensitive: vec!["host".into()],
            ..Default::default()
        }
    }

    #[test]
    fn lowers_record_to_object_type() {
        let ty = derive_schema(&RecordType::of::<CreateDb>(), &options()).unwrap();
        let endpoint = ObjectType::new()
            .with("host", AttributeType::String)
            .with("port", AttributeType::Int64);
        let expected = ObjectType::new()
            .with("name", AttributeType::String)
            .with("tier", AttributeType::String)
            .with("zones", AttributeType::set(AttributeType::String))
            .with("replicas", AttributeType::Int64)
            .with("endpoints", AttributeType::list(AttributeType::Object(endpoint)))
            .with("labels", AttributeType::map(AttributeType::String))
            .with("extra", AttributeType::Dynamic);
        assert_eq!(ty, expected);
    }

    #[test]
    fn resource_schema_layers_input_over_computed() {
        let schema = generate_resource_schema(
            &RecordType::of::<CreateDb>(),
            None,
            Some(&RecordType::of::<DbState>()),
            &options(),
        )
        .unwrap();

        let name = schema.attribute("name").unwrap();
        assert!(name.required && !name.computed);
        assert_eq!(name.immutable_kind(), Some(ImmutableKind::String));
        assert_eq!(name.description.as_deref(), Some("Database name"));

        let tier = schema.attribute("tier").unwrap();
        assert!(!tier.required && tier.optional && tier.computed);
        assert_eq!(tier.default, Some(AttributeValue::string("basic")));
        assert_eq!(tier.validators.len(), 1);

        assert!(schema.attribute("zones").unwrap().requires_replace());
        assert_eq!(schema.attribute("replicas").unwrap().default, Some(AttributeValue::int64(1)));

        let status = schema.attribute("status").unwrap();
        assert!(status.optional && status.computed && status.default.is_none());

        let endpoints = schema.attribute("endpoints").unwrap().nested.as_ref().unwrap();
        assert_eq!(endpoints.mode, NestingMode::List);
        assert!(endpoints.attributes["host"].required);
        assert!(endpoints.attributes["host"].sensitive);
        assert_eq!(schema.requires_replace_attributes().collect::<Vec<_>>(), ["zones"]);
    }

    #[test]
    fn data_source_drops_defaults_and_modifiers() {
        let schema = generate_data_source_schema(
            Some(&RecordType::of::<CreateDb>()),
            &RecordType::of::<DbState>(),
            &options(),
        )
        .unwrap();
        let tier = schema.attribute("tier").unwrap();
        assert!(tier.default.is_none());
        assert_eq!(tier.validators.len(), 1);
        assert!(schema.attribute("name").unwrap().plan_modifiers.is_empty());
    }

    #[test]
    fn data_source_without_input_is_all_computed() {
        let schema =
            generate_data_source_schema(None, &RecordType::of::<DbState>(), &options()).unwrap();
        assert_eq!(schema.flavor, SchemaFlavor::DataSource);
        let names: Vec<_> = schema.attributes().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["name", "id", "status"]);
        assert!(
            schema
                .attributes()
                .all(|(_, attr)| attr.optional && attr.computed && !attr.required)
        );
    }

    #[test]
    fn validate_reports_missing_required_and_bad_choice() {
        let schema =
            generate_resource_schema(&RecordType::of::<CreateDb>(), None, None, &options()).unwrap();
        let ty = AttributeType::Object(schema.attribute_types());
        let config = AttributeValue::from_json(&serde_json::json!({"tier": "gold"}), &ty).unwrap();
        let diags = schema.validate(&config);
        let summaries: Vec<_> =
            diags.iter().map(|d| (d.path.to_string(), d.summary.as_str())).collect();
        assert_eq!(summaries, [
            ("name".to_string(), "Missing Required Attribute"),
            ("tier".to_string(), "Invalid Value"),
        ]);
    }

    #[test]
    fn apply_defaults_fills_null_only() {
        let schema =
            generate_resource_schema(&RecordType::of::<CreateDb>(), None, None, &options()).unwrap();
        let ty = AttributeType::Object(schema.attribute_types());
        let config = AttributeValue::from_json(&serde_json::json!({"name": "db", "replicas": 3}), &ty).unwrap();
        let filled = schema.apply_defaults(config);
        assert_eq!(filled.attribute("tier"), Some(&AttributeValue::string("basic")));
        assert_eq!(filled.attribute("replicas"), Some(&AttributeValue::int64(3)));
    }

    #[test]
    fn non_string_map_keys_are_unsupported() {
        let ty = <BTreeMap<i64, String> as Describe>::describe();
        let err = attribute_type_of("by_id", &ty, false, &SchemaOptions::default());
        assert!(matches!(err, Err(SchemaError::UnsupportedType { .. })));
    }

    #[test]
    fn invalid_default_is_an_error() {
        #[derive(Debug, Default, Serialize, Deserialize)]
        #[serde(default)]
        struct Bad {
            count: i64,
        }
        impl Record for Bad {
            fn fields() -> Vec<FieldSpec> {
                vec![FieldSpec::new::<i64>("count").default_literal("many")]
            }
        }
        let options = SchemaOptions::default();
        let err =
            generate_resource_schema(&RecordType::of::<Bad>(), None, None, &options).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefault { ref field, .. } if field == "count"));
    }
}
