//! One resource type's records and options, wired through the conversion
//! steps that surround an external action.
//!
//! ```text
//! plan ─┬─ decode_create ──────────────────────────┐
//!       └─ decode_update (guard, decode, reconcile) ┼─> action ─> finalize ─> state
//! state ── decode_state / decode_input ────────────┘
//! ```
//!
//! The action itself stays with the caller.
use std::marker::PhantomData;

use once_cell::sync::OnceCell;

use crate::convert::{decode, encode_with_fallback, select_path};
use crate::descriptor::{Record, RecordType};
use crate::error::{PathError, ResourceError, SchemaError};
use crate::guard::{PlanCheck, guard_plan};
use crate::merge::merge_plan_into_state;
use crate::path;
use crate::reconcile::reconcile;
use crate::schema::{ResourceSchema, SchemaOptions, generate_resource_schema};
use crate::value::{AttributeValue, ObjectType};

/// Create input `C`, update input `U` and state record `S` of one resource
/// type. The derived schema is computed on first use and kept.
pub struct ResourceDefinition<C, U, S> {
    name: String,
    options: SchemaOptions,
    schema: OnceCell<ResourceSchema>,
    records: PhantomData<fn() -> (C, U, S)>,
}

impl<C, U, S> std::fmt::Debug for ResourceDefinition<C, U, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("schema_cached", &self.schema.get().is_some())
            .finish()
    }
}

impl<C: Record, U: Record, S: Record> ResourceDefinition<C, U, S> {
    pub fn new(name: impl Into<String>, options: SchemaOptions) -> Self {
        Self { name: name.into(), options, schema: OnceCell::new(), records: PhantomData }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    pub fn schema(&self) -> Result<&ResourceSchema, SchemaError> {
        self.schema.get_or_try_init(|| {
            tracing::debug!(resource = %self.name, "deriving resource schema");
            generate_resource_schema(
                &RecordType::of::<C>(),
                Some(&RecordType::of::<U>()),
                Some(&RecordType::of::<S>()),
                &self.options,
            )
        })
    }

    pub fn attribute_types(&self) -> Result<ObjectType, SchemaError> {
        Ok(self.schema()?.attribute_types())
    }

    /// Immutability violations and requires-replace attributes of a planned change.
    pub fn check_plan(
        &self,
        state: Option<&AttributeValue>,
        plan: Option<&AttributeValue>,
        config: Option<&AttributeValue>,
    ) -> Result<PlanCheck, SchemaError> {
        Ok(guard_plan(self.schema()?, state, plan, config))
    }

    /// Plan → create input, after defaults and validation.
    pub fn decode_create(&self, plan: &AttributeValue) -> Result<C, ResourceError> {
        tracing::info!(resource = %self.name, "converting plan to create input");
        let schema = self.schema()?;
        let plan = schema.apply_defaults(plan.clone());
        let diagnostics: Vec<_> =
            schema.validate(&plan).into_iter().filter(|d| d.is_error()).collect();
        if !diagnostics.is_empty() {
            for d in &diagnostics {
                tracing::error!(
                    resource = %self.name,
                    attribute = %d.path,
                    "{}: {}",
                    d.summary,
                    d.detail
                );
            }
            return Err(ResourceError::Invalid(diagnostics));
        }
        decode::<C>(&plan).map_err(|err| self.failed("failed to convert plan object", err.into()))
    }

    /// Plan and prior state → update input.
    ///
    /// Immutable attributes are checked first; both trees are then decoded
    /// and the plan is reconciled against the state.
    pub fn decode_update(
        &self,
        plan: &AttributeValue,
        state: &AttributeValue,
    ) -> Result<U, ResourceError> {
        tracing::info!(resource = %self.name, "converting plan and state to update input");
        let check = self.check_plan(Some(state), Some(plan), Some(plan))?;
        if !check.is_allowed() {
            for v in &check.violations {
                tracing::error!(resource = %self.name, attribute = %v.path, "{}", v.summary);
            }
            return Err(ResourceError::Immutable(check.violations));
        }
        let planned = decode::<U>(plan)
            .map_err(|err| self.failed("failed to convert plan object", err.into()))?;
        let prior = self.decode_state(state)?;
        reconcile(&planned, &prior)
            .map_err(|err| self.failed("failed to reconcile plan and state", err.into()))
    }

    pub fn decode_state(&self, state: &AttributeValue) -> Result<S, ResourceError> {
        decode::<S>(state).map_err(|err| self.failed("failed to convert state object", err.into()))
    }

    /// Prior state → input of a read or delete action.
    ///
    /// With `at`, the input is taken from the dotted wire path inside the
    /// state record instead of the whole record. Fields are matched by serde key.
    pub fn decode_input<R: Record>(
        &self,
        state: &AttributeValue,
        at: Option<&str>,
    ) -> Result<R, ResourceError> {
        let prior = self.decode_state(state)?;
        let json = match at {
            Some(at) => select_path(&prior, at)?,
            None => serde_json::to_value(&prior).map_err(PathError::Serialize)?,
        };
        path::from_value_with_path(json)
            .map_err(|err| self.failed("failed to decode action input", err.into()))
    }

    /// Action result → new state.
    ///
    /// Declared attributes the result does not carry come from the plan, then
    /// from the prior state; the plan is then merged over the result.
    pub fn finalize<R: Record>(
        &self,
        result: &R,
        plan: Option<&AttributeValue>,
        state: Option<&AttributeValue>,
    ) -> Result<AttributeValue, ResourceError> {
        tracing::info!(resource = %self.name, "converting result to state object");
        let ty = self.attribute_types()?;
        let encoded = encode_with_fallback(result, &ty, plan, state)
            .map_err(|err| self.failed("failed to convert result to state object", err.into()))?;
        Ok(match plan {
            Some(plan) if !plan.is_null() => merge_plan_into_state(plan, &encoded, &ty),
            _ => encoded,
        })
    }

    fn failed(&self, what: &str, err: ResourceError) -> ResourceError {
        tracing::error!(resource = %self.name, "{what}: {err}");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldSpec;
    use crate::value::AttributeType;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct CreateVolume {
        name: String,
        size_gb: i64,
        zone: String,
        tags: Option<Vec<String>>,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct UpdateVolume {
        volume_id: String,
        name: String,
        size_gb: i64,
        tags: Option<Vec<String>>,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Attachment {
        host: String,
        device: String,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct VolumeState {
        volume_id: String,
        name: String,
        size_gb: i64,
        zone: String,
        tags: Option<Vec<String>>,
        attachment: Option<Attachment>,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct DetachInput {
        host: String,
    }

    impl Record for CreateVolume {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::new::<String>("name").required().immutable(),
                FieldSpec::new::<i64>("size_gb").default_literal("10"),
                FieldSpec::new::<String>("zone").choices(["a", "b"]).force_replace(),
                FieldSpec::new::<Option<Vec<String>>>("tags"),
            ]
        }
    }

    impl Record for UpdateVolume {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::new::<String>("volume_id"),
                FieldSpec::new::<String>("name"),
                FieldSpec::new::<i64>("size_gb"),
                FieldSpec::new::<Option<Vec<String>>>("tags"),
            ]
        }
    }

    impl Record for Attachment {
        fn fields() -> Vec<FieldSpec> {
            vec![FieldSpec::new::<String>("host"), FieldSpec::new::<String>("device")]
        }
    }

    impl Record for VolumeState {
        fn fields() -> Vec<FieldSpec> {
            vec![
                FieldSpec::new::<String>("volume_id"),
                FieldSpec::new::<String>("name"),
                FieldSpec::new::<i64>("size_gb"),
                FieldSpec::new::<String>("zone"),
                FieldSpec::new::<Option<Vec<String>>>("tags"),
                FieldSpec::new::<Option<Attachment>>("attachment"),
            ]
        }
    }

    impl Record for DetachInput {
        fn fields() -> Vec<FieldSpec> {
            vec![FieldSpec::new::<String>("host")]
        }
    }

    crate::describe_records!(Attachment);

    type Volume = ResourceDefinition<CreateVolume, UpdateVolume, VolumeState>;

    fn volume() -> Volume {
        ResourceDefinition::new("volume", SchemaOptions::default())
    }

    fn tree(def: &Volume, value: serde_json::Value) -> AttributeValue {
        let ty = AttributeType::Object(def.attribute_types().unwrap());
        AttributeValue::from_json(&value, &ty).unwrap()
    }

    #[test]
    fn schema_merges_input_and_computed_attributes() {
        let def = volume();
        let schema = def.schema().unwrap();
        assert!(schema.attribute("name").unwrap().required);
        assert!(schema.attribute("volume_id").unwrap().computed);
        assert!(schema.attribute("attachment").unwrap().nested.is_some());
        assert!(std::ptr::eq(schema, def.schema().unwrap()));
    }

    #[test]
    fn create_applies_defaults_before_decoding() {
        let def = volume();
        let plan = tree(&def, json!({"name": "data", "zone": "a", "volume_id": {"$unknown": true}}));
        let input = def.decode_create(&plan).unwrap();
        assert_eq!(
            input,
            CreateVolume { name: "data".into(), size_gb: 10, zone: "a".into(), tags: None }
        );
    }

    #[test]
    fn create_rejects_invalid_plans() {
        let def = volume();
        let plan = tree(&def, json!({"zone": "c"}));
        let Err(ResourceError::Invalid(diagnostics)) = def.decode_create(&plan) else {
            panic!("expected validation failure");
        };
        let summaries: Vec<_> = diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Missing Required Attribute", "Invalid Value"]);
    }

    #[test]
    fn update_reconciles_plan_against_state() {
        let def = volume();
        let state = tree(
            &def,
            json!({"volume_id": "vol-1", "name": "data", "size_gb": 10, "zone": "a", "tags": ["x"]}),
        );
        let plan = tree(
            &def,
            json!({"volume_id": "vol-1", "name": "data", "size_gb": 20, "zone": "a", "tags": null}),
        );
        let input = def.decode_update(&plan, &state).unwrap();
        assert_eq!(
            input,
            UpdateVolume {
                volume_id: "vol-1".into(),
                name: "data".into(),
                size_gb: 20,
                tags: Some(vec!["x".into()]),
            }
        );
    }

    #[test]
    fn update_of_immutable_attribute_is_rejected() {
        let def = volume();
        let state = tree(&def, json!({"volume_id": "vol-1", "name": "data", "zone": "a"}));
        let plan = tree(&def, json!({"volume_id": "vol-1", "name": "logs", "zone": "b"}));
        let check = def.check_plan(Some(&state), Some(&plan), Some(&plan)).unwrap();
        assert_eq!(check.requires_replace, vec!["zone".to_string()]);

        let Err(ResourceError::Immutable(violations)) = def.decode_update(&plan, &state) else {
            panic!("expected immutability violation");
        };
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].current.as_deref(), Some("data"));
        assert_eq!(violations[0].attempted.as_deref(), Some("logs"));
    }

    #[test]
    fn input_can_be_taken_from_a_nested_state_path() {
        let def = volume();
        let state = tree(
            &def,
            json!({"volume_id": "vol-1", "attachment": {"host": "web-1", "device": "/dev/sdb"}}),
        );
        let input: DetachInput = def.decode_input(&state, Some("attachment")).unwrap();
        assert_eq!(input.host, "web-1");

        let whole: UpdateVolume = def.decode_input(&state, None).unwrap();
        assert_eq!(whole.volume_id, "vol-1");
    }

    #[test]
    fn finalize_fills_from_plan_and_merges() {
        let def = volume();
        let plan = tree(
            &def,
            json!({"name": "data", "size_gb": 10, "zone": "a", "tags": ["x"], "volume_id": {"$unknown": true}}),
        );
        let result = VolumeState {
            volume_id: "vol-9".into(),
            name: "data".into(),
            size_gb: 10,
            ..Default::default()
        };
        let state = def.finalize(&result, Some(&plan), None).unwrap();
        assert_eq!(
            state.to_json(),
            json!({
                "attachment": null,
                "name": "data",
                "size_gb": 10,
                "tags": ["x"],
                "volume_id": "vol-9",
                "zone": "a"
            })
        );
    }
}
