//! Plan/state reconciliation over records.
//!
//! The target starts from `P::default()`, receives every state field whose
//! identifier the plan record shares, then takes plan values field by field:
//!
//! - booleans: plan always wins
//! - other scalars: plan wins when non-zero and different from state
//! - containers and dynamic values: plan wins when set (non-empty for
//!   non-optional containers)
//! - nested records: plan wins if state is zero, otherwise recurse
//!
//! An absent plan value (`None`) never overrides state.
use serde_json::{Map, Value};

use crate::descriptor::{FieldType, Record, describe_record};
use crate::error::ReconcileError;
use crate::path;

pub fn reconcile<P: Record, S: Record>(plan: &P, state: &S) -> Result<P, ReconcileError> {
    let plan_desc = describe_record::<P>()?;
    let state_desc = describe_record::<S>()?;
    let plan_json = to_object(plan, "plan")?;
    let state_json = to_object(state, "state")?;
    let mut target = to_object(&P::default(), "default")?;

    for state_field in state_desc.fields() {
        let Some(plan_field) = plan_desc.by_ident(state_field.ident) else { continue };
        let value = state_json.get(&state_field.serde_key).cloned().unwrap_or(Value::Null);
        if value.is_null() && !plan_field.is_optional() {
            continue;
        }
        target.insert(plan_field.serde_key.clone(), value);
    }

    for plan_field in plan_desc.fields() {
        let planned = plan_json.get(&plan_field.serde_key).unwrap_or(&Value::Null);
        let prior = state_desc
            .by_ident(plan_field.ident)
            .map(|f| state_json.get(&f.serde_key).unwrap_or(&Value::Null));
        let slot = target.entry(plan_field.serde_key.clone()).or_insert(Value::Null);
        apply(planned, prior, slot, &plan_field.ty)?;
    }

    path::from_value_with_path(Value::Object(target)).map_err(ReconcileError::Rebuild)
}

fn to_object<T: serde::Serialize>(
    record: &T,
    which: &'static str,
) -> Result<Map<String, Value>, ReconcileError> {
    let json = serde_json::to_value(record)
        .map_err(|source| ReconcileError::Serialize { which, source })?;
    match json {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn apply(
    plan: &Value,
    state: Option<&Value>,
    target: &mut Value,
    ty: &FieldType,
) -> Result<(), ReconcileError> {
    if plan.is_null() {
        return Ok(());
    }
    let Some(state) = state else {
        *target = plan.clone();
        return Ok(());
    };
    match ty.strip_optional() {
        FieldType::Bool => *target = plan.clone(),
        FieldType::String | FieldType::Int | FieldType::Uint | FieldType::Float => {
            if !is_zero(plan) && (is_zero(state) || plan != state) {
                *target = plan.clone();
            }
        }
        FieldType::Slice(_) | FieldType::Set(_) | FieldType::Map { .. } => {
            if ty.is_optional() || !is_empty_container(plan) {
                *target = plan.clone();
            }
        }
        FieldType::Tuple(_) | FieldType::Interface => *target = plan.clone(),
        FieldType::Record(record) => {
            if is_zero(state) || !target.is_object() {
                *target = plan.clone();
                return Ok(());
            }
            let descriptor = record.descriptor()?;
            let (Value::Object(plan_map), Some(target_map)) = (plan, target.as_object_mut()) else {
                return Ok(());
            };
            for field in descriptor.fields() {
                let planned = plan_map.get(&field.serde_key).unwrap_or(&Value::Null);
                let prior = Some(state.get(&field.serde_key).unwrap_or(&Value::Null));
                let slot = target_map.entry(field.serde_key.clone()).or_insert(Value::Null);
                apply(planned, prior, slot, &field.ty)?;
            }
        }
        FieldType::Optional(_) | FieldType::Unsupported(_) => {}
    }
    Ok(())
}

/// Only emptiness counts for containers: `{"k": ""}` is a set value.
fn is_empty_container(v: &Value) -> bool {
    match v {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        other => is_zero(other),
    }
}

/// Null, false, zero, empty string, empty collection, or an object of zeros.
fn is_zero(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_zero),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldSpec;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Limits {
        cpu: i64,
        memory: String,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct UpdateApp {
        id: String,
        name: String,
        replicas: i64,
        paused: bool,
        owner: Option<String>,
        labels: BTreeMap<String, String>,
        limits: Limits,
    }

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct AppState {
        id: String,
        name: String,
        replicas: i64,
        paused: bool,
        owner: Option<String>,
        labels: BTreeMap<String, String>,
        limits: Limits,
        created_at: String,
    }

    crate::describe_records!(Limits);

    impl Record for Limits {
        fn fields() -> Vec<FieldSpec> {
            vec![FieldSpec::new::<i64>("cpu"), FieldSpec::new::<String>("memory")]
        }
    }

    fn app_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new::<String>("id"),
            FieldSpec::new::<String>("name"),
            FieldSpec::new::<i64>("replicas"),
            FieldSpec::new::<bool>("paused"),
            FieldSpec::new::<Option<String>>("owner"),
            FieldSpec::new::<BTreeMap<String, String>>("labels"),
            FieldSpec::new::<Limits>("limits"),
        ]
    }

    impl Record for UpdateApp {
        fn fields() -> Vec<FieldSpec> {
            app_fields()
        }
    }

    impl Record for AppState {
        fn fields() -> Vec<FieldSpec> {
            let mut fields = app_fields();
            fields.push(FieldSpec::new::<String>("created_at"));
            fields
        }
    }

    fn state() -> AppState {
        AppState {
            id: "app-1".into(),
            name: "web".into(),
            replicas: 3,
            paused: true,
            owner: Some("ops".into()),
            labels: BTreeMap::from([("tier".to_string(), "front".to_string())]),
            limits: Limits { cpu: 2, memory: "1Gi".into() },
            created_at: "yesterday".into(),
        }
    }

    #[test]
    fn zero_plan_values_keep_state() {
        let plan = UpdateApp { name: "web2".into(), ..Default::default() };
        let merged = reconcile(&plan, &state()).unwrap();
        assert_eq!(merged, UpdateApp {
            id: "app-1".into(),
            name: "web2".into(),
            replicas: 3,
            // booleans always follow the plan
            paused: false,
            owner: Some("ops".into()),
            labels: BTreeMap::from([("tier".to_string(), "front".to_string())]),
            limits: Limits { cpu: 2, memory: "1Gi".into() },
        });
    }

    #[test]
    fn nested_records_merge_field_by_field() {
        let plan = UpdateApp {
            limits: Limits { cpu: 4, memory: String::new() },
            labels: BTreeMap::from([("tier".to_string(), "back".to_string())]),
            owner: Some("dev".into()),
            ..Default::default()
        };
        let merged = reconcile(&plan, &state()).unwrap();
        assert_eq!(merged.limits, Limits { cpu: 4, memory: "1Gi".into() });
        assert_eq!(merged.labels["tier"], "back");
        assert_eq!(merged.owner.as_deref(), Some("dev"));
    }

    #[test]
    fn zero_state_takes_plan_outright() {
        let plan = UpdateApp {
            limits: Limits { cpu: 1, memory: String::new() },
            ..Default::default()
        };
        let merged = reconcile(&plan, &AppState::default()).unwrap();
        assert_eq!(merged.limits, Limits { cpu: 1, memory: String::new() });
    }

    #[test]
    fn map_with_zero_values_is_still_a_plan_value() {
        let plan = UpdateApp {
            labels: BTreeMap::from([("tier".to_string(), String::new())]),
            ..Default::default()
        };
        let merged = reconcile(&plan, &state()).unwrap();
        assert_eq!(merged.labels, BTreeMap::from([("tier".to_string(), String::new())]));
    }
}
