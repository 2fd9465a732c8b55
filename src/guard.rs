//! Pre-apply plan checks: immutable attributes and force-replace detection.
//!
//! A rejection is a value, not a failure of the check itself. Callers collect
//! violations and surface them before any mutating action.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::AttributePath;
use crate::schema::{AttributeSchema, NestedAttributes, NestingMode, ResourceSchema};
use crate::value::{AttributeType, AttributeValue};

pub const IMMUTABLE_SUMMARY: &str = "Immutable Attribute Cannot Be Changed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImmutableKind {
    String,
    Int64,
    Float64,
    Bool,
    List,
    Set,
    Map,
}

impl ImmutableKind {
    pub fn for_type(ty: &AttributeType) -> Option<Self> {
        Some(match ty {
            AttributeType::String => ImmutableKind::String,
            AttributeType::Int64 => ImmutableKind::Int64,
            AttributeType::Float64 => ImmutableKind::Float64,
            AttributeType::Bool => ImmutableKind::Bool,
            AttributeType::List(_) => ImmutableKind::List,
            AttributeType::Set(_) => ImmutableKind::Set,
            AttributeType::Map(_) => ImmutableKind::Map,
            _ => return None,
        })
    }

    /// Scalar kinds name both values in the rejection; containers only the path.
    pub fn renders_values(&self) -> bool {
        matches!(
            self,
            ImmutableKind::String
                | ImmutableKind::Int64
                | ImmutableKind::Float64
                | ImmutableKind::Bool
        )
    }
}

/// Where a guarded attribute stands, derived from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Create,
    Destroy,
    UpdateNoOp,
    UpdateUnknown,
    UpdateChanged,
}

/// One attribute's view of a planned change.
#[derive(Debug, Clone)]
pub struct PlanModifyRequest<'a> {
    pub path: AttributePath,
    /// Prior state exists for the resource.
    pub state_exists: bool,
    /// A plan exists; false while destroying.
    pub plan_exists: bool,
    pub state_value: &'a AttributeValue,
    pub plan_value: &'a AttributeValue,
    pub config_value: &'a AttributeValue,
}

impl PlanModifyRequest<'_> {
    pub fn phase(&self) -> Phase {
        if !self.state_exists {
            return Phase::Create;
        }
        if self.plan_value.is_unknown() || self.config_value.is_unknown() {
            return Phase::UpdateUnknown;
        }
        if !self.plan_exists {
            return Phase::Destroy;
        }
        if self.plan_value == self.state_value {
            return Phase::UpdateNoOp;
        }
        Phase::UpdateChanged
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{summary}: {detail}")]
pub struct ImmutableAttributeViolation {
    pub path: AttributePath,
    pub summary: String,
    pub detail: String,
    pub current: Option<String>,
    pub attempted: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmutableModifier {
    pub kind: ImmutableKind,
}

impl ImmutableModifier {
    pub fn new(kind: ImmutableKind) -> Self {
        Self { kind }
    }

    pub fn description(&self) -> &'static str {
        "Prevents changes to this attribute after initial creation. Any attempt to modify will result in an error."
    }

    pub fn check(&self, req: &PlanModifyRequest<'_>) -> Result<(), ImmutableAttributeViolation> {
        if req.phase() != Phase::UpdateChanged {
            return Ok(());
        }
        let (current, attempted) = if self.kind.renders_values() {
            (Some(render(req.state_value)), Some(render(req.plan_value)))
        } else {
            (None, None)
        };
        let mut detail = format!(
            "The attribute '{}' is immutable and cannot be changed after resource creation.\n\n",
            req.path
        );
        if let (Some(current), Some(attempted)) = (&current, &attempted) {
            detail.push_str(&format!(
                "Current value: {current}\nAttempted new value: {attempted}\n\n"
            ));
        }
        detail.push_str("To use a different value, you must create a new resource.");
        Err(ImmutableAttributeViolation {
            path: req.path.clone(),
            summary: IMMUTABLE_SUMMARY.to_string(),
            detail,
            current,
            attempted,
        })
    }
}

fn render(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Scalar(s) => s.to_string(),
        other => other.kind_name().to_string(),
    }
}

/// Whether a change to the attribute forces replacement.
pub fn requires_replace(req: &PlanModifyRequest<'_>) -> bool {
    req.phase() == Phase::UpdateChanged
}

// ------------------------------ Whole plans ------------------------------- //

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanCheck {
    pub violations: Vec<ImmutableAttributeViolation>,
    /// Top-level attributes whose change forces replacement.
    pub requires_replace: Vec<String>,
}

impl PlanCheck {
    pub fn is_allowed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Run the immutable check for each named top-level attribute.
///
/// `None` and a root Null both mean "no such tree" (no state on create, no
/// plan on destroy).
pub fn check_immutable<'a>(
    attributes: impl IntoIterator<Item = (&'a str, ImmutableKind)>,
    state: Option<&AttributeValue>,
    plan: Option<&AttributeValue>,
    config: Option<&AttributeValue>,
) -> Vec<ImmutableAttributeViolation> {
    attributes
        .into_iter()
        .filter_map(|(name, kind)| {
            let req = request(name, state, plan, config);
            ImmutableModifier::new(kind).check(&req).err()
        })
        .collect()
}

/// Immutable and requires-replace modifiers of a resource schema, nested
/// attributes included.
///
/// Single nested objects are walked attribute by attribute, list elements by
/// plan index and map entries by plan key. Set elements have no stable
/// identity and are not walked.
pub fn guard_plan(
    schema: &ResourceSchema,
    state: Option<&AttributeValue>,
    plan: Option<&AttributeValue>,
    config: Option<&AttributeValue>,
) -> PlanCheck {
    let present = |tree: Option<&AttributeValue>| tree.is_some_and(|t| !t.is_null());
    let walk = Walk { state_exists: present(state), plan_exists: present(plan) };
    let mut check = PlanCheck::default();
    let level = Level {
        state: state.and_then(AttributeValue::attributes),
        plan: plan.and_then(AttributeValue::attributes),
        config: config.and_then(AttributeValue::attributes),
    };
    walk.attributes(schema.attributes(), level, &AttributePath::root(), &mut check);
    check
}

#[derive(Clone, Copy)]
struct Walk {
    state_exists: bool,
    plan_exists: bool,
}

/// Attribute maps of the three trees at one nesting level.
#[derive(Clone, Copy)]
struct Level<'a> {
    state: Option<&'a BTreeMap<String, AttributeValue>>,
    plan: Option<&'a BTreeMap<String, AttributeValue>>,
    config: Option<&'a BTreeMap<String, AttributeValue>>,
}

impl<'a> Level<'a> {
    fn of(state: &'a AttributeValue, plan: &'a AttributeValue, config: &'a AttributeValue) -> Self {
        Level { state: state.attributes(), plan: plan.attributes(), config: config.attributes() }
    }
}

fn list_element(tree: &AttributeValue, index: usize) -> Option<&BTreeMap<String, AttributeValue>> {
    match tree {
        AttributeValue::List { items, .. } => items.get(index).and_then(AttributeValue::attributes),
        _ => None,
    }
}

fn map_entry<'a>(
    tree: &'a AttributeValue,
    key: &str,
) -> Option<&'a BTreeMap<String, AttributeValue>> {
    match tree {
        AttributeValue::Map { entries, .. } => {
            entries.get(key).and_then(AttributeValue::attributes)
        }
        _ => None,
    }
}

fn lookup<'a>(
    attrs: Option<&'a BTreeMap<String, AttributeValue>>,
    name: &str,
) -> &'a AttributeValue {
    attrs.and_then(|a| a.get(name)).unwrap_or(&AttributeValue::Null)
}

impl Walk {
    fn attributes<'s>(
        self,
        schemas: impl IntoIterator<Item = (&'s String, &'s AttributeSchema)>,
        level: Level<'_>,
        at: &AttributePath,
        check: &mut PlanCheck,
    ) {
        for (name, schema) in schemas {
            let req = PlanModifyRequest {
                path: at.join_attribute(name.as_str()),
                state_exists: self.state_exists,
                plan_exists: self.plan_exists,
                state_value: lookup(level.state, name),
                plan_value: lookup(level.plan, name),
                config_value: lookup(level.config, name),
            };
            if let Some(kind) = schema.immutable_kind() {
                if let Err(violation) = ImmutableModifier::new(kind).check(&req) {
                    check.violations.push(violation);
                }
            }
            if schema.requires_replace() && requires_replace(&req) {
                check.requires_replace.push(req.path.to_string());
            }
            if let Some(nested) = &schema.nested {
                self.nested(nested, &req, check);
            }
        }
    }

    fn nested(self, nested: &NestedAttributes, req: &PlanModifyRequest<'_>, check: &mut PlanCheck) {
        let (state, plan, config) = (req.state_value, req.plan_value, req.config_value);
        match nested.mode {
            NestingMode::Single => {
                let level = Level::of(state, plan, config);
                self.attributes(&nested.attributes, level, &req.path, check);
            }
            NestingMode::List => {
                let AttributeValue::List { items, .. } = plan else { return };
                for (i, item) in items.iter().enumerate() {
                    let level = Level {
                        state: list_element(state, i),
                        plan: item.attributes(),
                        config: list_element(config, i),
                    };
                    self.attributes(&nested.attributes, level, &req.path.join_index(i), check);
                }
            }
            NestingMode::Map => {
                let AttributeValue::Map { entries, .. } = plan else { return };
                for (key, item) in entries {
                    let level = Level {
                        state: map_entry(state, key),
                        plan: item.attributes(),
                        config: map_entry(config, key),
                    };
                    let at = req.path.join_key(key.as_str());
                    self.attributes(&nested.attributes, level, &at, check);
                }
            }
            NestingMode::Set => {}
        }
    }
}

fn request<'a>(
    name: &str,
    state: Option<&'a AttributeValue>,
    plan: Option<&'a AttributeValue>,
    config: Option<&'a AttributeValue>,
) -> PlanModifyRequest<'a> {
    let present = |tree: Option<&AttributeValue>| tree.is_some_and(|t| !t.is_null());
    let attr = |tree: Option<&'a AttributeValue>| -> &'a AttributeValue {
        tree.and_then(|t| t.attribute(name)).unwrap_or(&AttributeValue::Null)
    };
    PlanModifyRequest {
        path: AttributePath::attribute(name),
        state_exists: present(state),
        plan_exists: present(plan),
        state_value: attr(state),
        plan_value: attr(plan),
        config_value: attr(config),
    }
}
