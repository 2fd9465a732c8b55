//! Choice validators and the diagnostics they emit.
use serde::Serialize;

use crate::path::AttributePath;
use crate::value::AttributeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// A validation finding attached to an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    #[serde(serialize_with = "serialize_path")]
    pub path: AttributePath,
    pub summary: String,
    pub detail: String,
}

fn serialize_path<S: serde::Serializer>(path: &AttributePath, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(path)
}

impl Diagnostic {
    pub fn error(
        path: AttributePath,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Diagnostic {
            severity: Severity::Error,
            path,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceValidator {
    /// A string must be one of the choices.
    String(Vec<String>),
    /// Every list element must be one of the choices.
    List(Vec<String>),
    /// Every set element must be one of the choices.
    Set(Vec<String>),
}

impl ChoiceValidator {
    pub fn choices(&self) -> &[String] {
        match self {
            ChoiceValidator::String(c) | ChoiceValidator::List(c) | ChoiceValidator::Set(c) => c,
        }
    }

    pub fn description(&self) -> String {
        match self {
            ChoiceValidator::String(c) => format!("Value must be one of: {}", c.join(", ")),
            ChoiceValidator::List(c) | ChoiceValidator::Set(c) => {
                format!("All values must be one of: {}", c.join(", "))
            }
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            ChoiceValidator::String(_) => "Invalid Value",
            ChoiceValidator::List(_) => "Invalid Value in List",
            ChoiceValidator::Set(_) => "Invalid Value in Set",
        }
    }

    /// Null and Unknown config values pass. One diagnostic at most.
    pub fn validate(&self, path: &AttributePath, value: &AttributeValue) -> Option<Diagnostic> {
        let allowed = |v: &AttributeValue| match v.as_str() {
            Some(s) => self.choices().iter().any(|c| c == s),
            // unknown elements cannot be judged yet
            None => !v.is_known(),
        };
        let ok = match (self, value) {
            (_, AttributeValue::Null | AttributeValue::Unknown) => true,
            (ChoiceValidator::String(_), v) => allowed(v),
            (ChoiceValidator::List(_), AttributeValue::List { items, .. }) => {
                items.iter().all(allowed)
            }
            (ChoiceValidator::Set(_), AttributeValue::Set { items, .. }) => {
                items.iter().all(allowed)
            }
            _ => true,
        };
        if ok {
            return None;
        }
        Some(Diagnostic::error(path.clone(), self.summary(), self.description()))
    }
}
