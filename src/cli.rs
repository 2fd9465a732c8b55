//! Minimal CLI over JSON files: validate | merge | guard
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::guard::{ImmutableKind, check_immutable};
use crate::merge::merge_into;
use crate::schema::SchemaOptions;
use crate::value::{AttributeType, AttributeValue};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// check, merge and guard attribute-value trees stored as JSON
///
/// Types are read in their serde form (e.g. `{"object": {"name": "string"}}`);
/// values in plain JSON, with `{"$unknown": true}` for unknown values.
#[derive(Parser, Debug)]
#[command(name = "attr-schema")]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// type-check value files against an attribute type
    Validate(ValidateOut),
    /// deep-merge incoming trees into an existing one
    Merge(MergeOut),
    /// reject changes to immutable attributes between state and plan
    Guard(GuardOut),
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// attribute type file (`AttributeType` serde form, usually an object type)
    #[arg(long)]
    schema: PathBuf,
}

#[derive(clap::Parser, Debug)]
struct ValidateOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// output .json report (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct MergeOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// the tree merged into
    #[arg(long)]
    existing: PathBuf,

    /// incoming trees, applied in order. May be quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct GuardOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    /// `SchemaOptions` file; its `immutable` list names the guarded attributes
    #[arg(long)]
    options: Option<PathBuf>,

    /// guarded attribute, in addition to those in `--options`
    #[arg(long = "immutable")]
    immutable: Vec<String>,

    /// prior state (omit on create)
    #[arg(long)]
    state: Option<PathBuf>,

    /// planned state (omit on destroy)
    #[arg(long)]
    plan: Option<PathBuf>,

    /// configuration (defaults to the plan)
    #[arg(long)]
    config: Option<PathBuf>,

    /// output .json report (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SchemaSettings {
    fn load(&self) -> anyhow::Result<AttributeType> {
        read_json_file(&self.schema).context("failed to load attribute type")
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Validate(target) => target.run(),
            Command::Merge(target) => target.run(),
            Command::Guard(target) => target.run(),
        }
    }
}

impl ValidateOut {
    fn run(&self) -> anyhow::Result<()> {
        let ty = self.schema_settings.load()?;
        let mut failures = 0usize;
        let mut report = Vec::new();
        for source_path in resolve_file_path_patterns(&self.input)? {
            let json: Value = read_json_file(&source_path)?;
            let file = source_path.display().to_string();
            let entry = match AttributeValue::from_json(&json, &ty) {
                Ok(_) => json!({"file": file, "valid": true}),
                Err(error) => {
                    failures += 1;
                    tracing::error!(file = %file, "{error}");
                    json!({"file": file, "valid": false, "error": error.to_string()})
                }
            };
            report.push(entry);
        }
        write_output(self.out.as_deref(), &Value::Array(report))?;
        if failures > 0 {
            bail!("{failures} file(s) do not conform to {ty}");
        }
        Ok(())
    }
}

impl MergeOut {
    fn run(&self) -> anyhow::Result<()> {
        let ty = self.schema_settings.load()?;
        let mut merged = read_value(&self.existing, &ty)?;
        for source_path in resolve_file_path_patterns(&self.input)? {
            let incoming = read_value(&source_path, &ty)?;
            merge_into(&mut merged, &incoming);
        }
        write_output(self.out.as_deref(), &merged.to_json())
    }
}

impl GuardOut {
    fn run(&self) -> anyhow::Result<()> {
        let ty = self.schema_settings.load()?;
        let Some(object) = ty.as_object() else {
            bail!("guard expects an object type, found {ty}");
        };
        let mut names = match &self.options {
            Some(path) => {
                read_json_file::<SchemaOptions>(path)
                    .context("failed to load schema options")?
                    .immutable
            }
            None => Vec::new(),
        };
        names.extend(self.immutable.iter().cloned());

        let mut guarded = Vec::with_capacity(names.len());
        for name in &names {
            let attr_ty = object
                .get(name)
                .with_context(|| format!("`{name}` is not declared by the schema"))?;
            let kind = ImmutableKind::for_type(attr_ty)
                .with_context(|| format!("`{name}`: immutability is not supported for {attr_ty}"))?;
            guarded.push((name.as_str(), kind));
        }

        let state = self.state.as_deref().map(|p| read_value(p, &ty)).transpose()?;
        let plan = self.plan.as_deref().map(|p| read_value(p, &ty)).transpose()?;
        let config = match self.config.as_deref() {
            Some(p) => Some(read_value(p, &ty)?),
            None => plan.clone(),
        };
        let violations = check_immutable(guarded, state.as_ref(), plan.as_ref(), config.as_ref());

        let report: Vec<Value> = violations
            .iter()
            .map(|v| {
                json!({
                    "path": v.path.to_string(),
                    "summary": v.summary,
                    "detail": v.detail,
                    "current": v.current,
                    "attempted": v.attempted,
                })
            })
            .collect();
        write_output(self.out.as_deref(), &Value::Array(report))?;
        if !violations.is_empty() {
            bail!("{} immutable attribute(s) changed", violations.len());
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn read_json_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read source file: {}", path.display()))?;
    crate::path::from_str_with_path(&source)
        .with_context(|| format!("failed to parse JSON source file ({})", path.display()))
}

fn read_value(path: &Path, ty: &AttributeType) -> anyhow::Result<AttributeValue> {
    let json: Value = read_json_file(path)?;
    AttributeValue::from_json(&json, ty)
        .with_context(|| format!("{} does not conform to {ty}", path.display()))
}

fn write_output(out: Option<&Path>, value: &Value) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, &rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let before = out.len();
            for entry in glob::glob(pattern)? {
                out.push(entry?);
            }
            if out.len() == before {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
