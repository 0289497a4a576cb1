//! Loading workflow definitions from JSON or YAML.
//!
//! Relative paths under path-like parameter keys are resolved against the
//! directory holding the definition file, so a definition and its artifacts
//! can move together.
use super::model::{split_source, CombineSpec, Step, Workflow};
use crate::error::{FlowError, FlowResult};
use crate::invoker::Params;
use crate::util::{absolutize, resolve_against};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Parameter keys whose string values are filesystem paths.
pub const PATH_KEYS: &[&str] = &[
    "input_file",
    "output_file",
    "template_file",
    "data_file",
    "input_dir",
    "inputs",
];

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    params: Params,
    /// Inline parameters declared next to `name`/`type`.
    #[serde(flatten)]
    inline: Params,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    steps: Vec<Value>,
    #[serde(default)]
    combine: Vec<CombineSpec>,
}

/// Load and normalize a workflow definition.
pub fn load_workflow(path: &Path) -> FlowResult<Workflow> {
    let source_path = absolutize(path).map_err(|err| FlowError::io(path, err))?;
    if source_path.is_dir() {
        return Err(FlowError::io(
            &source_path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "workflow definition is a directory",
            ),
        ));
    }
    let text = fs::read_to_string(&source_path).map_err(|err| FlowError::io(&source_path, err))?;
    let base_dir = source_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let document = parse_document(&source_path, &text)?;
    let (raw_steps, mut combine) = split_document(&source_path, document)?;

    let mut steps = Vec::with_capacity(raw_steps.len());
    let mut seen = HashSet::new();
    for (idx, raw) in raw_steps.into_iter().enumerate() {
        let step = build_step(&source_path, idx, raw, &base_dir)?;
        if !seen.insert(step.name.clone()) {
            return Err(FlowError::invalid(format!(
                "duplicate step name {:?}",
                step.name
            )));
        }
        steps.push(step);
    }

    for spec in &mut combine {
        if spec.output_file.trim().is_empty() {
            return Err(FlowError::invalid("combine entry requires output_file"));
        }
        for source in &spec.sources {
            let (step, _) = split_source(source, |name| seen.contains(name));
            if !seen.contains(step) {
                return Err(FlowError::invalid(format!(
                    "combine source {source:?} references unknown step {step:?}"
                )));
            }
        }
        spec.output_file = resolve_against(&base_dir, &spec.output_file)
            .display()
            .to_string();
    }

    tracing::debug!(
        path = %source_path.display(),
        steps = steps.len(),
        combine = combine.len(),
        "loaded workflow"
    );
    Ok(Workflow {
        source_path,
        base_dir,
        steps,
        combine,
    })
}

fn parse_document(path: &Path, text: &str) -> FlowResult<Value> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str::<Value>(text).map_err(|err| err.to_string())
    } else {
        serde_yaml::from_str::<Value>(text).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| FlowError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

fn split_document(path: &Path, document: Value) -> FlowResult<(Vec<Value>, Vec<CombineSpec>)> {
    let parse_err = |message: String| FlowError::Parse {
        path: path.to_path_buf(),
        message,
    };
    match document {
        Value::Array(steps) => Ok((steps, Vec::new())),
        Value::Object(_) => {
            let raw: RawDocument =
                serde_json::from_value(document).map_err(|err| parse_err(err.to_string()))?;
            Ok((raw.steps, raw.combine))
        }
        Value::Null => Err(parse_err("definition is empty".to_string())),
        other => Err(parse_err(format!(
            "expected a list of steps or an object with `steps`, got {}",
            value_kind(&other)
        ))),
    }
}

fn build_step(path: &Path, idx: usize, value: Value, base_dir: &Path) -> FlowResult<Step> {
    if !value.is_object() {
        return Err(FlowError::Parse {
            path: path.to_path_buf(),
            message: format!("step #{} must be an object, got {}", idx + 1, value_kind(&value)),
        });
    }
    let raw: RawStep = serde_json::from_value(value).map_err(|err| FlowError::Parse {
        path: path.to_path_buf(),
        message: format!("step #{}: {err}", idx + 1),
    })?;

    let name = raw
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| FlowError::invalid(format!("step #{} is missing `name`", idx + 1)))?;
    let kind = raw
        .kind
        .map(|kind| kind.trim().to_string())
        .filter(|kind| !kind.is_empty())
        .ok_or_else(|| FlowError::invalid(format!("step {name:?} is missing `type`")))?;

    let mut params = raw.params;
    for (key, value) in raw.inline {
        params.entry(key).or_insert(value);
    }
    normalize_params(&mut params, base_dir);

    Ok(Step {
        name,
        kind,
        enabled: raw.enabled.unwrap_or(true),
        params,
    })
}

/// Resolve relative path-like parameters against `base_dir`, recursing into
/// nested objects. Idempotent: absolute values are left alone.
pub fn normalize_params(params: &mut Params, base_dir: &Path) {
    for (key, value) in params.iter_mut() {
        normalize_value(key, value, base_dir);
    }
}

fn normalize_value(key: &str, value: &mut Value, base_dir: &Path) {
    let path_like = PATH_KEYS.contains(&key);
    match value {
        Value::String(raw) if path_like && !raw.is_empty() => {
            *raw = resolve_against(base_dir, raw).display().to_string();
        }
        Value::Array(items) if path_like => {
            for item in items.iter_mut() {
                if let Value::String(raw) = item {
                    if !raw.is_empty() {
                        *raw = resolve_against(base_dir, raw).display().to_string();
                    }
                }
            }
        }
        Value::Object(map) => {
            for (nested_key, nested) in map.iter_mut() {
                normalize_value(nested_key, nested, base_dir);
            }
        }
        _ => {}
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
