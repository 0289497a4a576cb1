//! Workflow and execution-report types.
use crate::invoker::Params;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An ordered list of steps loaded from one definition file.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    /// Absolute path of the definition file.
    pub source_path: PathBuf,
    /// Directory relative references were resolved against.
    pub base_dir: PathBuf,
    pub steps: Vec<Step>,
    pub combine: Vec<CombineSpec>,
}

impl Workflow {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn enabled_count(&self) -> usize {
        self.steps.iter().filter(|step| step.enabled).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub name: String,
    /// Operation name handed to the invoker.
    pub kind: String,
    pub enabled: bool,
    pub params: Params,
}

/// Concatenate outputs of several steps into one artifact after the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombineSpec {
    pub output_file: String,
    /// `"<step>.<key>"` references; a bare step name means its `result`.
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

pub const DEFAULT_COMBINE_SEPARATOR: &str = "\n\n";
pub const RESULT_KEY: &str = "result";
pub const STRUCTURED_KEY: &str = "structured";

impl CombineSpec {
    pub fn separator(&self) -> &str {
        self.separator
            .as_deref()
            .unwrap_or(DEFAULT_COMBINE_SEPARATOR)
    }
}

/// Split a combine source into `(step, key)`.
///
/// Step names may contain dots, so a source that names a known step outright
/// means that step's `result`; otherwise the longest known step prefix wins.
/// Without a matching step the split falls back to the last dot.
pub fn split_source<'a>(source: &'a str, is_step: impl Fn(&str) -> bool) -> (&'a str, &'a str) {
    if is_step(source) {
        return (source, RESULT_KEY);
    }
    let mut fallback = None;
    for (idx, _) in source.rmatch_indices('.') {
        let (step, key) = (&source[..idx], &source[idx + 1..]);
        if step.is_empty() || key.is_empty() {
            continue;
        }
        if is_step(step) {
            return (step, key);
        }
        fallback.get_or_insert((step, key));
    }
    fallback.unwrap_or((source, RESULT_KEY))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    pub key: String,
    pub value: String,
    pub format: String,
}

impl StepOutput {
    pub fn new(key: impl Into<String>, value: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            format: format.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub enabled: bool,
    #[serde(default)]
    pub outputs: IndexMap<String, StepOutput>,
}

impl StepRecord {
    pub fn for_step(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            kind: step.kind.clone(),
            enabled: step.enabled,
            outputs: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, output: StepOutput) {
        self.outputs.insert(output.key.clone(), output);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub source_path: String,
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub files_written: Vec<String>,
}

impl ExecutionReport {
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            steps: Vec::new(),
            files_written: Vec::new(),
        }
    }

    pub fn output(&self, step: &str, key: &str) -> Option<&StepOutput> {
        self.steps
            .iter()
            .find(|record| record.name == step)
            .and_then(|record| record.outputs.get(key))
    }
}
