//! The `batch` operation: fan one operation out over many documents.
//!
//! This is the bridge between the orchestrator and the job pool; a workflow
//! step of type `batch` runs its inner operation once per input file.
use crate::invoker::{
    param_str, param_usize, require_str, Invoker, Operation, OperationOutput, Params,
};
use crate::pool::{run_batch, JobDescriptor};
use crate::render::{render_summary, OutputFormat};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const BATCH_OPERATION: &str = "batch";

pub struct BatchOperation {
    inner: Arc<dyn Invoker>,
}

impl BatchOperation {
    /// `inner` resolves the per-document operation named by the `operation`
    /// parameter.
    pub fn new(inner: Arc<dyn Invoker>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Operation for BatchOperation {
    async fn run(&self, cancel: &CancellationToken, params: &Params) -> Result<OperationOutput> {
        let operation = require_str(params, "operation")?.to_string();
        if operation == BATCH_OPERATION {
            return Err(anyhow!("batch cannot fan out over itself"));
        }
        let max_concurrency = param_usize(params, "max_concurrency")?.unwrap_or(0);
        let format: OutputFormat = param_str(params, "format")
            .unwrap_or("text")
            .parse()
            .context("batch format")?;
        let shared = match params.get("params") {
            None | Some(Value::Null) => Params::new(),
            Some(Value::Object(map)) => map.clone().into_iter().collect(),
            Some(_) => return Err(anyhow!("batch `params` must be an object")),
        };

        let inputs = collect_inputs(params).await?;
        let jobs = jobs_for_inputs(&inputs, &shared);
        tracing::info!(
            operation = %operation,
            jobs = jobs.len(),
            max_concurrency,
            "fanning out batch"
        );

        let inner = self.inner.clone();
        let summary = run_batch(cancel, jobs, max_concurrency, move |token, job| {
            let inner = inner.clone();
            let operation = operation.clone();
            async move {
                let output = inner.invoke(&token, &operation, &job.params).await?;
                Ok(output_map(output))
            }
        })
        .await?;

        let text = render_summary(&summary, format)?;
        let structured = serde_json::to_value(&summary).context("serialize batch summary")?;
        Ok(OperationOutput::structured(text, structured))
    }
}

pub fn jobs_for_inputs(inputs: &[PathBuf], shared: &Params) -> Vec<JobDescriptor> {
    inputs
        .iter()
        .map(|path| {
            let path = path.display().to_string();
            let mut params = shared.clone();
            params.insert("input_file".to_string(), Value::String(path.clone()));
            JobDescriptor::with_params(path, params)
        })
        .collect()
}

/// Gather input paths from `inputs` (list) and `input_dir` (+ `include`).
pub async fn collect_inputs(params: &Params) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    match params.get("inputs") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let path = item
                    .as_str()
                    .ok_or_else(|| anyhow!("batch `inputs` entries must be strings"))?;
                inputs.push(PathBuf::from(path));
            }
        }
        Some(Value::String(path)) => inputs.push(PathBuf::from(path)),
        Some(_) => return Err(anyhow!("batch `inputs` must be a list of paths")),
    }

    if let Some(dir) = param_str(params, "input_dir") {
        let include = param_str(params, "include")
            .map(Regex::new)
            .transpose()
            .context("batch `include` pattern")?;
        inputs.extend(list_dir(Path::new(dir), include.as_ref()).await?);
    }
    Ok(inputs)
}

async fn list_dir(dir: &Path, include: Option<&Regex>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("read {}", dir.display()))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("read {}", dir.display()))?
    {
        let path = entry.path();
        // Follows symlinks, unlike `DirEntry::file_type`.
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        if include.is_some_and(|re| !re.is_match(name)) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Job output shape: `text` plus `structured` when the operation produced one.
pub fn output_map(output: OperationOutput) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("text".to_string(), Value::String(output.text));
    if let Some(structured) = output.structured {
        map.insert("structured".to_string(), structured);
    }
    map
}
