//! Sequential step execution.
//!
//! Steps run strictly one after another; a failing step ends the run and the
//! report accumulated so far travels back with the error.
use super::load::normalize_params;
use super::model::{
    split_source, ExecutionReport, Step, StepOutput, StepRecord, Workflow, RESULT_KEY,
    STRUCTURED_KEY,
};
use crate::error::{FlowError, FlowResult, RunFailure};
use crate::invoker::{param_str, Invoker, OperationOutput};
use crate::output::{OutputWriter, PayloadKind, WritePolicy};
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Step parameter naming the file a step's result is persisted to.
pub const OUTPUT_FILE_KEY: &str = "output_file";
/// Step parameter mapping extra output keys to JSON pointers into the
/// structured payload.
pub const EXTRACT_KEY: &str = "extract";

/// Run every enabled step in order, then the combine pass.
pub async fn run_workflow(
    cancel: &CancellationToken,
    workflow: &Workflow,
    invoker: &dyn Invoker,
    policy: &dyn WritePolicy,
) -> Result<ExecutionReport, RunFailure> {
    let mut report = ExecutionReport::new(workflow.source_path.display().to_string());
    let mut writer = OutputWriter::new(&workflow.base_dir, policy);
    let total = workflow.steps.len();
    tracing::info!(
        workflow = %workflow.source_path.display(),
        steps = total,
        enabled = workflow.enabled_count(),
        policy = policy.name(),
        "workflow started"
    );

    for (idx, step) in workflow.steps.iter().enumerate() {
        let mut record = StepRecord::for_step(step);
        if !step.enabled {
            tracing::info!(step = %step.name, "step disabled, skipping");
            report.steps.push(record);
            continue;
        }
        if cancel.is_cancelled() {
            let error = FlowError::Cancelled {
                completed: idx,
                total,
            };
            return Err(fail(report, writer, error));
        }

        let start = Instant::now();
        tracing::info!(step = %step.name, operation = %step.kind, "step started");
        match execute_step(cancel, workflow, step, invoker, &mut writer, &mut record).await {
            Ok(()) => {
                tracing::info!(
                    step = %step.name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    outputs = record.outputs.len(),
                    "step complete"
                );
                report.steps.push(record);
            }
            Err(error) => {
                let error = if error.is_cancelled() {
                    FlowError::Cancelled {
                        completed: idx,
                        total,
                    }
                } else {
                    error
                };
                tracing::error!(step = %step.name, error = %error, "step failed, aborting workflow");
                return Err(fail(report, writer, error));
            }
        }
    }

    if let Err(error) = combine_outputs(workflow, &report, &mut writer).await {
        return Err(fail(report, writer, error));
    }

    report.files_written = writer.into_written();
    tracing::info!(
        files_written = report.files_written.len(),
        "workflow complete"
    );
    Ok(report)
}

fn fail(mut report: ExecutionReport, writer: OutputWriter<'_>, error: FlowError) -> RunFailure {
    report.files_written = writer.into_written();
    RunFailure::new(report, error)
}

async fn execute_step(
    cancel: &CancellationToken,
    workflow: &Workflow,
    step: &Step,
    invoker: &dyn Invoker,
    writer: &mut OutputWriter<'_>,
    record: &mut StepRecord,
) -> FlowResult<()> {
    let mut params = step.params.clone();
    normalize_params(&mut params, &workflow.base_dir);

    let output = invoker
        .invoke(cancel, &step.kind, &params)
        .await
        .map_err(|err| classify_failure(cancel, step, err))?;

    record_outputs(step, &output, record)?;

    if let Some(dest) = param_str(&params, OUTPUT_FILE_KEY) {
        let dest = Path::new(dest);
        match &output.structured {
            Some(structured) => {
                let text = pretty_json(structured);
                writer.write(dest, &text, PayloadKind::Structured).await?;
            }
            None => {
                writer.write(dest, &output.text, PayloadKind::Text).await?;
            }
        }
    }
    Ok(())
}

fn classify_failure(cancel: &CancellationToken, step: &Step, err: anyhow::Error) -> FlowError {
    let nested_cancel = err
        .downcast_ref::<FlowError>()
        .is_some_and(FlowError::is_cancelled);
    if nested_cancel || cancel.is_cancelled() {
        // Step counts are filled in by the caller.
        return FlowError::Cancelled {
            completed: 0,
            total: 0,
        };
    }
    FlowError::Operation {
        step: step.name.clone(),
        operation: step.kind.clone(),
        message: format!("{err:#}"),
    }
}

fn record_outputs(step: &Step, output: &OperationOutput, record: &mut StepRecord) -> FlowResult<()> {
    record.insert(StepOutput::new(RESULT_KEY, output.text.clone(), "text"));
    if let Some(structured) = &output.structured {
        record.insert(StepOutput::new(
            STRUCTURED_KEY,
            pretty_json(structured),
            "json",
        ));
    }

    let Some(extract) = step.params.get(EXTRACT_KEY) else {
        return Ok(());
    };
    let operation_err = |message: String| FlowError::Operation {
        step: step.name.clone(),
        operation: step.kind.clone(),
        message,
    };
    let Value::Object(pointers) = extract else {
        return Err(operation_err(format!(
            "`{EXTRACT_KEY}` must map output keys to JSON pointers"
        )));
    };
    let structured = output.structured.as_ref().ok_or_else(|| {
        operation_err(format!(
            "`{EXTRACT_KEY}` requires a structured result, operation returned text only"
        ))
    })?;
    for (key, pointer) in pointers {
        let pointer = pointer
            .as_str()
            .ok_or_else(|| operation_err(format!("extract pointer for {key:?} must be a string")))?;
        let value = structured
            .pointer(pointer)
            .ok_or_else(|| operation_err(format!("extract {key:?}: nothing at {pointer:?}")))?;
        let extracted = match value {
            Value::String(text) => StepOutput::new(key.as_str(), text.clone(), "text"),
            other => StepOutput::new(key.as_str(), pretty_json(other), "json"),
        };
        record.insert(extracted);
    }
    Ok(())
}

/// Concatenate declared outputs into composite artifacts.
async fn combine_outputs(
    workflow: &Workflow,
    report: &ExecutionReport,
    writer: &mut OutputWriter<'_>,
) -> FlowResult<()> {
    for spec in &workflow.combine {
        let mut parts = Vec::with_capacity(spec.sources.len());
        for source in &spec.sources {
            let (step, key) = split_source(source, |name| workflow.step(name).is_some());
            if workflow.step(step).is_none() {
                return Err(FlowError::invalid(format!(
                    "combine source {source:?} references unknown step {step:?}"
                )));
            }
            match report.output(step, key) {
                Some(output) => parts.push(output.value.as_str()),
                None => {
                    tracing::warn!(source = %source, "combine source produced no output, skipping");
                }
            }
        }
        if parts.is_empty() {
            tracing::warn!(path = %spec.output_file, "nothing to combine");
            continue;
        }
        let combined = parts.join(spec.separator());
        writer
            .write(Path::new(&spec.output_file), &combined, PayloadKind::Text)
            .await?;
    }
    Ok(())
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
#[path = "execute_tests.rs"]
mod tests;
