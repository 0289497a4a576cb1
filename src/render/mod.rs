//! Text renderings of batch summaries and execution reports.
//!
//! Everything here is deterministic: results are ordered by job id and step
//! outputs by key, so the same input always renders to the same bytes.
mod report;
mod summary;

use crate::error::{FlowError, FlowResult};
use crate::pool::BatchSummary;
use crate::workflow::ExecutionReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
    Html,
    Markdown,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "markdown",
        }
    }

    /// Formats an execution report can be rendered in.
    pub fn supports_report(self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Markdown)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = FlowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "html" => Ok(OutputFormat::Html),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(FlowError::invalid(format!("unsupported format {other:?}"))),
        }
    }
}

pub fn render_summary(summary: &BatchSummary, format: OutputFormat) -> FlowResult<String> {
    match format {
        OutputFormat::Text => Ok(summary::to_text(summary)),
        OutputFormat::Json => summary::to_json(summary),
        OutputFormat::Csv => summary::to_csv(summary),
        OutputFormat::Html => Ok(summary::to_html(summary)),
        OutputFormat::Markdown => Ok(summary::to_markdown(summary)),
    }
}

pub fn render_report(report: &ExecutionReport, format: OutputFormat) -> FlowResult<String> {
    match format {
        OutputFormat::Markdown => Ok(report::to_markdown(report)),
        OutputFormat::Json => report::to_json(report),
        other => Err(FlowError::invalid(format!(
            "execution reports render as markdown or json, not {other}"
        ))),
    }
}

fn json_error(err: serde_json::Error) -> FlowError {
    FlowError::invalid(format!("serialize JSON: {err}"))
}

pub(crate) fn format_ms(ms: f64) -> String {
    format!("{ms:.2} ms")
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
