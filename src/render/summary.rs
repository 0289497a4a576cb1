use super::{format_ms, json_error};
use crate::error::{FlowError, FlowResult};
use crate::pool::{BatchSummary, JobResult};

pub(super) fn to_text(summary: &BatchSummary) -> String {
    let mut out = String::new();
    out.push_str("Batch summary\n");
    out.push_str("=============\n");
    out.push_str(&format!("Total:            {}\n", summary.total));
    out.push_str(&format!("Successful:       {}\n", summary.successful));
    out.push_str(&format!("Failed:           {}\n", summary.failed));
    out.push_str(&format!(
        "Total duration:   {}\n",
        format_ms(summary.total_duration_ms)
    ));
    out.push_str(&format!(
        "Average duration: {}\n",
        format_ms(summary.average_duration_ms)
    ));

    out.push_str("\nErrors:\n");
    if summary.errors.is_empty() {
        out.push_str("  (none)\n");
    }
    for error in sorted_errors(summary) {
        out.push_str(&format!("  - {error}\n"));
    }

    out.push_str("\nResults:\n");
    for result in summary.sorted_results() {
        let status = if result.success { "ok" } else { "FAIL" };
        out.push_str(&format!(
            "  [{status:<4}] {} ({})",
            result.id,
            format_ms(result.duration_ms)
        ));
        if let Some(error) = &result.error {
            out.push_str(&format!(": {error}"));
        }
        out.push('\n');
    }
    out
}

pub(super) fn to_json(summary: &BatchSummary) -> FlowResult<String> {
    let mut sorted = summary.clone();
    sorted.results.sort_by(|a, b| a.id.cmp(&b.id));
    sorted.errors = sorted_errors(summary);
    serde_json::to_string_pretty(&sorted).map_err(json_error)
}

pub(super) fn to_csv(summary: &BatchSummary) -> FlowResult<String> {
    let mut out = csv_section(|wtr| {
        wtr.write_record(["# summary"])?;
        wtr.write_record(["field", "value"])?;
        wtr.write_record(["total", &summary.total.to_string()])?;
        wtr.write_record(["successful", &summary.successful.to_string()])?;
        wtr.write_record(["failed", &summary.failed.to_string()])?;
        wtr.write_record([
            "total_duration_ms",
            &format!("{:.3}", summary.total_duration_ms),
        ])?;
        wtr.write_record([
            "average_duration_ms",
            &format!("{:.3}", summary.average_duration_ms),
        ])?;
        wtr.write_record(["errors", &sorted_errors(summary).join("; ")])
    })?;
    out.push('\n');
    out.push_str(&csv_section(|wtr| {
        wtr.write_record(["# details"])?;
        wtr.write_record(["id", "success", "error", "duration_ms"])?;
        for result in summary.sorted_results() {
            wtr.write_record([
                result.id.as_str(),
                if result.success { "true" } else { "false" },
                result.error.as_deref().unwrap_or(""),
                &format!("{:.3}", result.duration_ms),
            ])?;
        }
        Ok(())
    })?);
    Ok(out)
}

/// Write one CSV section into a string; sections differ in width.
fn csv_section<F>(fill: F) -> FlowResult<String>
where
    F: FnOnce(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>,
{
    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    fill(&mut wtr).map_err(csv_error)?;
    let bytes = wtr
        .into_inner()
        .map_err(|err| FlowError::invalid(format!("flush CSV: {}", err.error())))?;
    String::from_utf8(bytes).map_err(|err| FlowError::invalid(format!("CSV is not UTF-8: {err}")))
}

fn csv_error(err: csv::Error) -> FlowError {
    FlowError::invalid(format!("write CSV: {err}"))
}

pub(super) fn to_html(summary: &BatchSummary) -> String {
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>Batch summary</title>\n<style>\n");
    out.push_str(
        "body { font-family: sans-serif; margin: 2em; }\n\
         table { border-collapse: collapse; margin-bottom: 1.5em; }\n\
         th, td { border: 1px solid #ccc; padding: 0.3em 0.8em; text-align: left; }\n\
         th { background: #f0f0f0; }\n\
         tr.fail td { background: #fde8e8; }\n\
         tr.ok td.status { color: #17702a; }\n",
    );
    out.push_str("</style>\n</head>\n<body>\n<h1>Batch summary</h1>\n");

    out.push_str("<table class=\"summary\">\n");
    for (label, value) in summary_fields(summary) {
        out.push_str(&format!(
            "<tr><th>{}</th><td>{}</td></tr>\n",
            html_escape(label),
            html_escape(&value)
        ));
    }
    out.push_str("</table>\n");

    if !summary.errors.is_empty() {
        out.push_str("<h2>Errors</h2>\n<ul>\n");
        for error in sorted_errors(summary) {
            out.push_str(&format!("<li>{}</li>\n", html_escape(&error)));
        }
        out.push_str("</ul>\n");
    }

    out.push_str("<h2>Results</h2>\n<table class=\"results\">\n");
    out.push_str("<tr><th>ID</th><th>Status</th><th>Error</th><th>Duration</th></tr>\n");
    for result in summary.sorted_results() {
        let class = if result.success { "ok" } else { "fail" };
        out.push_str(&format!(
            "<tr class=\"{class}\"><td>{}</td><td class=\"status\">{}</td><td>{}</td><td>{}</td></tr>\n",
            html_escape(&result.id),
            status_label(result),
            html_escape(result.error.as_deref().unwrap_or("")),
            html_escape(&format_ms(result.duration_ms))
        ));
    }
    out.push_str("</table>\n</body>\n</html>\n");
    out
}

pub(super) fn to_markdown(summary: &BatchSummary) -> String {
    let mut out = String::new();
    out.push_str("# Batch summary\n\n");
    out.push_str("| Field | Value |\n|---|---|\n");
    for (label, value) in summary_fields(summary) {
        out.push_str(&format!("| {label} | {} |\n", md_cell(&value)));
    }

    if !summary.errors.is_empty() {
        out.push_str("\n## Errors\n\n");
        for error in sorted_errors(summary) {
            out.push_str(&format!("- {}\n", error.replace('\n', " ")));
        }
    }

    out.push_str("\n## Results\n\n");
    out.push_str("| ID | Status | Error | Duration |\n|---|---|---|---|\n");
    for result in summary.sorted_results() {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            md_cell(&result.id),
            status_label(result),
            md_cell(result.error.as_deref().unwrap_or("")),
            format_ms(result.duration_ms)
        ));
    }
    out
}

/// The six summary fields every format exposes, in display order.
fn summary_fields(summary: &BatchSummary) -> Vec<(&'static str, String)> {
    vec![
        ("Total", summary.total.to_string()),
        ("Successful", summary.successful.to_string()),
        ("Failed", summary.failed.to_string()),
        ("Total duration", format_ms(summary.total_duration_ms)),
        ("Average duration", format_ms(summary.average_duration_ms)),
        ("Errors", summary.errors.len().to_string()),
    ]
}

fn sorted_errors(summary: &BatchSummary) -> Vec<String> {
    let mut errors = summary.errors.clone();
    errors.sort();
    errors
}

fn status_label(result: &JobResult) -> &'static str {
    if result.success {
        "success"
    } else {
        "failed"
    }
}

fn md_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
