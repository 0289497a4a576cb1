use super::json_error;
use crate::error::FlowResult;
use crate::workflow::{ExecutionReport, StepRecord};

pub(super) fn to_markdown(report: &ExecutionReport) -> String {
    let mut out = String::new();
    out.push_str("# Execution report\n\n");
    out.push_str(&format!("Source: `{}`\n", report.source_path));

    for (idx, step) in report.steps.iter().enumerate() {
        out.push_str(&format!("\n## {}. {} (`{}`)\n\n", idx + 1, step.name, step.kind));
        append_step_body(&mut out, step);
    }

    if !report.files_written.is_empty() {
        out.push_str("\n## Files written\n\n");
        for file in &report.files_written {
            out.push_str(&format!("- `{file}`\n"));
        }
    }
    out
}

pub(super) fn to_json(report: &ExecutionReport) -> FlowResult<String> {
    serde_json::to_string_pretty(report).map_err(json_error)
}

fn append_step_body(out: &mut String, step: &StepRecord) {
    if !step.enabled {
        out.push_str("_disabled_\n");
        return;
    }
    if step.outputs.is_empty() {
        out.push_str("_no outputs_\n");
        return;
    }
    let mut keys: Vec<&String> = step.outputs.keys().collect();
    keys.sort();
    for (pos, key) in keys.into_iter().enumerate() {
        let output = &step.outputs[key];
        if pos > 0 {
            out.push('\n');
        }
        out.push_str(&format!("**{}** ({})\n\n", output.key, output.format));
        let fence = fence_for(&output.value);
        out.push_str(&format!("{fence}{}\n", fence_lang(&output.format)));
        out.push_str(&output.value);
        if !output.value.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{fence}\n"));
    }
}

/// A backtick fence longer than any backtick run inside `value`.
fn fence_for(value: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for ch in value.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}

fn fence_lang(format: &str) -> &str {
    match format {
        "json" => "json",
        "markdown" => "markdown",
        "html" => "html",
        "csv" => "csv",
        _ => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_grows_past_embedded_backticks() {
        assert_eq!(fence_for("plain"), "```");
        assert_eq!(fence_for("has ``` inside"), "````");
        assert_eq!(fence_for("`one`"), "```");
    }
}
