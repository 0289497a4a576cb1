use super::*;
use crate::pool::JobResult;
use crate::workflow::{StepOutput, StepRecord};
use indexmap::IndexMap;
use serde_json::Map;

fn job(id: &str, error: Option<&str>, duration_ms: f64) -> JobResult {
    JobResult {
        id: id.to_string(),
        success: error.is_none(),
        error: error.map(str::to_string),
        output: Map::new(),
        duration_ms,
    }
}

fn sample_summary() -> BatchSummary {
    // Arrival order, not id order.
    BatchSummary::from_results(vec![
        job("p3", None, 1.5),
        job("p2", Some("bad, \"quoted\" <tag>"), 4.25),
        job("p1", None, 0.75),
    ])
}

fn sample_report() -> ExecutionReport {
    let mut outputs = IndexMap::new();
    outputs.insert(
        "zeta".to_string(),
        StepOutput::new("zeta", "last", "text"),
    );
    outputs.insert(
        "alpha".to_string(),
        StepOutput::new("alpha", "{\n  \"n\": 1\n}", "json"),
    );
    ExecutionReport {
        source_path: "/defs/wf.yaml".to_string(),
        steps: vec![
            StepRecord {
                name: "parse".to_string(),
                kind: "stat".to_string(),
                enabled: true,
                outputs,
            },
            StepRecord {
                name: "skipped".to_string(),
                kind: "head".to_string(),
                enabled: false,
                outputs: IndexMap::new(),
            },
        ],
        files_written: vec!["out/stats.json".to_string()],
    }
}

#[test]
fn report_markdown_is_stable_and_sorted() {
    let report = sample_report();
    let first = render_report(&report, OutputFormat::Markdown).unwrap();
    let second = render_report(&report.clone(), OutputFormat::Markdown).unwrap();
    assert_eq!(first, second);

    let alpha = first.find("**alpha**").expect("alpha rendered");
    let zeta = first.find("**zeta**").expect("zeta rendered");
    assert!(alpha < zeta, "outputs must render in sorted key order");
    assert!(first.contains("## 1. parse (`stat`)"));
    assert!(first.contains("## 2. skipped (`head`)\n\n_disabled_"));
    assert!(first.contains("```json\n{\n  \"n\": 1\n}\n```"));
    assert!(first.contains("## Files written\n\n- `out/stats.json`"));
}

#[test]
fn report_markdown_omits_empty_file_list() {
    let mut report = sample_report();
    report.files_written.clear();
    let text = render_report(&report, OutputFormat::Markdown).unwrap();
    assert!(!text.contains("Files written"));
}

#[test]
fn report_json_round_trips() {
    let report = sample_report();
    let text = render_report(&report, OutputFormat::Json).unwrap();
    let decoded: ExecutionReport = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded, report);
    assert!(text.contains("\"type\": \"stat\""));
}

#[test]
fn report_rejects_tabular_formats() {
    let report = sample_report();
    for format in [OutputFormat::Text, OutputFormat::Csv, OutputFormat::Html] {
        assert!(!format.supports_report());
        let err = render_report(&report, format).unwrap_err();
        assert!(matches!(err, FlowError::InvalidInput(_)));
    }
}

#[test]
fn summary_json_round_trips() {
    let summary = sample_summary();
    let text = render_summary(&summary, OutputFormat::Json).unwrap();
    let decoded: BatchSummary = serde_json::from_str(&text).unwrap();

    assert_eq!(decoded.total, summary.total);
    assert_eq!(decoded.successful, summary.successful);
    assert_eq!(decoded.failed, summary.failed);
    assert_eq!(decoded.total_duration_ms, summary.total_duration_ms);
    assert_eq!(decoded.average_duration_ms, summary.average_duration_ms);
    assert_eq!(decoded.errors, summary.errors);

    let mut expected: Vec<JobResult> = summary.results.clone();
    expected.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(decoded.results, expected);
}

#[test]
fn every_summary_format_is_deterministic_and_ordered() {
    let summary = sample_summary();
    for format in [
        OutputFormat::Text,
        OutputFormat::Json,
        OutputFormat::Csv,
        OutputFormat::Html,
        OutputFormat::Markdown,
    ] {
        let first = render_summary(&summary, format).unwrap();
        assert_eq!(first, render_summary(&summary, format).unwrap());
        let p1 = first.find("p1").unwrap();
        let p3 = first.find("p3").unwrap();
        assert!(p1 < p3, "{format} must list results by id");
    }
}

#[test]
fn summary_csv_has_summary_then_details() {
    let csv = render_summary(&sample_summary(), OutputFormat::Csv).unwrap();
    let summary_at = csv.find("# summary").unwrap();
    let details_at = csv.find("# details").unwrap();
    assert!(summary_at < details_at);
    assert!(csv.contains("total,3\n"));
    assert!(csv.contains("failed,1\n"));
    assert!(csv.contains("p2,false,\"bad, \"\"quoted\"\" <tag>\",4.250\n"));
    assert!(csv.contains("p1,true,,0.750\n"));
}

#[test]
fn summary_csv_reads_back_with_a_csv_reader() {
    let text = render_summary(&sample_summary(), OutputFormat::Csv).unwrap();
    let (_, details) = text.split_once("\n\n").unwrap();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(details.as_bytes());
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    // The "# details" marker line is consumed as the header row.
    assert_eq!(&reader.headers().unwrap()[0], "# details");
    assert_eq!(&rows[0][0], "id");
    assert_eq!(&rows[2][0], "p2");
    assert_eq!(&rows[2][2], "bad, \"quoted\" <tag>");
    assert_eq!(rows.len(), 4);
}

#[test]
fn summary_html_escapes_errors() {
    let html = render_summary(&sample_summary(), OutputFormat::Html).unwrap();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("&lt;tag&gt;"));
    assert!(!html.contains("<tag>"));
    assert!(html.contains("<tr class=\"fail\">"));
}

#[test]
fn summary_text_and_markdown_expose_summary_fields() {
    let summary = sample_summary();
    let text = render_summary(&summary, OutputFormat::Text).unwrap();
    assert!(text.contains("Total:            3"));
    assert!(text.contains("Average duration: 2.17 ms"));
    assert!(text.contains("  - p2: bad"));

    let markdown = render_summary(&summary, OutputFormat::Markdown).unwrap();
    assert!(markdown.contains("| Successful | 2 |"));
    assert!(markdown.contains("| Total duration | 6.50 ms |"));
    assert!(markdown.contains("| p2 | failed |"));
}

#[test]
fn formats_parse_from_names() {
    assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
    assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
    assert!("pdf".parse::<OutputFormat>().is_err());
    assert_eq!(OutputFormat::Html.to_string(), "html");
}
