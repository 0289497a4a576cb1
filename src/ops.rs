//! Built-in file inspection operations and the default registry.
use crate::batch::{BatchOperation, BATCH_OPERATION};
use crate::invoker::{
    param_usize, require_str, Invoker, Operation, OperationOutput, OperationRegistry, Params,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_HEAD_LINES: usize = 10;

/// Size and kind of `input_file`.
pub struct StatOperation;

/// Line, word and character counts of `input_file`.
pub struct LineCountOperation;

/// First `lines` lines of `input_file` (default 10).
pub struct HeadOperation;

#[async_trait]
impl Operation for StatOperation {
    async fn run(&self, _cancel: &CancellationToken, params: &Params) -> Result<OperationOutput> {
        let path = require_str(params, "input_file")?;
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("stat {path}"))?;
        let kind = if meta.is_dir() { "directory" } else { "file" };
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");
        Ok(OperationOutput::structured(
            format!("{path}: {kind}, {} bytes", meta.len()),
            json!({
                "path": path,
                "kind": kind,
                "bytes": meta.len(),
                "extension": extension,
            }),
        ))
    }
}

#[async_trait]
impl Operation for LineCountOperation {
    async fn run(&self, _cancel: &CancellationToken, params: &Params) -> Result<OperationOutput> {
        let path = require_str(params, "input_file")?;
        let text = read_text(path).await?;
        let lines = text.lines().count();
        let words = text.split_whitespace().count();
        let chars = text.chars().count();
        Ok(OperationOutput::structured(
            format!("{lines} lines, {words} words, {chars} characters"),
            json!({ "lines": lines, "words": words, "chars": chars }),
        ))
    }
}

#[async_trait]
impl Operation for HeadOperation {
    async fn run(&self, _cancel: &CancellationToken, params: &Params) -> Result<OperationOutput> {
        let path = require_str(params, "input_file")?;
        let count = param_usize(params, "lines")?.unwrap_or(DEFAULT_HEAD_LINES);
        let text = read_text(path).await?;
        let mut head = text.lines().take(count).collect::<Vec<_>>().join("\n");
        if !head.is_empty() {
            head.push('\n');
        }
        Ok(OperationOutput::text(head))
    }
}

async fn read_text(path: &str) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read {path}"))?;
    String::from_utf8(bytes).map_err(|_| anyhow!("{path} is not valid UTF-8"))
}

/// Registry with the built-ins plus `batch` fanning out over them.
pub fn default_registry() -> OperationRegistry {
    let mut base = OperationRegistry::new();
    base.register("stat", Arc::new(StatOperation));
    base.register("line_count", Arc::new(LineCountOperation));
    base.register("head", Arc::new(HeadOperation));

    let inner: Arc<dyn Invoker> = Arc::new(base.clone());
    let mut registry = base;
    registry.register(BATCH_OPERATION, Arc::new(BatchOperation::new(inner)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn params_for(path: &Path) -> Params {
        let mut params = Params::new();
        params.insert("input_file".to_string(), json!(path.display().to_string()));
        params
    }

    #[test]
    fn default_registry_lists_builtins_and_batch() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["batch", "head", "line_count", "stat"]);
    }

    #[tokio::test]
    async fn line_count_and_head_read_the_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        fs::write(&path, "one two\nthree\nfour five six\n").unwrap();
        let registry = default_registry();
        let cancel = CancellationToken::new();

        let counted = registry
            .invoke(&cancel, "line_count", &params_for(&path))
            .await
            .unwrap();
        assert_eq!(counted.text, "3 lines, 6 words, 28 characters");
        assert_eq!(counted.structured.unwrap()["lines"], 3);

        let mut params = params_for(&path);
        params.insert("lines".to_string(), json!(2));
        let head = registry.invoke(&cancel, "head", &params).await.unwrap();
        assert_eq!(head.text, "one two\nthree\n");
    }

    #[tokio::test]
    async fn stat_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.xml");
        fs::write(&path, "<a/>").unwrap();
        let out = StatOperation
            .run(&CancellationToken::new(), &params_for(&path))
            .await
            .unwrap();
        let structured = out.structured.unwrap();
        assert_eq!(structured["bytes"], 4);
        assert_eq!(structured["extension"], "xml");
    }

    #[tokio::test]
    async fn missing_input_names_the_path() {
        let out = HeadOperation
            .run(
                &CancellationToken::new(),
                &params_for(Path::new("/nonexistent/docflow.txt")),
            )
            .await;
        let err = out.unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/docflow.txt"));
    }
}
