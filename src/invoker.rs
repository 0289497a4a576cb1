//! Operation invocation seam.
//!
//! The orchestrator and the batch runner only see the `Invoker` shape; the
//! set of operation names is owned by whoever populates the registry.
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Operation parameters in declaration order.
pub type Params = IndexMap<String, Value>;

/// What an operation hands back: free text plus an optional structured payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOutput {
    pub text: String,
    pub structured: Option<Value>,
}

impl OperationOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
        }
    }

    pub fn structured(text: impl Into<String>, structured: Value) -> Self {
        Self {
            text: text.into(),
            structured: Some(structured),
        }
    }
}

#[async_trait]
pub trait Operation: Send + Sync {
    async fn run(&self, cancel: &CancellationToken, params: &Params) -> Result<OperationOutput>;
}

#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        params: &Params,
    ) -> Result<OperationOutput>;
}

/// Adapts a synchronous closure into an `Operation`.
pub struct FnOperation<F>(pub F);

#[async_trait]
impl<F> Operation for FnOperation<F>
where
    F: Fn(&Params) -> Result<OperationOutput> + Send + Sync,
{
    async fn run(&self, _cancel: &CancellationToken, params: &Params) -> Result<OperationOutput> {
        (self.0)(params)
    }
}

/// Name → operation lookup, populated once at startup.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    operations: BTreeMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, operation: Arc<dyn Operation>) {
        let name = name.into();
        if self.operations.insert(name.clone(), operation).is_some() {
            tracing::debug!(operation = %name, "replaced registered operation");
        }
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Params) -> Result<OperationOutput> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnOperation(f)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("operations", &self.names())
            .finish()
    }
}

#[async_trait]
impl Invoker for OperationRegistry {
    async fn invoke(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        params: &Params,
    ) -> Result<OperationOutput> {
        let handler = self
            .operations
            .get(operation)
            .ok_or_else(|| anyhow!("unknown operation {operation:?}"))?;
        handler.run(cancel, params).await
    }
}

pub fn param_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub fn require_str<'a>(params: &'a Params, key: &str) -> Result<&'a str> {
    param_str(params, key).ok_or_else(|| anyhow!("missing string parameter {key:?}"))
}

/// Accepts both JSON numbers and numeric strings (YAML authors often quote).
pub fn param_usize(params: &Params, key: &str) -> Result<Option<usize>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| anyhow!("parameter {key:?} must be a non-negative integer")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|err| anyhow!("parameter {key:?} must be an integer: {err}")),
        Some(other) => Err(anyhow!("parameter {key:?} must be an integer, got {other}")),
    }
}
