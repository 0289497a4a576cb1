//! Error taxonomy shared by the job pool and the step orchestrator.
//!
//! Operations themselves report failures through `anyhow`; they are folded
//! into `FlowError::Operation` at the point where the core observes them.
use crate::workflow::ExecutionReport;
use std::path::{Path, PathBuf};

pub type FlowResult<T> = std::result::Result<T, FlowError>;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// Rejected before any work started (empty job list, bad step fields).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("step {step:?} ({operation}) failed: {message}")]
    Operation {
        step: String,
        operation: String,
        message: String,
    },

    /// The shared cancellation token fired before the run finished.
    #[error("cancelled after {completed} of {total} units completed")]
    Cancelled { completed: usize, total: usize },
}

impl FlowError {
    pub fn invalid(message: impl Into<String>) -> Self {
        FlowError::InvalidInput(message.into())
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        FlowError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FlowError::Cancelled { .. })
    }
}

/// A failed orchestration run together with everything recorded before the
/// failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    pub report: Box<ExecutionReport>,
    #[source]
    pub error: FlowError,
}

impl RunFailure {
    pub(crate) fn new(report: ExecutionReport, error: FlowError) -> Self {
        Self {
            report: Box::new(report),
            error,
        }
    }
}
