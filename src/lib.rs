//! Document analysis orchestration: ordered workflows, parallel batches and
//! deterministic renderings of their results.
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod invoker;
pub mod ops;
pub mod output;
pub mod pool;
pub mod render;
pub mod util;
pub mod workflow;

pub use error::{FlowError, FlowResult, RunFailure};
pub use invoker::{Invoker, Operation, OperationOutput, OperationRegistry, Params};
pub use pool::{run_batch, BatchSummary, JobDescriptor, JobResult};
pub use render::{render_report, render_summary, OutputFormat};
pub use workflow::{load_workflow, run_workflow, ExecutionReport, Workflow};
