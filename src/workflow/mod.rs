//! Step orchestration: load a definition, run its steps in order, report.
//!
//! Steps only communicate through files they write and read; the
//! orchestrator never hands results from one step to the next in memory.
mod execute;
mod load;
mod model;

pub use execute::{run_workflow, EXTRACT_KEY, OUTPUT_FILE_KEY};
pub use load::{load_workflow, normalize_params, PATH_KEYS};
pub use model::{
    split_source, CombineSpec, ExecutionReport, Step, StepOutput, StepRecord, Workflow,
    DEFAULT_COMBINE_SEPARATOR, RESULT_KEY, STRUCTURED_KEY,
};
