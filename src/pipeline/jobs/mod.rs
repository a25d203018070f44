//! Asynchronous job lifecycle: submission, state machine, poll contract.

pub mod orchestrator;
pub mod store;
pub mod types;

pub use orchestrator::{build_orchestrator, JobOrchestrator};
pub use store::{InMemoryJobStore, JobStore};
pub use types::{Job, JobInput, JobMetrics, JobSnapshot, JobStatus};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("job store failure: {0}")]
    Store(String),

    #[error("unknown job id: {0}")]
    UnknownJob(String),

    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },
}
