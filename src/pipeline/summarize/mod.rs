//! Map-reduce document summarization over the gateway and recovery
//! engine, plus single-call feature execution.

pub mod chunker;
pub mod orchestrator;

pub use chunker::{chunk_text, Chunk};
pub use orchestrator::{DocumentSummarizer, SummarizeOptions, SummarizeOutcome, UsageTotals};

use thiserror::Error;

use crate::pipeline::gateway::GatewayError;

/// Failure of a summarize or single-call feature operation.
#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("model provider failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("model output was unrecoverable after {attempts} corrective attempts")]
    Unrecoverable { attempts: u32 },

    #[error("no usable content produced by any pipeline stage")]
    NoUsableContent,
}
