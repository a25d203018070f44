//! Output recovery engine.
//!
//! Turns unreliable model text into schema-conformant structured data:
//! an ordered extraction cascade, structural repair, confidence
//! normalization, per-feature validation and output sanitization.

pub mod confidence;
pub mod extract;
pub mod repair;
pub mod sanitize;
pub mod validate;

pub use confidence::{normalize_confidence, normalized_confidence, DEFAULT_CONFIDENCE};
pub use extract::recover;
pub use sanitize::{
    is_publicly_routable_url, sanitize_model_input, sanitize_output, sanitize_value,
    BLOCKED_URL_MARKER, REDACTION_MARKER,
};
pub use validate::{
    validate_chunk, validate_document, validate_feature, validate_roadmap, ChunkDigest,
    DocumentSummary, ExplainOutput, FeatureOutput, RewriteOutput, RoadmapOutput, RoadmapWeek,
};

use thiserror::Error;

/// Terminal failure of the extraction cascade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecoveryError {
    #[error("no recoverable JSON object in model output: {0}")]
    Unrecoverable(String),
}
