//! Job records and the monotonic status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::recovery::FeatureOutput;

/// Lifecycle of one document job.
///
/// Strictly monotonic: Pending -> Processing -> Complete | Failed.
/// Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether moving to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Complete)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Feature-specific parameters of a document job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobInput {
    pub text: String,
    pub derive_roadmap: bool,
}

/// Metrics accumulated across the pipeline milestones of one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobMetrics {
    pub duration_ms: u64,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// True when any contributing token count was estimated.
    pub tokens_estimated: bool,
    pub provider: String,
    pub confidence: f64,
    pub fallback_used: bool,
    pub chunk_failures: u32,
    pub gateway_calls: u32,
}

/// One asynchronous unit of document-processing work.
///
/// Owned exclusively by the orchestrator; external callers only read
/// snapshots through the poll contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub input: JobInput,
    pub result: Option<FeatureOutput>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
    pub metrics: JobMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Fresh Pending record for a submitted request.
    pub fn new(input: JobInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            input,
            result: None,
            error_message: None,
            warnings: Vec::new(),
            metrics: JobMetrics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Read-only view for the poll contract.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            status: self.status,
            result: self.result.clone(),
            error_message: self.error_message.clone(),
            warnings: self.warnings.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

/// What a poller sees: status, result, error and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub result: Option<FeatureOutput>,
    pub error_message: Option<String>,
    pub warnings: Vec<String>,
    pub metrics: JobMetrics,
}
