//! Owns the asynchronous lifecycle of document jobs.
//!
//! Submission persists a Pending record and returns immediately; the
//! pipeline runs on a spawned task. Every status transition is persisted
//! as it happens, so a crash between stages leaves the job queryable in
//! its last persisted state.

use std::sync::Arc;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::pipeline::gateway::{build_provider, Gateway, GatewayError};
use crate::pipeline::recovery::FeatureOutput;
use crate::pipeline::summarize::{DocumentSummarizer, SummarizeError, SummarizeOutcome};
use crate::prompts::PromptSource;

use super::store::JobStore;
use super::types::{Job, JobInput, JobSnapshot, JobStatus};
use super::JobError;

/// Clones share the same store and summarizer, so the spawned pipeline
/// task works against the same state as the handle callers hold.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    summarizer: Arc<DocumentSummarizer>,
}

impl JobOrchestrator {
    pub fn new(store: Arc<dyn JobStore>, summarizer: Arc<DocumentSummarizer>) -> Self {
        Self { store, summarizer }
    }

    /// Accept a document job: persist a Pending record, start the
    /// pipeline on the runtime, and return the job id immediately.
    pub fn submit(&self, input: JobInput) -> Result<String, JobError> {
        let job = Job::new(input);
        let id = job.id.clone();
        self.store.create(job.clone())?;
        tracing::info!(job_id = %id, "job accepted");

        let runner = self.clone();
        tokio::spawn(async move {
            runner.run(job).await;
        });
        Ok(id)
    }

    /// Poll contract: read-only, idempotent; `None` for an unknown id.
    pub fn get_job(&self, id: &str) -> Result<Option<JobSnapshot>, JobError> {
        Ok(self.store.get(id)?.map(|job| job.snapshot()))
    }

    async fn run(&self, mut job: Job) {
        let started = Instant::now();
        if let Err(err) = self.transition(&mut job, JobStatus::Processing) {
            tracing::error!(job_id = %job.id, error = %err, "failed to mark job processing");
            return;
        }

        let text = job.input.text.clone();
        let derive_roadmap = job.input.derive_roadmap;
        match self.summarizer.summarize(&text, derive_roadmap).await {
            Ok(outcome) => self.complete(&mut job, outcome, started),
            Err(err) => self.fail(&mut job, &err, started),
        }
    }

    fn complete(&self, job: &mut Job, outcome: SummarizeOutcome, started: Instant) {
        job.metrics.duration_ms = started.elapsed().as_millis() as u64;
        job.metrics.prompt_tokens = outcome.usage.prompt_tokens;
        job.metrics.completion_tokens = outcome.usage.completion_tokens;
        job.metrics.total_tokens = outcome.usage.total_tokens;
        job.metrics.tokens_estimated = outcome.usage.estimated;
        job.metrics.gateway_calls = outcome.usage.calls;
        job.metrics.provider = self.summarizer.provider_name().to_string();
        job.metrics.confidence = outcome.document.confidence;
        job.metrics.fallback_used = outcome.document.fallback;
        job.metrics.chunk_failures = outcome.chunk_failures;
        job.warnings = outcome.warnings;
        job.result = Some(FeatureOutput::Document(outcome.document));

        match self.transition(job, JobStatus::Complete) {
            Ok(()) => tracing::info!(
                job_id = %job.id,
                duration_ms = job.metrics.duration_ms,
                total_tokens = job.metrics.total_tokens,
                fallback = job.metrics.fallback_used,
                "job complete"
            ),
            Err(err) => tracing::error!(job_id = %job.id, error = %err, "failed to persist completion"),
        }
    }

    fn fail(&self, job: &mut Job, error: &SummarizeError, started: Instant) {
        job.metrics.duration_ms = started.elapsed().as_millis() as u64;
        job.metrics.provider = self.summarizer.provider_name().to_string();
        job.error_message = Some(user_facing_message(error));

        match self.transition(job, JobStatus::Failed) {
            Ok(()) => tracing::warn!(job_id = %job.id, error = %error, "job failed"),
            Err(err) => tracing::error!(job_id = %job.id, error = %err, "failed to persist failure"),
        }
    }

    /// Apply and persist one status transition, rejecting anything the
    /// lifecycle does not allow.
    fn transition(&self, job: &mut Job, next: JobStatus) -> Result<(), JobError> {
        if !job.status.can_transition_to(next) {
            return Err(JobError::IllegalTransition {
                from: job.status,
                to: next,
            });
        }
        job.status = next;
        job.updated_at = chrono::Utc::now();
        self.store.update(job)?;
        tracing::debug!(job_id = %job.id, status = %job.status, "job status persisted");
        Ok(())
    }
}

/// Rewrite pipeline errors into actionable user-facing messages; raw
/// provider payloads never surface to callers.
fn user_facing_message(error: &SummarizeError) -> String {
    match error {
        SummarizeError::Gateway(GatewayError::Auth { .. }) => {
            "Provider credentials are invalid or missing. Check the configured API key.".to_string()
        }
        SummarizeError::Gateway(GatewayError::ModelNotFound(_)) => {
            "The configured model is not available on the provider.".to_string()
        }
        SummarizeError::Gateway(GatewayError::RateLimited { .. }) => {
            "The provider is rate limiting requests. Try again shortly.".to_string()
        }
        SummarizeError::Gateway(GatewayError::Network(_))
        | SummarizeError::Gateway(GatewayError::Server { .. }) => {
            "The provider is temporarily unavailable. Try again shortly.".to_string()
        }
        SummarizeError::Gateway(_) => "The provider rejected the request.".to_string(),
        SummarizeError::Unrecoverable { .. } => {
            "The model did not produce usable structured output.".to_string()
        }
        SummarizeError::NoUsableContent => {
            "No usable content could be produced for this document.".to_string()
        }
    }
}

/// Build a fully wired orchestrator from configuration: provider,
/// gateway, summarizer and store assembled once at startup.
pub fn build_orchestrator(
    config: &PipelineConfig,
    prompts: Arc<dyn PromptSource>,
    store: Arc<dyn JobStore>,
) -> JobOrchestrator {
    let provider = build_provider(config);
    let gateway = Gateway::new(provider, config.retry_policy());
    let summarizer = Arc::new(DocumentSummarizer::new(
        gateway,
        prompts,
        config.summarize_options(),
    ));
    JobOrchestrator::new(store, summarizer)
}
