//! Persistence contract for job records.

use std::collections::HashMap;
use std::sync::Mutex;

use super::types::Job;
use super::JobError;

/// Create/update/read contract over job records, keyed by job id.
///
/// Updates are last-writer-wins per id. External persistence engines
/// implement this trait; the pipeline never assumes more than a
/// key-value store.
pub trait JobStore: Send + Sync {
    fn create(&self, job: Job) -> Result<(), JobError>;
    fn update(&self, job: &Job) -> Result<(), JobError>;
    fn get(&self, id: &str) -> Result<Option<Job>, JobError>;
}

/// In-memory store for tests and embedding without external persistence.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job: Job) -> Result<(), JobError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| JobError::Store("job store lock poisoned".into()))?;
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn update(&self, job: &Job) -> Result<(), JobError> {
        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| JobError::Store("job store lock poisoned".into()))?;
        if !jobs.contains_key(&job.id) {
            return Err(JobError::UnknownJob(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| JobError::Store("job store lock poisoned".into()))?;
        Ok(jobs.get(id).cloned())
    }
}
