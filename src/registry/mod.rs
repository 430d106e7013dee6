// In-memory job registry
// Single source of truth for job existence and lifecycle state.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::models::{Job, JobResult, JobStatus, JobType};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("invalid transition for job {job_id}: {reason}")]
    InvalidTransition { job_id: String, reason: String },
}

/// Partial update applied atomically under the registry's write lock.
#[derive(Debug, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        JobUpdate {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        JobUpdate {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn completed(result: JobResult) -> Self {
        JobUpdate {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        JobUpdate {
            status: Some(JobStatus::Failed),
            progress: None,
            result: None,
            error: Some(error),
        }
    }
}

/// Thread-safe job table. Every component receives it behind an `Arc`;
/// nothing mutates a `Job` outside `update`.
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a fresh job record in `pending`. Never blocks on anything
    /// but the table lock.
    pub fn create(&self, job_type: JobType) -> Job {
        let job = Job::new(uuid::Uuid::new_v4().to_string(), job_type);
        self.jobs.write().insert(job.job_id.clone(), job.clone());
        job
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().get(job_id).cloned()
    }

    pub fn list(&self) -> Vec<Job> {
        self.jobs.read().values().cloned().collect()
    }

    /// Apply a partial update. Rejects status moves outside the lifecycle
    /// DAG, any change to a terminal job's status, second assignments of
    /// result/error, and a result alongside an existing error (or vice
    /// versa). Progress never decreases.
    pub fn update(&self, job_id: &str, update: JobUpdate) -> Result<Job, RegistryError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                job_id: job_id.to_string(),
                reason: format!("job is {:?}", job.status),
            });
        }

        if let Some(next) = update.status {
            // The DAG has no self-loops; stopping a paused job or resuming a
            // running one is an invalid request, not a no-op.
            if !job.status.can_transition_to(next) {
                return Err(RegistryError::InvalidTransition {
                    job_id: job_id.to_string(),
                    reason: format!("{:?} -> {:?}", job.status, next),
                });
            }
        }

        if update.result.is_some() {
            if job.result.is_some() {
                return Err(RegistryError::InvalidTransition {
                    job_id: job_id.to_string(),
                    reason: "result already set".to_string(),
                });
            }
            if job.error.is_some() || update.error.is_some() {
                return Err(RegistryError::InvalidTransition {
                    job_id: job_id.to_string(),
                    reason: "result and error are mutually exclusive".to_string(),
                });
            }
        }

        if update.error.is_some() {
            if job.error.is_some() {
                return Err(RegistryError::InvalidTransition {
                    job_id: job_id.to_string(),
                    reason: "error already set".to_string(),
                });
            }
            if job.result.is_some() {
                return Err(RegistryError::InvalidTransition {
                    job_id: job_id.to_string(),
                    reason: "result and error are mutually exclusive".to_string(),
                });
            }
        }

        // All checks passed; apply the whole update in one shot.
        if let Some(next) = update.status {
            job.status = next;
            if next.is_terminal() && job.completed_at.is_none() {
                job.completed_at = Some(chrono::Utc::now().to_rfc3339());
            }
        }
        if let Some(progress) = update.progress {
            // 100 is reserved for the completed transition, which forces it
            // below; a job that later fails must not read as fully done.
            job.progress = job.progress.max(progress.min(99));
        }
        if job.status == JobStatus::Completed {
            job.progress = 100;
        }
        if let Some(result) = update.result {
            job.result = Some(result);
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }

        Ok(job.clone())
    }

    /// Remove a record. Deleting an unknown (or already deleted) job reports
    /// `NotFound`; the removed record is handed back so the caller can clean
    /// up its artifacts.
    pub fn delete(&self, job_id: &str) -> Result<Job, RegistryError> {
        self.jobs
            .write()
            .remove(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.to_string()))
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
