// Job executor
// Validates input synchronously, creates the job record and spawns the
// adapter on the runtime. Exactly one terminal update is written per job,
// whether the adapter returns, errors or panics.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adapters::{Adapter, AdapterInput, JobContext, JobControl};
use crate::error::ApiError;
use crate::models::{Job, JobStatus, JobType};
use crate::registry::{JobRegistry, JobUpdate, RegistryError};

pub struct JobExecutor {
    registry: Arc<JobRegistry>,
    adapters: HashMap<JobType, Arc<dyn Adapter>>,
    controls: Arc<Mutex<HashMap<String, Arc<JobControl>>>>,
}

impl JobExecutor {
    pub fn new(registry: Arc<JobRegistry>, adapters: HashMap<JobType, Arc<dyn Adapter>>) -> Self {
        Self {
            registry,
            adapters,
            controls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate and launch a job. Validation failures surface here and no
    /// job record is created for them; everything after this call is
    /// reported through the registry.
    pub fn submit(&self, job_type: JobType, input: AdapterInput) -> Result<Job, ApiError> {
        let adapter = self
            .adapters
            .get(&job_type)
            .cloned()
            .ok_or_else(|| {
                ApiError::Internal(format!("No adapter registered for {}", job_type.as_str()))
            })?;

        adapter.validate(&input)?;

        let job = self.registry.create(job_type);
        let control = Arc::new(JobControl::default());
        self.controls
            .lock()
            .insert(job.job_id.clone(), control.clone());

        let registry = self.registry.clone();
        let controls = self.controls.clone();
        let ctx = JobContext::new(job.job_id.clone(), registry.clone(), control);
        let job_id = job.job_id.clone();

        tokio::spawn(async move {
            if let Err(e) = registry.update(&job_id, JobUpdate::status(JobStatus::Running)) {
                log::warn!("Job {} vanished before it could start: {}", job_id, e);
                controls.lock().remove(&job_id);
                return;
            }
            log::info!("Job {} ({}) started", job_id, job_type.as_str());

            // Run the adapter in its own task so a panic lands here as a
            // JoinError instead of tearing the job down silently.
            let inner_ctx = ctx.clone();
            let handle =
                tokio::spawn(async move { adapter.run(input, &inner_ctx).await });

            let update = match handle.await {
                Ok(Ok(result)) => JobUpdate::completed(result),
                Ok(Err(e)) => JobUpdate::failed(e.to_string()),
                Err(e) => JobUpdate::failed(format!("worker panicked: {}", e)),
            };
            let failed = update.error.clone();

            match registry.update(&job_id, update) {
                Ok(_) => match failed {
                    Some(error) => log::error!("Job {} failed: {}", job_id, error),
                    None => log::info!("Job {} completed", job_id),
                },
                Err(RegistryError::NotFound(_)) => {
                    log::warn!("Job {} was deleted while running", job_id);
                }
                Err(e) => log::error!("Could not finalize job {}: {}", job_id, e),
            }
            controls.lock().remove(&job_id);
        });

        Ok(job)
    }

    /// Request a cooperative pause. Only a running job can be stopped; the
    /// in-flight unit of work still finishes before the pause takes hold.
    pub fn stop(&self, job_id: &str) -> Result<Job, ApiError> {
        let job = self.transition(job_id, JobStatus::Paused)?;
        if let Some(control) = self.controls.lock().get(job_id) {
            control.set_paused(true);
        }
        Ok(job)
    }

    /// Resume a paused job.
    pub fn resume(&self, job_id: &str) -> Result<Job, ApiError> {
        let job = self.transition(job_id, JobStatus::Running)?;
        if let Some(control) = self.controls.lock().get(job_id) {
            control.set_paused(false);
        }
        Ok(job)
    }

    fn transition(&self, job_id: &str, next: JobStatus) -> Result<Job, ApiError> {
        let job = self
            .registry
            .update(job_id, JobUpdate::status(next))
            .map_err(|e| match e {
                RegistryError::NotFound(_) => {
                    ApiError::NotFound(format!("Job {} not found", job_id))
                }
                RegistryError::InvalidTransition { .. } => {
                    ApiError::InvalidTransition(e.to_string())
                }
            })?;

        if job.status.is_terminal() {
            self.controls.lock().remove(job_id);
        }
        Ok(job)
    }

    /// Drop the pause handle for a job that no longer exists.
    pub fn forget(&self, job_id: &str) {
        self.controls.lock().remove(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::models::JobResult;
    use async_trait::async_trait;
    use std::time::Duration;

    struct InstantAdapter;

    #[async_trait]
    impl Adapter for InstantAdapter {
        fn validate(&self, input: &AdapterInput) -> Result<(), AdapterError> {
            match input {
                AdapterInput::Bioproject(id) if id.is_empty() => {
                    Err(AdapterError::InvalidInput("empty".to_string()))
                }
                _ => Ok(()),
            }
        }

        async fn run(
            &self,
            _input: AdapterInput,
            ctx: &JobContext,
        ) -> Result<JobResult, AdapterError> {
            ctx.set_progress(50);
            Ok(JobResult::Analysis {
                artifacts: vec![],
                message: "done".to_string(),
            })
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl Adapter for FailingAdapter {
        fn validate(&self, _input: &AdapterInput) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn run(
            &self,
            _input: AdapterInput,
            _ctx: &JobContext,
        ) -> Result<JobResult, AdapterError> {
            Err(AdapterError::Tool("tool exploded".to_string()))
        }
    }

    struct PanickingAdapter;

    #[async_trait]
    impl Adapter for PanickingAdapter {
        fn validate(&self, _input: &AdapterInput) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn run(
            &self,
            _input: AdapterInput,
            _ctx: &JobContext,
        ) -> Result<JobResult, AdapterError> {
            panic!("boom");
        }
    }

    struct SlowAdapter;

    #[async_trait]
    impl Adapter for SlowAdapter {
        fn validate(&self, _input: &AdapterInput) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn run(
            &self,
            _input: AdapterInput,
            ctx: &JobContext,
        ) -> Result<JobResult, AdapterError> {
            for i in 0..20 {
                ctx.checkpoint().await;
                ctx.set_progress(i * 5);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Ok(JobResult::Analysis {
                artifacts: vec![],
                message: "done".to_string(),
            })
        }
    }

    fn executor_with(job_type: JobType, adapter: Arc<dyn Adapter>) -> (JobExecutor, Arc<JobRegistry>) {
        let registry = Arc::new(JobRegistry::new());
        let mut adapters: HashMap<JobType, Arc<dyn Adapter>> = HashMap::new();
        adapters.insert(job_type, adapter);
        (JobExecutor::new(registry.clone(), adapters), registry)
    }

    async fn wait_terminal(registry: &JobRegistry, job_id: &str) -> Job {
        for _ in 0..200 {
            if let Some(job) = registry.get(job_id) {
                if job.status.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", job_id);
    }

    #[tokio::test]
    async fn test_submit_runs_to_completed() {
        let (executor, registry) =
            executor_with(JobType::FetchGenomes, Arc::new(InstantAdapter));
        let job = executor
            .submit(
                JobType::FetchGenomes,
                AdapterInput::Bioproject("PRJNA1".to_string()),
            )
            .unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let job = wait_terminal(&registry, &job.job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.result.is_some());
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_validation_failure_creates_no_job() {
        let (executor, registry) =
            executor_with(JobType::FetchGenomes, Arc::new(InstantAdapter));
        let err = executor
            .submit(
                JobType::FetchGenomes,
                AdapterInput::Bioproject(String::new()),
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_adapter_error_lands_in_error_field() {
        let (executor, registry) = executor_with(JobType::Vfdb, Arc::new(FailingAdapter));
        let job = executor
            .submit(JobType::Vfdb, AdapterInput::Genomes(vec![]))
            .unwrap();
        let job = wait_terminal(&registry, &job.job_id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("tool exploded"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failure() {
        let (executor, registry) = executor_with(JobType::Vfdb, Arc::new(PanickingAdapter));
        let job = executor
            .submit(JobType::Vfdb, AdapterInput::Genomes(vec![]))
            .unwrap();
        let job = wait_terminal(&registry, &job.job_id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_concurrent_jobs_do_not_interfere() {
        let (executor, registry) = executor_with(JobType::Phastest, Arc::new(SlowAdapter));
        let a = executor
            .submit(JobType::Phastest, AdapterInput::Genomes(vec![]))
            .unwrap();
        let b = executor
            .submit(JobType::Phastest, AdapterInput::Genomes(vec![]))
            .unwrap();
        assert_ne!(a.job_id, b.job_id);

        let a = wait_terminal(&registry, &a.job_id).await;
        let b = wait_terminal(&registry, &b.job_id).await;
        assert_eq!(a.status, JobStatus::Completed);
        assert_eq!(b.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_stop_and_resume() {
        let (executor, registry) = executor_with(JobType::Phastest, Arc::new(SlowAdapter));
        let job = executor
            .submit(JobType::Phastest, AdapterInput::Genomes(vec![]))
            .unwrap();

        // Wait for the job to actually start before stopping it
        for _ in 0..100 {
            if registry.get(&job.job_id).unwrap().status == JobStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let paused = executor.stop(&job.job_id).unwrap();
        assert_eq!(paused.status, JobStatus::Paused);

        // A paused job parks at its next checkpoint and stays put
        tokio::time::sleep(Duration::from_millis(400)).await;
        let frozen = registry.get(&job.job_id).unwrap().progress;
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(registry.get(&job.job_id).unwrap().progress, frozen);

        // Stopping again is rejected
        assert!(matches!(
            executor.stop(&job.job_id),
            Err(ApiError::InvalidTransition(_))
        ));

        let resumed = executor.resume(&job.job_id).unwrap();
        assert_eq!(resumed.status, JobStatus::Running);
        let job = wait_terminal(&registry, &job.job_id).await;
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_stop_unknown_job() {
        let (executor, _registry) = executor_with(JobType::Phastest, Arc::new(SlowAdapter));
        assert!(matches!(
            executor.stop("nope"),
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resume_requires_paused() {
        let (executor, registry) = executor_with(JobType::Phastest, Arc::new(SlowAdapter));
        let job = executor
            .submit(JobType::Phastest, AdapterInput::Genomes(vec![]))
            .unwrap();
        for _ in 0..100 {
            if registry.get(&job.job_id).unwrap().status == JobStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(
            executor.resume(&job.job_id),
            Err(ApiError::InvalidTransition(_))
        ));
    }
}
