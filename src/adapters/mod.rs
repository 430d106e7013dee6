// Adapter boundary: each long-running external operation (NCBI metadata
// fetch, ResFinder, PHASTEST, VFDB) sits behind the same trait so the
// executor can dispatch on job type and tests can substitute doubles.

pub mod ncbi;
pub mod phastest;
pub mod resfinder;
pub mod tool;
pub mod vfdb;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::models::{GenomeRecord, JobResult, JobType, Settings};
use crate::registry::{JobRegistry, JobUpdate};
use crate::utils::DataDirs;

/// Input to a job, fixed at submission time.
#[derive(Debug, Clone)]
pub enum AdapterInput {
    Bioproject(String),
    Genomes(Vec<GenomeRecord>),
}

impl AdapterInput {
    pub fn genomes(&self) -> &[GenomeRecord] {
        match self {
            AdapterInput::Genomes(genomes) => genomes,
            AdapterInput::Bioproject(_) => &[],
        }
    }
}

/// Cooperative pause flag, one per in-flight job.
#[derive(Debug, Default)]
pub struct JobControl {
    paused: AtomicBool,
}

impl JobControl {
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Handed to an adapter for the duration of one run: progress reporting and
/// the cancellation checkpoint. Adapters never touch the registry beyond
/// the progress writes routed through here.
#[derive(Clone)]
pub struct JobContext {
    job_id: String,
    registry: Arc<JobRegistry>,
    control: Arc<JobControl>,
}

impl JobContext {
    pub fn new(job_id: String, registry: Arc<JobRegistry>, control: Arc<JobControl>) -> Self {
        Self {
            job_id,
            registry,
            control,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Write coarse progress. Failures are ignored; the job may have been
    /// deleted while the run was in flight.
    pub fn set_progress(&self, percent: u8) {
        if let Err(e) = self.registry.update(&self.job_id, JobUpdate::progress(percent)) {
            log::debug!("Progress update dropped for {}: {}", self.job_id, e);
        }
    }

    /// Cooperative cancellation checkpoint. Parks while a stop request is
    /// pending and returns once the job is resumed. The unit of work before
    /// a checkpoint always finishes.
    pub async fn checkpoint(&self) {
        while self.control.is_paused() {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

#[async_trait]
pub trait Adapter: Send + Sync {
    /// Synchronous input check, run before any job record exists. Empty or
    /// malformed input never reaches `running`.
    fn validate(&self, input: &AdapterInput) -> Result<(), AdapterError>;

    async fn run(&self, input: AdapterInput, ctx: &JobContext) -> Result<JobResult, AdapterError>;
}

pub(crate) fn require_genomes(input: &AdapterInput) -> Result<(), AdapterError> {
    match input {
        AdapterInput::Genomes(genomes) if genomes.is_empty() => Err(AdapterError::InvalidInput(
            "Genome URLs are required".to_string(),
        )),
        AdapterInput::Genomes(genomes) => {
            if let Some(bad) = genomes.iter().find(|g| g.url.trim().is_empty()) {
                return Err(AdapterError::InvalidInput(format!(
                    "Genome record without a URL: {}",
                    bad.assembly_accession
                )));
            }
            Ok(())
        }
        AdapterInput::Bioproject(_) => Err(AdapterError::InvalidInput(
            "Expected a genome list".to_string(),
        )),
    }
}

/// The production adapter set, one per job type.
pub fn default_adapters(
    settings: &Settings,
    dirs: &DataDirs,
) -> HashMap<JobType, Arc<dyn Adapter>> {
    let mut adapters: HashMap<JobType, Arc<dyn Adapter>> = HashMap::new();
    adapters.insert(
        JobType::FetchGenomes,
        Arc::new(ncbi::NcbiAdapter::new(
            settings.ncbi_base_url.clone(),
            settings.ncbi_api_key.clone(),
        )),
    );
    adapters.insert(
        JobType::Resfinder,
        Arc::new(resfinder::ResfinderAdapter::new(
            settings.resfinder_command.clone(),
            dirs.clone(),
        )),
    );
    adapters.insert(
        JobType::Phastest,
        Arc::new(phastest::PhastestAdapter::new(
            settings.phastest_api_url.clone(),
            Duration::from_secs(settings.phastest_poll_secs),
            dirs.clone(),
        )),
    );
    adapters.insert(
        JobType::Vfdb,
        Arc::new(vfdb::VfdbAdapter::new(
            settings.vfdb_command.clone(),
            settings.vfdb_formatter_command.clone(),
            dirs.clone(),
        )),
    );
    adapters
}
