// Artifact manager
// Owns everything on disk that jobs produce: per-job result files, the
// shared FASTA and zip pools, manual-submission bundles and the retention
// sweep that keeps the data root from growing forever.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ApiError;
use crate::models::{FileKind, GenomeRecord, JobStatus};
use crate::registry::JobRegistry;
use crate::utils::bundle::zip_files;
use crate::utils::fasta::download_and_decompress_fasta;
use crate::utils::DataDirs;

/// A file ready to hand to an HTTP response.
pub struct NamedBytes {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// One entry in a pool listing.
#[derive(Debug, Clone, Serialize)]
pub struct TempArtifact {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    pub size_mb: f64,
    pub created_at: String,
}

pub struct ArtifactStore {
    registry: Arc<JobRegistry>,
    dirs: DataDirs,
}

impl ArtifactStore {
    pub fn new(registry: Arc<JobRegistry>, dirs: DataDirs) -> Self {
        Self { registry, dirs }
    }

    /// Resolve a completed job's artifact of the given kind and read it
    /// whole. Unknown job is `NotFound`; a job that exists but is not
    /// completed, or completed without that kind, is `NotReady`.
    pub fn get(&self, job_id: &str, kind: FileKind) -> Result<NamedBytes, ApiError> {
        let job = self
            .registry
            .get(job_id)
            .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))?;

        if job.status != JobStatus::Completed {
            return Err(ApiError::NotReady(format!(
                "Job {} has not completed, no files to download yet",
                job_id
            )));
        }

        let artifact = job
            .result
            .as_ref()
            .and_then(|result| result.artifact(kind))
            .ok_or_else(|| {
                ApiError::NotReady(format!(
                    "Job {} did not produce a {} file",
                    job_id,
                    kind.download_name(job_id)
                ))
            })?;

        let bytes = fs::read(&artifact.path)?;
        Ok(NamedBytes {
            filename: kind.download_name(job_id),
            content_type: kind.content_type(),
            bytes,
        })
    }

    /// Delete a job record together with its artifact directory. The
    /// directory removal is idempotent; a missing directory is fine.
    pub fn delete_for_job(&self, job_id: &str) -> Result<(), ApiError> {
        self.registry
            .delete(job_id)
            .map_err(|_| ApiError::NotFound(format!("Job {} not found", job_id)))?;

        let job_dir = self.dirs.job_dir(job_id);
        if job_dir.exists() {
            fs::remove_dir_all(&job_dir)?;
            log::info!("Removed artifacts for deleted job {}", job_id);
        }
        Ok(())
    }

    /// Zip bundles sitting in `temp_fasta_*` namespaces, newest first.
    pub fn list_temp_fasta_zips(&self) -> Vec<TempArtifact> {
        let mut entries = Vec::new();
        for dir in self.dirs.temp_fasta_dirs() {
            let dir_name = match dir.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            for zip in zips_in(&dir) {
                if let Some(mut artifact) = describe(&zip) {
                    artifact.dir = Some(dir_name.clone());
                    entries.push(artifact);
                }
            }
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    /// `.PHASTEST.zip` results accumulated in the shared pool.
    pub fn list_phastest_zips(&self) -> Vec<TempArtifact> {
        let mut entries: Vec<TempArtifact> = fs::read_dir(self.dirs.phastest_dir())
            .into_iter()
            .flatten()
            .flatten()
            .filter(|e| {
                e.path().is_file()
                    && e.file_name().to_string_lossy().ends_with(".PHASTEST.zip")
            })
            .filter_map(|e| describe(&e.path()))
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    /// Fetch one bundle out of a `temp_fasta_*` namespace. Both path
    /// components are validated; nothing outside the data root is readable
    /// through here.
    pub fn get_temp_fasta_zip(&self, dir: &str, filename: &str) -> Result<NamedBytes, ApiError> {
        if !dir.starts_with("temp_fasta_") || has_traversal(dir) {
            return Err(ApiError::Validation(format!(
                "Invalid temp directory name: {}",
                dir
            )));
        }
        if !filename.ends_with(".zip") || has_traversal(filename) {
            return Err(ApiError::Validation(format!(
                "Invalid zip filename: {}",
                filename
            )));
        }

        let path = self.dirs.root().join(dir).join(filename);
        if !path.is_file() {
            return Err(ApiError::NotFound(format!(
                "No such file: {}/{}",
                dir, filename
            )));
        }
        Ok(NamedBytes {
            filename: filename.to_string(),
            content_type: "application/zip",
            bytes: fs::read(&path)?,
        })
    }

    /// Bundle every FASTA currently in the shared work pool. This is the
    /// manual-submission path used while the PHASTEST API is down.
    pub fn bundle_pool_fastas(&self) -> Result<NamedBytes, ApiError> {
        let pool = self.dirs.resfinder_dir();
        let fastas: Vec<PathBuf> = fs::read_dir(&pool)
            .into_iter()
            .flatten()
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .map(|ext| ext == "fna" || ext == "fasta" || ext == "fa")
                        .unwrap_or(false)
            })
            .collect();

        if fastas.is_empty() {
            return Err(ApiError::NotFound(
                "No FASTA files available to bundle".to_string(),
            ));
        }

        // The bundle is built outside the pool: the sweep must never treat
        // it as a work file and concurrent requests must not overwrite each
        // other's archive mid-read.
        let filename = format!("phastest_fasta_files_{}_genomes.zip", fastas.len());
        let scratch = std::env::temp_dir().join(format!("genolab_bundle_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&scratch)?;
        let zip_path = scratch.join(&filename);
        let bytes = zip_files(&fastas, &zip_path)
            .map_err(|e| ApiError::Internal(e.to_string()))
            .and_then(|()| fs::read(&zip_path).map_err(ApiError::from));
        let _ = fs::remove_dir_all(&scratch);

        Ok(NamedBytes {
            filename,
            content_type: "application/zip",
            bytes: bytes?,
        })
    }

    /// Download the given genomes into a fresh time-scoped namespace and zip
    /// them there. Blocking; callers run it on a blocking thread.
    pub fn create_temp_fasta_bundle(
        &self,
        genomes: &[GenomeRecord],
    ) -> Result<TempArtifact, ApiError> {
        if genomes.is_empty() {
            return Err(ApiError::Validation("Genome URLs are required".to_string()));
        }

        let dir = self.dirs.temp_fasta_dir(Utc::now().timestamp());
        fs::create_dir_all(&dir)?;

        let mut fastas = Vec::new();
        for genome in genomes {
            match download_and_decompress_fasta(&genome.url, &dir) {
                Ok(path) => fastas.push(path),
                Err(e) => log::warn!("Skipping {} in bundle: {}", genome.url, e),
            }
        }
        if fastas.is_empty() {
            return Err(ApiError::Internal(
                "None of the requested genomes could be downloaded".to_string(),
            ));
        }

        let zip_path = dir.join("fasta_files.zip");
        zip_files(&fastas, &zip_path).map_err(|e| ApiError::Internal(e.to_string()))?;

        let mut artifact = describe(&zip_path)
            .ok_or_else(|| ApiError::Internal("Bundle vanished after creation".to_string()))?;
        artifact.dir = dir.file_name().map(|n| n.to_string_lossy().to_string());
        Ok(artifact)
    }

    /// Remove pool files and temp namespaces older than `max_age`. Returns
    /// how many entries went away. Job-owned directories under `jobs/` are
    /// only removed through `delete_for_job`.
    pub fn sweep_temp(&self, max_age: Duration) -> usize {
        let cutoff = SystemTime::now() - max_age;
        let mut removed = 0;

        for pool in [
            self.dirs.resfinder_dir(),
            self.dirs.phastest_dir(),
            self.dirs.vfdb_dir(),
        ] {
            removed += sweep_entries(&pool, cutoff);
        }

        for dir in self.dirs.temp_fasta_dirs() {
            if older_than(&dir, cutoff) {
                match fs::remove_dir_all(&dir) {
                    Ok(()) => {
                        log::info!("Swept stale namespace {:?}", dir);
                        removed += 1;
                    }
                    Err(e) => log::warn!("Could not sweep {:?}: {}", dir, e),
                }
            }
        }

        removed
    }
}

fn has_traversal(component: &str) -> bool {
    component.contains("..") || component.contains('/') || component.contains('\\')
}

fn zips_in(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map(|ext| ext == "zip").unwrap_or(false))
        .collect()
}

fn describe(path: &Path) -> Option<TempArtifact> {
    let metadata = fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    let created_at: DateTime<Utc> = modified.into();
    Some(TempArtifact {
        filename: path.file_name()?.to_string_lossy().to_string(),
        dir: None,
        size_mb: (metadata.len() as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
        created_at: created_at.to_rfc3339(),
    })
}

fn older_than(path: &Path, cutoff: SystemTime) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|modified| modified < cutoff)
        .unwrap_or(false)
}

/// Remove direct children of `dir` older than the cutoff.
fn sweep_entries(dir: &Path, cutoff: SystemTime) -> usize {
    let mut removed = 0;
    for entry in fs::read_dir(dir).into_iter().flatten().flatten() {
        let path = entry.path();
        if !older_than(&path, cutoff) {
            continue;
        }
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                log::info!("Swept stale entry {:?}", path);
                removed += 1;
            }
            Err(e) => log::warn!("Could not sweep {:?}: {}", path, e),
        }
    }
    removed
}
