// PHASTEST prophage screening via the phastest.ca API
// Submit raw FASTA bodies, poll until complete, download the per-genome
// result zips into the shared pool and bundle them for the job.

use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::{require_genomes, Adapter, AdapterInput, JobContext};
use crate::error::AdapterError;
use crate::models::{ArtifactRef, FileKind, JobResult};
use crate::utils::bundle::zip_files;
use crate::utils::csv::write_row;
use crate::utils::fasta::download_and_decompress_fasta;
use crate::utils::DataDirs;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Availability probe for the upstream API. Callers check this before
/// submitting a job; a down API means the fallback bundle flow, not a job.
pub fn probe(api_url: &str) -> bool {
    match ureq::get(api_url).timeout(PROBE_TIMEOUT).call() {
        Ok(response) => response.status() == 200,
        Err(e) => {
            log::warn!("PHASTEST availability probe failed: {}", e);
            false
        }
    }
}

pub async fn probe_available(api_url: String) -> bool {
    tokio::task::spawn_blocking(move || probe(&api_url))
        .await
        .unwrap_or(false)
}

enum PollOutcome {
    Complete { zip_url: String },
    Pending,
}

pub struct PhastestAdapter {
    api_url: String,
    poll_interval: Duration,
    dirs: DataDirs,
}

impl PhastestAdapter {
    pub fn new(api_url: String, poll_interval: Duration, dirs: DataDirs) -> Self {
        Self {
            api_url,
            poll_interval,
            dirs,
        }
    }

    fn submit(&self, fasta: &[u8]) -> Result<String, AdapterError> {
        let response = ureq::post(&self.api_url)
            .timeout(Duration::from_secs(120))
            .send_bytes(fasta)
            .map_err(|e| AdapterError::Upstream(format!("PHASTEST submission failed: {}", e)))?;
        let body: Value = response.into_json().map_err(|e| {
            AdapterError::Upstream(format!("PHASTEST returned non-JSON response: {}", e))
        })?;

        if let Some(job_id) = body["job_id"].as_str() {
            return Ok(job_id.to_string());
        }
        let reason = body["error"].as_str().unwrap_or("no job_id in response");
        Err(AdapterError::Tool(format!(
            "PHASTEST rejected submission: {}",
            reason
        )))
    }

    fn poll_once(&self, acc: &str) -> Result<PollOutcome, AdapterError> {
        let response = ureq::get(&self.api_url)
            .query("acc", acc)
            .timeout(Duration::from_secs(60))
            .call()
            .map_err(|e| AdapterError::Upstream(format!("PHASTEST poll failed: {}", e)))?;
        let body: Value = response.into_json().map_err(|e| {
            AdapterError::Upstream(format!("PHASTEST returned non-JSON response: {}", e))
        })?;

        if let Some(status) = body["status"].as_str() {
            if status.to_lowercase().starts_with("complete") {
                if let Some(zip) = body["zip"].as_str() {
                    return Ok(PollOutcome::Complete {
                        zip_url: normalize_zip_url(zip),
                    });
                }
            }
            return Ok(PollOutcome::Pending);
        }
        if let Some(error) = body["error"].as_str() {
            return Err(AdapterError::Tool(format!(
                "PHASTEST job {} failed: {}",
                acc, error
            )));
        }
        Err(AdapterError::Tool(format!(
            "Unexpected PHASTEST response for job {}",
            acc
        )))
    }

    fn download_zip(&self, zip_url: &str, dest: &PathBuf) -> Result<(), AdapterError> {
        let response = ureq::get(zip_url)
            .timeout(Duration::from_secs(120))
            .call()
            .map_err(|e| {
                AdapterError::Upstream(format!("PHASTEST zip download failed: {}", e))
            })?;
        let mut reader = response.into_reader();
        let mut file = fs::File::create(dest)?;
        std::io::copy(&mut reader, &mut file)?;
        Ok(())
    }

    async fn screen_genome(&self, url: &str, ctx: &JobContext) -> Result<PathBuf, AdapterError> {
        let work = self.dirs.resfinder_dir();
        let url_owned = url.to_string();
        let fasta_path =
            tokio::task::spawn_blocking(move || download_and_decompress_fasta(&url_owned, &work))
                .await
                .map_err(|e| AdapterError::Tool(format!("Download worker panicked: {}", e)))??;

        let fasta = fs::read(&fasta_path)?;
        let this = self.as_client();
        let acc = tokio::task::spawn_blocking(move || this.submit(&fasta))
            .await
            .map_err(|e| AdapterError::Tool(format!("Submit worker panicked: {}", e)))??;
        log::info!("PHASTEST accepted {:?} as job {}", fasta_path.file_name(), acc);

        let zip_url = loop {
            ctx.checkpoint().await;
            let this = self.as_client();
            let acc_owned = acc.clone();
            match tokio::task::spawn_blocking(move || this.poll_once(&acc_owned))
                .await
                .map_err(|e| AdapterError::Tool(format!("Poll worker panicked: {}", e)))??
            {
                PollOutcome::Complete { zip_url } => break zip_url,
                PollOutcome::Pending => tokio::time::sleep(self.poll_interval).await,
            }
        };

        let stem = fasta_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| acc.clone());
        let zip_path = self.dirs.phastest_dir().join(format!("{}.PHASTEST.zip", stem));
        let this = self.as_client();
        let dest = zip_path.clone();
        tokio::task::spawn_blocking(move || this.download_zip(&zip_url, &dest))
            .await
            .map_err(|e| AdapterError::Tool(format!("Download worker panicked: {}", e)))??;

        Ok(zip_path)
    }

    fn as_client(&self) -> PhastestAdapter {
        PhastestAdapter {
            api_url: self.api_url.clone(),
            poll_interval: self.poll_interval,
            dirs: self.dirs.clone(),
        }
    }
}

fn normalize_zip_url(zip: &str) -> String {
    if zip.starts_with("http") {
        zip.to_string()
    } else {
        format!("https://{}", zip)
    }
}

#[async_trait]
impl Adapter for PhastestAdapter {
    fn validate(&self, input: &AdapterInput) -> Result<(), AdapterError> {
        require_genomes(input)
    }

    async fn run(&self, input: AdapterInput, ctx: &JobContext) -> Result<JobResult, AdapterError> {
        let genomes = input.genomes().to_vec();
        let total = genomes.len();

        let job_dir = self.dirs.job_dir(ctx.job_id());
        fs::create_dir_all(&job_dir)?;
        fs::create_dir_all(self.dirs.phastest_dir())?;

        let mut zip_paths = Vec::new();
        let mut summary_rows = Vec::new();

        for (i, genome) in genomes.iter().enumerate() {
            ctx.checkpoint().await;
            match self.screen_genome(&genome.url, ctx).await {
                Ok(zip_path) => {
                    summary_rows.push(vec![
                        genome.file_stem(),
                        zip_path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default(),
                        "completed".to_string(),
                    ]);
                    zip_paths.push(zip_path);
                }
                Err(e) => {
                    log::warn!("PHASTEST failed for {}: {}", genome.url, e);
                    summary_rows.push(vec![genome.file_stem(), String::new(), format!("failed: {}", e)]);
                }
            }
            ctx.set_progress((10 + 80 * (i + 1) / total.max(1)) as u8);
        }

        if zip_paths.is_empty() {
            return Err(AdapterError::Tool(format!(
                "PHASTEST produced no results for {} genomes",
                total
            )));
        }

        let csv_path = job_dir.join("phastest_results.csv");
        let mut writer = BufWriter::new(fs::File::create(&csv_path)?);
        write_row(
            &mut writer,
            &["GENOME".to_string(), "ZIP_FILE".to_string(), "STATUS".to_string()],
        )?;
        for row in &summary_rows {
            write_row(&mut writer, row)?;
        }
        drop(writer);

        let mut artifacts = vec![ArtifactRef {
            kind: FileKind::PhastestCsv,
            path: csv_path.to_string_lossy().to_string(),
        }];

        let bundle_path = job_dir.join(format!("phastest_results_{}.zip", ctx.job_id()));
        zip_files(&zip_paths, &bundle_path)?;
        artifacts.push(ArtifactRef {
            kind: FileKind::PhastestZip,
            path: bundle_path.to_string_lossy().to_string(),
        });

        Ok(JobResult::Analysis {
            artifacts,
            message: format!("PHASTEST analysis completed for {} genomes", total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zip_url() {
        assert_eq!(
            normalize_zip_url("phastest.ca/jobs/x.zip"),
            "https://phastest.ca/jobs/x.zip"
        );
        assert_eq!(
            normalize_zip_url("https://phastest.ca/jobs/x.zip"),
            "https://phastest.ca/jobs/x.zip"
        );
    }

    #[test]
    fn test_validate_rejects_empty_list() {
        let tmp = tempfile::tempdir().unwrap();
        let adapter = PhastestAdapter::new(
            "https://example".to_string(),
            Duration::from_secs(1),
            DataDirs::new(tmp.path().to_path_buf()),
        );
        assert!(adapter.validate(&AdapterInput::Genomes(vec![])).is_err());
    }
}
