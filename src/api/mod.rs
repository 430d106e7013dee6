// HTTP surface
// Thin JSON layer over the executor, registry and artifact store. Handlers
// never run adapter work themselves; submissions return a job id right away
// and everything slow happens on the spawned job task.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::adapters::{phastest, AdapterInput};
use crate::artifacts::{ArtifactStore, NamedBytes};
use crate::error::ApiError;
use crate::executor::JobExecutor;
use crate::models::{FileKind, GenomeRecord, Job, JobType, Settings};
use crate::registry::JobRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub executor: Arc<JobExecutor>,
    pub artifacts: Arc<ArtifactStore>,
    pub settings: Settings,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/fetch-genomes", post(fetch_genomes))
        .route("/run-resfinder", post(run_resfinder))
        .route("/run-phastest", post(run_phastest))
        .route("/run-vfdb", post(run_vfdb))
        .route("/job-status/:job_id", get(job_status))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id/stop", post(stop_job))
        .route("/jobs/:job_id/resume", post(resume_job))
        .route("/download/:job_id/:file_type", get(download_artifact))
        .route("/phastest-status", get(phastest_status))
        .route("/phastest-zip-files", get(phastest_zip_files))
        .route("/temp-fasta-zip-files", get(temp_fasta_zip_files))
        .route(
            "/download-temp-fasta-zip/:dir/:filename",
            get(download_temp_fasta_zip),
        )
        .route(
            "/download-resfinder-fasta-zip",
            get(download_resfinder_fasta_zip),
        )
        .route("/download-fasta-files", post(download_fasta_files))
        .route("/cleanup/:job_id", delete(cleanup_job))
        .route("/cleanup-files", post(cleanup_files))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct FetchGenomesRequest {
    #[serde(default)]
    bioproject_id: String,
}

#[derive(Debug, Deserialize)]
struct AnalysisRequest {
    #[serde(default)]
    genome_urls: Vec<GenomeRecord>,
}

fn submitted(job: Job) -> Json<serde_json::Value> {
    Json(json!({ "job_id": job.job_id, "status": job.status }))
}

fn attachment(named: NamedBytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, named.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", named.filename),
            ),
        ],
        named.bytes,
    )
        .into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn fetch_genomes(
    State(state): State<AppState>,
    Json(request): Json<FetchGenomesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state.executor.submit(
        JobType::FetchGenomes,
        AdapterInput::Bioproject(request.bioproject_id),
    )?;
    Ok(submitted(job))
}

async fn run_resfinder(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .executor
        .submit(JobType::Resfinder, AdapterInput::Genomes(request.genome_urls))?;
    Ok(submitted(job))
}

/// The upstream probe runs before any job record exists; a down API answers
/// with the manual-submission fallback instructions instead of a job.
async fn run_phastest(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Response, ApiError> {
    if !phastest::probe_available(state.settings.phastest_api_url.clone()).await {
        let body = Json(json!({
            "status": "api_unavailable",
            "fallback_available": true,
            "instructions": "The PHASTEST API is currently unavailable. Download the FASTA \
                bundle via POST /download-fasta-files and submit it manually at phastest.ca.",
        }));
        return Ok((StatusCode::SERVICE_UNAVAILABLE, body).into_response());
    }

    let job = state
        .executor
        .submit(JobType::Phastest, AdapterInput::Genomes(request.genome_urls))?;
    Ok(submitted(job).into_response())
}

async fn run_vfdb(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let job = state
        .executor
        .submit(JobType::Vfdb, AdapterInput::Genomes(request.genome_urls))?;
    Ok(submitted(job))
}

async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state
        .registry
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))
}

async fn list_jobs(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "jobs": state.registry.list() }))
}

async fn stop_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state.executor.stop(&job_id).map(Json)
}

async fn resume_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    state.executor.resume(&job_id).map(Json)
}

async fn download_artifact(
    State(state): State<AppState>,
    Path((job_id, file_type)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let kind = FileKind::parse(&file_type)
        .ok_or_else(|| ApiError::Validation(format!("Unknown file type: {}", file_type)))?;
    let artifacts = state.artifacts.clone();
    let named = tokio::task::spawn_blocking(move || artifacts.get(&job_id, kind))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(attachment(named))
}

async fn phastest_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let available = phastest::probe_available(state.settings.phastest_api_url.clone()).await;
    Json(json!({
        "status": if available { "available" } else { "unavailable" }
    }))
}

async fn phastest_zip_files(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let artifacts = state.artifacts.clone();
    let files = tokio::task::spawn_blocking(move || artifacts.list_phastest_zips())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "zip_files": files })))
}

async fn temp_fasta_zip_files(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let artifacts = state.artifacts.clone();
    let files = tokio::task::spawn_blocking(move || artifacts.list_temp_fasta_zips())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({ "zip_files": files })))
}

async fn download_temp_fasta_zip(
    State(state): State<AppState>,
    Path((dir, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let artifacts = state.artifacts.clone();
    let named = tokio::task::spawn_blocking(move || artifacts.get_temp_fasta_zip(&dir, &filename))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(attachment(named))
}

/// Fallback bundle of every FASTA in the resfinder work pool, for manual
/// PHASTEST submission.
async fn download_resfinder_fasta_zip(
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let artifacts = state.artifacts.clone();
    let named = tokio::task::spawn_blocking(move || artifacts.bundle_pool_fastas())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(attachment(named))
}

/// Download the requested genomes into a fresh temp namespace, zip them and
/// stream the bundle back.
async fn download_fasta_files(
    State(state): State<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Response, ApiError> {
    let artifacts = state.artifacts.clone();
    let genomes = request.genome_urls;
    let bundle = tokio::task::spawn_blocking(move || artifacts.create_temp_fasta_bundle(&genomes))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let dir = bundle
        .dir
        .ok_or_else(|| ApiError::Internal("Bundle namespace missing".to_string()))?;
    let artifacts = state.artifacts.clone();
    let named =
        tokio::task::spawn_blocking(move || artifacts.get_temp_fasta_zip(&dir, &bundle.filename))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(attachment(named))
}

async fn cleanup_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.artifacts.delete_for_job(&job_id)?;
    state.executor.forget(&job_id);
    Ok(Json(json!({
        "message": format!("Job {} deleted", job_id),
        "status": "success",
    })))
}

async fn cleanup_files(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let artifacts = state.artifacts.clone();
    let max_age = Duration::from_secs(state.settings.temp_retention_days * 24 * 3600);
    let removed = tokio::task::spawn_blocking(move || artifacts.sweep_temp(max_age))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(json!({
        "message": format!("Removed {} stale entries", removed),
        "status": "success",
    })))
}
