// Genolab: asynchronous job orchestration for genome analysis pipelines

pub mod adapters;
pub mod api;
pub mod artifacts;
pub mod error;
pub mod executor;
pub mod file_manager;
pub mod models;
pub mod registry;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use adapters::default_adapters;
use api::AppState;
use artifacts::ArtifactStore;
use executor::JobExecutor;
use file_manager::{initialize_json_file, read_json_file_or_default};
use models::Settings;
use registry::JobRegistry;
use utils::DataDirs;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

fn load_settings(dirs: &DataDirs) -> Result<Settings, String> {
    let path = dirs.settings_json_path();
    initialize_json_file(&path, &Settings::default())?;
    read_json_file_or_default(&path)
}

/// Wire the registry, executor, adapters and artifact store together.
pub fn build_state(settings: Settings, dirs: DataDirs) -> AppState {
    let registry = Arc::new(JobRegistry::new());
    let adapters = default_adapters(&settings, &dirs);
    let executor = Arc::new(JobExecutor::new(registry.clone(), adapters));
    let artifacts = Arc::new(ArtifactStore::new(registry.clone(), dirs));
    AppState {
        registry,
        executor,
        artifacts,
        settings,
    }
}

/// Hourly retention sweep over the temporary namespaces. The first tick
/// fires on boot, so stale files from a previous run go away immediately.
fn spawn_sweeper(artifacts: Arc<ArtifactStore>, retention_days: u64) {
    let max_age = Duration::from_secs(retention_days * 24 * 3600);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let artifacts = artifacts.clone();
            let removed = tokio::task::spawn_blocking(move || artifacts.sweep_temp(max_age))
                .await
                .unwrap_or(0);
            if removed > 0 {
                log::info!("Retention sweep removed {} stale entries", removed);
            }
        }
    });
}

pub async fn run() -> Result<(), String> {
    let dirs = DataDirs::from_env();
    dirs.initialize()?;
    let settings = load_settings(&dirs)?;
    log::info!("Data directory: {:?}", dirs.root());

    let state = build_state(settings.clone(), dirs);
    spawn_sweeper(state.artifacts.clone(), settings.temp_retention_days);

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
    log::info!("Listening on {}", addr);

    axum::serve(listener, api::router(state))
        .await
        .map_err(|e| format!("Server error: {}", e))
}
