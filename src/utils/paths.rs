use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static APP_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Root data directory. `GENOLAB_DATA_DIR` overrides the platform default.
pub fn get_app_data_dir() -> PathBuf {
    APP_DATA_DIR
        .get_or_init(|| {
            if let Ok(dir) = std::env::var("GENOLAB_DATA_DIR") {
                return PathBuf::from(dir);
            }
            let base_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
            base_dir.join("Genolab")
        })
        .clone()
}

/// Directory layout under one data root. Components hold a `DataDirs` value
/// instead of calling the global getter so tests can point them at a
/// scratch directory.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn from_env() -> Self {
        Self::new(get_app_data_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn settings_json_path(&self) -> PathBuf {
        self.data_dir().join("settings.json")
    }

    /// Per-job artifact namespace.
    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_dir().join(job_id)
    }

    /// Shared FASTA work pool for ResFinder runs; also the source of the
    /// PHASTEST fallback bundle.
    pub fn resfinder_dir(&self) -> PathBuf {
        self.root.join("resfinder_results")
    }

    /// Downloaded `.PHASTEST.zip` pool.
    pub fn phastest_dir(&self) -> PathBuf {
        self.root.join("phastest_results")
    }

    pub fn vfdb_dir(&self) -> PathBuf {
        self.root.join("vfdb_results")
    }

    /// Fresh time-scoped namespace for a manual-submission FASTA bundle.
    pub fn temp_fasta_dir(&self, unix_ts: i64) -> PathBuf {
        self.root.join(format!("temp_fasta_{}", unix_ts))
    }

    pub fn temp_fasta_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                if path.is_dir() && name.starts_with("temp_fasta_") {
                    dirs.push(path);
                }
            }
        }
        dirs
    }

    pub fn initialize(&self) -> Result<(), String> {
        let directories = [
            self.data_dir(),
            self.jobs_dir(),
            self.resfinder_dir(),
            self.phastest_dir(),
            self.vfdb_dir(),
        ];

        for dir in &directories {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("Failed to create directory {:?}: {}", dir, e))?;
                log::info!("Created directory: {:?}", dir);
            }
        }

        Ok(())
    }
}
