// Job data models
use serde::{Deserialize, Serialize};

/// Which pipeline a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FetchGenomes,
    Resfinder,
    Phastest,
    Vfdb,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FetchGenomes => "fetch_genomes",
            JobType::Resfinder => "resfinder",
            JobType::Phastest => "phastest",
            JobType::Vfdb => "vfdb",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Legal moves along the lifecycle. Terminal states are absorbing.
    /// An uninterruptible invocation may finish while a stop request is
    /// pending, so paused jobs can still reach a terminal state.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Completed)
                | (Paused, Failed)
        )
    }
}

/// File kinds a completed job can be asked for. The variants double as the
/// `file_type` path parameter of the download endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    ResfinderCsv,
    PhastestCsv,
    PhastestZip,
    VfdbXlsx,
}

impl FileKind {
    pub fn parse(s: &str) -> Option<FileKind> {
        match s {
            "resfinder_csv" => Some(FileKind::ResfinderCsv),
            "phastest_csv" => Some(FileKind::PhastestCsv),
            "phastest_zip" => Some(FileKind::PhastestZip),
            "vfdb_xlsx" | "vfdb_excel" => Some(FileKind::VfdbXlsx),
            _ => None,
        }
    }

    /// Filename offered to the client, derived from the kind (and job id for
    /// the PHASTEST bundle).
    pub fn download_name(&self, job_id: &str) -> String {
        match self {
            FileKind::ResfinderCsv => "resfinder_results.csv".to_string(),
            FileKind::PhastestCsv => "phastest_results.csv".to_string(),
            FileKind::PhastestZip => format!("phastest_results_{}.zip", job_id),
            FileKind::VfdbXlsx => "vfdb_results.xlsx".to_string(),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            FileKind::ResfinderCsv | FileKind::PhastestCsv => "text/csv",
            FileKind::PhastestZip => "application/zip",
            FileKind::VfdbXlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

/// A produced file, owned by the job that made it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: FileKind,
    pub path: String,
}

/// Job-type-specific payload stored on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobResult {
    Genomes {
        genomes: Vec<crate::models::GenomeRecord>,
        count: usize,
    },
    Analysis {
        artifacts: Vec<ArtifactRef>,
        message: String,
    },
}

impl JobResult {
    pub fn artifact(&self, kind: FileKind) -> Option<&ArtifactRef> {
        match self {
            JobResult::Analysis { artifacts, .. } => artifacts.iter().find(|a| a.kind == kind),
            JobResult::Genomes { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8, // 0-100
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl Job {
    pub fn new(job_id: String, job_type: JobType) -> Self {
        Self {
            job_id,
            job_type,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&JobType::FetchGenomes).unwrap(),
            "\"fetch_genomes\""
        );
        assert_eq!(
            serde_json::to_string(&FileKind::VfdbXlsx).unwrap(),
            "\"vfdb_xlsx\""
        );
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        use JobStatus::*;
        for terminal in [Completed, Failed] {
            for next in [Pending, Running, Paused, Completed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_lifecycle_edges() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Paused));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Paused.can_transition_to(Running));
        assert!(Paused.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Paused));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Pending));
    }

    #[test]
    fn test_file_kind_parse_and_names() {
        assert_eq!(FileKind::parse("resfinder_csv"), Some(FileKind::ResfinderCsv));
        assert_eq!(FileKind::parse("vfdb_excel"), Some(FileKind::VfdbXlsx));
        assert_eq!(FileKind::parse("bogus"), None);
        assert_eq!(
            FileKind::PhastestZip.download_name("abc"),
            "phastest_results_abc.zip"
        );
        assert_eq!(FileKind::VfdbXlsx.download_name("abc"), "vfdb_results.xlsx");
    }
}
