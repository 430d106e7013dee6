// Settings data models
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub port: u16,
    pub phastest_api_url: String,
    /// Seconds between PHASTEST job status polls.
    pub phastest_poll_secs: u64,
    pub ncbi_base_url: String,
    #[serde(default)]
    pub ncbi_api_key: Option<String>,
    /// External tool invocations; first element is the program, the rest are
    /// leading arguments. Input/output paths are appended by the adapters.
    pub resfinder_command: Vec<String>,
    pub vfdb_command: Vec<String>,
    pub vfdb_formatter_command: Vec<String>,
    /// Days to keep temporary work files before the sweep removes them.
    pub temp_retention_days: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 5000,
            phastest_api_url: String::from("https://phastest.ca/phastest_api"),
            phastest_poll_secs: 30,
            ncbi_base_url: String::from("https://eutils.ncbi.nlm.nih.gov/entrez/eutils"),
            ncbi_api_key: None,
            resfinder_command: vec![
                String::from("python"),
                String::from("resfinder/src/resfinder/run_resfinder.py"),
            ],
            vfdb_command: vec![String::from("abricate"), String::from("--db"), String::from("vfdb")],
            vfdb_formatter_command: vec![
                String::from("python"),
                String::from("tools/vfdb_excel_formatter.py"),
            ],
            temp_retention_days: 7,
        }
    }
}
