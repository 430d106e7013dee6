// NCBI assembly metadata fetch (E-utilities, JSON mode)

use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::{Adapter, AdapterInput, JobContext};
use crate::error::AdapterError;
use crate::models::{GenomeRecord, JobResult};

#[derive(Clone)]
pub struct NcbiAdapter {
    base_url: String,
    api_key: Option<String>,
}

impl NcbiAdapter {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self { base_url, api_key }
    }

    fn esearch_assembly_ids(&self, bioproject_id: &str) -> Result<Vec<String>, AdapterError> {
        let mut request = ureq::get(&format!("{}/esearch.fcgi", self.base_url))
            .query("db", "assembly")
            .query("term", &format!("{}[BioProject]", bioproject_id))
            .query("retmax", "1000")
            .query("retmode", "json")
            .timeout(std::time::Duration::from_secs(120));
        if let Some(ref key) = self.api_key {
            request = request.query("api_key", key);
        }

        let body: Value = request
            .call()
            .map_err(|e| AdapterError::Upstream(format!("NCBI esearch failed: {}", e)))?
            .into_json()
            .map_err(|e| AdapterError::Upstream(format!("NCBI esearch returned bad JSON: {}", e)))?;

        let ids = body["esearchresult"]["idlist"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(ids)
    }

    fn esummary_genomes(
        &self,
        assembly_ids: &[String],
        bioproject_id: &str,
    ) -> Result<Vec<GenomeRecord>, AdapterError> {
        let mut request = ureq::get(&format!("{}/esummary.fcgi", self.base_url))
            .query("db", "assembly")
            .query("id", &assembly_ids.join(","))
            .query("retmode", "json")
            .timeout(std::time::Duration::from_secs(120));
        if let Some(ref key) = self.api_key {
            request = request.query("api_key", key);
        }

        let body: Value = request
            .call()
            .map_err(|e| AdapterError::Upstream(format!("NCBI esummary failed: {}", e)))?
            .into_json()
            .map_err(|e| {
                AdapterError::Upstream(format!("NCBI esummary returned bad JSON: {}", e))
            })?;

        let result = &body["result"];
        let uids = result["uids"].as_array().cloned().unwrap_or_default();

        let mut genomes = Vec::new();
        for uid in uids {
            let Some(uid) = uid.as_str() else { continue };
            let summary = &result[uid];
            if let Some(genome) = parse_assembly_summary(summary, bioproject_id) {
                genomes.push(genome);
            }
        }
        Ok(genomes)
    }
}

fn str_field(summary: &Value, key: &str) -> String {
    match summary[key].as_str() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "Unknown".to_string(),
    }
}

/// Build one record from an esummary document. Assemblies without an FTP
/// path are skipped, exactly like the upstream listing does.
fn parse_assembly_summary(summary: &Value, bioproject_id: &str) -> Option<GenomeRecord> {
    let refseq = summary["ftppath_refseq"].as_str().unwrap_or("");
    let genbank = summary["ftppath_genbank"].as_str().unwrap_or("");
    let ftp_path = if !refseq.is_empty() { refseq } else { genbank };
    if ftp_path.is_empty() {
        return None;
    }

    let ftp_path = if let Some(rest) = ftp_path.strip_prefix("ftp://") {
        format!("https://{}", rest)
    } else {
        ftp_path.to_string()
    };
    let assembly_dir = ftp_path.rsplit('/').next().unwrap_or("");
    let url = format!("{}/{}_genomic.fna.gz", ftp_path, assembly_dir);

    let organism = summary["organism"].as_str().unwrap_or("").to_string();
    // "Escherichia coli O157 (E. coli)" -> genus "Escherichia",
    // species "coli O157"
    let name_part = organism.split(" (").next().unwrap_or("");
    let parts: Vec<&str> = name_part.split_whitespace().collect();
    let genus = parts
        .first()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let species = if parts.len() > 1 {
        parts[1..parts.len().min(3)].join(" ")
    } else {
        "Unknown".to_string()
    };

    let strain = strain_from_summary(summary);

    let taxonomy_id = match &summary["taxid"] {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => "Unknown".to_string(),
    };

    Some(GenomeRecord {
        url,
        genus,
        species,
        strain,
        organism,
        assembly_accession: str_field(summary, "assemblyaccession"),
        assembly_name: str_field(summary, "assemblyname"),
        assembly_level: str_field(summary, "assemblystatus"),
        taxonomy_id,
        submitter: str_field(summary, "submitterorganization"),
        submission_date: str_field(summary, "submissiondate"),
        contig_count: str_field(summary, "contign50"),
        genome_size: str_field(summary, "genomesize"),
        bioproject_id: bioproject_id.to_string(),
    })
}

fn strain_from_summary(summary: &Value) -> String {
    if let Some(list) = summary["biosource"]["infraspecieslist"].as_array() {
        for entry in list {
            if entry["sub_type"].as_str() == Some("strain") {
                if let Some(value) = entry["sub_value"].as_str() {
                    if !value.is_empty() {
                        return value.to_string();
                    }
                }
            }
        }
    }
    str_field(summary, "strain")
}

#[async_trait]
impl Adapter for NcbiAdapter {
    fn validate(&self, input: &AdapterInput) -> Result<(), AdapterError> {
        match input {
            AdapterInput::Bioproject(id) if id.trim().is_empty() => Err(
                AdapterError::InvalidInput("BioProject ID is required".to_string()),
            ),
            AdapterInput::Bioproject(_) => Ok(()),
            AdapterInput::Genomes(_) => Err(AdapterError::InvalidInput(
                "Expected a BioProject ID".to_string(),
            )),
        }
    }

    async fn run(&self, input: AdapterInput, ctx: &JobContext) -> Result<JobResult, AdapterError> {
        let AdapterInput::Bioproject(bioproject_id) = input else {
            return Err(AdapterError::InvalidInput(
                "Expected a BioProject ID".to_string(),
            ));
        };

        ctx.checkpoint().await;

        let adapter = self.clone();
        let id = bioproject_id.clone();
        let assembly_ids = tokio::task::spawn_blocking(move || adapter.esearch_assembly_ids(&id))
            .await
            .map_err(|e| AdapterError::Tool(format!("Fetch worker panicked: {}", e)))??;

        if assembly_ids.is_empty() {
            return Err(AdapterError::NotFound(format!(
                "No assemblies found for BioProject {}",
                bioproject_id
            )));
        }
        ctx.set_progress(30);
        ctx.checkpoint().await;

        let adapter = self.clone();
        let id = bioproject_id.clone();
        let genomes =
            tokio::task::spawn_blocking(move || adapter.esummary_genomes(&assembly_ids, &id))
                .await
                .map_err(|e| AdapterError::Tool(format!("Fetch worker panicked: {}", e)))??;

        if genomes.is_empty() {
            return Err(AdapterError::NotFound(format!(
                "No downloadable assemblies for BioProject {}",
                bioproject_id
            )));
        }
        ctx.set_progress(90);

        let count = genomes.len();
        Ok(JobResult::Genomes { genomes, count })
    }
}
