// Genome assembly metadata, as returned by the NCBI fetch job and fed back
// in by clients when they submit an analysis.
use serde::{Deserialize, Serialize};

fn unknown() -> String {
    "Unknown".to_string()
}

/// One genome assembly. All fields are plain strings because the NCBI
/// esummary payload is stringly typed and clients round-trip these records
/// verbatim into analysis submissions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenomeRecord {
    /// HTTPS URL of the gzipped genomic FASTA.
    pub url: String,
    #[serde(default = "unknown")]
    pub genus: String,
    #[serde(default = "unknown")]
    pub species: String,
    #[serde(default = "unknown")]
    pub strain: String,
    #[serde(default)]
    pub organism: String,
    #[serde(default = "unknown")]
    pub assembly_accession: String,
    #[serde(default = "unknown")]
    pub assembly_name: String,
    #[serde(default = "unknown")]
    pub assembly_level: String,
    #[serde(default = "unknown")]
    pub taxonomy_id: String,
    #[serde(default = "unknown")]
    pub submitter: String,
    #[serde(default = "unknown")]
    pub submission_date: String,
    #[serde(default = "unknown")]
    pub contig_count: String,
    #[serde(default = "unknown")]
    pub genome_size: String,
    #[serde(default)]
    pub bioproject_id: String,
}

impl GenomeRecord {
    /// Best available name for files derived from this genome.
    pub fn file_stem(&self) -> String {
        if self.assembly_accession != "Unknown" && !self.assembly_accession.is_empty() {
            return self.assembly_accession.clone();
        }
        // Fall back to the basename of the FASTA URL
        self.url
            .rsplit('/')
            .next()
            .unwrap_or("genome")
            .trim_end_matches(".gz")
            .trim_end_matches(".fna")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_record_deserializes_with_defaults() {
        let record: GenomeRecord =
            serde_json::from_str(r#"{"url": "https://example.org/g/GCF_1_genomic.fna.gz"}"#)
                .unwrap();
        assert_eq!(record.genus, "Unknown");
        assert_eq!(record.strain, "Unknown");
        assert!(record.bioproject_id.is_empty());
    }

    #[test]
    fn test_file_stem_prefers_accession() {
        let mut record: GenomeRecord =
            serde_json::from_str(r#"{"url": "https://example.org/g/GCF_1_genomic.fna.gz"}"#)
                .unwrap();
        record.assembly_accession = "GCF_000123".to_string();
        assert_eq!(record.file_stem(), "GCF_000123");

        record.assembly_accession = "Unknown".to_string();
        assert_eq!(record.file_stem(), "GCF_1_genomic");
    }
}
