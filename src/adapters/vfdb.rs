// VFDB virulence-factor screening
// Downloads each genome, runs the external screening tool (abricate against
// the VFDB database), aggregates a gene presence matrix and hands it to the
// external Excel formatter for the final workbook.

use std::collections::BTreeSet;
use std::fs;
use std::io::BufWriter;
use std::path::Path;

use async_trait::async_trait;

use crate::adapters::{require_genomes, tool, Adapter, AdapterInput, JobContext};
use crate::error::AdapterError;
use crate::models::{ArtifactRef, FileKind, JobResult};
use crate::utils::csv::write_row;
use crate::utils::fasta::download_and_decompress_fasta;
use crate::utils::DataDirs;

pub struct VfdbAdapter {
    command: Vec<String>,
    formatter_command: Vec<String>,
    dirs: DataDirs,
}

struct GenomeScreen {
    name: String,
    genus: String,
    size_kb: f64,
    gc_pct: f64,
    genes: BTreeSet<String>,
}

impl VfdbAdapter {
    pub fn new(command: Vec<String>, formatter_command: Vec<String>, dirs: DataDirs) -> Self {
        Self {
            command,
            formatter_command,
            dirs,
        }
    }

    async fn screen_genome(
        &self,
        url: &str,
        provided_genus: &str,
        work_dir: &Path,
    ) -> Result<GenomeScreen, AdapterError> {
        let url_owned = url.to_string();
        let work = work_dir.to_path_buf();
        let fasta_path =
            tokio::task::spawn_blocking(move || download_and_decompress_fasta(&url_owned, &work))
                .await
                .map_err(|e| AdapterError::Tool(format!("Download worker panicked: {}", e)))??;

        let stem = fasta_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "genome".to_string());
        let tsv_path = work_dir.join(format!("{}_vfdb.tsv", stem));

        let args = vec![
            fasta_path.to_string_lossy().to_string(),
            "-o".to_string(),
            tsv_path.to_string_lossy().to_string(),
        ];
        tool::run_tool(&self.command, &args).await?;

        let content = fs::read_to_string(&fasta_path)?;
        let (size_kb, gc_pct) = calc_kb_gc(&content);
        let genus = if provided_genus.is_empty() || provided_genus == "Unknown" {
            genus_from_fasta(&content)
        } else {
            provided_genus.to_string()
        };

        let tsv = fs::read_to_string(&tsv_path)?;
        let genes = parse_abricate_genes(&tsv);

        Ok(GenomeScreen {
            name: stem,
            genus,
            size_kb,
            gc_pct,
            genes,
        })
    }
}

/// Genome size in kilobases and GC percentage, straight off the sequence.
fn calc_kb_gc(fasta: &str) -> (f64, f64) {
    let mut bases: u64 = 0;
    let mut gc: u64 = 0;
    for line in fasta.lines() {
        if line.starts_with('>') {
            continue;
        }
        let seq = line.trim().to_ascii_uppercase();
        bases += seq.len() as u64;
        gc += seq.chars().filter(|c| *c == 'G' || *c == 'C').count() as u64;
    }
    if bases == 0 {
        return (0.0, 0.0);
    }
    let kb = (bases as f64 / 1000.0 * 10.0).round() / 10.0;
    let gc_pct = (gc as f64 / bases as f64 * 100.0 * 100.0).round() / 100.0;
    (kb, gc_pct)
}

fn genus_from_fasta(fasta: &str) -> String {
    for line in fasta.lines() {
        if let Some(header) = line.strip_prefix('>') {
            let mut parts = header.split_whitespace();
            let _accession = parts.next();
            return parts.next().unwrap_or("").to_string();
        }
    }
    String::new()
}

/// Gene column of an abricate TSV (header line starts with '#').
fn parse_abricate_genes(tsv: &str) -> BTreeSet<String> {
    let mut genes = BTreeSet::new();
    for line in tsv.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if let Some(gene) = fields.get(5) {
            if !gene.is_empty() {
                genes.insert(gene.to_string());
            }
        }
    }
    genes
}

fn write_matrix_csv(path: &Path, rows: &[GenomeScreen]) -> Result<(), AdapterError> {
    let mut all_genes = BTreeSet::new();
    for row in rows {
        all_genes.extend(row.genes.iter().cloned());
    }

    let mut writer = BufWriter::new(fs::File::create(path)?);
    let mut header = vec![
        "GENOME".to_string(),
        "GENUS".to_string(),
        "SIZE_KB".to_string(),
        "GC_PCT".to_string(),
    ];
    header.extend(all_genes.iter().cloned());
    write_row(&mut writer, &header)?;

    for row in rows {
        let mut fields = vec![
            row.name.clone(),
            row.genus.clone(),
            format!("{}", row.size_kb),
            format!("{}", row.gc_pct),
        ];
        for gene in &all_genes {
            fields.push(if row.genes.contains(gene) {
                "+".to_string()
            } else {
                String::new()
            });
        }
        write_row(&mut writer, &fields)?;
    }

    Ok(())
}

#[async_trait]
impl Adapter for VfdbAdapter {
    fn validate(&self, input: &AdapterInput) -> Result<(), AdapterError> {
        require_genomes(input)
    }

    async fn run(&self, input: AdapterInput, ctx: &JobContext) -> Result<JobResult, AdapterError> {
        let genomes = input.genomes().to_vec();
        let total = genomes.len();

        let work_dir = self.dirs.vfdb_dir().join(ctx.job_id());
        fs::create_dir_all(&work_dir)?;
        let job_dir = self.dirs.job_dir(ctx.job_id());
        fs::create_dir_all(&job_dir)?;

        let mut rows = Vec::with_capacity(total);
        let mut failures = 0usize;
        let mut first_error = None;

        for (i, genome) in genomes.iter().enumerate() {
            ctx.checkpoint().await;
            match self.screen_genome(&genome.url, &genome.genus, &work_dir).await {
                Ok(screen) => rows.push(screen),
                Err(e) => {
                    log::warn!("VFDB screening failed for {}: {}", genome.url, e);
                    failures += 1;
                    if first_error.is_none() {
                        first_error = Some(e.to_string());
                    }
                }
            }
            ctx.set_progress((10 + 70 * (i + 1) / total.max(1)) as u8);
        }

        if failures == total {
            return Err(AdapterError::Tool(format!(
                "VFDB screening failed for all {} genomes; first error: {}",
                total,
                first_error.unwrap_or_default()
            )));
        }

        let matrix_path = work_dir.join("vfdb_matrix.csv");
        write_matrix_csv(&matrix_path, &rows)?;
        ctx.set_progress(90);

        // The workbook layout (category grouping, coloring) lives in the
        // external formatter
        let xlsx_path = job_dir.join("vfdb_results.xlsx");
        let args = vec![
            matrix_path.to_string_lossy().to_string(),
            xlsx_path.to_string_lossy().to_string(),
        ];
        tool::run_tool(&self.formatter_command, &args).await?;

        if !xlsx_path.exists() {
            return Err(AdapterError::Tool(
                "VFDB formatter did not produce an output workbook".to_string(),
            ));
        }

        Ok(JobResult::Analysis {
            artifacts: vec![ArtifactRef {
                kind: FileKind::VfdbXlsx,
                path: xlsx_path.to_string_lossy().to_string(),
            }],
            message: format!("VFDB analysis completed for {} genomes", total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calc_kb_gc() {
        let fasta = ">g test\nGGCC\nAATT\n";
        let (kb, gc) = calc_kb_gc(fasta);
        assert_eq!(kb, 0.0); // 8 bases rounds to 0.0 kb
        assert_eq!(gc, 50.0);

        let (kb, _) = calc_kb_gc(&format!(">g\n{}\n", "ACGT".repeat(500)));
        assert_eq!(kb, 2.0);
    }

    #[test]
    fn test_parse_abricate_genes() {
        let tsv = "\
#FILE\tSEQUENCE\tSTART\tEND\tSTRAND\tGENE\tCOVERAGE\tCOVERAGE_MAP\tGAPS\t%COVERAGE\t%IDENTITY\tDATABASE\tACCESSION\tPRODUCT\tRESISTANCE
g.fna\tcontig_1\t100\t900\t+\tfimH\t1-801/801\t===============\t0/0\t100.00\t99.88\tvfdb\tNC_1\tfimbrial adhesin\t
g.fna\tcontig_2\t10\t800\t-\thlyA\t1-790/790\t===============\t0/0\t100.00\t98.10\tvfdb\tNC_2\themolysin\t
";
        let genes = parse_abricate_genes(tsv);
        assert_eq!(genes, BTreeSet::from(["fimH".to_string(), "hlyA".to_string()]));
    }

    #[test]
    fn test_matrix_csv_marks_presence() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("matrix.csv");
        let rows = vec![
            GenomeScreen {
                name: "g1".to_string(),
                genus: "Escherichia".to_string(),
                size_kb: 5100.5,
                gc_pct: 50.2,
                genes: BTreeSet::from(["fimH".to_string()]),
            },
            GenomeScreen {
                name: "g2".to_string(),
                genus: "Shigella".to_string(),
                size_kb: 4700.0,
                gc_pct: 49.1,
                genes: BTreeSet::from(["hlyA".to_string()]),
            },
        ];
        write_matrix_csv(&path, &rows).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "GENOME,GENUS,SIZE_KB,GC_PCT,fimH,hlyA");
        assert_eq!(lines[1], "g1,Escherichia,5100.5,50.2,+,");
        assert_eq!(lines[2], "g2,Shigella,4700,49.1,,+");
    }
}
