// FASTA retrieval helpers
// Assemblies come down as gzipped `.fna.gz`; tools downstream want a clean
// uncompressed file whose first line is a `>` header. The work pool is
// shared between concurrent jobs, so files appear atomically (staged under
// a unique name, renamed into place) and a finished `.fna` is never
// rewritten.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::AdapterError;

/// Download a gzipped genomic FASTA and leave the decompressed, normalized
/// `.fna` next to it in `output_dir`. Re-uses an already downloaded archive
/// and an already decompressed FASTA as-is. Blocking; callers inside the
/// runtime wrap this in `spawn_blocking`.
pub fn download_and_decompress_fasta(url: &str, output_dir: &Path) -> Result<PathBuf, AdapterError> {
    fs::create_dir_all(output_dir)?;

    let gz_name = url
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AdapterError::InvalidInput(format!("Not a usable FASTA URL: {}", url)))?;
    let gz_path = output_dir.join(gz_name);
    let fasta_path = gz_path.with_extension("");

    // Another job's external tool may be reading this file right now
    if fasta_path.exists() {
        return Ok(fasta_path);
    }

    if !gz_path.exists() {
        let staging = staging_path(&gz_path);
        if let Err(e) = fetch_to_file(url, &staging) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        fs::rename(&staging, &gz_path)?;
    }

    let mut decoder = GzDecoder::new(File::open(&gz_path)?);
    let mut content = String::new();
    if let Err(e) = decoder.read_to_string(&mut content) {
        // Partial or corrupt download; drop it so a retry starts clean
        let _ = fs::remove_file(&gz_path);
        return Err(AdapterError::Tool(format!(
            "Downloaded file is not a valid gzip: {:?}: {}",
            gz_path, e
        )));
    }

    let cleaned = normalize_fasta(&content)
        .ok_or_else(|| AdapterError::Tool(format!("No FASTA header found in {:?}", gz_path)))?;

    let staging = staging_path(&fasta_path);
    if let Err(e) = fs::write(&staging, cleaned.as_bytes()) {
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }
    fs::rename(&staging, &fasta_path)?;

    Ok(fasta_path)
}

/// A unique sibling name for in-progress writes. Hidden and extensionless
/// as far as the pool scanners are concerned.
fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    dest.with_file_name(format!(".{}.{}", name, uuid::Uuid::new_v4()))
}

fn fetch_to_file(url: &str, path: &Path) -> Result<(), AdapterError> {
    let response = ureq::get(url)
        .timeout(std::time::Duration::from_secs(60))
        .call()
        .map_err(|e| AdapterError::Upstream(format!("Failed to download {}: {}", url, e)))?;

    let mut reader = response.into_reader();
    let mut file = File::create(path)?;
    std::io::copy(&mut reader, &mut file)?;
    Ok(())
}

/// Strip a BOM and anything before the first `>` header, trim line endings,
/// and force `\n` separators. Returns `None` when no header exists at all.
pub fn normalize_fasta(content: &str) -> Option<String> {
    let content = content.trim_start_matches('\u{feff}');
    let lines: Vec<&str> = content.lines().map(|l| l.trim()).collect();
    let header_index = lines.iter().position(|l| l.starts_with('>'))?;

    let mut cleaned = String::with_capacity(content.len());
    for line in &lines[header_index..] {
        cleaned.push_str(line);
        cleaned.push('\n');
    }
    Some(cleaned)
}
