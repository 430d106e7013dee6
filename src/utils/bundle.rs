// Zip bundling for FASTA sets and PHASTEST result pools

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Write `files` into a zip at `dest`, flattened to their basenames.
pub fn zip_files(files: &[PathBuf], dest: &Path) -> io::Result<()> {
    let mut writer = ZipWriter::new(File::create(dest)?);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        writer.start_file(name, options)?;
        let mut file = File::open(path)?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        writer.write_all(&buf)?;
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_zip_files_flattens_names() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("nested");
        fs::create_dir_all(&sub).unwrap();
        let a = sub.join("a.fna");
        let b = sub.join("b.fna");
        fs::write(&a, ">a\nACGT\n").unwrap();
        fs::write(&b, ">b\nTTTT\n").unwrap();

        let dest = tmp.path().join("bundle.zip");
        zip_files(&[a, b], &dest).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["a.fna", "b.fna"]);
    }
}
