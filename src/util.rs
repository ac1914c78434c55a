use crate::path_type::PathType;
use anyhow::{Context, Result, bail};
use log::info;
use rust_htslib::bam::{Read, Reader};
use std::io::{self, Write};
use std::num::NonZero;
use std::path::{Path, PathBuf};

/// Get a BAM reader (also reads SAM and CRAM). Set threads for reading.
pub fn get_bam_reader<P1, P2>(
    input: P1,
    reference_fasta: Option<P2>,
    threads: NonZero<usize>,
) -> Result<Reader>
where
    P1: AsRef<Path>,
    P2: AsRef<Path>,
{
    let mut reader = match PathType::from_path(&input) {
        PathType::Pipe => Reader::from_stdin(),
        PathType::FilePath(file_path) => Reader::from_path(&file_path)
            .with_context(|| format!("cannot open input {}", file_path.display())),
    }?;
    reader.set_threads(threads.into())?;
    if let Some(fasta) = reference_fasta {
        reader.set_reference(fasta)?;
    }
    Ok(reader)
}

/// Ensure the output directory exists, prompting the user for confirmation before reusing one
/// that already exists (its contents, including any stale `tmp/` run files, would be mixed in
/// with this run's output).
///
/// Returns `true` if the run should proceed.
pub fn prepare_output_dir(prefix: &Path, assume_yes: bool) -> Result<bool> {
    if !prefix.exists() {
        std::fs::create_dir_all(prefix)
            .with_context(|| format!("cannot create output directory {}", prefix.display()))?;
        return Ok(true);
    }
    if !prefix.is_dir() {
        bail!("output prefix {} exists and is not a directory", prefix.display());
    }
    if assume_yes {
        info!("reusing existing output directory {}", prefix.display());
        return Ok(true);
    }
    print!(
        "Output directory {} already exists. Continue and reuse it? [y/N] ",
        prefix.display()
    );
    io::stdout().flush().ok();
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Files directly inside `dir`, sorted by file name so directory order is deterministic across
/// platforms and file systems. Dot-entries (hidden files, and the "." / ".." pseudo-entries a
/// listing can otherwise surface) are skipped.
pub fn sorted_dir_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot list directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| !matches!(path.file_name().and_then(|n| n.to_str()), Some(name) if name.starts_with('.')))
        .collect();
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prepare_output_dir_creates_missing_directory() {
        let base = TempDir::new().unwrap();
        let target = base.path().join("out");
        assert!(prepare_output_dir(&target, false).unwrap());
        assert!(target.is_dir());
    }

    #[test]
    fn prepare_output_dir_assume_yes_skips_prompt() {
        let base = TempDir::new().unwrap();
        assert!(prepare_output_dir(base.path(), true).unwrap());
    }

    #[test]
    fn sorted_dir_entries_are_alphabetical() {
        let base = TempDir::new().unwrap();
        for name in ["chunk00002.bam", "chunk00000.bam", "chunk00001.bam"] {
            std::fs::write(base.path().join(name), b"").unwrap();
        }
        let entries = sorted_dir_entries(base.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["chunk00000.bam", "chunk00001.bam", "chunk00002.bam"]);
    }

    #[test]
    fn sorted_dir_entries_skip_dot_entries() {
        let base = TempDir::new().unwrap();
        std::fs::write(base.path().join("chunk00000.bam"), b"").unwrap();
        std::fs::write(base.path().join(".lock"), b"").unwrap();
        let entries = sorted_dir_entries(base.path()).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["chunk00000.bam"]);
    }
}
