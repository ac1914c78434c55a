use crate::metadata::{Metadata, sanitize_label};
use crate::sam_writer_spec::SamWriterSpec;
use anyhow::{Context, Result};
use rust_htslib::bam::{Format, Header, Writer};
use std::collections::HashMap;
use std::num::NonZero;
use std::path::{Path, PathBuf};

/// Set of per-label BAM writers, rooted at `prefix`.
///
/// Built once at startup by iterating the CBC→label metadata table and, for each label not yet
/// seen, opening `<prefix><sanitized-label>.bam` and writing `header` into it. A label reached
/// through more than one barcode only ever gets a single stream.
pub struct LabelRegistry {
    writers: HashMap<String, Writer>,
}

impl LabelRegistry {
    pub fn open(prefix: &Path, header: &Header, threads: NonZero<usize>, metadata: &Metadata) -> Result<Self> {
        let mut writers = HashMap::new();
        for label in metadata.distinct_labels() {
            if writers.contains_key(label) {
                continue;
            }
            let path = PathBuf::from(format!("{}{}.bam", prefix.to_string_lossy(), sanitize_label(label)));
            let mut spec = SamWriterSpec::new(path.clone());
            spec.header(header.clone()).format(Format::Bam).threads(threads);
            let writer = spec
                .get_bam_writer()
                .with_context(|| format!("cannot open output BAM for label {label:?} at {}", path.display()))?;
            writers.insert(label.to_string(), writer);
        }
        Ok(LabelRegistry { writers })
    }

    /// Writer for `label`, or `None` if no such label was present in the metadata table this
    /// registry was built from. A CBC resolving to such a label is dropped silently by the
    /// caller; the metadata is authoritative.
    pub fn writer_for(&mut self, label: &str) -> Option<&mut Writer> {
        self.writers.get_mut(label)
    }

    pub fn labels_opened(&self) -> usize {
        self.writers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn blank_header() -> Header {
        Header::new()
    }

    fn metadata_with(pairs: &[(&str, &str)]) -> Metadata {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.csv");
        let mut contents = String::from("cbc,label\n");
        for (cbc, label) in pairs {
            contents.push_str(&format!("{cbc},{label}\n"));
        }
        fs::write(&path, contents).unwrap();
        Metadata::load(&path).unwrap()
    }

    #[test]
    fn open_creates_one_stream_per_distinct_label() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("prefix_");
        let metadata = metadata_with(&[("AAAA", "sampleA"), ("CCCC", "sampleA"), ("GGGG", "sampleB")]);
        let registry = LabelRegistry::open(&prefix, &blank_header(), NonZero::new(1).unwrap(), &metadata).unwrap();
        assert_eq!(registry.labels_opened(), 2);
    }

    #[test]
    fn open_eagerly_creates_files_before_any_record_is_routed() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("prefix_");
        let metadata = metadata_with(&[("AAAA", "sampleA")]);
        LabelRegistry::open(&prefix, &blank_header(), NonZero::new(1).unwrap(), &metadata).unwrap();
        assert!(dir.path().join("prefix_sampleA.bam").exists());
    }

    #[test]
    fn open_sanitizes_slash_in_label() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("prefix_");
        let metadata = metadata_with(&[("AAAA", "group/1")]);
        LabelRegistry::open(&prefix, &blank_header(), NonZero::new(1).unwrap(), &metadata).unwrap();
        assert!(dir.path().join("prefix_group-1.bam").exists());
    }

    #[test]
    fn writer_for_unknown_label_is_none() {
        let dir = TempDir::new().unwrap();
        let prefix = dir.path().join("prefix_");
        let metadata = metadata_with(&[("AAAA", "sampleA")]);
        let mut registry = LabelRegistry::open(&prefix, &blank_header(), NonZero::new(1).unwrap(), &metadata).unwrap();
        assert!(registry.writer_for("sampleB").is_none());
    }
}
