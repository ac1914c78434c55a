use anyhow::{Context, Result, anyhow, bail};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Cell barcode to output-label mapping loaded from the metadata CSV.
///
/// The CSV's first line is a header and is always skipped; every subsequent line must have
/// exactly two comma-separated fields, `cell_barcode,label`.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    labels: HashMap<String, String>,
    /// Distinct labels in first-seen file order, so the label registry opens output files in a
    /// deterministic sequence regardless of the backing map's iteration order.
    distinct_labels: Vec<String>,
}

impl Metadata {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("cannot open metadata file {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        // Header line, always skipped.
        lines
            .next()
            .ok_or_else(|| anyhow!("metadata file {} is empty", path.display()))??;

        let mut labels = HashMap::new();
        let mut distinct_labels: Vec<String> = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != 2 {
                bail!(
                    "metadata file {} line {} has {} fields but exactly 2 are expected",
                    path.display(),
                    line_no + 2,
                    fields.len()
                );
            }
            let (cbc, label) = (fields[0], fields[1]);
            if !distinct_labels.iter().any(|seen| seen == label) {
                distinct_labels.push(label.to_string());
            }
            labels.insert(cbc.to_string(), label.to_string());
        }
        Ok(Metadata { labels, distinct_labels })
    }

    /// Output label for a cell barcode, or `None` if the barcode is not in the metadata table.
    pub fn label_for(&self, cbc: &str) -> Option<&str> {
        self.labels.get(cbc).map(String::as_str)
    }

    /// Every distinct label present in the metadata table, in first-seen file order.
    pub fn distinct_labels(&self) -> Vec<&str> {
        self.distinct_labels.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Output file name for a label: slashes are replaced with hyphens so labels never imply
/// subdirectories that do not exist.
pub fn sanitize_label(label: &str) -> String {
    label.replace('/', "-")
}
