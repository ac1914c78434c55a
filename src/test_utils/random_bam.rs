use anyhow::{Context, Result};
use rust_htslib::bam::header::HeaderRecord;
use rust_htslib::bam::record::{Aux, CigarString};
use rust_htslib::bam::{Format, Header, Record, Writer};
use std::path::{Path, PathBuf};

/// One record to materialize into a synthetic BAM file.
///
/// Covers the handful of fields the pipeline actually reads: query name, cell barcode, UMI,
/// mapping quality, and the primary/secondary flag. Everything else (sequence, cigar, position)
/// is a fixed placeholder, since no stage under test inspects it.
#[derive(Clone, Debug)]
pub struct ReadSpec {
    pub qname: String,
    pub cbc: Option<String>,
    pub umi: Option<String>,
    pub mapq: u8,
    pub secondary: bool,
    pub unmapped: bool,
}

impl ReadSpec {
    pub fn new(qname: impl Into<String>) -> Self {
        ReadSpec {
            qname: qname.into(),
            cbc: None,
            umi: None,
            mapq: 60,
            secondary: false,
            unmapped: false,
        }
    }

    pub fn cbc(mut self, cbc: impl Into<String>) -> Self {
        self.cbc = Some(cbc.into());
        self
    }

    pub fn umi(mut self, umi: impl Into<String>) -> Self {
        self.umi = Some(umi.into());
        self
    }

    pub fn mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    pub fn secondary(mut self) -> Self {
        self.secondary = true;
        self
    }

    pub fn unmapped(mut self) -> Self {
        self.unmapped = true;
        self
    }

    fn to_record(&self, tid: i32) -> Record {
        let mut record = Record::new();
        record.set(
            self.qname.as_bytes(),
            Some(&CigarString::try_from("4M").unwrap()),
            b"ACGT",
            &[30, 30, 30, 30],
        );
        if self.unmapped {
            record.set_unmapped();
        } else {
            record.set_tid(tid);
            record.set_pos(0);
            record.set_mapq(self.mapq);
        }
        if self.secondary {
            record.set_secondary();
        }
        if let Some(cbc) = &self.cbc {
            record.push_aux(b"CB", Aux::String(cbc)).unwrap();
        }
        if let Some(umi) = &self.umi {
            record.push_aux(b"UB", Aux::String(umi)).unwrap();
        }
        record
    }
}

/// Build a minimal single-contig header, matching what a real aligner would emit for a tiny
/// reference.
pub fn minimal_header() -> Header {
    let mut header = Header::new();
    let mut sq = HeaderRecord::new(b"SQ");
    sq.push_tag(b"SN", "chr1");
    sq.push_tag(b"LN", 1_000_000);
    header.push_record(&sq);
    header
}

/// Write `reads` to a BAM file at `dir/name`, in the order given (the caller is responsible for
/// presenting them in whatever order the scenario under test requires).
pub fn write_bam(dir: &Path, name: &str, reads: &[ReadSpec]) -> Result<PathBuf> {
    let header = minimal_header();
    let path = dir.join(name);
    let mut writer = Writer::from_path(&path, &header, Format::Bam)
        .with_context(|| format!("cannot create test bam {}", path.display()))?;
    for read in reads {
        writer.write(&read.to_record(0)).context("failed to write synthetic record")?;
    }
    drop(writer);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::{Read, Reader};
    use tempfile::TempDir;

    #[test]
    fn written_records_round_trip_cbc_umi_and_flags() {
        let dir = TempDir::new().unwrap();
        let reads = [
            ReadSpec::new("read1").cbc("AAAACCCCGGGGTTTT").umi("TTTTGGGG").mapq(60),
            ReadSpec::new("read1").cbc("AAAACCCCGGGGTTTT").umi("TTTTGGGG").secondary(),
        ];
        let path = write_bam(dir.path(), "synthetic.bam", &reads).unwrap();

        let mut reader = Reader::from_path(&path).unwrap();
        let mut record = Record::new();
        let mut seen = 0;
        while let Some(result) = reader.read(&mut record) {
            result.unwrap();
            assert_eq!(record.qname(), b"read1");
            if seen == 0 {
                assert!(!record.is_secondary());
            } else {
                assert!(record.is_secondary());
            }
            seen += 1;
        }
        assert_eq!(seen, 2);
    }
}
