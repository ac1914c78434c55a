use crate::config::KEY_SIZE;
use crate::tag::{self, TagDescriptor};
use rust_htslib::bam::Record;
use std::fmt;

/// A record could not be assigned a sort key.
#[derive(Debug)]
pub enum KeyError {
    /// The query name is longer than the configured read-name field width.
    QnameTooLong { len: usize, rn_size: usize },
    /// One of the extracted fields (barcode, UMI, or query name) was not valid UTF-8.
    NonAscii,
    /// The assembled key is longer than [`KEY_SIZE`].
    KeyTooLong { len: usize },
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::QnameTooLong { len, rn_size } => write!(
                f,
                "query name of length {len} exceeds the configured read-name field width of {rn_size}; \
                 rerun with --rn-length at least {}",
                len + 1
            ),
            KeyError::NonAscii => write!(f, "barcode, UMI, or query name contained non-UTF8 bytes"),
            KeyError::KeyTooLong { len } => {
                write!(f, "sort key of length {len} exceeds the maximum of {KEY_SIZE} bytes")
            }
        }
    }
}

impl std::error::Error for KeyError {}

/// Auxiliary tag under which the formatted sort key is stashed on each kept record.
pub const SORT_KEY_TAG: &[u8; 2] = b"SK";

/// `1` for a primary, mapped alignment; `2` for everything else (secondary, supplementary,
/// or unmapped). Chosen so primary alignments sort first within a CBC/UMI group.
fn primary_flag_byte(record: &Record) -> u8 {
    if !record.is_secondary() && !record.is_unmapped() {
        b'1'
    } else {
        b'2'
    }
}

/// Query name, space-padded on the right to exactly `rn_size` bytes so that the key's trailing
/// field is fixed-width and comparisons stay purely lexicographic.
fn pad_qname(qname: &[u8], rn_size: usize) -> Result<String, KeyError> {
    if qname.len() > rn_size {
        return Err(KeyError::QnameTooLong { len: qname.len(), rn_size });
    }
    let qname = std::str::from_utf8(qname).map_err(|_| KeyError::NonAscii)?;
    Ok(format!("{qname:<rn_size$}"))
}

/// Build the composite sort key for `record`, or `None` if it is missing its CBC or UMI.
///
/// The key is `CBC ‖ UMI ‖ primary-flag ‖ inverted MAPQ ‖ space-padded read name`, formatted so
/// that byte-wise comparison groups reads by cell and molecule, then orders primary mappings
/// before secondary/supplementary/unmapped ones, then by descending MAPQ, then by read name.
/// MAPQ is stored as `255 - mapq` so that the highest-confidence alignment in a group sorts
/// first and is the one the dedup/route stage keeps.
pub fn build_sort_key(
    record: &Record,
    cbc: &TagDescriptor,
    umi: &TagDescriptor,
    rn_size: usize,
) -> Result<Option<String>, KeyError> {
    let Some(cbc_val) = tag::extract(record, cbc) else {
        return Ok(None);
    };
    let Some(umi_val) = tag::extract(record, umi) else {
        return Ok(None);
    };
    let cbc_str = std::str::from_utf8(&cbc_val).map_err(|_| KeyError::NonAscii)?;
    let umi_str = std::str::from_utf8(&umi_val).map_err(|_| KeyError::NonAscii)?;
    let padded_qname = pad_qname(record.qname(), rn_size)?;

    let mut key = String::with_capacity(cbc_str.len() + umi_str.len() + 1 + 3 + rn_size);
    key.push_str(cbc_str);
    key.push_str(umi_str);
    key.push(primary_flag_byte(record) as char);
    key.push_str(&format!("{:03}", 255 - record.mapq() as u16));
    key.push_str(&padded_qname);
    if key.len() > KEY_SIZE {
        return Err(KeyError::KeyTooLong { len: key.len() });
    }
    Ok(Some(key))
}

/// A record is eligible for sorting/export if it has a MAPQ at or above `threshold`.
///
/// CBC/UMI presence is already handled by [`build_sort_key`] returning `None`.
pub fn passes_mapq(record: &Record, threshold: u8) -> bool {
    record.mapq() >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Platform;
    use rust_htslib::bam::record::{Aux, CigarString};

    fn mapped_record(qname: &[u8], mapq: u8) -> Record {
        let mut record = Record::new();
        record.set(qname, Some(&CigarString::try_from("4M").unwrap()), b"ACGT", &[30, 30, 30, 30]);
        record.set_mapq(mapq);
        record.set_pos(10);
        record.set_tid(0);
        record
            .push_aux(b"CB", Aux::String("AAAACCCCGGGGTTTT"))
            .unwrap();
        record.push_aux(b"UB", Aux::String("TTTTGGGG")).unwrap();
        record
    }

    #[test]
    fn primary_mapped_sorts_before_secondary() {
        let primary = mapped_record(b"read1", 60);
        let mut secondary = mapped_record(b"read1", 60);
        secondary.set_secondary();

        let cbc = Platform::TenXV3.cbc_descriptor();
        let umi = Platform::TenXV3.umi_descriptor();
        let key_primary = build_sort_key(&primary, &cbc, &umi, 70).unwrap().unwrap();
        let key_secondary = build_sort_key(&secondary, &cbc, &umi, 70).unwrap().unwrap();
        assert!(key_primary < key_secondary);
    }

    #[test]
    fn oversized_qname_is_an_error() {
        let record = mapped_record(b"a_very_long_read_name_that_is_longer_than_the_configured_field_width", 60);
        let cbc = Platform::TenXV3.cbc_descriptor();
        let umi = Platform::TenXV3.umi_descriptor();
        let err = build_sort_key(&record, &cbc, &umi, 10).unwrap_err();
        assert!(matches!(err, KeyError::QnameTooLong { .. }));
    }

    #[test]
    fn higher_mapq_sorts_first_within_a_group() {
        let low = mapped_record(b"read1", 20);
        let high = mapped_record(b"read2", 40);
        let cbc = Platform::TenXV3.cbc_descriptor();
        let umi = Platform::TenXV3.umi_descriptor();
        let key_low = build_sort_key(&low, &cbc, &umi, 70).unwrap().unwrap();
        let key_high = build_sort_key(&high, &cbc, &umi, 70).unwrap().unwrap();
        assert!(key_high < key_low, "MAPQ 40 should sort before MAPQ 20 within the same CBC/UMI group");
    }

    #[test]
    fn key_longer_than_key_size_is_an_error() {
        let record = mapped_record(b"read1", 60);
        let cbc = Platform::TenXV3.cbc_descriptor();
        let umi = Platform::TenXV3.umi_descriptor();
        let err = build_sort_key(&record, &cbc, &umi, crate::config::KEY_SIZE).unwrap_err();
        assert!(matches!(err, KeyError::KeyTooLong { .. }));
    }

    #[test]
    fn missing_cbc_is_a_skip_not_an_error() {
        let mut record = Record::new();
        record.set(b"read1", None, b"ACGT", &[30, 30, 30, 30]);
        let cbc = Platform::TenXV3.cbc_descriptor();
        let umi = Platform::TenXV3.umi_descriptor();
        assert!(build_sort_key(&record, &cbc, &umi, 70).unwrap().is_none());
    }
}
