use crate::config::Config;
use crate::key::{self, SORT_KEY_TAG};
use crate::label_registry::LabelRegistry;
use crate::metadata::Metadata;
use crate::tag;
use anyhow::{Context, Result};
use log::info;
use rust_htslib::bam::{Read, Reader, Record};
use std::path::Path;

/// Route every record straight from the input to its label's output file, without
/// deduplication. Used when `--dedup` is not set.
pub fn run_direct(config: &Config, reader: &mut Reader, metadata: &Metadata, registry: &mut LabelRegistry) -> Result<()> {
    let mut record = Record::new();
    let mut routed = 0u64;
    while let Some(result) = reader.read(&mut record) {
        result?;
        if !key::passes_mapq(&record, config.mapq_threshold) {
            continue;
        }
        let Some(cbc) = tag::extract(&record, &config.cbc) else {
            continue;
        };
        let Ok(cbc) = std::str::from_utf8(&cbc) else {
            continue;
        };
        route(cbc, &record, metadata, registry)?;
        routed += 1;
    }
    info!("routed {routed} record(s) without deduplication");
    Ok(())
}

/// Stream the merged, sorted file and keep only the first alignment of each cell barcode / UMI
/// combination. Because run files are sorted by CBC ‖ UMI ‖ primary-flag ‖ MAPQ ‖ read name, that
/// first alignment is always a primary mapping, and every later record sharing its read name is
/// a secondary/supplementary mapping of the same molecule that is kept alongside it; records
/// with a different read name within the same CBC/UMI group are discarded as duplicates.
pub fn run_deduped(config: &Config, sorted_path: &Path, metadata: &Metadata, registry: &mut LabelRegistry) -> Result<()> {
    let mut reader = Reader::from_path(sorted_path)
        .with_context(|| format!("cannot open sorted file {}", sorted_path.display()))?;
    let mut record = Record::new();

    let mut current_cbc: Vec<u8> = Vec::new();
    let mut current_umi: Vec<u8> = Vec::new();
    let mut keep_qname: Vec<u8> = Vec::new();
    let mut first_record = true;
    let mut routed = 0u64;
    let mut deduped = 0u64;

    while let Some(result) = reader.read(&mut record) {
        result?;
        let cbc = tag::extract(&record, &config.cbc).context("sorted record is missing its CBC")?;
        let umi = tag::extract(&record, &config.umi).context("sorted record is missing its UMI")?;

        let new_group = first_record || cbc != current_cbc || umi != current_umi;
        if new_group {
            first_record = false;
            current_cbc = cbc;
            current_umi = umi;
            keep_qname = record.qname().to_vec();
        }
        if record.qname() != keep_qname.as_slice() {
            deduped += 1;
            continue;
        }

        let Ok(cbc_str) = std::str::from_utf8(&current_cbc) else {
            continue;
        };
        if config.strip_sort_key {
            record.remove_aux(SORT_KEY_TAG).ok();
        }
        route(cbc_str, &record, metadata, registry)?;
        routed += 1;
    }

    info!("routed {routed} record(s), dropped {deduped} duplicate alignment(s)");
    Ok(())
}

fn route(cbc: &str, record: &Record, metadata: &Metadata, registry: &mut LabelRegistry) -> Result<()> {
    let Some(label) = metadata.label_for(cbc) else {
        return Ok(());
    };
    let Some(writer) = registry.writer_for(label) else {
        return Ok(());
    };
    writer.write(record).context("failed to write routed record")?;
    Ok(())
}
