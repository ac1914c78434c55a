use crate::cli::Args;
use crate::config::Config;
use crate::dedup_route;
use crate::header;
use crate::label_registry::LabelRegistry;
use crate::merge_stage;
use crate::metadata::Metadata;
use crate::sort_stage;
use crate::util::{get_bam_reader, prepare_output_dir};
use anyhow::{Context, Result, bail};
use log::info;
use rust_htslib::bam::{Header, Read};

/// Sort-order marker stamped onto the fully merged, sorted temp file's header, once every record
/// in it is globally ordered by sort key.
const SORTED_MARKER: &[u8] = b"scbamsplit";

/// Run the whole split/dedup pipeline for one invocation, per the resolved configuration.
pub fn run(args: &Args) -> Result<()> {
    let config = args.resolve()?;

    if !config.input.exists() {
        bail!("{} not found", config.input.display());
    }

    if args.verbose.is_some() || config.dry_run {
        print_resolved_config(&config);
    }

    if config.dry_run {
        eprintln!("==========================================================");
        eprintln!("= This is a dry-run (-n/--dry-run). Nothing is executed. =");
        eprintln!("==========================================================");
        return Ok(());
    }

    info!("loading barcode-to-label metadata from {}", config.meta.display());
    let metadata = Metadata::load(&config.meta)?;
    if metadata.is_empty() {
        bail!("metadata file {} contains no barcode/label pairs", config.meta.display());
    }

    if !prepare_output_dir(&config.output_prefix, config.assume_yes)? {
        info!("exiting because the user declined to reuse the existing output directory");
        return Ok(());
    }

    info!("reading input alignment file {}", config.input.display());
    let mut reader = get_bam_reader(&config.input, None::<&std::path::Path>, config.threads)?;
    let mut header = Header::from_template(reader.header());
    if config.dedup {
        header.push_comment(b"scbamsplit: reordered by CBC/UMI for deduplication");
    }

    let mut registry = LabelRegistry::open(&config.output_prefix, &header, config.threads, &metadata)?;

    if !config.dedup {
        dedup_route::run_direct(&config, &mut reader, &metadata, &mut registry)?;
        return Ok(());
    }

    let run_header = header::with_sort_order(&header, b"unknown");
    let final_header = header::with_sort_order(&header, SORTED_MARKER);

    info!("sorting input into chunks of up to {} records", config.chunk_size());
    sort_stage::run(&config, &mut reader, &run_header)?;

    info!("merging sorted chunks");
    let sorted_path = merge_stage::run(&config, &run_header, &final_header)?;

    info!("deduplicating and routing sorted records");
    dedup_route::run_deduped(&config, &sorted_path, &metadata, &mut registry)?;

    std::fs::remove_file(&sorted_path)
        .with_context(|| format!("cannot remove temporary file {}", sorted_path.display()))?;
    std::fs::remove_dir(config.temp_dir())
        .with_context(|| format!("cannot remove temporary directory {}", config.temp_dir().display()))?;

    Ok(())
}


fn print_resolved_config(config: &Config) {
    eprintln!("- Run condition:");
    eprintln!("\tInput bam: {}", config.input.display());
    eprintln!("\tInput metadata: {}", config.meta.display());
    eprintln!("\tMAPQ threshold: {}", config.mapq_threshold);
    eprintln!("\tRead name length: {}mer", config.rn_size);
    eprintln!("\tOutput prefix: {}", config.output_prefix.display());
    eprintln!("\tMemory scale: {}GB", config.mem_scale);
    eprintln!("\tThreads: {}", config.threads);
    eprintln!("\tCell barcode: {:?}", config.cbc);
    eprintln!("\tUMI: {:?}", config.umi);
    if config.dedup {
        eprintln!("\tRunning **with** deduplication.");
    } else {
        eprintln!("\tRunning **without** deduplication.");
    }
}
