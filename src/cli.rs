use crate::built_info;
use crate::config::Config;
use crate::tag::{Platform, TagDescriptor};
use anyhow::{Result, bail};
use clap::{Parser, value_parser};
use std::num::NonZero;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Package and git version, including dirty git state.
static VERSION: LazyLock<String> = LazyLock::new(|| {
    let pkg_version = built_info::PKG_VERSION;
    if let Some(git_version) = built_info::GIT_VERSION {
        let suffix = if Some(true) == built_info::GIT_DIRTY { "-dirty" } else { "" };
        format!("{pkg_version}-{git_version}{suffix}")
    } else {
        format!("{pkg_version}-no-git")
    }
});

/// Split a BAM/SAM/CRAM file by cell barcode, with optional UMI-aware deduplication.
#[derive(Parser, Debug)]
#[command(version = VERSION.as_str(), verbatim_doc_comment)]
pub struct Args {
    /// Input alignment file. Use "-" for stdin.
    #[clap(long, short = 'f', required = true)]
    pub file: PathBuf,

    /// Metadata CSV mapping cell barcodes to output labels (header line, then `<CBC>,<label>`).
    #[clap(long, short = 'm', required = true)]
    pub meta: PathBuf,

    /// Output directory prefix; a trailing `/` is appended if missing.
    #[clap(long, short = 'o', default_value = "./")]
    pub output: String,

    /// Minimum mapping quality to keep a record.
    #[clap(long, short = 'q', default_value_t = 0, value_parser = value_parser!(u16).range(..=254))]
    pub mapq: u16,

    /// Barcode/UMI preset: 10xv2, 10xv3, or scirnaseq3.
    #[clap(long, short = 'p')]
    pub platform: Option<String>,

    /// Remove duplicate alignments sharing a cell barcode/UMI combination.
    #[clap(long, short = 'd')]
    pub dedup: bool,

    /// Cell barcode location: a two-letter aux tag name, or a 1-based query-name field number.
    #[clap(long, short = 'b')]
    pub cbc_location: Option<String>,

    /// Cell barcode length.
    #[clap(long, short = 'L')]
    pub cbc_length: Option<usize>,

    /// UMI location: a two-letter aux tag name, or a 1-based query-name field number.
    #[clap(long, short = 'u')]
    pub umi_location: Option<String>,

    /// UMI length.
    #[clap(long, short = 'l')]
    pub umi_length: Option<usize>,

    /// Maximum query-name length.
    #[clap(long, short = 'r', default_value_t = 70)]
    pub rn_length: usize,

    /// Memory scale, in gibibytes.
    #[clap(long, short = 'M', default_value_t = NonZero::new(4).unwrap())]
    pub mem: NonZero<usize>,

    /// Worker thread count for the sort and merge stages.
    #[clap(long, short = '@', default_value_t = NonZero::new(num_cpus::get()).unwrap_or(NonZero::new(1).unwrap()))]
    pub threads: NonZero<usize>,

    /// Strip the "SK" sort-key auxiliary tag from final per-label outputs.
    #[clap(long)]
    pub strip_sort_key: bool,

    /// Print the fully resolved parameters and exit without touching any file.
    #[clap(long, short = 'n')]
    pub dry_run: bool,

    /// Reuse an existing output directory without the interactive confirmation prompt.
    #[clap(long, short = 'y')]
    pub yes: bool,

    /// Verbosity level (0 = INFO, 5+ = DEBUG). Absent means WARNING.
    #[clap(long, short = 'v', num_args = 0..=1, default_missing_value = "0")]
    pub verbose: Option<u8>,
}

/// Parse a `-b/-u` override: a value that parses as a positive integer selects a query-name
/// field; anything else is taken as a two-letter auxiliary tag name.
fn parse_location_override(raw: &str, length: usize) -> Result<TagDescriptor> {
    if let Ok(field) = raw.parse::<usize>() {
        if field == 0 {
            bail!("query-name field numbers are 1-based; 0 is not valid");
        }
        return Ok(TagDescriptor::read_name(field, length));
    }
    let bytes = raw.as_bytes();
    if bytes.len() != 2 {
        bail!("tag name override {raw:?} must be exactly two letters");
    }
    Ok(TagDescriptor::read_tag([bytes[0], bytes[1]], length))
}

impl Args {
    /// Resolve parsed CLI arguments into an immutable [`Config`], applying platform presets and
    /// any explicit tag-location/length overrides.
    pub fn resolve(&self) -> Result<Config> {
        if self.mapq > 254 {
            bail!("MAPQ threshold {} exceeds the maximum valid value of 255", self.mapq);
        }

        let platform = self
            .platform
            .as_deref()
            .map(Platform::parse)
            .transpose()?
            .unwrap_or(Platform::TenXV3);

        let mut cbc = platform.cbc_descriptor();
        let mut umi = platform.umi_descriptor();
        if let Some(length) = self.cbc_length {
            if length == 0 {
                bail!("cell barcode length must be larger than 0");
            }
            cbc.length = length;
        }
        if let Some(location) = &self.cbc_location {
            cbc = parse_location_override(location, cbc.length)?;
        }
        if let Some(length) = self.umi_length {
            if length == 0 {
                bail!("UMI length must be larger than 0");
            }
            umi.length = length;
        }
        if let Some(location) = &self.umi_location {
            umi = parse_location_override(location, umi.length)?;
        }

        let mut output = self.output.clone();
        if !output.ends_with('/') {
            output.push('/');
        }

        Ok(Config {
            input: self.file.clone(),
            meta: self.meta.clone(),
            output_prefix: PathBuf::from(output),
            mapq_threshold: self.mapq as u8,
            dedup: self.dedup,
            strip_sort_key: self.strip_sort_key,
            cbc,
            umi,
            rn_size: self.rn_length,
            mem_scale: self.mem,
            threads: self.threads,
            dry_run: self.dry_run,
            assume_yes: self.yes,
        })
    }

    /// Resolved logging level, mirroring the original tool's verbosity scale: absent means
    /// WARNING, `-v`/`-v0` means INFO, and `-v5` and above means DEBUG.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            None => "warn",
            Some(level) if level < 5 => "info",
            Some(_) => "debug",
        }
    }
}
