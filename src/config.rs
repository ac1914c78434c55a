use crate::tag::TagDescriptor;
use std::num::NonZero;
use std::path::PathBuf;

/// Default number of records per in-memory chunk at memory scale 1 and thread count 1.
pub const BASE_CHUNK_SIZE: usize = 400_000;

/// Number of run files merged together in a single merge task.
pub const MERGE_FANOUT: usize = 8;

/// Upper bound on a formatted sort key: CBC + UMI + 1-byte primary flag + 3-digit MAPQ + read name.
pub const KEY_SIZE: usize = 512;

/// Resolved, immutable configuration threaded through the whole pipeline.
///
/// Constructed once from parsed CLI arguments; every stage receives a reference rather than
/// touching process-wide state.
#[derive(Clone, Debug)]
pub struct Config {
    pub input: PathBuf,
    pub meta: PathBuf,
    pub output_prefix: PathBuf,
    pub mapq_threshold: u8,
    pub dedup: bool,
    pub strip_sort_key: bool,
    pub cbc: TagDescriptor,
    pub umi: TagDescriptor,
    pub rn_size: usize,
    pub mem_scale: NonZero<usize>,
    pub threads: NonZero<usize>,
    pub dry_run: bool,
    pub assume_yes: bool,
}

impl Config {
    /// Number of records held per chunk, derived from the memory scale and thread count.
    ///
    /// Caps the number of records simultaneously resident in memory to roughly
    /// `chunk_size * threads`.
    pub fn chunk_size(&self) -> usize {
        (BASE_CHUNK_SIZE * self.mem_scale.get() / self.threads.get()).max(1)
    }

    /// Temporary directory holding run files and the merged-sorted file during dedup mode.
    pub fn temp_dir(&self) -> PathBuf {
        self.output_prefix.join("tmp")
    }
}
