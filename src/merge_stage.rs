use crate::config::{Config, MERGE_FANOUT};
use crate::key::SORT_KEY_TAG;
use crate::thread_pool::ThreadPool;
use crate::util::sorted_dir_entries;
use anyhow::{Context, Result, anyhow};
use log::{debug, error, info};
use rust_htslib::bam::record::Aux;
use rust_htslib::bam::{Format, Header, Read, Reader, Record, Writer};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Merge every run file the sort stage produced into a single sorted file, `sorted.bam`, inside
/// the temp directory, merging `MERGE_FANOUT` run files together at a time per round until one
/// file remains.
///
/// Each round spawns one merge task per batch on the bounded thread pool and waits for the whole
/// round to drain before starting the next, so a round's outputs are fully written (and its
/// inputs fully consumed) before directory enumeration happens again. Output files are named
/// `merged<letter><NNNNN>.bam`, with the letter cycling `a`..`z` across rounds; `merged` sorts
/// after `chunk` so a round's outputs never mix with the run files that produced them.
///
/// `run_header` (carrying `SO:unknown`) is used for every intermediate round's output; the one
/// round whose single batch produces the file that gets renamed to `sorted.bam` (and the
/// no-input edge case) is written with `final_header` (carrying the custom sort-order marker)
/// instead, so the final sorted file's header reflects that it is fully ordered.
///
/// Returns the path to the merged, fully sorted file.
pub fn run(config: &Config, run_header: &Header, final_header: &Header) -> Result<PathBuf> {
    let temp_dir = config.temp_dir();
    let mut round = 0usize;

    loop {
        let files = sorted_dir_entries(&temp_dir)?;
        if files.len() <= 1 {
            let sorted_path = temp_dir.join("sorted.bam");
            if let Some(only) = files.into_iter().next() {
                if only != sorted_path {
                    std::fs::rename(&only, &sorted_path)
                        .with_context(|| format!("cannot rename {} to {}", only.display(), sorted_path.display()))?;
                }
            } else {
                // No input records at all: still produce an (empty-bodied) sorted file downstream
                // stages can stream from.
                Writer::from_path(&sorted_path, final_header, Format::Bam)?;
            }
            return Ok(sorted_path);
        }

        let letter = (b'a' + (round % 26) as u8) as char;
        let batches: Vec<Vec<PathBuf>> = files.chunks(MERGE_FANOUT).map(<[PathBuf]>::to_vec).collect();
        // A single batch this round means its output is the one remaining file the next
        // iteration renames to `sorted.bam`: write it with the final header.
        let is_final_round = batches.len() == 1;
        info!(
            "merge round {round}: merging {} file(s) in {} batch(es)",
            files.len(),
            batches.len()
        );

        let pool = ThreadPool::new(config.threads, config.threads.get() * 2);
        let errors: Arc<Mutex<Vec<anyhow::Error>>> = Arc::new(Mutex::new(Vec::new()));

        for (batch_index, batch) in batches.into_iter().enumerate() {
            let out_path = temp_dir.join(format!("merged{letter}{batch_index:05}.bam"));
            let header = if is_final_round { final_header.clone() } else { run_header.clone() };
            let errors = Arc::clone(&errors);
            debug!("merge round {round}: {} file(s) -> {}", batch.len(), out_path.display());
            pool.submit(move || {
                if let Err(err) = merge_batch(&batch, &header, &out_path) {
                    error!("failed to merge into {}: {err:#}", out_path.display());
                    errors.lock().unwrap().push(err);
                }
            });
        }
        pool.wait();

        if let Some(err) = errors.lock().unwrap().drain(..).next() {
            return Err(err);
        }
        round += 1;
    }
}

/// Merge one batch of run files into its output file, then delete the consumed inputs.
fn merge_batch(batch: &[PathBuf], header: &Header, out_path: &Path) -> Result<()> {
    k_way_merge(batch, header, out_path)?;
    for input in batch {
        std::fs::remove_file(input).with_context(|| format!("cannot remove merged input {}", input.display()))?;
    }
    Ok(())
}

struct Source {
    reader: Reader,
    next: Option<(String, Record)>,
}

impl Source {
    fn open(path: &Path) -> Result<Self> {
        let mut reader = Reader::from_path(path).with_context(|| format!("cannot open run file {}", path.display()))?;
        let next = read_one(&mut reader)?;
        Ok(Source { reader, next })
    }

    fn advance(&mut self) -> Result<()> {
        self.next = read_one(&mut self.reader)?;
        Ok(())
    }
}

fn read_one(reader: &mut Reader) -> Result<Option<(String, Record)>> {
    let mut record = Record::new();
    match reader.read(&mut record) {
        None => Ok(None),
        Some(Err(err)) => Err(err.into()),
        Some(Ok(())) => {
            let key = match record.aux(SORT_KEY_TAG) {
                Ok(Aux::String(value)) => value.to_string(),
                _ => return Err(anyhow!("run file record is missing its sort key tag")),
            };
            Ok(Some((key, record)))
        }
    }
}

/// Merge `inputs`, all already sorted by their "SK" tag, into a single sorted file at `out_path`.
fn k_way_merge(inputs: &[PathBuf], header: &Header, out_path: &Path) -> Result<()> {
    let mut sources: Vec<Source> = inputs.iter().map(|path| Source::open(path)).collect::<Result<_>>()?;
    let mut writer =
        Writer::from_path(out_path, header, Format::Bam).with_context(|| format!("cannot create {}", out_path.display()))?;

    let mut heap: BinaryHeap<Reverse<(String, usize)>> = BinaryHeap::new();
    for (idx, source) in sources.iter().enumerate() {
        if let Some((key, _)) = &source.next {
            heap.push(Reverse((key.clone(), idx)));
        }
    }

    while let Some(Reverse((_, idx))) = heap.pop() {
        let source = &mut sources[idx];
        let (_, record) = source.next.take().expect("heap entry without a buffered record");
        writer.write(&record).context("failed to write merged record")?;
        source.advance()?;
        if let Some((key, _)) = &source.next {
            heap.push(Reverse((key.clone(), idx)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_fanout_is_eight() {
        assert_eq!(MERGE_FANOUT, 8);
    }

    #[test]
    fn merged_output_names_sort_after_chunk_files() {
        assert!("chunk00000.bam" < "merged" && "merged" < "mergeda00000.bam");
        assert!("mergeda00000.bam" < "mergedb00000.bam");
    }

    #[test]
    fn merges_more_run_files_than_the_fanout_into_one_sorted_file() {
        use crate::sort_stage::run_file_name;
        use rust_htslib::bam::record::CigarString;
        use std::num::NonZero;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let config = crate::config::Config {
            input: dir.path().join("in.bam"),
            meta: dir.path().join("meta.csv"),
            output_prefix: dir.path().to_path_buf(),
            mapq_threshold: 0,
            dedup: true,
            strip_sort_key: false,
            cbc: crate::tag::Platform::TenXV3.cbc_descriptor(),
            umi: crate::tag::Platform::TenXV3.umi_descriptor(),
            rn_size: 70,
            mem_scale: NonZero::new(1).unwrap(),
            threads: NonZero::new(2).unwrap(),
            dry_run: false,
            assume_yes: false,
        };
        std::fs::create_dir_all(config.temp_dir()).unwrap();

        let header = Header::new();
        // 10 single-record run files: more than MERGE_FANOUT (8), so this takes two rounds.
        let mut expected_keys = Vec::new();
        for i in 0..10 {
            let key = format!("KEY{:02}", 9 - i);
            let mut record = Record::new();
            record.set(format!("r{i}").as_bytes(), Some(&CigarString::try_from("4M").unwrap()), b"ACGT", &[30; 4]);
            record.set_tid(0);
            record.set_pos(0);
            record.push_aux(SORT_KEY_TAG, Aux::String(&key)).unwrap();
            expected_keys.push(key);

            let path = config.temp_dir().join(run_file_name(i));
            let mut writer = Writer::from_path(&path, &header, Format::Bam).unwrap();
            writer.write(&record).unwrap();
        }
        expected_keys.sort();

        let sorted_path = run(&config, &header, &header).unwrap();
        assert_eq!(sorted_path, config.temp_dir().join("sorted.bam"));

        let mut reader = Reader::from_path(&sorted_path).unwrap();
        let mut record = Record::new();
        let mut observed_keys = Vec::new();
        while let Some(Ok(())) = reader.read(&mut record) {
            let Ok(Aux::String(key)) = record.aux(SORT_KEY_TAG) else {
                panic!("merged record missing sort key");
            };
            observed_keys.push(key.to_string());
        }
        assert_eq!(observed_keys, expected_keys);
    }
}
