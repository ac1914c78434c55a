use crate::chunk::{Chunk, ChunkPool};
use crate::config::Config;
use crate::key::{self, SORT_KEY_TAG};
use crate::thread_pool::ThreadPool;
use anyhow::{Context, Result};
use log::{debug, error, info};
use rust_htslib::bam::record::Aux;
use rust_htslib::bam::{Format, Header, Read, Reader, Record, Writer};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Name of the `n`th run file produced by the sort stage.
pub fn run_file_name(index: usize) -> String {
    format!("chunk{index:05}.bam")
}

/// Read every record out of `reader`, group it into memory-bounded chunks, and hand each chunk
/// off to a worker that sorts it and writes it to its own run file under the temp directory.
///
/// Returns the number of run files produced.
pub fn run(config: &Config, reader: &mut Reader, header: &Header) -> Result<usize> {
    std::fs::create_dir_all(config.temp_dir())
        .with_context(|| format!("cannot create temp directory {}", config.temp_dir().display()))?;

    let chunk_pool = Arc::new(ChunkPool::new(config.chunk_size(), config.threads.get()));
    let pool = ThreadPool::new(config.threads, config.threads.get() * 2);
    let errors: Arc<Mutex<Vec<anyhow::Error>>> = Arc::new(Mutex::new(Vec::new()));

    let mut record = Record::new();
    let mut chunk_index = 0usize;
    loop {
        let mut chunk = chunk_pool.acquire();
        let filled = fill_chunk(reader, config, &mut record, &mut chunk)?;
        if filled == 0 {
            chunk_pool.release(chunk);
            break;
        }

        let tmp_path = config.temp_dir().join(run_file_name(chunk_index));
        debug!("dispatching {} records to {}", chunk.len(), tmp_path.display());
        chunk_index += 1;

        let header = header.clone();
        let chunk_pool = Arc::clone(&chunk_pool);
        let errors = Arc::clone(&errors);
        pool.submit(move || {
            let result = sort_and_export(&mut chunk, &header, &tmp_path);
            chunk_pool.release(chunk);
            if let Err(err) = result {
                error!("failed to write run file {}: {err:#}", tmp_path.display());
                errors.lock().unwrap().push(err);
            }
        });
    }

    pool.wait();

    if let Some(err) = errors.lock().unwrap().drain(..).next() {
        return Err(err);
    }

    info!("sort stage produced {chunk_index} run file(s)");
    Ok(chunk_index)
}

/// Fill `chunk` with up to `config.chunk_size()` kept records from `reader`.
///
/// A record is kept only if it carries both a CBC and a UMI and its MAPQ is at or above the
/// configured threshold; everything else is silently dropped. Returns the number of records
/// placed in the chunk, which is `0` only at end of input.
fn fill_chunk(reader: &mut Reader, config: &Config, record: &mut Record, chunk: &mut Chunk) -> Result<usize> {
    let target = config.chunk_size();
    while chunk.len() < target {
        match reader.read(record) {
            None => break,
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(())) => {
                if !key::passes_mapq(record, config.mapq_threshold) {
                    continue;
                }
                let Some(sort_key) = key::build_sort_key(record, &config.cbc, &config.umi, config.rn_size)?
                else {
                    continue;
                };
                record
                    .push_aux(SORT_KEY_TAG, Aux::String(&sort_key))
                    .context("failed to append sort key tag")?;
                chunk.push((sort_key, record.clone()));
            }
        }
    }
    Ok(chunk.len())
}

/// Sort a chunk by its formatted key (byte-wise, same ordering as the key's `Ord` on `String`)
/// and flush it to its own BAM run file.
fn sort_and_export(chunk: &mut Chunk, header: &Header, path: &PathBuf) -> Result<()> {
    chunk.sort_by(|a, b| a.0.cmp(&b.0));
    let mut writer =
        Writer::from_path(path, header, Format::Bam).with_context(|| format!("cannot create run file {}", path.display()))?;
    for (_, record) in chunk.iter() {
        writer.write(record).context("failed to write record to run file")?;
    }
    Ok(())
}
