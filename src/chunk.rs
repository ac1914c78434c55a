use rust_htslib::bam::Record;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A batch of records paired with their formatted sort keys, read from the input in one pass
/// and later sorted and flushed to its own run file.
pub type Chunk = Vec<(String, Record)>;

struct State {
    idle: VecDeque<Chunk>,
    outstanding: usize,
}

/// Recycles chunk buffers between the reader thread and the worker threads that sort and export
/// them, so a long run does not repeatedly allocate and free large `Vec`s.
///
/// Bounds the number of chunks in circulation (acquired but not yet released) to
/// `max_outstanding`, so the sort stage's peak memory stays at `chunk_size * max_outstanding`
/// regardless of how deep the worker pool's job queue is.
pub struct ChunkPool {
    capacity: usize,
    max_outstanding: usize,
    state: Mutex<State>,
    /// Signaled when a chunk is released, freeing a slot.
    slot_freed: Condvar,
}

impl ChunkPool {
    pub fn new(capacity: usize, max_outstanding: usize) -> Self {
        ChunkPool {
            capacity,
            max_outstanding: max_outstanding.max(1),
            state: Mutex::new(State {
                idle: VecDeque::new(),
                outstanding: 0,
            }),
            slot_freed: Condvar::new(),
        }
    }

    /// Take an idle buffer if one is available, otherwise allocate a fresh one, blocking while
    /// `max_outstanding` chunks are already in circulation.
    pub fn acquire(&self) -> Chunk {
        let mut state = self.state.lock().unwrap();
        while state.idle.is_empty() && state.outstanding >= self.max_outstanding {
            state = self.slot_freed.wait(state).unwrap();
        }
        state.outstanding += 1;
        state.idle.pop_front().unwrap_or_else(|| Vec::with_capacity(self.capacity))
    }

    /// Return a drained buffer for reuse.
    pub fn release(&self, mut chunk: Chunk) {
        chunk.clear();
        let mut state = self.state.lock().unwrap();
        state.outstanding -= 1;
        state.idle.push_back(chunk);
        self.slot_freed.notify_one();
    }
}
