use std::collections::VecDeque;
use std::num::NonZero;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct State {
    queue: VecDeque<Job>,
    working_count: usize,
    stop: bool,
}

struct Shared {
    state: Mutex<State>,
    queue_max: usize,
    /// Signaled when a job is pushed, or on shutdown.
    work_avail: Condvar,
    /// Signaled when a job is popped, freeing a queue slot.
    slot_freed: Condvar,
    /// Signaled when the queue drains and no worker is running a job.
    idle: Condvar,
}

/// A fixed-size worker pool with a bounded job queue.
///
/// `submit` blocks the caller once `queue_max` jobs are queued, providing back-pressure so a
/// fast producer cannot outrun slow workers and exhaust memory. Mirrors the bounded work queue
/// used to dispatch chunk-sort tasks across worker threads.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(num_threads: NonZero<usize>, queue_max: usize) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                working_count: 0,
                stop: false,
            }),
            queue_max: queue_max.max(1),
            work_avail: Condvar::new(),
            slot_freed: Condvar::new(),
            idle: Condvar::new(),
        });

        let workers = (0..num_threads.get())
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || Self::worker_loop(shared))
            })
            .collect();

        ThreadPool { shared, workers }
    }

    fn worker_loop(shared: Arc<Shared>) {
        loop {
            let job = {
                let mut state = shared.state.lock().unwrap();
                loop {
                    if let Some(job) = state.queue.pop_front() {
                        state.working_count += 1;
                        shared.slot_freed.notify_all();
                        break Some(job);
                    }
                    if state.stop {
                        break None;
                    }
                    state = shared.work_avail.wait(state).unwrap();
                }
            };

            let Some(job) = job else { return };
            job();

            let mut state = shared.state.lock().unwrap();
            state.working_count -= 1;
            if state.queue.is_empty() && state.working_count == 0 {
                shared.idle.notify_all();
            }
        }
    }

    /// Queue a job, blocking while the queue is already at `queue_max`.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        while state.queue.len() >= self.shared.queue_max {
            state = self.shared.slot_freed.wait(state).unwrap();
        }
        state.queue.push_back(Box::new(job));
        self.shared.work_avail.notify_one();
    }

    /// Block until every submitted job has completed and no more are queued.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while !state.queue.is_empty() || state.working_count != 0 {
            state = self.shared.idle.wait(state).unwrap();
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.stop = true;
        }
        self.shared.work_avail.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
