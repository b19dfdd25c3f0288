// Fixed-size worker pool for generation jobs.
// Jobs queue behind a mutex-guarded deque; idle workers park on a condvar.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Job>,
    closed: bool,
}

#[derive(Default)]
struct SharedQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

pub struct WorkerPool {
    queue: Arc<SharedQueue>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> io::Result<Self> {
        let queue = Arc::new(SharedQueue::default());
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads.max(1) {
            let shared = Arc::clone(&queue);
            let worker = thread::Builder::new()
                .name(format!("rtsdf-worker-{i}"))
                .spawn(move || run_worker(&shared));
            match worker {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Dropping the partial pool joins the workers already started.
                    drop(Self { queue, workers });
                    return Err(e);
                }
            }
        }
        log::debug!("Started {} generation workers", workers.len());
        Ok(Self { queue, workers })
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. Returns false once the pool is closed.
    pub fn submit(&self, job: Job) -> bool {
        {
            let mut state = self.queue.state.lock().expect("worker queue mutex poisoned");
            if state.closed {
                return false;
            }
            state.queue.push_back(job);
        }
        self.queue.ready.notify_one();
        true
    }

    /// Stop accepting jobs. Workers finish what is queued, then exit.
    pub fn close(&self) {
        let mut state = self.queue.state.lock().expect("worker queue mutex poisoned");
        state.closed = true;
        drop(state);
        self.queue.ready.notify_all();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Generation worker panicked");
            }
        }
    }
}

fn run_worker(queue: &SharedQueue) {
    loop {
        let job = {
            let mut state = queue.state.lock().expect("worker queue mutex poisoned");
            while state.queue.is_empty() && !state.closed {
                state = queue
                    .ready
                    .wait(state)
                    .expect("worker queue condvar wait failed");
            }
            if state.closed && state.queue.is_empty() {
                return;
            }
            state.queue.pop_front()
        };

        if let Some(job) = job {
            job();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_off_thread() {
        let pool = WorkerPool::new(2).unwrap();
        let (tx, rx) = mpsc::channel();
        let caller = thread::current().id();
        for _ in 0..4 {
            let tx = tx.clone();
            assert!(pool.submit(Box::new(move || {
                tx.send(thread::current().id()).unwrap();
            })));
        }
        for _ in 0..4 {
            let id = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_ne!(id, caller);
        }
    }

    #[test]
    fn test_drop_drains_queue() {
        let done = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(1).unwrap();
            for _ in 0..16 {
                let done = Arc::clone(&done);
                pool.submit(Box::new(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }
        assert_eq!(done.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_closed_pool_rejects_jobs() {
        let pool = WorkerPool::new(1).unwrap();
        pool.close();
        assert!(!pool.submit(Box::new(|| {})));
        assert_eq!(pool.threads(), 1);
    }
}
