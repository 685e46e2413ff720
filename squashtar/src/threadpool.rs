//! Ticket-ordered worker pool used by the block processor.
//!
//! Work is submitted with a monotonically increasing ticket; a dispatcher
//! thread dequeues finished work strictly in submission order regardless of
//! which worker finished it first or how long each item took to run. A
//! "serial" pool spawns no threads at all and instead runs each job in-situ
//! inside `dequeue`, for deterministic single-threaded tests; its external
//! behavior (bar never blocking, never reordering) is identical.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::{Result, SquashTarError};

type Job<R> = Box<dyn FnOnce() -> Result<R> + Send>;

struct Shared<R> {
    next_ticket: u64,
    next_dequeue: u64,
    queue: VecDeque<(u64, Job<R>)>,
    completed: HashMap<u64, Result<R>>,
    /// First worker error, latched; stored as its display string since
    /// [`SquashTarError`] doesn't implement `Clone`.
    status: Option<String>,
    shutdown: bool,
}

/// A ticket returned by [`ThreadPool::submit`]; opaque to callers beyond
/// ordering (it is, in fact, just the submission sequence number).
pub type Ticket = u64;

pub struct ThreadPool<R> {
    state: Arc<Mutex<Shared<R>>>,
    work_cv: Arc<Condvar>,
    done_cv: Arc<Condvar>,
    workers: Vec<JoinHandle<()>>,
    max_backlog: usize,
    serial: bool,
}

impl<R: Send + 'static> ThreadPool<R> {
    /// Spawn `worker_count` OS threads (`worker_count == 0` degenerates to
    /// the serial fallback, spawning none). `max_backlog` bounds how many
    /// submitted-but-not-yet-dequeued tickets may be outstanding before
    /// `submit` blocks.
    pub fn new(worker_count: usize, max_backlog: usize) -> Self {
        let state = Arc::new(Mutex::new(Shared {
            next_ticket: 0,
            next_dequeue: 0,
            queue: VecDeque::new(),
            completed: HashMap::new(),
            status: None,
            shutdown: false,
        }));
        let work_cv = Arc::new(Condvar::new());
        let done_cv = Arc::new(Condvar::new());

        let serial = worker_count == 0;
        let mut workers = vec![];
        for _ in 0..worker_count {
            let state = Arc::clone(&state);
            let work_cv = Arc::clone(&work_cv);
            let done_cv = Arc::clone(&done_cv);
            workers.push(std::thread::spawn(move || worker_loop(state, work_cv, done_cv)));
        }

        Self { state, work_cv, done_cv, workers, max_backlog: max_backlog.max(1), serial }
    }

    /// Submit a unit of work, blocking only if the backlog is full. Returns
    /// the latched pool-wide failure, if one has occurred, instead of
    /// enqueueing anything further.
    pub fn submit<F>(&self, job: F) -> Result<Ticket>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
    {
        let mut guard = self.state.lock().unwrap();
        while !self.serial
            && guard.status.is_none()
            && (guard.next_ticket - guard.next_dequeue) as usize > self.max_backlog
        {
            guard = self.done_cv.wait(guard).unwrap();
        }
        if let Some(msg) = &guard.status {
            return Err(SquashTarError::Internal(format!("worker pool failed: {msg}")));
        }
        let ticket = guard.next_ticket;
        guard.next_ticket += 1;
        guard.queue.push_back((ticket, Box::new(job)));
        drop(guard);
        self.work_cv.notify_one();
        Ok(ticket)
    }

    /// Dequeue the next item, strictly in ticket order. In the serial pool
    /// this runs the job itself; in the parallel pool it waits for a worker
    /// thread to have already finished it.
    pub fn dequeue(&self) -> Result<R> {
        if self.serial {
            let (ticket, job) = {
                let mut guard = self.state.lock().unwrap();
                guard.queue.pop_front().expect("dequeue called with no pending work")
            };
            let result = job();
            let mut guard = self.state.lock().unwrap();
            debug_assert_eq!(ticket, guard.next_dequeue);
            guard.next_dequeue += 1;
            if let Err(e) = &result {
                guard.status.get_or_insert_with(|| e.to_string());
            }
            return result;
        }

        let mut guard = self.state.lock().unwrap();
        loop {
            if let Some(result) = guard.completed.remove(&guard.next_dequeue) {
                guard.next_dequeue += 1;
                drop(guard);
                self.done_cv.notify_all();
                return result;
            }
            if let Some(msg) = &guard.status {
                return Err(SquashTarError::Internal(format!("worker pool failed: {msg}")));
            }
            guard = self.done_cv.wait(guard).unwrap();
        }
    }

    /// Number of tickets submitted but not yet dequeued.
    pub fn in_flight(&self) -> u64 {
        let guard = self.state.lock().unwrap();
        guard.next_ticket - guard.next_dequeue
    }
}

impl<R> Drop for ThreadPool<R> {
    fn drop(&mut self) {
        {
            let mut guard = self.state.lock().unwrap();
            guard.shutdown = true;
        }
        self.work_cv.notify_all();
        self.done_cv.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop<R: Send + 'static>(
    state: Arc<Mutex<Shared<R>>>,
    work_cv: Arc<Condvar>,
    done_cv: Arc<Condvar>,
) {
    loop {
        let (ticket, job) = {
            let mut guard = state.lock().unwrap();
            loop {
                if let Some(item) = guard.queue.pop_front() {
                    break item;
                }
                if guard.shutdown {
                    return;
                }
                guard = work_cv.wait(guard).unwrap();
            }
        };

        let result = job();

        let mut guard = state.lock().unwrap();
        if let Err(e) = &result {
            guard.status.get_or_insert_with(|| e.to_string());
        }
        guard.completed.insert(ticket, result);
        drop(guard);
        done_cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn preserves_ticket_order_under_parallel_execution() {
        let pool: ThreadPool<usize> = ThreadPool::new(4, 8);
        for i in 0..10 {
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis((9 - i) * 5));
                Ok(i)
            })
            .unwrap();
        }
        let mut out = vec![];
        for _ in 0..10 {
            out.push(pool.dequeue().unwrap());
        }
        assert_eq!(out, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn serial_pool_preserves_order_and_never_blocks() {
        let pool: ThreadPool<usize> = ThreadPool::new(0, 1);
        for i in 0..5 {
            pool.submit(move || Ok(i)).unwrap();
        }
        let out: Vec<_> = (0..5).map(|_| pool.dequeue().unwrap()).collect();
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn first_error_is_latched() {
        let pool: ThreadPool<usize> = ThreadPool::new(2, 4);
        pool.submit(|| Err(SquashTarError::Internal("boom".into()))).unwrap();
        pool.submit(|| Ok(1)).unwrap();
        // Ticket 0 is an error; by the time it is dequeued the latch is
        // already visible (set under the same lock as its completion entry).
        assert!(pool.dequeue().is_err());
        assert!(pool.submit(|| Ok(2)).is_err());
    }
}
