//! Bounded worker queue.
//!
//! The indexing pipeline is a producer/consumer arrangement: the ingest
//! thread submits jobs into a bounded MPMC channel and a fixed pool of
//! workers drains it. `submit` blocks while the queue is full;
//! `complete_and_join` closes the channel, lets the workers drain, and
//! surfaces the first error a worker hit.

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::{ArborError, Result};

/// A worker pool over a bounded channel.
pub struct WorkQueue<T: Send + 'static> {
    sender: Option<crossbeam_channel::Sender<T>>,
    workers: Vec<JoinHandle<()>>,
    errors: Arc<Mutex<Vec<ArborError>>>,
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Start `worker_count` workers draining a channel of `capacity`.
    pub fn start<F>(name: &str, capacity: usize, worker_count: usize, handler: F) -> Self
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        let (sender, receiver) = crossbeam_channel::bounded::<T>(capacity);
        let handler = Arc::new(handler);
        let errors: Arc<Mutex<Vec<ArborError>>> = Arc::new(Mutex::new(Vec::new()));

        let mut workers = Vec::with_capacity(worker_count.max(1));
        for worker in 0..worker_count.max(1) {
            let receiver = receiver.clone();
            let handler = handler.clone();
            let errors = errors.clone();
            let thread_name = format!("{name}-{worker}");
            let handle = std::thread::Builder::new()
                .name(thread_name)
                .spawn(move || {
                    // Workers exit when the channel closes and drains.
                    while let Ok(job) = receiver.recv() {
                        if let Err(err) = handler(job) {
                            errors.lock().push(err);
                        }
                    }
                })
                .expect("spawning queue worker");
            workers.push(handle);
        }

        Self {
            sender: Some(sender),
            workers,
            errors,
        }
    }

    /// Enqueue a job, blocking while the queue is full.
    pub fn submit(&self, job: T) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| ArborError::internal("queue already completed"))?;
        sender
            .send(job)
            .map_err(|_| ArborError::internal("queue workers are gone"))
    }

    /// Close the queue, wait for the workers to drain it, and surface the
    /// first worker error.
    pub fn complete_and_join(mut self) -> Result<()> {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        let mut errors = self.errors.lock();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.remove(0))
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("workers", &self.workers.len())
            .field("open", &self.sender.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_all_jobs_processed() {
        let counter = Arc::new(AtomicU64::new(0));
        let seen = counter.clone();
        let queue = WorkQueue::start("test", 8, 3, move |job: u64| {
            seen.fetch_add(job, Ordering::SeqCst);
            Ok(())
        });

        for job in 1..=100u64 {
            queue.submit(job).unwrap();
        }
        queue.complete_and_join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 5050);
    }

    #[test]
    fn test_worker_error_surfaces() {
        let queue = WorkQueue::start("test", 4, 2, |job: u64| {
            if job == 13 {
                Err(ArborError::misaligned("unlucky"))
            } else {
                Ok(())
            }
        });

        for job in 0..20u64 {
            queue.submit(job).unwrap();
        }
        assert!(matches!(
            queue.complete_and_join(),
            Err(ArborError::DataMisaligned(_))
        ));
    }

    #[test]
    fn test_empty_queue_joins_cleanly() {
        let queue: WorkQueue<u64> = WorkQueue::start("test", 4, 1, |_| Ok(()));
        queue.complete_and_join().unwrap();
    }
}
