//! Ordered task execution.
//!
//! All user callbacks run through an [`OrderedExecutor`] keyed by ledger id,
//! which serializes callbacks for the same ledger while letting different
//! ledgers complete in parallel.

use tokio::sync::mpsc;

/// A unit of work submitted to the executor.
pub type Task = Box<dyn FnOnce() + Send>;

/// A task runner that executes tasks sharing a key sequentially, in
/// submission order, while tasks with different keys may run in parallel.
///
/// Internally a fixed set of lanes, each drained by its own tokio task; a
/// key always maps to the same lane, so same-key ordering follows from the
/// lane's FIFO channel.
pub struct OrderedExecutor {
    lanes: Vec<mpsc::UnboundedSender<Task>>,
}

impl OrderedExecutor {
    /// Creates an executor with one lane per available core.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let lanes = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::with_lanes(lanes)
    }

    /// Creates an executor with a fixed number of lanes.
    pub fn with_lanes(lanes: usize) -> Self {
        assert!(lanes > 0, "ordered executor needs at least one lane");
        let lanes = (0..lanes)
            .map(|_| {
                let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
                tokio::spawn(async move {
                    while let Some(task) = rx.recv().await {
                        task();
                    }
                });
                tx
            })
            .collect();
        Self { lanes }
    }

    /// Submits a task keyed by `key`.
    ///
    /// Tasks submitted with the same key execute sequentially in submission
    /// order. Tasks already queued keep running after the executor is
    /// dropped; their lane task exits once its queue drains.
    pub fn submit_ordered(&self, key: u64, task: Task) {
        let lane = (key % self.lanes.len() as u64) as usize;
        if self.lanes[lane].send(task).is_err() {
            tracing::warn!("ordered executor lane {} is gone, dropping task", lane);
        }
    }
}

impl Default for OrderedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_runs_in_submission_order() {
        let executor = OrderedExecutor::with_lanes(4);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100u64 {
            let seen = seen.clone();
            executor.submit_ordered(
                42,
                Box::new(move || {
                    seen.lock().unwrap().push(i);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_keys_make_progress() {
        let executor = OrderedExecutor::with_lanes(3);
        let count = Arc::new(AtomicUsize::new(0));

        for key in 0..64u64 {
            let count = count.clone();
            executor.submit_ordered(
                key,
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_tasks_survive_drop() {
        let executor = OrderedExecutor::with_lanes(1);
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let count = count.clone();
            executor.submit_ordered(
                1,
                Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        drop(executor);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
