//! Fixed-size pool of asynchronous workers sharing one job queue.
//!
//! This module defines the [`WorkerPool`] struct, which spawns the workers,
//! waits for them during shutdown and, if the drain deadline passes, stops
//! them via a shared [`CancellationToken`] and rejects whatever is still
//! queued.
//!
//! Unlike a round-robin design, every worker pulls from the same bounded
//! receiver, so an idle worker always picks up the oldest queued job.

use super::{
    SharedQueue,
    worker::{reject, worker_loop},
};
use crate::{GenerationBackend, Job, ServiceConfig, ServiceStats};
use core::time::Duration;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;

pub struct WorkerPool {
    handles: Mutex<Vec<JoinHandle<()>>>,
    queue: SharedQueue,
    halt: CancellationToken,
    num_workers: usize,
}

impl WorkerPool {
    /// Spawns `config.num_workers` workers on the current Tokio runtime, all
    /// consuming from `rx`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn(
        rx: mpsc::Receiver<Job>,
        backend: Arc<dyn GenerationBackend>,
        config: &ServiceConfig,
        stats: Arc<ServiceStats>,
    ) -> Self {
        let queue: SharedQueue = Arc::new(tokio::sync::Mutex::new(rx));
        let halt = CancellationToken::new();

        let handles = (0..config.num_workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&queue),
                    Arc::clone(&backend),
                    halt.clone(),
                    config.delivery_timeout,
                    Arc::clone(&stats),
                ))
            })
            .collect();

        Self {
            handles: Mutex::new(handles),
            queue,
            halt,
            num_workers: config.num_workers,
        }
    }

    pub const fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Waits up to `deadline` for every worker to exit.
    ///
    /// Workers exit on their own once the queue is closed and drained, so this
    /// must be called after the last queue sender is gone. Returns `true` if
    /// all workers exited in time. Workers still running afterwards are
    /// detached, not aborted.
    pub async fn join(&self, deadline: Duration) -> bool {
        let handles = core::mem::take(&mut *self.handles.lock());

        match timeout(deadline, futures::future::join_all(handles)).await {
            Ok(results) => {
                for (worker_id, res) in results.into_iter().enumerate() {
                    if let Err(e) = res {
                        tracing::error!("Worker {worker_id} terminated abnormally: {e}");
                    }
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Stops workers from dequeuing further jobs. Backend calls already
    /// running are left to finish.
    pub fn halt(&self) {
        self.halt.cancel();
    }

    /// Closes the queue and answers every job still in it with
    /// `ServiceShutdown`. Returns the number of rejected jobs.
    ///
    /// Only meaningful after [`halt`](Self::halt); otherwise workers would
    /// keep competing for the same jobs.
    pub async fn reject_queued(&self, delivery_timeout: Duration, stats: &ServiceStats) -> usize {
        let mut leftover = Vec::new();
        {
            let mut rx = self.queue.lock().await;
            rx.close();
            while let Ok(job) = rx.try_recv() {
                leftover.push(job);
            }
        }

        let rejected = leftover.len();
        futures::future::join_all(
            leftover
                .into_iter()
                .map(|job| reject(job, delivery_timeout, stats)),
        )
        .await;
        rejected
    }
}
