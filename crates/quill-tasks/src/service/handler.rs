//! The asynchronous task service.
//!
//! This module defines [`AsyncTaskService`], which owns the bounded job queue
//! and the [`WorkerPool`] consuming it, exposes one submission method per
//! task kind and coordinates graceful shutdown.
//!
//! ## Responsibilities
//!
//! - Spawn the worker pool at construction.
//! - Enqueue jobs with backpressure while running.
//! - Reject submissions with `ServiceShutdown` once draining has begun.
//! - Drain queued work on shutdown, bounded by a deadline.

use super::state::{Lifecycle, LifecycleState};
use crate::{
    Error, GenerationBackend, Job, Result, ServiceConfig, ServiceStats, StatsSnapshot, Task,
    TaskResult,
    pool::{manager::WorkerPool, worker::reject},
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bounded worker pool running generation jobs in the background.
///
/// Cloning is cheap and every clone refers to the same service. Callers
/// observe outcomes only through the result channel they pass to a
/// `submit_*` method; each job yields at most one [`TaskResult`] there.
///
/// Dropping the last clone without calling [`shutdown`](Self::shutdown)
/// closes the queue; workers finish what is queued and exit on their own.
#[derive(Clone)]
pub struct AsyncTaskService {
    inner: Arc<Inner>,
}

struct Inner {
    /// `None` once shutdown has begun. Submitters clone it for the duration
    /// of one enqueue.
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    lifecycle: Lifecycle,
    /// Cancelled when draining starts, releasing submitters blocked on a full
    /// queue.
    draining: CancellationToken,
    pool: WorkerPool,
    config: ServiceConfig,
    stats: Arc<ServiceStats>,
}

impl AsyncTaskService {
    /// Creates a service with `num_workers` workers and default limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `num_workers` is zero.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new<B: GenerationBackend>(backend: B, num_workers: usize) -> Result<Self> {
        Self::with_config(backend, ServiceConfig::with_workers(num_workers))
    }

    /// Creates a service from `config` and starts its workers immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is rejected by
    /// [`ServiceConfig::validate`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn with_config<B: GenerationBackend>(backend: B, config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let backend: Arc<dyn GenerationBackend> = Arc::new(backend);
        let stats = Arc::new(ServiceStats::default());
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let pool = WorkerPool::spawn(rx, backend, &config, Arc::clone(&stats));

        tracing::info!(
            workers = config.num_workers,
            queue_capacity = config.queue_capacity,
            "Started task service"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                sender: RwLock::new(Some(tx)),
                lifecycle: Lifecycle::new(),
                draining: CancellationToken::new(),
                pool,
                config,
                stats,
            }),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.load()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Enqueues `task` under the correlation id `id`.
    ///
    /// While the service is running this waits for a free queue slot if the
    /// queue is full. Once shutdown has begun the job is not enqueued; instead
    /// `reply` receives a [`TaskResult`] carrying [`Error::ServiceShutdown`],
    /// delivered within the configured delivery timeout. A submitter that is
    /// waiting on a full queue when shutdown starts takes the same path.
    ///
    /// The service does not deduplicate ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `id` is empty. Nothing is sent on
    /// `reply` in that case.
    pub async fn submit(
        &self,
        id: impl Into<String>,
        task: Task,
        reply: mpsc::Sender<TaskResult>,
    ) -> Result<()> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "job id must not be empty".to_string(),
            });
        }

        let job = Job { id, task, reply };

        // The sender clone is dropped before any rejection is delivered.
        let rejected = match self.open_sender() {
            None => job,
            Some(sender) => tokio::select! {
                biased;
                () = self.inner.draining.cancelled() => job,
                permit = sender.reserve() => match permit {
                    Ok(permit) => {
                        tracing::trace!(job_id = %job.id, kind = %job.kind(), "job queued");
                        self.inner.stats.record_submitted();
                        permit.send(job);
                        return Ok(());
                    }
                    Err(_) => job,
                },
            },
        };

        self.reject(rejected).await;
        Ok(())
    }

    /// Submits a summarization job.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub async fn submit_summary(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        max_length: usize,
        reply: mpsc::Sender<TaskResult>,
    ) -> Result<()> {
        let task = Task::Summarize {
            text: text.into(),
            max_length,
        };
        self.submit(id, task, reply).await
    }

    /// Submits a tag-generation job.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub async fn submit_tags(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        count: usize,
        reply: mpsc::Sender<TaskResult>,
    ) -> Result<()> {
        let task = Task::GenerateTags {
            text: text.into(),
            count,
        };
        self.submit(id, task, reply).await
    }

    /// Submits a spam-detection job.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub async fn submit_spam_check(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        reply: mpsc::Sender<TaskResult>,
    ) -> Result<()> {
        let task = Task::DetectSpam { text: text.into() };
        self.submit(id, task, reply).await
    }

    /// Submits a post-content generation job.
    ///
    /// # Errors
    ///
    /// See [`submit`](Self::submit).
    pub async fn submit_content(
        &self,
        id: impl Into<String>,
        topic: impl Into<String>,
        reply: mpsc::Sender<TaskResult>,
    ) -> Result<()> {
        let task = Task::GenerateContent {
            topic: topic.into(),
        };
        self.submit(id, task, reply).await
    }

    /// Gracefully shuts the service down.
    ///
    /// - Stops accepting new jobs and closes the queue.
    /// - Waits up to the configured shutdown timeout for workers to finish
    ///   everything already queued.
    /// - On timeout, logs a warning, stops idle workers and rejects jobs that
    ///   never started. Backend calls in flight are not interrupted.
    ///
    /// Only the first call does any work; later or concurrent calls return
    /// immediately.
    pub async fn shutdown(&self) {
        if !self.inner.lifecycle.begin_draining() {
            tracing::debug!(state = %self.state(), "Shutdown already requested");
            return;
        }

        // === Phase 1: Stop accepting new jobs ===
        tracing::info!("Shutting down task service");
        self.inner.draining.cancel();
        drop(self.inner.sender.write().take());

        // === Phase 2: Let workers drain the queue ===
        let deadline = self.inner.config.shutdown_timeout;
        tracing::debug!(
            workers = self.inner.pool.num_workers(),
            ?deadline,
            "Draining queued jobs"
        );

        if self.inner.pool.join(deadline).await {
            tracing::info!("Task service shutdown complete");
        } else {
            // === Phase 3: Deadline exceeded, stop dequeuing ===
            tracing::warn!(
                ?deadline,
                "Task service shutdown timed out; in-flight backend calls keep running"
            );
            self.inner.pool.halt();

            let rejected = self
                .inner
                .pool
                .reject_queued(self.inner.config.delivery_timeout, &self.inner.stats)
                .await;
            if rejected > 0 {
                tracing::warn!(rejected, "Rejected jobs still queued at shutdown deadline");
            }
        }

        self.inner.lifecycle.mark_stopped();
    }

    fn open_sender(&self) -> Option<mpsc::Sender<Job>> {
        if self.state() != LifecycleState::Running {
            return None;
        }
        self.inner.sender.read().clone()
    }

    async fn reject(&self, job: Job) {
        reject(job, self.inner.config.delivery_timeout, &self.inner.stats).await;
    }
}
