use super::SharedQueue;
use crate::{Error, GenerationBackend, Job, ServiceStats, Task, TaskOutput, TaskResult};
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;
use tokio::{
    sync::mpsc::{self, error::SendTimeoutError},
    task::JoinError,
};
use tokio_util::sync::CancellationToken;

/// Worker task responsible for processing [`Job`]s from the shared queue.
///
/// Workers compete for the queue's receiver; whichever worker holds the lock
/// waits on `recv`, the rest park on the lock. Jobs therefore leave the queue
/// in FIFO order, while completion order depends on backend latency.
///
/// The loop ends when the queue is closed and empty (graceful drain) or when
/// `halt` is cancelled (drain deadline exceeded).
///
/// # Arguments
///
/// - `worker_id`: Identifier for this worker (used for logs/tracing).
/// - `queue`: The service's shared job receiver.
/// - `backend`: Generation backend invoked for each job.
/// - `halt`: Stops the loop before the next dequeue once cancelled.
/// - `delivery_timeout`: Bound on waiting for room on a caller's channel.
/// - `stats`: Shared counters.
pub async fn worker_loop(
    worker_id: usize,
    queue: SharedQueue,
    backend: Arc<dyn GenerationBackend>,
    halt: CancellationToken,
    delivery_timeout: Duration,
    stats: Arc<ServiceStats>,
) {
    tracing::trace!("Worker {worker_id} started");

    while let Some(job) = next_job(&queue, &halt).await {
        process_job(worker_id, job, &backend, delivery_timeout, &stats).await;
    }

    tracing::debug!("Worker {worker_id} stopped");
}

async fn next_job(queue: &SharedQueue, halt: &CancellationToken) -> Option<Job> {
    tokio::select! {
        biased;
        () = halt.cancelled() => None,
        job = async { queue.lock().await.recv().await } => job,
    }
}

async fn process_job(
    worker_id: usize,
    job: Job,
    backend: &Arc<dyn GenerationBackend>,
    delivery_timeout: Duration,
    stats: &ServiceStats,
) {
    let Job { id, task, reply } = job;
    let kind = task.kind();

    tracing::debug!(worker_id, job_id = %id, %kind, "task started");
    let start = Instant::now();

    let outcome = execute(task, Arc::clone(backend)).await;
    let elapsed = start.elapsed();

    match &outcome {
        Ok(_) => tracing::info!(worker_id, job_id = %id, %kind, ?elapsed, "task completed"),
        Err(e) => {
            tracing::warn!(worker_id, job_id = %id, %kind, ?elapsed, error = %e, "task failed");
        }
    }
    stats.record_outcome(outcome.is_ok());

    deliver(&reply, TaskResult { id, outcome }, delivery_timeout, stats).await;
}

/// Runs the backend call on the blocking pool so a slow backend never stalls
/// the async runtime. A panic inside the backend is reported as a failed job.
async fn execute(task: Task, backend: Arc<dyn GenerationBackend>) -> Result<TaskOutput, Error> {
    let kind = task.kind();

    match tokio::task::spawn_blocking(move || task.run(&*backend)).await {
        Ok(result) => result.map_err(Error::from),
        Err(e) => Err(Error::BackendPanicked {
            kind,
            message: panic_message(e),
        }),
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }

    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Hands `result` to its caller, waiting at most `delivery_timeout` for room.
///
/// Returns `false` if the result was discarded, either because the caller's
/// channel stayed full or because the caller dropped its receiver. Discarded
/// results are never retried.
pub(crate) async fn deliver(
    reply: &mpsc::Sender<TaskResult>,
    result: TaskResult,
    delivery_timeout: Duration,
    stats: &ServiceStats,
) -> bool {
    match reply.send_timeout(result, delivery_timeout).await {
        Ok(()) => true,
        Err(SendTimeoutError::Timeout(result)) => {
            tracing::warn!(
                job_id = %result.id,
                ?delivery_timeout,
                "result channel timeout, discarding result"
            );
            stats.record_delivery_failure();
            false
        }
        Err(SendTimeoutError::Closed(result)) => {
            tracing::warn!(job_id = %result.id, "caller dropped result channel, discarding result");
            stats.record_delivery_failure();
            false
        }
    }
}

/// Answers `job` with [`Error::ServiceShutdown`] without running it.
pub(crate) async fn reject(job: Job, delivery_timeout: Duration, stats: &ServiceStats) {
    stats.record_rejected();
    tracing::debug!(job_id = %job.id, kind = %job.kind(), "rejecting job, service is shutting down");

    let result = TaskResult::failure(job.id, Error::ServiceShutdown);
    deliver(&job.reply, result, delivery_timeout, stats).await;
}
