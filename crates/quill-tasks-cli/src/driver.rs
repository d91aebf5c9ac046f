//! Feeds NDJSON requests into the service and streams responses back.
//!
//! Every accepted line gets its own capacity-1 result channel and a waiter
//! task that races the result against the configured result timeout. Lines
//! that cannot become a job are answered immediately. Responses are written
//! in completion order, not input order; callers correlate by `id`.

use crate::config::CliConfig;
use crate::request::{JobResponse, parse_line};
use core::time::Duration;
use quill_tasks::{AsyncTaskService, Task, TaskResult};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_stream::{StreamExt, wrappers::LinesStream};
use tokio_util::sync::CancellationToken;

/// Counters for one driver run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriverSummary {
    /// Non-blank lines read.
    pub lines: u64,
    /// Lines that became a job in the service.
    pub submitted: u64,
    /// Lines answered without reaching the service.
    pub rejected: u64,
    /// Jobs whose result arrived in time (success or failure).
    pub answered: u64,
    /// Jobs reported as timed out or lost.
    pub timed_out: u64,
}

impl DriverSummary {
    fn tally(&mut self, waiter: Result<bool, JoinError>) {
        match waiter {
            Ok(true) => self.answered += 1,
            Ok(false) => self.timed_out += 1,
            Err(e) => {
                tracing::error!(error = %e, "result waiter exited abnormally");
                self.timed_out += 1;
            }
        }
    }
}

/// Reads requests from `reader` until EOF or `stop`, then shuts the service
/// down and waits for every outstanding result.
///
/// Response lines are sent on `out`. Shutdown is always called before this
/// returns, including on a read error.
///
/// # Errors
///
/// Returns an error if reading from `reader` fails.
pub async fn run<R>(
    reader: R,
    service: &AsyncTaskService,
    config: &CliConfig,
    out: mpsc::UnboundedSender<String>,
    stop: CancellationToken,
) -> anyhow::Result<DriverSummary>
where
    R: AsyncBufRead + Unpin,
{
    let defaults = config.request_defaults();
    let mut lines = LinesStream::new(reader.lines());
    let mut waiters = JoinSet::new();
    let mut summary = DriverSummary::default();

    let read_result = loop {
        let next = tokio::select! {
            biased;
            () = stop.cancelled() => {
                tracing::info!("Stop requested; no further input will be read");
                break Ok(());
            }
            next = lines.next() => next,
        };

        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => break Err(e),
            None => {
                tracing::debug!("End of input");
                break Ok(());
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        match parse_line(line, &defaults) {
            Err(rejected) => {
                tracing::warn!(id = ?rejected.id, reason = %rejected.reason, "Rejected request");
                summary.rejected += 1;
                emit(&out, &JobResponse::from(rejected));
            }
            Ok((id, task)) => {
                let (reply, rx) = mpsc::channel(1);
                match submit_or_stop(service, id.clone(), task, reply, &stop).await {
                    Ok(()) => {
                        summary.submitted += 1;
                        waiters.spawn(await_result(id, rx, config.result_timeout, out.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Rejected request");
                        summary.rejected += 1;
                        emit(&out, &JobResponse::rejected(Some(id), e.to_string()));
                    }
                }
            }
        }

        while let Some(waiter) = waiters.try_join_next() {
            summary.tally(waiter);
        }
    };

    service.shutdown().await;

    tracing::debug!(outstanding = waiters.len(), "Waiting for outstanding results");
    while let Some(waiter) = waiters.join_next().await {
        summary.tally(waiter);
    }

    read_result?;
    Ok(summary)
}

/// Submits one job, starting shutdown if `stop` fires while the queue is full.
///
/// Shutdown releases the waiting submission, which then answers the job with
/// `ServiceShutdown` on `reply` instead of enqueueing it.
async fn submit_or_stop(
    service: &AsyncTaskService,
    id: String,
    task: Task,
    reply: mpsc::Sender<TaskResult>,
    stop: &CancellationToken,
) -> quill_tasks::Result<()> {
    let submit = service.submit(id, task, reply);
    tokio::pin!(submit);

    tokio::select! {
        biased;
        submitted = &mut submit => submitted,
        () = stop.cancelled() => {
            tracing::info!("Stop requested while waiting for queue capacity");
            let (submitted, ()) = tokio::join!(submit, service.shutdown());
            submitted
        }
    }
}

/// Waits for the single result of one job and emits its response line.
///
/// Returns `true` if a result arrived within `timeout`.
async fn await_result(
    id: String,
    mut rx: mpsc::Receiver<TaskResult>,
    timeout: Duration,
    out: mpsc::UnboundedSender<String>,
) -> bool {
    let (response, answered) = match tokio::time::timeout(timeout, rx.recv()).await {
        Ok(Some(result)) => (JobResponse::from(result), true),
        Ok(None) => {
            tracing::warn!(job_id = %id, "Result channel closed without a result");
            (JobResponse::rejected(Some(id), "result was lost"), false)
        }
        Err(_) => {
            tracing::warn!(job_id = %id, ?timeout, "Timed out waiting for result");
            (JobResponse::timed_out(id, timeout), false)
        }
    };

    emit(&out, &response);
    answered
}

fn emit(out: &mpsc::UnboundedSender<String>, response: &JobResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            if out.send(line).is_err() {
                tracing::debug!(id = ?response.id, "Output closed; dropping response");
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode response"),
    }
}

/// Runs [`run`] with its responses written to `writer`.
///
/// Every response produced before a read error is written before the error
/// is returned.
///
/// # Errors
///
/// Returns the read error from [`run`] if there was one, otherwise the first
/// write error.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    service: &AsyncTaskService,
    config: &CliConfig,
    stop: CancellationToken,
) -> anyhow::Result<DriverSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (out, rx) = mpsc::unbounded_channel();
    let (driven, written) = tokio::join!(
        run(reader, service, config, out, stop),
        write_lines(writer, rx)
    );

    let summary = driven?;
    written?;
    Ok(summary)
}

/// Writes each line from `rx` followed by a newline, flushing as it goes.
/// Returns once every sender has been dropped.
///
/// # Errors
///
/// Returns the first write error.
pub async fn write_lines<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
