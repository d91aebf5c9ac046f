use crate::{
    AsyncTaskService, BackendError, BackendResult, Error, GenerationBackend, LifecycleState,
    ServiceConfig, StatsSnapshot, TaskKind, TaskOutput, TaskResult,
};
use core::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;
use tokio::{sync::mpsc, time::timeout};

const WAIT: Duration = Duration::from_secs(5);

/// Canned answers. The text `fail` makes the backend return an error, the
/// text `panic` makes it panic.
struct StubBackend;

impl GenerationBackend for StubBackend {
    fn summarize(&self, text: &str, _max_length: usize) -> BackendResult<String> {
        match text {
            "fail" => Err(BackendError::RequestFailed {
                reason: "upstream returned 500".to_string(),
            }),
            "panic" => panic!("backend exploded"),
            _ => Ok("short summary".to_string()),
        }
    }

    fn generate_tags(&self, _text: &str, count: usize) -> BackendResult<Vec<String>> {
        Ok(["rust", "async", "tokio"]
            .iter()
            .take(count)
            .map(ToString::to_string)
            .collect())
    }

    fn detect_spam(&self, text: &str) -> BackendResult<bool> {
        Ok(text.contains("casino"))
    }
}

#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

/// Opens the gate when dropped so a failing test never leaves a blocking
/// thread parked forever.
struct OpenOnDrop(Arc<Gate>);

impl Drop for OpenOnDrop {
    fn drop(&mut self) {
        self.0.open();
    }
}

/// Reports each summarize call as it starts, then blocks until the gate
/// opens.
struct GatedBackend {
    gate: Arc<Gate>,
    started: mpsc::UnboundedSender<String>,
}

impl GatedBackend {
    fn new() -> (Self, Arc<Gate>, mpsc::UnboundedReceiver<String>) {
        let gate = Arc::new(Gate::default());
        let (started, started_rx) = mpsc::unbounded_channel();
        let backend = Self {
            gate: Arc::clone(&gate),
            started,
        };
        (backend, gate, started_rx)
    }
}

impl GenerationBackend for GatedBackend {
    fn summarize(&self, text: &str, _max_length: usize) -> BackendResult<String> {
        let _ = self.started.send(text.to_string());
        self.gate.wait();
        Ok(text.to_uppercase())
    }

    fn generate_tags(&self, _text: &str, _count: usize) -> BackendResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn detect_spam(&self, _text: &str) -> BackendResult<bool> {
        Ok(false)
    }
}

async fn recv(rx: &mut mpsc::Receiver<TaskResult>) -> TaskResult {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for result")
        .expect("result channel closed")
}

async fn recv_all(rx: &mut mpsc::Receiver<TaskResult>, n: usize) -> HashMap<String, TaskResult> {
    let mut results = HashMap::with_capacity(n);
    for _ in 0..n {
        let result = recv(rx).await;
        assert!(
            results.insert(result.id.clone(), result).is_none(),
            "duplicate result"
        );
    }
    results
}

async fn wait_for_state(service: &AsyncTaskService, state: LifecycleState) {
    timeout(WAIT, async {
        while service.state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("state never reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn summary_result_is_correlated_by_id() {
    let service = AsyncTaskService::new(StubBackend, 2).unwrap();
    let (tx, mut rx) = mpsc::channel(1);

    service
        .submit_summary("job-1", "long text...", 200, tx)
        .await
        .unwrap();

    let result = recv(&mut rx).await;
    assert_eq!(result.id, "job-1");
    assert_eq!(
        result.data(),
        Some(&TaskOutput::Summary("short summary".to_string()))
    );
    assert_eq!(result.error(), None);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_kind_reaches_its_backend_method() {
    let service = AsyncTaskService::new(StubBackend, 2).unwrap();
    let (tx, mut rx) = mpsc::channel(4);

    service.submit_tags("tags", "post", 2, tx.clone()).await.unwrap();
    service
        .submit_spam_check("spam", "win at the casino", tx.clone())
        .await
        .unwrap();
    service.submit_content("content", "rust", tx).await.unwrap();

    let results = recv_all(&mut rx, 3).await;
    assert_eq!(
        results["tags"].data(),
        Some(&TaskOutput::Tags(vec!["rust".to_string(), "async".to_string()]))
    );
    assert_eq!(results["spam"].data(), Some(&TaskOutput::Spam(true)));
    assert_eq!(
        results["content"].error(),
        Some(&Error::Backend(BackendError::Unsupported {
            operation: "generate_content"
        }))
    );

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_job_gets_exactly_one_result() {
    let service = AsyncTaskService::new(StubBackend, 4).unwrap();

    let mut receivers = Vec::new();
    for i in 0..50 {
        let (tx, rx) = mpsc::channel(1);
        service
            .submit_spam_check(format!("job-{i}"), "hello", tx)
            .await
            .unwrap();
        receivers.push((format!("job-{i}"), rx));
    }

    for (id, rx) in &mut receivers {
        let result = recv(rx).await;
        assert_eq!(result.id, *id);
        assert_eq!(result.data(), Some(&TaskOutput::Spam(false)));
    }

    service.shutdown().await;

    for (_, rx) in &mut receivers {
        assert!(rx.try_recv().is_err());
    }
    let stats = service.stats();
    assert_eq!(stats.submitted, 50);
    assert_eq!(stats.succeeded, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_queue_blocks_the_submitter() {
    let (backend, gate, mut started) = GatedBackend::new();
    let _guard = OpenOnDrop(Arc::clone(&gate));
    let config = ServiceConfig::with_workers(1).queue_capacity(2);
    let service = AsyncTaskService::with_config(backend, config).unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    // Occupy the only worker.
    service.submit_summary("a", "a", 10, tx.clone()).await.unwrap();
    assert_eq!(timeout(WAIT, started.recv()).await.unwrap().as_deref(), Some("a"));

    // Fill the queue.
    for id in ["b", "c"] {
        timeout(WAIT, service.submit_summary(id, id, 10, tx.clone()))
            .await
            .expect("queue had room")
            .unwrap();
    }

    // No slot left: the next submission must wait rather than drop.
    let blocked = timeout(
        Duration::from_millis(200),
        service.submit_summary("d", "d", 10, tx.clone()),
    )
    .await;
    assert!(blocked.is_err(), "submission should block on a full queue");
    assert_eq!(service.stats().submitted, 3);

    let submitter = {
        let service = service.clone();
        let tx = tx.clone();
        tokio::spawn(async move { service.submit_summary("d", "d", 10, tx).await })
    };
    gate.open();
    submitter.await.unwrap().unwrap();

    let results = recv_all(&mut rx, 4).await;
    for id in ["a", "b", "c", "d"] {
        assert_eq!(
            results[id].data(),
            Some(&TaskOutput::Summary(id.to_uppercase()))
        );
    }

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_releases_a_submitter_blocked_on_a_full_queue() {
    let (backend, gate, mut started) = GatedBackend::new();
    let _guard = OpenOnDrop(Arc::clone(&gate));
    let config = ServiceConfig::with_workers(1).queue_capacity(1);
    let service = AsyncTaskService::with_config(backend, config).unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    service.submit_summary("running", "running", 10, tx.clone()).await.unwrap();
    assert_eq!(
        timeout(WAIT, started.recv()).await.unwrap().as_deref(),
        Some("running")
    );
    service.submit_summary("queued", "queued", 10, tx).await.unwrap();

    let (blocked_tx, mut blocked_rx) = mpsc::channel(1);
    let submitter = {
        let service = service.clone();
        tokio::spawn(async move {
            service
                .submit_summary("blocked", "blocked", 10, blocked_tx)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!submitter.is_finished(), "submitter should wait for a free slot");

    let shutdown = {
        let service = service.clone();
        tokio::spawn(async move { service.shutdown().await })
    };

    // The gate stays closed, so only the draining signal can release the
    // submitter this early; the shutdown deadline is 30s away.
    timeout(Duration::from_secs(1), submitter)
        .await
        .expect("blocked submitter must be released when shutdown begins")
        .unwrap()
        .unwrap();
    let blocked = recv(&mut blocked_rx).await;
    assert_eq!(blocked.id, "blocked");
    assert_eq!(blocked.error(), Some(&Error::ServiceShutdown));
    assert_eq!(service.stats().submitted, 2);
    assert_eq!(service.stats().rejected, 1);

    gate.open();
    timeout(WAIT, shutdown).await.unwrap().unwrap();
    let results = recv_all(&mut rx, 2).await;
    assert!(results["running"].is_ok());
    assert!(results["queued"].is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_rejection_does_not_hold_the_queue_open() {
    let (backend, gate, mut started) = GatedBackend::new();
    let _guard = OpenOnDrop(Arc::clone(&gate));
    let config = ServiceConfig::with_workers(1)
        .queue_capacity(1)
        .delivery_timeout(Duration::from_secs(3));
    let service = AsyncTaskService::with_config(backend, config).unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    service.submit_summary("running", "running", 10, tx.clone()).await.unwrap();
    assert_eq!(
        timeout(WAIT, started.recv()).await.unwrap().as_deref(),
        Some("running")
    );
    service.submit_summary("queued", "queued", 10, tx).await.unwrap();

    // Its rejection can only be delivered by timing out on this full channel.
    let (stuck_tx, _stuck_rx) = mpsc::channel(1);
    stuck_tx
        .try_send(TaskResult::success("filler", TaskOutput::Spam(false)))
        .unwrap();
    let submitter = {
        let service = service.clone();
        tokio::spawn(async move { service.submit_summary("stuck", "stuck", 10, stuck_tx).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!submitter.is_finished());

    let shutdown = {
        let service = service.clone();
        tokio::spawn(async move { service.shutdown().await })
    };
    wait_for_state(&service, LifecycleState::Draining).await;
    gate.open();

    timeout(Duration::from_secs(1), shutdown)
        .await
        .expect("drain must finish while the rejection is still waiting")
        .unwrap();
    assert_eq!(service.state(), LifecycleState::Stopped);

    let results = recv_all(&mut rx, 2).await;
    assert!(results["running"].is_ok());
    assert!(results["queued"].is_ok());

    timeout(WAIT, submitter).await.unwrap().unwrap().unwrap();
    assert_eq!(service.stats().delivery_failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_workers_wait_without_touching_the_queue() {
    let service = AsyncTaskService::new(StubBackend, 4).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(service.stats(), StatsSnapshot::default());
    assert_eq!(service.state(), LifecycleState::Running);

    let (tx, mut rx) = mpsc::channel(1);
    service.submit_spam_check("wake", "text", tx).await.unwrap();
    assert_eq!(recv(&mut rx).await.id, "wake");

    let stats = service.stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.completed(), 1);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submission_after_shutdown_is_rejected_promptly() {
    let service = AsyncTaskService::new(StubBackend, 2).unwrap();
    service.shutdown().await;
    assert_eq!(service.state(), LifecycleState::Stopped);

    let (tx, mut rx) = mpsc::channel(1);
    timeout(
        Duration::from_secs(1),
        service.submit_spam_check("job-2", "text", tx),
    )
    .await
    .expect("rejection must not block")
    .unwrap();

    let result = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.id, "job-2");
    assert_eq!(result.error(), Some(&Error::ServiceShutdown));
    assert_eq!(
        result.error().map(ToString::to_string).as_deref(),
        Some("service is shutting down")
    );
    assert_eq!(service.stats().rejected, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_error_is_isolated_to_its_job() {
    let service = AsyncTaskService::new(StubBackend, 2).unwrap();
    let (tx, mut rx) = mpsc::channel(2);

    service.submit_summary("job-3", "fail", 50, tx.clone()).await.unwrap();
    service.submit_summary("job-4", "fine", 50, tx).await.unwrap();

    let results = recv_all(&mut rx, 2).await;
    assert_eq!(results["job-3"].data(), None);
    assert_eq!(
        results["job-3"].error(),
        Some(&Error::Backend(BackendError::RequestFailed {
            reason: "upstream returned 500".to_string()
        }))
    );
    assert_eq!(
        results["job-4"].data(),
        Some(&TaskOutput::Summary("short summary".to_string()))
    );

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backend_panic_does_not_kill_the_worker() {
    // A single worker must survive the panic to serve the second job.
    let service = AsyncTaskService::new(StubBackend, 1).unwrap();
    let (tx, mut rx) = mpsc::channel(2);

    service.submit_summary("boom", "panic", 50, tx.clone()).await.unwrap();
    service.submit_summary("after", "fine", 50, tx).await.unwrap();

    let results = recv_all(&mut rx, 2).await;
    match results["boom"].error() {
        Some(Error::BackendPanicked { kind, message }) => {
            assert_eq!(*kind, TaskKind::Summarize);
            assert!(message.contains("backend exploded"), "{message}");
        }
        other => panic!("expected a panic error, got {other:?}"),
    }
    assert!(results["after"].is_ok());

    let stats = service.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unread_result_channel_does_not_stall_the_worker() {
    let config = ServiceConfig::with_workers(1).delivery_timeout(Duration::from_millis(100));
    let service = AsyncTaskService::with_config(StubBackend, config).unwrap();

    // A full channel nobody reads.
    let (stuck_tx, mut stuck_rx) = mpsc::channel(1);
    stuck_tx
        .try_send(TaskResult::success("filler", TaskOutput::Spam(false)))
        .unwrap();
    service.submit_spam_check("stuck", "text", stuck_tx).await.unwrap();

    let (tx, mut rx) = mpsc::channel(1);
    service.submit_spam_check("next", "text", tx).await.unwrap();

    let result = recv(&mut rx).await;
    assert_eq!(result.id, "next");
    assert_eq!(service.stats().delivery_failures, 1);

    assert_eq!(stuck_rx.try_recv().unwrap().id, "filler");
    assert!(stuck_rx.try_recv().is_err());

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_receiver_is_a_delivery_failure() {
    let service = AsyncTaskService::new(StubBackend, 1).unwrap();

    let (abandoned_tx, abandoned_rx) = mpsc::channel(1);
    drop(abandoned_rx);
    service
        .submit_summary("abandoned", "text", 10, abandoned_tx)
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::channel(1);
    service.submit_summary("kept", "text", 10, tx).await.unwrap();
    assert_eq!(recv(&mut rx).await.id, "kept");
    assert_eq!(service.stats().delivery_failures, 1);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_shutdown_is_a_noop() {
    let service = AsyncTaskService::new(StubBackend, 2).unwrap();

    service.shutdown().await;
    assert_eq!(service.state(), LifecycleState::Stopped);

    timeout(Duration::from_millis(100), service.shutdown())
        .await
        .expect("second shutdown must return immediately");
    assert_eq!(service.state(), LifecycleState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_drains_queued_jobs() {
    let (backend, gate, mut started) = GatedBackend::new();
    let _guard = OpenOnDrop(Arc::clone(&gate));
    let service = AsyncTaskService::new(backend, 1).unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    service.submit_summary("a", "a", 10, tx.clone()).await.unwrap();
    assert_eq!(timeout(WAIT, started.recv()).await.unwrap().as_deref(), Some("a"));
    service.submit_summary("b", "b", 10, tx.clone()).await.unwrap();
    service.submit_summary("c", "c", 10, tx.clone()).await.unwrap();

    let shutdown = {
        let service = service.clone();
        tokio::spawn(async move { service.shutdown().await })
    };
    wait_for_state(&service, LifecycleState::Draining).await;

    // New work is refused while queued work is still pending.
    service.submit_summary("late", "late", 10, tx).await.unwrap();
    let late = recv(&mut rx).await;
    assert_eq!(late.id, "late");
    assert_eq!(late.error(), Some(&Error::ServiceShutdown));

    gate.open();
    timeout(WAIT, shutdown).await.unwrap().unwrap();
    assert_eq!(service.state(), LifecycleState::Stopped);

    let results = recv_all(&mut rx, 3).await;
    for id in ["a", "b", "c"] {
        assert!(results[id].is_ok(), "{id} should have been drained");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_deadline_rejects_jobs_that_never_started() {
    let (backend, gate, mut started) = GatedBackend::new();
    let _guard = OpenOnDrop(Arc::clone(&gate));
    let config = ServiceConfig::with_workers(1).shutdown_timeout(Duration::from_millis(200));
    let service = AsyncTaskService::with_config(backend, config).unwrap();
    let (tx, mut rx) = mpsc::channel(8);

    service.submit_summary("running", "running", 10, tx.clone()).await.unwrap();
    assert_eq!(
        timeout(WAIT, started.recv()).await.unwrap().as_deref(),
        Some("running")
    );
    service.submit_summary("queued", "queued", 10, tx).await.unwrap();

    let begun = Instant::now();
    service.shutdown().await;
    assert!(begun.elapsed() < WAIT);
    assert_eq!(service.state(), LifecycleState::Stopped);

    let queued = recv(&mut rx).await;
    assert_eq!(queued.id, "queued");
    assert_eq!(queued.error(), Some(&Error::ServiceShutdown));

    // The in-flight call was not interrupted and still reports back.
    gate.open();
    let running = recv(&mut rx).await;
    assert_eq!(running.id, "running");
    assert_eq!(
        running.data(),
        Some(&TaskOutput::Summary("RUNNING".to_string()))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_id_is_refused_without_a_result() {
    let service = AsyncTaskService::new(StubBackend, 1).unwrap();
    let (tx, mut rx) = mpsc::channel(1);

    let err = service.submit_summary("", "text", 10, tx).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));
    assert!(rx.try_recv().is_err());
    assert_eq!(service.stats().submitted, 0);

    service.shutdown().await;
}

#[test]
fn zero_workers_is_an_invalid_config() {
    let err = AsyncTaskService::new(StubBackend, 0).err();
    assert!(matches!(err, Some(Error::InvalidConfig { .. })));
}
