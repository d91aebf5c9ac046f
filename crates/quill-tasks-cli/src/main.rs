#![doc = include_str!("../README.md")]

mod backend;
mod config;
mod driver;
mod request;
mod telemetry;

use backend::OfflineBackend;
use clap::Parser;
use config::{CliArgs, CliConfig};
use quill_tasks::{AsyncTaskService, ValidatingBackend};
use telemetry::init_telemetry;
use tokio::io::BufReader;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry(config.log_format)?;
    log_startup_info(&config);

    let backend = ValidatingBackend::new(OfflineBackend::new(config.spam_keywords.clone()));
    let service = AsyncTaskService::with_config(backend, config.service.clone())?;

    let stop = CancellationToken::new();
    tokio::spawn(shutdown_signal(stop.clone()));

    let summary = driver::serve(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        &service,
        &config,
        stop.clone(),
    )
    .await?;

    let stats = service.stats();
    tracing::info!(
        lines = summary.lines,
        submitted = summary.submitted,
        answered = summary.answered,
        rejected = summary.rejected,
        timed_out = summary.timed_out,
        succeeded = stats.succeeded,
        failed = stats.failed,
        delivery_failures = stats.delivery_failures,
        "Task service shut down successfully"
    );

    // The blocking stdin reader cannot be cancelled; exit instead of waiting
    // for the runtime to join it.
    if stop.is_cancelled() {
        std::process::exit(0);
    }
    Ok(())
}

fn log_startup_info(config: &CliConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting task service with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting task service with {} workers (queue capacity {})",
            config.service.num_workers,
            config.service.queue_capacity
        );
    }
}

async fn shutdown_signal(stop: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, draining queued jobs...");
    stop.cancel();
}
