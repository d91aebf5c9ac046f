use crate::request::RequestDefaults;
use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use quill_tasks::ServiceConfig;

/// Runtime configuration for the `quill-tasks` binary.
///
/// These settings control the size of the worker pool, how much work it
/// buffers, and how long each side waits on the other. All values are parsed
/// from CLI arguments or environment variables (a `.env` file is honored).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "quill-tasks",
    version,
    about = "Run summarize/tag/spam jobs from NDJSON on stdin through a bounded worker pool"
)]
pub struct CliArgs {
    /// Number of workers running generation jobs concurrently.
    ///
    /// Defaults to the number of logical CPUs.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Maximum number of jobs waiting for a worker.
    ///
    /// Once full, reading stdin pauses until a worker frees a slot.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 100)]
    pub queue_capacity: usize,

    /// How long a worker waits to hand a result to its waiter before
    /// discarding it, in milliseconds.
    ///
    /// Environment variable: `DELIVERY_TIMEOUT_MS`
    #[arg(long, env = "DELIVERY_TIMEOUT_MS", default_value_t = 5_000)]
    pub delivery_timeout_ms: u64,

    /// How long shutdown waits for queued jobs to finish, in milliseconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_MS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_MS", default_value_t = 30_000)]
    pub shutdown_timeout_ms: u64,

    /// How long to wait for each job's result before reporting it as timed
    /// out, in milliseconds.
    ///
    /// Environment variable: `RESULT_TIMEOUT_MS`
    #[arg(long, env = "RESULT_TIMEOUT_MS", default_value_t = 60_000)]
    pub result_timeout_ms: u64,

    /// Summary length used when a summarize request omits `max_length`.
    ///
    /// Environment variable: `SUMMARY_MAX_LENGTH`
    #[arg(long, env = "SUMMARY_MAX_LENGTH", default_value_t = 200)]
    pub summary_max_length: usize,

    /// Tag count used when a tags request omits `count`.
    ///
    /// Environment variable: `TAG_COUNT`
    #[arg(long, env = "TAG_COUNT", default_value_t = 5)]
    pub tag_count: usize,

    /// Comma-separated keywords that mark a comment as spam.
    ///
    /// Environment variable: `SPAM_KEYWORDS`
    #[arg(
        long,
        env = "SPAM_KEYWORDS",
        value_delimiter = ',',
        default_value = "spam,casino,viagra,free money,click here,广告,垃圾"
    )]
    pub spam_keywords: Vec<String>,

    /// Log output format (logs go to stderr; stdout carries results).
    ///
    /// Environment variable: `LOG_FORMAT`
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub service: ServiceConfig,
    pub result_timeout: Duration,
    pub summary_max_length: usize,
    pub tag_count: usize,
    pub spam_keywords: Vec<String>,
    pub log_format: LogFormat,
}

impl CliConfig {
    pub const fn request_defaults(&self) -> RequestDefaults {
        RequestDefaults {
            summary_max_length: self.summary_max_length,
            tag_count: self.tag_count,
        }
    }
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let num_workers = args.num_workers.unwrap_or_else(num_cpus::get);

        if num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }
        if args.queue_capacity == 0 {
            bail!("QUEUE_CAPACITY must be greater than 0");
        }
        if args.delivery_timeout_ms == 0 {
            bail!("DELIVERY_TIMEOUT_MS must be greater than 0");
        }
        if args.shutdown_timeout_ms == 0 {
            bail!("SHUTDOWN_TIMEOUT_MS must be greater than 0");
        }
        if args.result_timeout_ms == 0 {
            bail!("RESULT_TIMEOUT_MS must be greater than 0");
        }
        if args.summary_max_length == 0 {
            bail!("SUMMARY_MAX_LENGTH must be greater than 0");
        }

        let service = ServiceConfig::with_workers(num_workers)
            .queue_capacity(args.queue_capacity)
            .delivery_timeout(Duration::from_millis(args.delivery_timeout_ms))
            .shutdown_timeout(Duration::from_millis(args.shutdown_timeout_ms));
        service.validate()?;

        let spam_keywords = args
            .spam_keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self {
            service,
            result_timeout: Duration::from_millis(args.result_timeout_ms),
            summary_max_length: args.summary_max_length,
            tag_count: args.tag_count,
            spam_keywords,
            log_format: args.log_format,
        })
    }
}
