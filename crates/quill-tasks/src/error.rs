//! Error types for the task service.
//!
//! This module defines the central [`Error`] enum, which captures every
//! outcome a caller can observe besides a successful [`TaskOutput`], and
//! [`BackendError`], the failure type a [`GenerationBackend`] reports.
//!
//! ## Error Cases
//! - `ServiceShutdown`: A job was submitted while the service was draining or
//!   stopped, or it was still queued when the shutdown deadline elapsed.
//! - `Backend`: The generation backend returned an error for the job.
//! - `BackendPanicked`: The generation backend panicked while running the job.
//! - `InvalidRequest`: The submission itself was malformed (e.g. empty id).
//! - `InvalidConfig`: The service configuration was rejected at construction.
//! - `UnknownTaskType`: A task name could not be parsed into a [`TaskKind`].
//!
//! [`TaskOutput`]: crate::TaskOutput
//! [`TaskKind`]: crate::TaskKind
//! [`GenerationBackend`]: crate::GenerationBackend

use crate::task::TaskKind;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the task service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The service is draining or stopped and no longer accepts work.
    #[error("service is shutting down")]
    ServiceShutdown,

    /// The generation backend reported a failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The generation backend panicked. The worker survives; only this job
    /// fails.
    #[error("backend panicked during {kind}: {message}")]
    BackendPanicked { kind: TaskKind, message: String },

    /// The submission was rejected before reaching the queue.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The service configuration is unusable.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    /// A task name did not match any known [`TaskKind`].
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),
}

/// Failure reported by a generation backend.
///
/// The variants follow the failure classes a remote model API produces. The
/// service never retries; the error is handed to the caller as-is.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum BackendError {
    /// The input was rejected before any work was attempted.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The backend (or its upstream) refused the call due to rate limiting.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The upstream request failed (network, non-success status, ...).
    #[error("request failed: {reason}")]
    RequestFailed { reason: String },

    /// The upstream answered with something that could not be interpreted.
    #[error("invalid response")]
    InvalidResponse,

    /// The backend does not implement this operation.
    #[error("operation not supported: {operation}")]
    Unsupported { operation: &'static str },

    #[error("{0}")]
    Other(String),
}
