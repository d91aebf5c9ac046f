//! Service configuration.
//!
//! These values control how much work the service buffers and how long it is
//! willing to wait on slow callers and slow workers.
//!
//! ## Key Concepts
//! - **Backpressure**: `queue_capacity` bounds the shared FIFO. Once it is
//!   full, submitters wait for a slot instead of dropping work.
//! - **Delivery bound**: `delivery_timeout` caps how long a worker waits on a
//!   caller's full result channel before discarding the result.
//! - **Drain deadline**: `shutdown_timeout` caps how long `shutdown` waits for
//!   queued jobs to finish.

use crate::{Error, Result};
use core::time::Duration;

/// Default number of jobs that may wait in the queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default number of workers.
pub const DEFAULT_NUM_WORKERS: usize = 4;

/// Default bound on delivering one result to its caller.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on draining the queue during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Number of worker tasks pulling from the shared queue.
    pub num_workers: usize,
    /// Capacity of the shared job queue.
    pub queue_capacity: usize,
    /// How long a worker waits for room on a caller's result channel.
    pub delivery_timeout: Duration,
    /// How long `shutdown` waits for workers to drain the queue.
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServiceConfig {
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    #[must_use]
    pub const fn delivery_timeout(mut self, delivery_timeout: Duration) -> Self {
        self.delivery_timeout = delivery_timeout;
        self
    }

    #[must_use]
    pub const fn shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Checks the configuration can back a running service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if there are no workers, the queue has
    /// no capacity, or either timeout is zero.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.num_workers == 0 {
            "num_workers must be greater than 0"
        } else if self.queue_capacity == 0 {
            "queue_capacity must be greater than 0"
        } else if self.delivery_timeout.is_zero() {
            "delivery_timeout must be non-zero"
        } else if self.shutdown_timeout.is_zero() {
            "shutdown_timeout must be non-zero"
        } else {
            return Ok(());
        };

        Err(Error::InvalidConfig {
            reason: reason.to_string(),
        })
    }
}
