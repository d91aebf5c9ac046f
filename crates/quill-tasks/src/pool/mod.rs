//! Worker pool internals.
//!
//! - [`manager`] - spawns, joins and halts the workers.
//! - [`worker`] - the per-worker loop, backend dispatch and result delivery.

pub mod manager;
pub mod worker;

use crate::Job;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// The receiving end of the job queue, shared by every worker.
pub type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;
