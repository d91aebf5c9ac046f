#![doc = include_str!("../README.md")]

mod backend;
mod config;
mod error;
mod pool;
mod service;
mod stats;
mod task;

pub use crate::backend::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::service::{handler::AsyncTaskService, state::LifecycleState};
pub use crate::stats::*;
pub use crate::task::*;
