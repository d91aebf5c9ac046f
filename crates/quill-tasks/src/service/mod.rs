//! Service lifecycle and submission.
//!
//! ## Structure
//!
//! - [`handler`] - the [`AsyncTaskService`](handler::AsyncTaskService) entry point.
//! - [`state`] - the `Running → Draining → Stopped` state machine.

pub mod handler;
pub mod state;

#[cfg(test)]
mod tests;
