use core::fmt;
use portable_atomic::{AtomicU8, Ordering};

/// Lifecycle of an [`AsyncTaskService`](crate::AsyncTaskService).
///
/// Transitions only move forward: `Running → Draining → Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    /// Accepting submissions; workers pulling from the queue.
    Running = 0,
    /// Shutdown requested; new submissions are rejected while queued work
    /// finishes.
    Draining = 1,
    /// Terminal. Workers have exited or the drain deadline elapsed.
    Stopped = 2,
}

impl LifecycleState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Running as u8))
    }

    pub(crate) fn load(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `Running → Draining`. Returns `false` if shutdown was already
    /// requested, so exactly one caller performs the drain.
    pub(crate) fn begin_draining(&self) -> bool {
        self.0
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn mark_stopped(&self) {
        self.0.store(LifecycleState::Stopped as u8, Ordering::Release);
    }
}
