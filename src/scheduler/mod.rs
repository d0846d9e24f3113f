mod manual;
mod thread;
mod tokio_rt;

pub use manual::ManualScheduler;
pub use thread::ThreadScheduler;
pub use tokio_rt::TokioScheduler;

use std::time::Duration;

/// Deferred unit of work handed to a scheduler.
pub type ScheduledTask = Box<dyn FnOnce() + Send>;

/// Handle to a scheduled task.
pub trait TimerHandle: Send {
    /// Cancels the pending task. Idempotent; a no-op once the task has run.
    /// Dropping a handle never cancels.
    fn cancel(&self);
}

/// Capability the aggregator uses to defer batch flushes.
///
/// Both operations run the task strictly after the calling synchronous
/// segment completes, never inline.
pub trait FlushScheduler: Send + Sync {
    /// Runs the task on the next available turn.
    fn schedule_asap(&self, task: ScheduledTask) -> Box<dyn TimerHandle>;

    /// Runs the task once the delay has elapsed.
    fn schedule_after(&self, delay: Duration, task: ScheduledTask) -> Box<dyn TimerHandle>;
}
