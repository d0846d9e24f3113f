use super::{FlushScheduler, ScheduledTask, TimerHandle};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Scheduler bound to a tokio runtime handle.
///
/// `schedule_after` requires the runtime to have its time driver enabled.
/// Spawned tasks never run inline with the caller, so the same-turn
/// enqueue guarantee holds for code running on a current-thread runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler for the provided runtime handle.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler for the runtime of the current async context.
    ///
    /// # Panics
    /// Panics outside of a tokio runtime, mirroring `Handle::current`.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }
}

impl FlushScheduler for TokioScheduler {
    fn schedule_asap(&self, task: ScheduledTask) -> Box<dyn TimerHandle> {
        let join = self.handle.spawn(async move {
            task();
        });
        Box::new(TokioTimer { join })
    }

    fn schedule_after(&self, delay: Duration, task: ScheduledTask) -> Box<dyn TimerHandle> {
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioTimer { join })
    }
}

struct TokioTimer {
    join: JoinHandle<()>,
}

impl TimerHandle for TokioTimer {
    fn cancel(&self) {
        self.join.abort();
    }
}
