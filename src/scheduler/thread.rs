use super::{FlushScheduler, ScheduledTask, TimerHandle};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Production scheduler backed by one std thread per deferred task.
///
/// Delayed tasks wait on a condvar so cancellation interrupts the sleep
/// instead of letting a dangling timer fire. A zero-delay task starts as
/// soon as its thread is scheduled by the OS; callers racing that flush may
/// land their submissions in the next batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadScheduler;

impl ThreadScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl FlushScheduler for ThreadScheduler {
    fn schedule_asap(&self, task: ScheduledTask) -> Box<dyn TimerHandle> {
        let state = Arc::new(TimerState::new());
        let worker_state = Arc::clone(&state);
        thread::Builder::new()
            .name("coalesce_flush".to_string())
            .spawn(move || {
                if worker_state.is_cancelled() {
                    return;
                }
                task();
            })
            .expect("failed to spawn flush worker");
        Box::new(ThreadTimer { state })
    }

    fn schedule_after(&self, delay: Duration, task: ScheduledTask) -> Box<dyn TimerHandle> {
        let state = Arc::new(TimerState::new());
        let worker_state = Arc::clone(&state);
        thread::Builder::new()
            .name("coalesce_timer".to_string())
            .spawn(move || {
                if worker_state.wait_for(delay) {
                    return;
                }
                task();
            })
            .expect("failed to spawn timer worker");
        Box::new(ThreadTimer { state })
    }
}

struct ThreadTimer {
    state: Arc<TimerState>,
}

impl TimerHandle for ThreadTimer {
    fn cancel(&self) {
        self.state.cancel();
    }
}

struct TimerState {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

impl TimerState {
    fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn cancel(&self) {
        let mut guard = self.cancelled.lock().unwrap();
        *guard = true;
        self.cv.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap()
    }

    /// Blocks until the delay elapses or the timer is cancelled.
    /// Returns true when cancelled.
    fn wait_for(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut guard = self.cancelled.lock().unwrap();
        loop {
            if *guard {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (next_guard, _) = self.cv.wait_timeout(guard, deadline - now).unwrap();
            guard = next_guard;
        }
    }
}
