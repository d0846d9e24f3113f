use super::{FlushScheduler, ScheduledTask, TimerHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic scheduler driven by an explicit fake clock.
///
/// Tasks only run inside `run_next_turn` or `advance`, which drain every
/// task due at the current instant in (due time, enqueue order). Tasks
/// scheduled by a running task for "as soon as possible" run within the
/// same drain.
#[derive(Default)]
pub struct ManualScheduler {
    inner: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    tasks: Vec<PendingTask>,
}

struct PendingTask {
    seq: u64,
    due: Duration,
    cancelled: Arc<AtomicBool>,
    task: ScheduledTask,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reading of the fake clock.
    pub fn now(&self) -> Duration {
        self.inner.lock().unwrap().now
    }

    /// Runs every task due at the current instant. Returns how many ran.
    pub fn run_next_turn(&self) -> usize {
        self.drain_due()
    }

    /// Moves the clock forward and runs every task that became due.
    pub fn advance(&self, delta: Duration) -> usize {
        {
            let mut state = self.inner.lock().unwrap();
            state.now += delta;
        }
        self.drain_due()
    }

    fn push(&self, due_in: Duration, task: ScheduledTask) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.inner.lock().unwrap();
        let due = state.now + due_in;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.push(PendingTask {
            seq,
            due,
            cancelled: Arc::clone(&cancelled),
            task,
        });
        Box::new(ManualTimer { cancelled })
    }

    fn drain_due(&self) -> usize {
        let mut executed = 0;
        loop {
            let next = {
                let mut state = self.inner.lock().unwrap();
                let now = state.now;
                let mut best: Option<usize> = None;
                for (idx, pending) in state.tasks.iter().enumerate() {
                    if pending.due > now {
                        continue;
                    }
                    best = match best {
                        Some(current) => {
                            let chosen = &state.tasks[current];
                            if (pending.due, pending.seq) < (chosen.due, chosen.seq) {
                                Some(idx)
                            } else {
                                Some(current)
                            }
                        }
                        None => Some(idx),
                    };
                }
                best.map(|idx| state.tasks.remove(idx))
            };
            let Some(pending) = next else {
                break;
            };
            if pending.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            (pending.task)();
            executed += 1;
        }
        executed
    }
}

impl FlushScheduler for ManualScheduler {
    fn schedule_asap(&self, task: ScheduledTask) -> Box<dyn TimerHandle> {
        self.push(Duration::ZERO, task)
    }

    fn schedule_after(&self, delay: Duration, task: ScheduledTask) -> Box<dyn TimerHandle> {
        self.push(delay, task)
    }
}

struct ManualTimer {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ManualTimer {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
