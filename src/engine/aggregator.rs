use crate::engine::options::{AggregateDefaults, AggregateOptions, BatchCallback, Reducer};
use crate::merge::Coalesce;
use crate::observability::{AggregatorTelemetry, BatchActivity, BatchActivityLog};
use crate::scheduler::{FlushScheduler, ScheduledTask, TimerHandle};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors returned synchronously by `submit`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("namespace must not be empty")]
    EmptyNamespace,
    #[error("aggregator has been closed")]
    Closed,
}

/// Completion slot registered for a single `submit` call. Invoked exactly
/// once, after the batch flushes.
type PendingCallback<T> = Box<dyn FnOnce(Arc<T>) + Send>;

struct TimerSlot {
    generation: u64,
    handle: Box<dyn TimerHandle>,
}

/// The three namespace-keyed tables. A namespace gains and loses its entry
/// in all of them together; queue and callback lengths match until flush.
struct Tables<T> {
    queues: HashMap<String, Vec<T>>,
    callbacks: HashMap<String, Vec<PendingCallback<T>>>,
    timers: HashMap<String, TimerSlot>,
    next_generation: u64,
    closed: bool,
}

impl<T> Tables<T> {
    fn new() -> Self {
        Self {
            queues: HashMap::new(),
            callbacks: HashMap::new(),
            timers: HashMap::new(),
            next_generation: 0,
            closed: false,
        }
    }
}

/// Collapses bursts of near-simultaneous submissions sharing a namespace
/// into a single deferred merge, fanning the result back out to every
/// registered completion callback.
///
/// Per namespace the lifecycle is `absent -> armed -> absent`: the first
/// submission since the last flush arms a scheduler task, later submissions
/// enqueue (optionally rearming the timer under debounce), and the flush
/// removes the namespace entirely so the next submission starts fresh.
pub struct Aggregator<T> {
    scheduler: Arc<dyn FlushScheduler>,
    tables: Arc<Mutex<Tables<T>>>,
    defaults: Mutex<AggregateDefaults<T>>,
    telemetry: AggregatorTelemetry,
    activity: BatchActivityLog,
}

impl<T: Coalesce + Send + 'static> Aggregator<T> {
    /// Creates an aggregator whose default reducer is the shallow
    /// field-overwrite merge.
    pub fn new(scheduler: Arc<dyn FlushScheduler>) -> Self {
        Self::with_defaults(scheduler, AggregateDefaults::shallow_merge())
    }
}

impl<T: Send + 'static> Aggregator<T> {
    /// Creates an aggregator with explicit engine-wide defaults.
    pub fn with_defaults(
        scheduler: Arc<dyn FlushScheduler>,
        defaults: AggregateDefaults<T>,
    ) -> Self {
        Self {
            scheduler,
            tables: Arc::new(Mutex::new(Tables::new())),
            defaults: Mutex::new(defaults),
            telemetry: AggregatorTelemetry::default(),
            activity: BatchActivityLog::default(),
        }
    }

    /// Returns a copy of the engine-wide defaults.
    pub fn defaults(&self) -> AggregateDefaults<T> {
        self.defaults.lock().unwrap().clone()
    }

    /// Replaces the engine-wide defaults. In-flight batches keep the
    /// settings they were submitted with.
    pub fn set_defaults(&self, defaults: AggregateDefaults<T>) {
        *self.defaults.lock().unwrap() = defaults;
    }

    pub fn telemetry(&self) -> &AggregatorTelemetry {
        &self.telemetry
    }

    pub fn activity_log(&self) -> BatchActivityLog {
        self.activity.clone()
    }

    /// Queues a payload for the namespace's current batch and registers the
    /// completion callback for this call.
    ///
    /// The first submission since the namespace's last flush becomes the
    /// primary: its `on_done` always receives the merged result. Later
    /// submissions in the same batch receive `extra` when configured, are
    /// discarded when `noop` is set, and otherwise queue their own `on_done`
    /// identically to the primary. Completion is always deferred; `on_done`
    /// never runs inside this call.
    pub fn submit<F>(
        &self,
        namespace: &str,
        payload: T,
        options: AggregateOptions<T>,
        on_done: F,
    ) -> Result<(), SubmitError>
    where
        F: FnOnce(Arc<T>) + Send + 'static,
    {
        if namespace.is_empty() {
            return Err(SubmitError::EmptyNamespace);
        }
        let effective = options.merged_over(&self.defaults.lock().unwrap());

        let mut tables = self.tables.lock().unwrap();
        if tables.closed {
            return Err(SubmitError::Closed);
        }
        let queue = tables.queues.entry(namespace.to_string()).or_default();
        queue.push(payload);
        let first = queue.len() == 1;

        let callback: PendingCallback<T> = if first {
            Box::new(on_done)
        } else if let Some(extra) = effective.extra.clone() {
            Box::new(move |merged| extra(merged))
        } else if effective.noop {
            Box::new(|_| {})
        } else {
            Box::new(on_done)
        };
        tables
            .callbacks
            .entry(namespace.to_string())
            .or_default()
            .push(callback);

        // Non-first submissions only touch the timer under debounce.
        if !first && !effective.debounce {
            return Ok(());
        }
        if let Some(slot) = tables.timers.remove(namespace) {
            slot.handle.cancel();
            self.telemetry.record_rearm();
        }
        let generation = tables.next_generation;
        tables.next_generation += 1;
        let task = self.flush_task(namespace.to_string(), generation, effective.reducer);
        let handle = if effective.duration.is_zero() {
            self.scheduler.schedule_asap(task)
        } else {
            self.scheduler.schedule_after(effective.duration, task)
        };
        tables
            .timers
            .insert(namespace.to_string(), TimerSlot { generation, handle });

        let delay_ms = effective.duration.as_millis() as u64;
        self.activity.record(
            namespace,
            if first {
                BatchActivity::Armed { delay_ms }
            } else {
                BatchActivity::Rearmed { delay_ms }
            },
        );
        Ok(())
    }

    /// `submit` variant returning an awaitable completion channel instead
    /// of taking a callback.
    pub fn submit_channel(
        &self,
        namespace: &str,
        payload: T,
        options: AggregateOptions<T>,
    ) -> Result<oneshot::Receiver<Arc<T>>, SubmitError>
    where
        T: Sync,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(namespace, payload, options, move |merged| {
            let _ = tx.send(merged);
        })?;
        Ok(rx)
    }

    /// Returns a single-argument adapter that submits into `namespace`.
    ///
    /// Intended for fire-and-forget call sites where only the canonical
    /// listener cares about the merged result, so `noop` defaults to true
    /// unless the caller set it explicitly.
    pub fn wrap(
        self: &Arc<Self>,
        namespace: impl Into<String>,
        mut options: AggregateOptions<T>,
        on_done: Arc<BatchCallback<T>>,
    ) -> impl Fn(T) -> Result<(), SubmitError> {
        if options.noop.is_none() {
            options.noop = Some(true);
        }
        let aggregator = Arc::clone(self);
        let namespace = namespace.into();
        move |payload| {
            let primary = Arc::clone(&on_done);
            aggregator.submit(&namespace, payload, options.clone(), move |merged| {
                primary(merged)
            })
        }
    }

    /// Payloads queued for the namespace's current batch.
    pub fn pending_len(&self, namespace: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .queues
            .get(namespace)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Whether a flush is armed for the namespace.
    pub fn is_armed(&self, namespace: &str) -> bool {
        self.tables.lock().unwrap().timers.contains_key(namespace)
    }

    /// Deterministic teardown: cancels every armed timer, drops pending
    /// payloads and callbacks without invoking them, and rejects further
    /// submissions.
    pub fn close(&self) {
        let mut tables = self.tables.lock().unwrap();
        if tables.closed {
            return;
        }
        tables.closed = true;
        for (_, slot) in tables.timers.drain() {
            slot.handle.cancel();
        }
        tables.queues.clear();
        tables.callbacks.clear();
    }

    fn flush_task(
        &self,
        namespace: String,
        generation: u64,
        reducer: Arc<Reducer<T>>,
    ) -> ScheduledTask {
        let tables = Arc::clone(&self.tables);
        let telemetry = self.telemetry.clone();
        let activity = self.activity.clone();
        Box::new(move || {
            // Extract the batch under the lock so the namespace reverts to
            // unseen before any callback runs; reentrant submissions from
            // callbacks start a fresh batch.
            let (payloads, callbacks) = {
                let mut guard = tables.lock().unwrap();
                let current = guard.timers.get(&namespace).map(|slot| slot.generation);
                if current != Some(generation) {
                    // A rearm superseded this fire.
                    return;
                }
                guard.timers.remove(&namespace);
                let payloads = guard.queues.remove(&namespace).unwrap_or_default();
                let callbacks = guard.callbacks.remove(&namespace).unwrap_or_default();
                (payloads, callbacks)
            };
            let payload_count = payloads.len();
            let callback_count = callbacks.len();

            let folded = catch_unwind(AssertUnwindSafe(|| {
                payloads
                    .into_iter()
                    .fold(None, |acc, payload| Some(reducer(acc, payload)))
            }));
            let merged = match folded {
                Ok(Some(merged)) => Arc::new(merged),
                Ok(None) => return,
                Err(_) => {
                    // The accumulator is unrecoverable mid-fold. The
                    // namespace state is already cleared, so the batch is
                    // dropped without fan-out and a fresh batch can start.
                    telemetry.record_reducer_fault();
                    activity.record(&namespace, BatchActivity::ReducerFault);
                    return;
                }
            };

            for callback in callbacks {
                let shared = Arc::clone(&merged);
                match catch_unwind(AssertUnwindSafe(move || callback(shared))) {
                    Ok(()) => telemetry.record_callback(),
                    Err(_) => {
                        telemetry.record_callback_fault();
                        activity.record(&namespace, BatchActivity::CallbackFault);
                    }
                }
            }
            telemetry.record_flush(payload_count as u64);
            activity.record(
                &namespace,
                BatchActivity::Flushed {
                    payloads: payload_count,
                    callbacks: callback_count,
                },
            );
        })
    }
}

impl<T> Drop for Aggregator<T> {
    fn drop(&mut self) {
        let mut tables = self.tables.lock().unwrap();
        tables.closed = true;
        for (_, slot) in tables.timers.drain() {
            slot.handle.cancel();
        }
    }
}
