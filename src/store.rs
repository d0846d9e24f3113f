use crate::engine::{AggregateOptions, Aggregator, SubmitError};
use crate::merge::Coalesce;
use crate::scheduler::FlushScheduler;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Callback invoked once per queued update after its batch is persisted.
type UpdateWaiter = Box<dyn FnOnce(Value) + Send>;

/// In-memory key/value store that coalesces concurrent updates to the same
/// key into a single load -> merge -> save cycle.
///
/// Each `update` queues its patch through the aggregator; when the batch
/// closes, the merged patch is applied over the stored value in one
/// read-modify-write, and every queued caller is notified with the saved
/// value. This is the proof case for the aggregation contract: N bursty
/// updates cost one store round-trip instead of N racing ones.
pub struct MemoryStore {
    scheduler: Arc<dyn FlushScheduler>,
    aggregator: Arc<Aggregator<Value>>,
    data: Arc<Mutex<HashMap<String, Value>>>,
    waiters: Arc<Mutex<HashMap<String, Vec<UpdateWaiter>>>>,
}

impl MemoryStore {
    pub fn new(scheduler: Arc<dyn FlushScheduler>) -> Arc<Self> {
        Arc::new(Self {
            aggregator: Arc::new(Aggregator::new(Arc::clone(&scheduler))),
            scheduler,
            data: Arc::new(Mutex::new(HashMap::new())),
            waiters: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Asynchronously loads the value stored under `key`.
    pub fn load(&self, key: &str, on_loaded: impl FnOnce(Option<Value>) + Send + 'static) {
        let data = Arc::clone(&self.data);
        let key = key.to_string();
        self.scheduler.schedule_asap(Box::new(move || {
            let value = data.lock().unwrap().get(&key).cloned();
            on_loaded(value);
        }));
    }

    /// Asynchronously stores `value` under `key`.
    pub fn save(&self, key: &str, value: Value, on_saved: impl FnOnce() + Send + 'static) {
        let data = Arc::clone(&self.data);
        let key = key.to_string();
        self.scheduler.schedule_asap(Box::new(move || {
            data.lock().unwrap().insert(key, value);
            on_saved();
        }));
    }

    /// Applies `patch` to the value under `key`, aggregated with every other
    /// update that lands in the same batch. `on_done` receives the value
    /// that was ultimately saved.
    pub fn update(
        self: &Arc<Self>,
        key: &str,
        patch: Value,
        on_done: impl FnOnce(Value) + Send + 'static,
    ) -> Result<(), SubmitError> {
        self.waiters
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(Box::new(on_done));
        let store = Arc::clone(self);
        let batch_key = key.to_string();
        let result = self.aggregator.submit(
            key,
            patch,
            AggregateOptions::default().with_noop(true),
            move |merged| store.apply_batch(batch_key, merged),
        );
        if result.is_err() {
            if let Some(queued) = self.waiters.lock().unwrap().get_mut(key) {
                queued.pop();
            }
        }
        result
    }

    /// Immediate read-modify-write without aggregation. Concurrent callers
    /// race their load/save cycles and overwrite each other's fields; kept
    /// as the contrast case for `update`.
    pub fn update_unbatched(
        self: &Arc<Self>,
        key: &str,
        patch: Value,
        on_done: impl FnOnce() + Send + 'static,
    ) {
        let store = Arc::clone(self);
        let save_key = key.to_string();
        self.load(key, move |existing| {
            let combined = Value::coalesce(existing, patch);
            store.save(&save_key, combined, on_done);
        });
    }

    /// Returns a snapshot of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().unwrap().get(key).cloned()
    }

    /// The aggregator backing `update`, exposed for telemetry inspection.
    pub fn aggregator(&self) -> &Arc<Aggregator<Value>> {
        &self.aggregator
    }

    fn apply_batch(self: Arc<Self>, key: String, batch: Arc<Value>) {
        let store = Arc::clone(&self);
        let load_key = key.clone();
        self.load(&load_key, move |existing| {
            // Batch fields win over the stored value on conflict.
            let combined = Value::coalesce(existing, (*batch).clone());
            let saved = combined.clone();
            let notify_store = Arc::clone(&store);
            let notify_key = key.clone();
            store.save(&key, combined, move || {
                notify_store.drain_waiters(&notify_key, saved);
            });
        });
    }

    fn drain_waiters(&self, key: &str, value: Value) {
        let drained = self
            .waiters
            .lock()
            .unwrap()
            .remove(key)
            .unwrap_or_default();
        for waiter in drained {
            waiter(value.clone());
        }
    }
}
