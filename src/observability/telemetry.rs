use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cumulative counters describing aggregator behavior.
///
/// Clones share the underlying counters, so a copy taken before handing the
/// aggregator to workers keeps observing it.
#[derive(Debug, Clone, Default)]
pub struct AggregatorTelemetry {
    batches_flushed: Arc<AtomicU64>,
    payloads_merged: Arc<AtomicU64>,
    callbacks_invoked: Arc<AtomicU64>,
    callback_faults: Arc<AtomicU64>,
    reducer_faults: Arc<AtomicU64>,
    timers_rearmed: Arc<AtomicU64>,
}

impl AggregatorTelemetry {
    pub(crate) fn record_flush(&self, payloads: u64) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.payloads_merged.fetch_add(payloads, Ordering::Relaxed);
    }

    pub(crate) fn record_callback(&self) {
        self.callbacks_invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback_fault(&self) {
        self.callback_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reducer_fault(&self) {
        self.reducer_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rearm(&self) {
        self.timers_rearmed.fetch_add(1, Ordering::Relaxed);
    }

    /// Batches folded and fanned out so far.
    pub fn batches_flushed(&self) -> u64 {
        self.batches_flushed.load(Ordering::Relaxed)
    }

    /// Payloads consumed across all flushed batches.
    pub fn payloads_merged(&self) -> u64 {
        self.payloads_merged.load(Ordering::Relaxed)
    }

    /// Completion callbacks that returned normally.
    pub fn callbacks_invoked(&self) -> u64 {
        self.callbacks_invoked.load(Ordering::Relaxed)
    }

    /// Completion callbacks that panicked during fan-out.
    pub fn callback_faults(&self) -> u64 {
        self.callback_faults.load(Ordering::Relaxed)
    }

    /// Batches aborted because the reducer panicked mid-fold.
    pub fn reducer_faults(&self) -> u64 {
        self.reducer_faults.load(Ordering::Relaxed)
    }

    /// Debounce rearms that cancelled a pending timer.
    pub fn timers_rearmed(&self) -> u64 {
        self.timers_rearmed.load(Ordering::Relaxed)
    }

    /// Returns every counter keyed by its canonical name.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            ("batches_flushed".to_string(), self.batches_flushed()),
            ("payloads_merged".to_string(), self.payloads_merged()),
            ("callbacks_invoked".to_string(), self.callbacks_invoked()),
            ("callback_faults".to_string(), self.callback_faults()),
            ("reducer_faults".to_string(), self.reducer_faults()),
            ("timers_rearmed".to_string(), self.timers_rearmed()),
        ])
    }
}
