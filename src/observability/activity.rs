use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Lifecycle event recorded for a namespace batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchActivity {
    /// First submission armed the flush timer.
    Armed { delay_ms: u64 },
    /// A debounced submission cancelled and rescheduled the timer.
    Rearmed { delay_ms: u64 },
    /// The batch folded and fanned out.
    Flushed { payloads: usize, callbacks: usize },
    /// The reducer panicked; the batch was dropped and the namespace cleared.
    ReducerFault,
    /// A completion callback panicked during fan-out.
    CallbackFault,
}

/// Activity entry tagged with its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchActivityRecord {
    pub namespace: String,
    pub activity: BatchActivity,
}

/// Thread-safe log of batch lifecycle events, used for diagnostics and tests.
#[derive(Clone, Default)]
pub struct BatchActivityLog {
    entries: Arc<Mutex<Vec<BatchActivityRecord>>>,
}

impl BatchActivityLog {
    pub fn record(&self, namespace: &str, activity: BatchActivity) {
        let mut guard = self.entries.lock().unwrap();
        guard.push(BatchActivityRecord {
            namespace: namespace.to_string(),
            activity,
        });
    }

    pub fn snapshot(&self) -> Vec<BatchActivityRecord> {
        self.entries.lock().unwrap().clone()
    }

    /// Serializes the log as JSON lines.
    pub fn to_json_lines(&self) -> Result<Vec<String>, ActivityLogError> {
        self.snapshot()
            .iter()
            .map(|record| serde_json::to_string(record).map_err(ActivityLogError::Serialize))
            .collect()
    }
}

/// Errors surfaced while serializing activity records.
#[derive(Debug, Error)]
pub enum ActivityLogError {
    #[error("failed to serialize activity record: {0}")]
    Serialize(#[from] serde_json::Error),
}
