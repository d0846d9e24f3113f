//! Namespace-scoped call aggregation: collapses bursts of near-simultaneous
//! submissions sharing a key into one deferred merge, fanning the single
//! result back out to every caller.

pub mod engine;
pub mod merge;
pub mod observability;
pub mod scheduler;
pub mod store;

pub use engine::{
    AggregateDefaults, AggregateOptions, Aggregator, BatchCallback, Reducer, SubmitError,
};
pub use merge::Coalesce;
pub use observability::{
    ActivityLogError, AggregatorTelemetry, BatchActivity, BatchActivityLog, BatchActivityRecord,
};
pub use scheduler::{
    FlushScheduler, ManualScheduler, ScheduledTask, ThreadScheduler, TimerHandle, TokioScheduler,
};
pub use store::MemoryStore;
