mod aggregator;
mod options;

pub use aggregator::{Aggregator, SubmitError};
pub use options::{AggregateDefaults, AggregateOptions, BatchCallback, Reducer};
