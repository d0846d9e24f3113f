mod activity;
mod telemetry;

pub use activity::{ActivityLogError, BatchActivity, BatchActivityLog, BatchActivityRecord};
pub use telemetry::AggregatorTelemetry;
