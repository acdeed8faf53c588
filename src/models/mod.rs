// Domain models for check observations, aggregate rows, and query responses

mod aggregate;
mod history;
mod observation;
mod retention;

pub use aggregate::{AggregateRow, BucketSize, LatencySum};
pub use history::{AggregatedHistory, Bucket};
pub use observation::{CheckStatus, Observation};
pub use retention::RetentionPolicy;
