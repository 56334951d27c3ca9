pub mod leap_array;
pub mod metric_bucket;

pub use leap_array::*;
pub use metric_bucket::*;

/// The metric recorded by one sliding-window bucket.
/// Implementors must be internally atomic.
pub trait MetricTrait: Default + Send + Sync + std::fmt::Debug {
    fn reset(&self);
}
