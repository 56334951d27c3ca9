//! Stat
//!
use crate::{Error, Result};
use enum_map::Enum;

pub type TimePredicate = dyn Fn(u64) -> bool;

/// `Snapshot` carries the metric value that triggered a breaker transition.
pub type Snapshot = dyn std::fmt::Debug + Send + Sync;

/// There are five events to record
/// pass + block == Total
#[derive(Debug, Clone, Copy, PartialEq, Enum)]
pub enum MetricEvent {
    /// rule checks pass
    Pass,
    /// rule checks block
    Block,
    Complete,
    /// Biz error, used for circuit breaker
    Error,
    /// request execute Round Trip Time, unit is millisecond
    Rt,
}

pub const ILLEGAL_STATISTIC_PARAMS_ERROR: &str =
    "Invalid parameters, sample count or interval, for the sliding window statistic";

/// The interval must be evenly divided by the sample count.
pub fn check_validity_for_statistic(sample_count: u32, interval_ms: u32) -> Result<()> {
    if interval_ms == 0 || sample_count == 0 || interval_ms % sample_count != 0 {
        return Err(Error::msg(ILLEGAL_STATISTIC_PARAMS_ERROR));
    }
    Ok(())
}
