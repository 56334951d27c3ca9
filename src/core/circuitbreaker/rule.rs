use super::*;
use crate::{base::TrafficRule, config, logging, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// `BreakerGrade` is the metric basis the circuit breaker trips on.
/// On the wire it is the integer code used by the rule schema.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(into = "u8", from = "u8")]
pub enum BreakerGrade {
    /// trips on mean response time combined with the slow-call ratio
    AverageRt,
    /// trips on error count / completed count
    ErrorRatio,
    /// trips on the absolute error count
    ErrorCount,
    Custom(u8),
}

impl Default for BreakerGrade {
    fn default() -> BreakerGrade {
        BreakerGrade::AverageRt
    }
}

impl From<BreakerGrade> for u8 {
    fn from(grade: BreakerGrade) -> u8 {
        match grade {
            BreakerGrade::AverageRt => 0,
            BreakerGrade::ErrorRatio => 1,
            BreakerGrade::ErrorCount => 2,
            BreakerGrade::Custom(code) => code,
        }
    }
}

impl From<u8> for BreakerGrade {
    fn from(code: u8) -> BreakerGrade {
        match code {
            0 => BreakerGrade::AverageRt,
            1 => BreakerGrade::ErrorRatio,
            2 => BreakerGrade::ErrorCount,
            _ => BreakerGrade::Custom(code),
        }
    }
}

/// Rule encompasses the fields of a circuit breaking rule.
/// Rules are immutable after construction; the live breaker state is kept
/// separately, keyed by rule identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Rule {
    /// unique id
    pub id: String,
    /// resource name
    pub resource: String,
    /// limited origin of the caller, empty means any
    pub limit_app: String,
    pub grade: BreakerGrade,
    /// `count` is the trip threshold. Its meaning depends on the grade:
    /// mean RT in ms for `AverageRt`, a 0-1 fraction for `ErrorRatio`,
    /// an absolute amount for `ErrorCount`.
    pub count: f64,
    /// `time_window` is the recovery timeout (in seconds) once tripped.
    /// During the open period no requests are permitted until it elapses,
    /// after that the circuit breaker probes in half-open state.
    pub time_window: u32,
    /// `min_request_amount` is the minimum number of completed calls
    /// (within the active statistic interval) before tripping is considered.
    pub min_request_amount: u64,
    /// `slow_ratio_threshold` is the max tolerated fraction of slow calls,
    /// only effective for the `AverageRt` grade.
    pub slow_ratio_threshold: f64,
    /// `stat_interval_ms` is the statistic interval of the internal sliding
    /// window (in ms).
    pub stat_interval_ms: u32,
    /// `stat_sliding_window_bucket_count` is the bucket count of the
    /// statistic sliding window. More buckets give more precision at a
    /// higher memory cost. The following must be true:
    /// `stat_interval_ms % stat_sliding_window_bucket_count == 0`,
    /// otherwise the bucket count falls back to 1.
    pub stat_sliding_window_bucket_count: u32,
    /// `half_open_base_amount_per_step` is the probe allowance of the first
    /// recovery step; each further step doubles it.
    pub half_open_base_amount_per_step: u64,
    /// `half_open_recovery_step_num` is the number of clean recovery steps
    /// required before the breaker closes again.
    pub half_open_recovery_step_num: u32,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            id: String::default(),
            resource: String::default(),
            limit_app: String::default(),
            grade: BreakerGrade::default(),
            count: 0.0,
            time_window: 0,
            min_request_amount: config::DEFAULT_MIN_REQUEST_AMOUNT,
            slow_ratio_threshold: config::DEFAULT_SLOW_RATIO_THRESHOLD,
            stat_interval_ms: config::DEFAULT_STAT_INTERVAL_MS,
            stat_sliding_window_bucket_count: 0,
            half_open_base_amount_per_step: config::DEFAULT_HALF_OPEN_BASE_AMOUNT_PER_STEP,
            half_open_recovery_step_num: config::DEFAULT_HALF_OPEN_RECOVERY_STEP_NUM,
        }
    }
}

impl Rule {
    pub fn retry_timeout_ms(&self) -> u32 {
        self.time_window * 1000
    }

    pub fn is_stat_reusable(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.grade == other.grade
            && self.stat_interval_ms == other.stat_interval_ms
            && self.stat_sliding_window_bucket_count == other.stat_sliding_window_bucket_count
    }

    pub fn get_stat_sliding_window_bucket_count(&self) -> u32 {
        let mut bucket_count = self.stat_sliding_window_bucket_count;
        if bucket_count == 0 || self.stat_interval_ms % bucket_count != 0 {
            bucket_count = 1
        }
        bucket_count
    }
}

impl TrafficRule for Rule {
    fn resource_name(&self) -> String {
        self.resource.clone()
    }

    fn is_valid(&self) -> crate::Result<()> {
        if self.resource.is_empty() {
            return Err(Error::msg("empty resource name"));
        }
        if self.stat_interval_ms == 0 {
            return Err(Error::msg("invalid stat_interval_ms"));
        }
        if self.time_window == 0 {
            return Err(Error::msg("invalid time_window"));
        }
        if self.count < 0.0 {
            return Err(Error::msg("invalid count"));
        }
        if self.grade == BreakerGrade::ErrorRatio && self.count > 1.0 {
            return Err(Error::msg(
                "invalid ErrorRatio count (valid range: [0.0, 1.0])",
            ));
        }
        if !(0.0..=1.0).contains(&self.slow_ratio_threshold) {
            return Err(Error::msg(
                "invalid slow_ratio_threshold (valid range: [0.0, 1.0])",
            ));
        }
        if self.half_open_base_amount_per_step == 0 {
            return Err(Error::msg("invalid half_open_base_amount_per_step"));
        }
        if self.half_open_recovery_step_num == 0 {
            return Err(Error::msg("invalid half_open_recovery_step_num"));
        }
        if self.stat_sliding_window_bucket_count != 0
            && self.stat_interval_ms % self.stat_sliding_window_bucket_count != 0
        {
            logging::warn!("[CircuitBreaker is_valid] The following must be true: stat_interval_ms % stat_sliding_window_bucket_count == 0. stat_sliding_window_bucket_count will be replaced by 1, rule {:?}", self);
        }
        Ok(())
    }
}

// `id` is deliberately excluded: two rules with the same configuration are
// the same rule regardless of where they were loaded from.
impl PartialEq for Rule {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
            && self.limit_app == other.limit_app
            && self.grade == other.grade
            && self.count.to_bits() == other.count.to_bits()
            && self.time_window == other.time_window
            && self.min_request_amount == other.min_request_amount
            && self.slow_ratio_threshold.to_bits() == other.slow_ratio_threshold.to_bits()
            && self.stat_interval_ms == other.stat_interval_ms
            && self.stat_sliding_window_bucket_count == other.stat_sliding_window_bucket_count
            && self.half_open_base_amount_per_step == other.half_open_base_amount_per_step
            && self.half_open_recovery_step_num == other.half_open_recovery_step_num
    }
}

impl Eq for Rule {}

impl Hash for Rule {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
        self.limit_app.hash(state);
        self.grade.hash(state);
        self.count.to_bits().hash(state);
        self.time_window.hash(state);
        self.min_request_amount.hash(state);
        self.slow_ratio_threshold.to_bits().hash(state);
        self.stat_interval_ms.hash(state);
        self.stat_sliding_window_bucket_count.hash(state);
        self.half_open_base_amount_per_step.hash(state);
        self.half_open_recovery_step_num.hash(state);
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmtted = serde_json::to_string_pretty(self).unwrap();
        write!(f, "{}", fmtted)
    }
}
