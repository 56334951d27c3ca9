use crate::{
    stat::{BucketWrap, LeapArray, MetricTrait},
    Result,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Per-bucket counters shared by every breaker grade: completed calls,
/// errors, slow calls and the response time sum. A single counter layout
/// keeps the statistics reusable when a rule changes grade-independent
/// fields only.
#[derive(Debug, Default)]
pub struct Counter {
    pub(crate) total: AtomicU64,
    pub(crate) error: AtomicU64,
    pub(crate) slow: AtomicU64,
    pub(crate) rt_sum: AtomicU64,
}

impl MetricTrait for Counter {
    fn reset(&self) {
        self.total.store(0, Ordering::SeqCst);
        self.error.store(0, Ordering::SeqCst);
        self.slow.store(0, Ordering::SeqCst);
        self.rt_sum.store(0, Ordering::SeqCst);
    }
}

pub type CounterLeapArray = LeapArray<Counter>;

impl CounterLeapArray {
    pub fn current_counter(&self) -> Result<Arc<BucketWrap<Counter>>> {
        self.current_bucket()
    }

    pub fn all_counter(&self) -> Vec<Arc<BucketWrap<Counter>>> {
        self.get_current_values()
    }
}
