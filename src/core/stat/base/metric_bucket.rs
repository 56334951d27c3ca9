use super::MetricTrait;
use crate::base::MetricEvent;
use enum_map::EnumMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// The counter bundle recorded by one statistic bucket: pass, block,
/// complete, error and RT-sum counts, plus the minimum RT observed within
/// the bucket. All mutation goes through atomic add/store operations.
#[derive(Debug)]
pub struct MetricBucket {
    counter: EnumMap<MetricEvent, AtomicU64>,
    min_rt: AtomicU64,
}

impl Default for MetricBucket {
    fn default() -> Self {
        MetricBucket {
            counter: EnumMap::default(),
            min_rt: AtomicU64::new(u64::MAX),
        }
    }
}

impl MetricBucket {
    pub fn add(&self, event: MetricEvent, count: u64) {
        self.counter[event].fetch_add(count, Ordering::SeqCst);
    }

    pub fn get(&self, event: MetricEvent) -> u64 {
        self.counter[event].load(Ordering::SeqCst)
    }

    /// Records a completed call's response time: adds to the RT sum and
    /// lowers the bucket minimum if necessary.
    pub fn add_rt(&self, rt: u64) {
        self.add(MetricEvent::Rt, rt);
        // concurrent updates may both observe a stale minimum, the smaller
        // value still wins eventually via fetch_min
        self.min_rt.fetch_min(rt, Ordering::SeqCst);
    }

    pub fn min_rt(&self) -> u64 {
        self.min_rt.load(Ordering::SeqCst)
    }
}

impl MetricTrait for MetricBucket {
    fn reset(&self) {
        for (_, value) in &self.counter {
            value.store(0, Ordering::SeqCst);
        }
        self.min_rt.store(u64::MAX, Ordering::SeqCst);
    }
}
