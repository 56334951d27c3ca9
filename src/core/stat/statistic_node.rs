use super::{BucketWrap, LeapArray, MetricBucket};
use crate::base::MetricEvent;
use crate::{config, logging, utils};
use std::sync::Arc;

pub type MetricLeapArray = LeapArray<MetricBucket>;

/// StatisticNode holds the real-time sliding-window statistics of one
/// resource or one (resource, origin) pair. All counters are mutated through
/// atomic add operations; readers take an eventually-consistent snapshot.
/// Nodes are created lazily and live as long as their owner, they are cleared
/// by resetting counters rather than by deallocation.
#[derive(Debug)]
pub struct StatisticNode {
    stat: Arc<MetricLeapArray>,
}

impl Default for StatisticNode {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticNode {
    pub fn new() -> Self {
        let sample_count = config::global_stat_sample_count_total();
        let interval_ms = config::global_stat_interval_ms_total();
        // the global window parameters are validated by `ConfigEntity::check`
        let stat = MetricLeapArray::new(sample_count, interval_ms)
            .expect("global statistic window parameters must be valid");
        StatisticNode {
            stat: Arc::new(stat),
        }
    }

    pub fn stat(&self) -> &Arc<MetricLeapArray> {
        &self.stat
    }

    pub fn add_count(&self, event: MetricEvent, count: u64) {
        match self.stat.current_bucket() {
            Ok(bucket) => bucket.value().add(event, count),
            Err(_) => logging::error!(
                "Fail to get current bucket in StatisticNode::add_count, event: {:?}",
                event
            ),
        }
    }

    pub fn add_pass(&self, count: u64) {
        self.add_count(MetricEvent::Pass, count);
    }

    pub fn add_block(&self, count: u64) {
        self.add_count(MetricEvent::Block, count);
    }

    pub fn add_error(&self, count: u64) {
        self.add_count(MetricEvent::Error, count);
    }

    /// Records one completed call with the given response time.
    pub fn add_complete_with_rt(&self, rt: u64) {
        match self.stat.current_bucket() {
            Ok(bucket) => {
                bucket.value().add(MetricEvent::Complete, 1);
                bucket.value().add_rt(rt);
            }
            Err(_) => logging::error!(
                "Fail to get current bucket in StatisticNode::add_complete_with_rt"
            ),
        }
    }

    /// the sum of the given event over the currently valid window
    pub fn sum(&self, event: MetricEvent) -> u64 {
        self.stat
            .get_current_values()
            .iter()
            .map(|bucket| bucket.value().get(event))
            .sum()
    }

    /// events per second over the currently valid window
    pub fn qps(&self, event: MetricEvent) -> f64 {
        let sum = self.sum(event) as f64;
        sum / (self.stat.interval_ms() as f64 / 1000.0)
    }

    /// the rate recorded by the previous bucket, scaled to one second
    pub fn qps_previous(&self, event: MetricEvent) -> f64 {
        match self.stat.get_previous_bucket() {
            Ok(bucket) => {
                bucket.value().get(event) as f64 / (self.stat.bucket_len_ms() as f64 / 1000.0)
            }
            Err(_) => 0f64,
        }
    }

    /// mean response time of completed calls over the valid window,
    /// 0 when no call completed
    pub fn avg_rt(&self) -> f64 {
        let buckets = self.stat.get_current_values();
        let (rt_sum, complete) = sum_rt_and_complete(&buckets);
        if complete == 0 {
            0f64
        } else {
            rt_sum as f64 / complete as f64
        }
    }

    /// minimum response time over the valid window, 0 when no call completed
    pub fn min_rt(&self) -> f64 {
        let min = self
            .stat
            .get_current_values()
            .iter()
            .map(|bucket| bucket.value().min_rt())
            .min()
            .unwrap_or(u64::MAX);
        if min == u64::MAX {
            0f64
        } else {
            min as f64
        }
    }

    /// exception count / completed count over the valid window,
    /// 0 when no call completed
    pub fn error_ratio(&self) -> f64 {
        let now = utils::curr_time_millis();
        let buckets = self.stat.get_valid_values(now);
        let mut error = 0u64;
        let mut complete = 0u64;
        for bucket in &buckets {
            error += bucket.value().get(MetricEvent::Error);
            complete += bucket.value().get(MetricEvent::Complete);
        }
        if complete == 0 {
            0f64
        } else {
            error as f64 / complete as f64
        }
    }

    /// clears every counter of the node, the node itself stays alive
    pub fn reset(&self) {
        self.stat.reset_all();
    }
}

fn sum_rt_and_complete(buckets: &[Arc<BucketWrap<MetricBucket>>]) -> (u64, u64) {
    let mut rt_sum = 0u64;
    let mut complete = 0u64;
    for bucket in buckets {
        rt_sum += bucket.value().get(MetricEvent::Rt);
        complete += bucket.value().get(MetricEvent::Complete);
    }
    (rt_sum, complete)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn counts() {
        let node = StatisticNode::new();
        node.add_pass(3);
        node.add_block(1);
        node.add_error(2);
        assert_eq!(node.sum(MetricEvent::Pass), 3);
        assert_eq!(node.sum(MetricEvent::Block), 1);
        assert_eq!(node.sum(MetricEvent::Error), 2);
    }

    #[test]
    fn response_time() {
        let node = StatisticNode::new();
        assert_eq!(node.avg_rt(), 0f64);
        assert_eq!(node.min_rt(), 0f64);
        node.add_complete_with_rt(20);
        node.add_complete_with_rt(40);
        assert_eq!(node.sum(MetricEvent::Complete), 2);
        assert_eq!(node.avg_rt(), 30f64);
        assert_eq!(node.min_rt(), 20f64);
    }

    #[test]
    fn error_ratio() {
        let node = StatisticNode::new();
        assert_eq!(node.error_ratio(), 0f64);
        for _ in 0..10 {
            node.add_complete_with_rt(1);
        }
        node.add_error(5);
        assert!((node.error_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn reset() {
        let node = StatisticNode::new();
        node.add_pass(7);
        node.reset();
        assert_eq!(node.sum(MetricEvent::Pass), 0);
    }

    #[test]
    fn random_rt_aggregates() {
        use rand::Rng;
        let node = StatisticNode::new();
        let mut rng = rand::thread_rng();
        let mut sum = 0u64;
        let mut min = u64::MAX;
        for _ in 0..100 {
            let rt = rng.gen_range(1..500);
            sum += rt;
            min = min.min(rt);
            node.add_complete_with_rt(rt);
        }
        assert_eq!(node.avg_rt(), sum as f64 / 100.0);
        assert_eq!(node.min_rt(), min as f64);
    }

    #[test]
    fn concurrent_add() {
        let node = Arc::new(StatisticNode::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let node = Arc::clone(&node);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    node.add_pass(1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(node.sum(MetricEvent::Pass), 8000);
    }
}
