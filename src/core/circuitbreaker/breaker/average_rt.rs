use super::*;
use crate::logging;
use std::sync::{atomic::Ordering, Arc};

/// Breaker for the `AverageRt` grade. It trips when the mean response time
/// over the statistic window reaches the rule's `count` and at least
/// `slow_ratio_threshold` of the completed calls were individually slow.
#[derive(Debug)]
pub struct AverageRtBreaker {
    breaker: BreakerBase,
    min_request_amount: u64,
    rt_threshold_ms: f64,
    slow_ratio_threshold: f64,
    // stat may be shared with a successor rule, hence Arc
    stat: Arc<CounterLeapArray>,
}

impl AverageRtBreaker {
    pub fn new(rule: Arc<Rule>) -> Self {
        let interval = rule.stat_interval_ms;
        let bucket_count = rule.get_stat_sliding_window_bucket_count();
        let stat = CounterLeapArray::new(bucket_count, interval).unwrap();
        Self::new_with_stat(rule, Arc::new(stat))
    }

    pub fn new_with_stat(rule: Arc<Rule>, stat: Arc<CounterLeapArray>) -> Self {
        let min_request_amount = rule.min_request_amount;
        let rt_threshold_ms = rule.count;
        let slow_ratio_threshold = rule.slow_ratio_threshold;
        Self {
            breaker: BreakerBase::new(rule),
            min_request_amount,
            rt_threshold_ms,
            slow_ratio_threshold,
            stat,
        }
    }

    fn is_slow(&self, rt: u64) -> bool {
        rt as f64 >= self.rt_threshold_ms
    }
}

impl CircuitBreaker for AverageRtBreaker {
    fn breaker(&self) -> &BreakerBase {
        &self.breaker
    }

    fn stat(&self) -> &Arc<CounterLeapArray> {
        &self.stat
    }

    fn on_request_complete(&self, rt: u64, err: &Option<Error>) {
        let counter = self.stat.current_counter();
        if counter.is_err() {
            logging::error!(
                "Fail to get current counter in AverageRtBreaker::on_request_complete, rule: {:?}",
                self.breaker.rule
            );
            return;
        }
        let counter = counter.unwrap();

        counter.value().total.fetch_add(1, Ordering::SeqCst);
        counter.value().rt_sum.fetch_add(rt, Ordering::SeqCst);
        if self.is_slow(rt) {
            counter.value().slow.fetch_add(1, Ordering::SeqCst);
        }
        if err.is_some() {
            counter.value().error.fetch_add(1, Ordering::SeqCst);
        }

        match self.current_state() {
            State::HalfOpen => {
                // a slow or failed probe means the resource has not recovered
                if err.is_some() || self.is_slow(rt) {
                    self.breaker.from_half_open_to_open(Arc::new(rt));
                } else if self.breaker.on_probe_success() {
                    self.reset_metric();
                }
            }
            State::Closed => {
                let mut slow_count = 0;
                let mut total_count = 0;
                let mut rt_sum = 0;
                for c in self.stat.all_counter() {
                    slow_count += c.value().slow.load(Ordering::SeqCst);
                    total_count += c.value().total.load(Ordering::SeqCst);
                    rt_sum += c.value().rt_sum.load(Ordering::SeqCst);
                }
                if total_count < self.min_request_amount {
                    return;
                }
                let avg_rt = rt_sum as f64 / total_count as f64;
                let slow_ratio = slow_count as f64 / total_count as f64;
                if avg_rt >= self.rt_threshold_ms && slow_ratio >= self.slow_ratio_threshold {
                    self.breaker.from_closed_to_open(Arc::new(avg_rt));
                }
            }
            State::Open => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rt_rule() -> Arc<Rule> {
        Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::AverageRt,
            count: 50.0,
            time_window: 3,
            min_request_amount: 10,
            stat_interval_ms: 10000,
            slow_ratio_threshold: 0.5,
            half_open_base_amount_per_step: 1,
            half_open_recovery_step_num: 1,
            ..Default::default()
        })
    }

    #[test]
    fn below_min_request_amount() {
        let breaker = AverageRtBreaker::new(rt_rule());
        breaker.on_request_complete(100, &None);
        assert_eq!(breaker.current_state(), State::Closed);
    }

    #[test]
    fn trips_on_slow_traffic() {
        let breaker = AverageRtBreaker::new(rt_rule());
        for _ in 0..10 {
            breaker.on_request_complete(80, &None);
        }
        assert_eq!(breaker.current_state(), State::Open);
    }

    #[test]
    fn fast_minority_does_not_trip() {
        let breaker = AverageRtBreaker::new(rt_rule());
        // four slow calls out of ten, ratio stays under the threshold and
        // the mean stays under 50ms
        for _ in 0..6 {
            breaker.on_request_complete(10, &None);
        }
        for _ in 0..4 {
            breaker.on_request_complete(60, &None);
        }
        assert_eq!(breaker.current_state(), State::Closed);
    }

    #[test]
    fn probe_outcome() {
        let breaker = AverageRtBreaker::new(rt_rule());

        // slow probe fails even without an error
        breaker.set_state(State::HalfOpen);
        breaker.on_request_complete(100, &None);
        assert_eq!(breaker.current_state(), State::Open);

        // fast probe recovers
        breaker.set_state(State::HalfOpen);
        breaker.on_request_complete(10, &None);
        assert_eq!(breaker.current_state(), State::Closed);
    }
}
