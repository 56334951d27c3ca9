use super::*;
use crate::logging;
use std::sync::{atomic::Ordering, Arc};

/// Breaker for the `ErrorRatio` grade: trips when the fraction of failed
/// calls over the statistic window reaches the rule's `count`.
#[derive(Debug)]
pub struct ErrorRatioBreaker {
    breaker: BreakerBase,
    min_request_amount: u64,
    error_ratio_threshold: f64,
    stat: Arc<CounterLeapArray>,
}

impl ErrorRatioBreaker {
    pub fn new(rule: Arc<Rule>) -> Self {
        let interval = rule.stat_interval_ms;
        let bucket_count = rule.get_stat_sliding_window_bucket_count();
        let stat = CounterLeapArray::new(bucket_count, interval).unwrap();
        Self::new_with_stat(rule, Arc::new(stat))
    }

    pub fn new_with_stat(rule: Arc<Rule>, stat: Arc<CounterLeapArray>) -> Self {
        let min_request_amount = rule.min_request_amount;
        let error_ratio_threshold = rule.count;
        Self {
            breaker: BreakerBase::new(rule),
            min_request_amount,
            error_ratio_threshold,
            stat,
        }
    }
}

impl CircuitBreaker for ErrorRatioBreaker {
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
                "Fail to get current counter in ErrorRatioBreaker::on_request_complete, rule: {:?}",
                self.breaker.rule
            );
            return;
        }
        let counter = counter.unwrap();

        counter.value().total.fetch_add(1, Ordering::SeqCst);
        counter.value().rt_sum.fetch_add(rt, Ordering::SeqCst);
        if err.is_some() {
            counter.value().error.fetch_add(1, Ordering::SeqCst);
        }

        match self.current_state() {
            State::HalfOpen => {
                if err.is_some() {
                    self.breaker.from_half_open_to_open(Arc::new(1.0));
                } else if self.breaker.on_probe_success() {
                    self.reset_metric();
                }
            }
            State::Closed => {
                let mut error_count = 0;
                let mut total_count = 0;
                for c in self.stat.all_counter() {
                    error_count += c.value().error.load(Ordering::SeqCst);
                    total_count += c.value().total.load(Ordering::SeqCst);
                }
                if total_count < self.min_request_amount {
                    return;
                }
                let error_ratio = error_count as f64 / total_count as f64;
                if error_ratio >= self.error_ratio_threshold {
                    self.breaker.from_closed_to_open(Arc::new(error_ratio));
                }
            }
            State::Open => {}
        }
    }
}
