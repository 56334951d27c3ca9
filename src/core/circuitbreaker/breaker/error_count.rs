use super::*;
use crate::logging;
use std::sync::{atomic::Ordering, Arc};

/// Breaker for the `ErrorCount` grade: trips when the absolute number of
/// failed calls over the statistic window reaches the rule's `count`.
#[derive(Debug)]
pub struct ErrorCountBreaker {
    breaker: BreakerBase,
    min_request_amount: u64,
    // the rule schema allows fractional thresholds, keep the double
    error_count_threshold: f64,
    stat: Arc<CounterLeapArray>,
}

impl ErrorCountBreaker {
    pub fn new(rule: Arc<Rule>) -> Self {
        let interval = rule.stat_interval_ms;
        let bucket_count = rule.get_stat_sliding_window_bucket_count();
        let stat = CounterLeapArray::new(bucket_count, interval).unwrap();
        Self::new_with_stat(rule, Arc::new(stat))
    }

    pub fn new_with_stat(rule: Arc<Rule>, stat: Arc<CounterLeapArray>) -> Self {
        let min_request_amount = rule.min_request_amount;
        let error_count_threshold = rule.count;
        Self {
            breaker: BreakerBase::new(rule),
            min_request_amount,
            error_count_threshold,
            stat,
        }
    }
}

impl CircuitBreaker for ErrorCountBreaker {
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
                "Fail to get current counter in ErrorCountBreaker::on_request_complete, rule: {:?}",
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
                    self.breaker.from_half_open_to_open(Arc::new(1));
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
                if error_count as f64 >= self.error_count_threshold {
                    self.breaker.from_closed_to_open(Arc::new(error_count));
                }
            }
            State::Open => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn count_rule() -> Arc<Rule> {
        Arc::new(Rule {
            resource: "abc".into(),
            grade: BreakerGrade::ErrorCount,
            count: 5.0,
            time_window: 3,
            min_request_amount: 10,
            stat_interval_ms: 10000,
            half_open_base_amount_per_step: 1,
            half_open_recovery_step_num: 1,
            ..Default::default()
        })
    }

    #[test]
    fn below_min_request_amount() {
        let breaker = ErrorCountBreaker::new(count_rule());
        for _ in 0..5 {
            breaker.on_request_complete(0, &Some(Error::msg("boom")));
        }
        // five errors but only five completed calls in total
        assert_eq!(breaker.current_state(), State::Closed);
    }

    #[test]
    fn trips_over_threshold() {
        let breaker = ErrorCountBreaker::new(count_rule());
        for _ in 0..5 {
            breaker.on_request_complete(0, &None);
        }
        for _ in 0..5 {
            breaker.on_request_complete(0, &Some(Error::msg("boom")));
        }
        assert_eq!(breaker.current_state(), State::Open);
    }

    #[test]
    fn fractional_threshold_is_not_truncated() {
        let breaker = ErrorCountBreaker::new(Arc::new(Rule {
            count: 5.5,
            ..(*count_rule()).clone()
        }));
        for _ in 0..5 {
            breaker.on_request_complete(0, &None);
        }
        for _ in 0..5 {
            breaker.on_request_complete(0, &Some(Error::msg("boom")));
        }
        // five errors stay below 5.5
        assert_eq!(breaker.current_state(), State::Closed);
        breaker.on_request_complete(0, &Some(Error::msg("boom")));
        assert_eq!(breaker.current_state(), State::Open);
    }

    #[test]
    fn probe_outcome() {
        let breaker = ErrorCountBreaker::new(count_rule());

        breaker.set_state(State::HalfOpen);
        breaker.on_request_complete(0, &Some(Error::msg("boom")));
        assert_eq!(breaker.current_state(), State::Open);

        breaker.set_state(State::HalfOpen);
        breaker.on_request_complete(0, &None);
        assert_eq!(breaker.current_state(), State::Closed);
    }
}
