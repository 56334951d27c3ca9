//! Circuit breaking on resource level.
//!
//! Each loaded rule owns an independent breaker instance, so multiple rules
//! on the same resource trip and recover independently. `check_traffic` is
//! the admission check consulted before an invocation; `on_completed` feeds
//! the outcome of every permitted invocation back into the breakers.

pub mod breaker;
pub mod rule;
pub mod rule_manager;

pub use breaker::*;
pub use rule::*;
pub use rule_manager::*;

use crate::base::{BlockType, TokenResult, TrafficRule};
use crate::Error;
use std::sync::Arc;

/// `check_traffic` runs every breaker bound to the resource and rejects the
/// invocation as soon as one of them denies permission.
pub fn check_traffic(res: &str) -> TokenResult {
    for breaker in get_breakers_of_resource(res) {
        if !breaker.try_acquire_permission() {
            let rule = Arc::clone(breaker.bound_rule());
            return TokenResult::new_blocked_with_cause(
                BlockType::CircuitBreaking,
                "circuit breaker check blocked".into(),
                rule as Arc<dyn TrafficRule>,
                Arc::new(breaker.current_state()),
            );
        }
    }
    TokenResult::new_pass()
}

/// `on_completed` records a finished invocation on every breaker bound to
/// the resource. Only invocations that were permitted may be reported here.
pub fn on_completed(res: &str, rt: u64, error: &Option<Error>) {
    for breaker in get_breakers_of_resource(res) {
        breaker.on_request_complete(rt, error);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils;

    #[test]
    #[ignore]
    fn trip_and_recover() {
        clear_rules();
        let res = "cb_trip_and_recover";
        let rule = Arc::new(Rule {
            resource: res.into(),
            grade: BreakerGrade::ErrorRatio,
            count: 0.5,
            time_window: 1,
            min_request_amount: 10,
            stat_interval_ms: 1000,
            half_open_base_amount_per_step: 1,
            half_open_recovery_step_num: 1,
            ..Default::default()
        });
        assert!(load_rules(vec![rule]));

        // 10 completed calls with 6 errors trip the breaker (ratio 0.6)
        for i in 0..10 {
            assert!(check_traffic(res).is_pass());
            let err = if i < 6 {
                Some(Error::msg("upstream failure"))
            } else {
                None
            };
            on_completed(res, 1, &err);
        }
        let result = check_traffic(res);
        assert!(result.is_blocked());
        assert_eq!(
            result.block_err().unwrap().block_type(),
            BlockType::CircuitBreaking
        );

        // after the open period, the next call is admitted as a probe and a
        // clean probe closes the circuit again
        utils::sleep_for_ms(1100);
        assert!(check_traffic(res).is_pass());
        assert_eq!(
            get_breakers_of_resource(res)[0].current_state(),
            State::HalfOpen
        );
        on_completed(res, 1, &None);
        assert_eq!(
            get_breakers_of_resource(res)[0].current_state(),
            State::Closed
        );
        assert!(check_traffic(res).is_pass());
        clear_rules();
    }

    #[test]
    fn no_rules_pass_through() {
        assert!(check_traffic("cb_unknown_resource").is_pass());
    }
}
