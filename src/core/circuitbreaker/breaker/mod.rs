//!  Circuit Breaker State Machine:
//!
//!                                switch to open based on rule
//!
//!             +-----------------------------------------------------------------------+
//!             |                                                                       |
//!             |                                                                       v
//!     +----------------+                   +----------------+      Probe      +----------------+
//!     |                |                   |                |<----------------|                |
//!     |                |  Recovery steps   |                |                 |                |
//!     |     Closed     |<------------------|    HalfOpen    |                 |      Open      |
//!     |                |     succeed       |                |   Probe failed  |                |
//!     |                |                   |                +---------------->|                |
//!     +----------------+                   +----------------+                 +----------------+
//!
//! HalfOpen admits a bounded amount of probe traffic per recovery step. The
//! allowance doubles with every clean step; once `half_open_recovery_step_num`
//! steps complete without a failed probe the breaker closes. A single failed
//! probe reopens the circuit and restarts the retry timer.

/// Average response time
pub mod average_rt;
/// Error count
pub mod error_count;
/// Error ratio
pub mod error_ratio;
pub mod stat;

pub use average_rt::*;
pub use error_count::*;
pub use error_ratio::*;
pub use stat::*;

use super::*;
use crate::{base::Snapshot, stat::MetricTrait, utils, Error};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

/// States of Circuit Breaker State Machine
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum State {
    Closed,
    HalfOpen,
    Open,
}

impl Default for State {
    fn default() -> State {
        State::Closed
    }
}

/// `StateChangeListener` listens on the circuit breaker state change event
pub trait StateChangeListener: Sync + Send {
    /// Triggered when the circuit breaker state transforms to Closed.
    /// The rule argument is a snapshot, changes to it do not affect the breaker.
    fn on_transform_to_closed(&self, prev: State, rule: Arc<Rule>);

    /// Triggered when the circuit breaker state transforms to Open.
    /// The "snapshot" carries the metric value that caused the transformation.
    fn on_transform_to_open(&self, prev: State, rule: Arc<Rule>, snapshot: Option<Arc<Snapshot>>);

    /// Triggered when the circuit breaker state transforms to HalfOpen.
    fn on_transform_to_half_open(&self, prev: State, rule: Arc<Rule>);
}

/// `CircuitBreaker` is the basic trait of circuit breakers.
/// One breaker instance serves exactly one rule.
pub trait CircuitBreaker: Send + Sync {
    /// `breaker` returns the associated inner breaker.
    fn breaker(&self) -> &BreakerBase;

    /// `stat` returns the associated statistic data structure.
    fn stat(&self) -> &Arc<CounterLeapArray>;

    /// `try_acquire_permission` decides whether one invocation may proceed.
    /// Closed always admits. Open admits nothing until the retry timeout
    /// elapses, then switches to HalfOpen and admits the first probe.
    /// HalfOpen admits up to the current step allowance.
    fn try_acquire_permission(&self) -> bool {
        self.breaker().try_acquire_permission()
    }

    #[inline]
    fn next_retry_timestamp_ms(&self) -> u64 {
        self.breaker()
            .next_retry_timestamp_ms
            .load(Ordering::SeqCst)
    }

    /// `bound_rule` returns the associated circuit breaking rule.
    #[inline]
    fn bound_rule(&self) -> &Arc<Rule> {
        self.breaker().bound_rule()
    }

    #[inline]
    fn set_state(&self, state: State) {
        self.breaker().set_state(state);
    }

    /// `current_state` returns current state of the circuit breaker.
    #[inline]
    fn current_state(&self) -> State {
        self.breaker().current_state()
    }

    /// `on_request_complete` records a completed invocation with the given
    /// response time and error (if present), and handles state
    /// transformation of the circuit breaker.
    /// It is called only when a permitted invocation finished.
    fn on_request_complete(&self, rt: u64, error: &Option<Error>);

    /// the underlying metric is interiorly mutable, thus `&self`
    fn reset_metric(&self) {
        for c in self.stat().all_counter() {
            c.value().reset()
        }
    }
}

/// the mutable part of the state machine, guarded by one mutex so that
/// probe admission can never race with a concurrent transition
#[derive(Debug, Default)]
struct Machine {
    state: State,
    /// index of the current recovery step while HalfOpen
    step: u32,
    /// probes admitted within the current step
    step_admitted: u64,
    /// probes that completed without failure within the current step
    step_succeeded: u64,
}

/// BreakerBase encompasses the common fields of circuit breakers.
#[derive(Debug)]
pub struct BreakerBase {
    pub(crate) rule: Arc<Rule>,
    /// `retry_timeout_ms` is the recovery timeout before an open circuit
    /// starts probing, derived from the rule's `time_window`.
    pub(crate) retry_timeout_ms: u32,
    /// the earliest time the circuit breaker may probe again
    pub(crate) next_retry_timestamp_ms: AtomicU64,
    pub(crate) machine: Mutex<Machine>,
}

impl BreakerBase {
    pub(crate) fn new(rule: Arc<Rule>) -> Self {
        let retry_timeout_ms = rule.retry_timeout_ms();
        BreakerBase {
            rule,
            retry_timeout_ms,
            next_retry_timestamp_ms: AtomicU64::new(0),
            machine: Mutex::new(Machine::default()),
        }
    }

    pub fn bound_rule(&self) -> &Arc<Rule> {
        &self.rule
    }

    pub fn set_state(&self, state: State) {
        let mut machine = self.machine.lock().unwrap();
        machine.state = state;
        machine.step = 0;
        machine.step_admitted = 0;
        machine.step_succeeded = 0;
    }

    pub fn current_state(&self) -> State {
        self.machine.lock().unwrap().state
    }

    pub fn retry_timeout_arrived(&self) -> bool {
        utils::curr_time_millis() >= self.next_retry_timestamp_ms.load(Ordering::SeqCst)
    }

    pub fn update_next_retry_timestamp(&self) {
        self.next_retry_timestamp_ms.store(
            utils::curr_time_millis() + self.retry_timeout_ms as u64,
            Ordering::SeqCst,
        );
    }

    /// probe allowance of the given recovery step, doubling per step
    fn step_allowance(&self, step: u32) -> u64 {
        self.rule
            .half_open_base_amount_per_step
            .saturating_mul(1u64 << step.min(63))
    }

    /// See `CircuitBreaker::try_acquire_permission`. The whole decision runs
    /// under the machine lock, so concurrent callers can never admit more
    /// probes than the current step allows.
    pub fn try_acquire_permission(&self) -> bool {
        let mut machine = self.machine.lock().unwrap();
        match machine.state {
            State::Closed => true,
            State::Open => {
                if !self.retry_timeout_arrived() {
                    return false;
                }
                machine.state = State::HalfOpen;
                machine.step = 0;
                machine.step_admitted = 1;
                machine.step_succeeded = 0;
                let listeners = state_change_listeners().lock().unwrap();
                for listener in &*listeners {
                    listener.on_transform_to_half_open(State::Open, Arc::clone(&self.rule));
                }
                true
            }
            State::HalfOpen => {
                if machine.step_admitted < self.step_allowance(machine.step) {
                    machine.step_admitted += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// from_closed_to_open updates the state machine from Closed to Open.
    /// Returns true only if the caller accomplished the transformation.
    pub fn from_closed_to_open(&self, snapshot: Arc<Snapshot>) -> bool {
        let mut machine = self.machine.lock().unwrap();
        if machine.state == State::Closed {
            machine.state = State::Open;
            self.update_next_retry_timestamp();
            let listeners = state_change_listeners().lock().unwrap();
            for listener in &*listeners {
                listener.on_transform_to_open(
                    State::Closed,
                    Arc::clone(&self.rule),
                    Some(Arc::clone(&snapshot)),
                );
            }
            true
        } else {
            false
        }
    }

    /// from_half_open_to_open reopens the circuit after a failed probe and
    /// restarts the retry timer.
    /// Returns true only if the caller accomplished the transformation.
    pub fn from_half_open_to_open(&self, snapshot: Arc<Snapshot>) -> bool {
        let mut machine = self.machine.lock().unwrap();
        if machine.state == State::HalfOpen {
            machine.state = State::Open;
            machine.step = 0;
            machine.step_admitted = 0;
            machine.step_succeeded = 0;
            self.update_next_retry_timestamp();
            let listeners = state_change_listeners().lock().unwrap();
            for listener in &*listeners {
                listener.on_transform_to_open(
                    State::HalfOpen,
                    Arc::clone(&self.rule),
                    Some(Arc::clone(&snapshot)),
                );
            }
            true
        } else {
            false
        }
    }

    /// on_probe_success accounts a clean probe. When the current step's
    /// allowance completes without failure the breaker advances one step;
    /// after `half_open_recovery_step_num` clean steps it closes.
    /// Returns true only if this call closed the circuit.
    pub fn on_probe_success(&self) -> bool {
        let mut machine = self.machine.lock().unwrap();
        if machine.state != State::HalfOpen {
            return false;
        }
        machine.step_succeeded += 1;
        if machine.step_succeeded < self.step_allowance(machine.step) {
            return false;
        }
        machine.step += 1;
        if machine.step >= self.rule.half_open_recovery_step_num.max(1) {
            machine.state = State::Closed;
            machine.step = 0;
            machine.step_admitted = 0;
            machine.step_succeeded = 0;
            let listeners = state_change_listeners().lock().unwrap();
            for listener in &*listeners {
                listener.on_transform_to_closed(State::HalfOpen, Arc::clone(&self.rule));
            }
            return true;
        }
        machine.step_admitted = 0;
        machine.step_succeeded = 0;
        false
    }
}

#[cfg(test)]
pub(crate) use test::MockStateListener;
