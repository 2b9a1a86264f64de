//! The breaker's internal state machine: which calls are admitted, and how
//! success/failure move between `closed`, `open` and `half-open`.
//!
//! Kept separate from [`crate::breaker::Breaker`] so state transitions live
//! in one place instead of being matched on scattered through the call path.

use std::time::{Duration, Instant};

use crate::clock;
use crate::listener::CircuitState;

#[derive(Debug)]
pub(crate) enum Internal {
    Closed,
    Open(Instant),
    HalfOpen { probing: bool },
}

/// The result of an admission check: whether the call is allowed, and
/// whether admitting it also performed a state transition the caller must
/// notify listeners about.
pub(crate) enum Admission {
    Permitted,
    PermittedAfterTransition,
    Rejected,
}

/// The result of accounting a failure: did it open the breaker.
pub(crate) enum FailureOutcome {
    Accounted,
    Opened,
}

impl Internal {
    pub(crate) fn as_circuit_state(&self) -> CircuitState {
        match self {
            Internal::Closed => CircuitState::Closed,
            Internal::Open(_) => CircuitState::Open,
            Internal::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Runs the admission check for the current state, possibly
    /// transitioning `open -> half-open` if `reset_timeout` has elapsed.
    pub(crate) fn admit(&mut self, reset_timeout: Duration) -> Admission {
        match self {
            Internal::Closed => Admission::Permitted,
            Internal::HalfOpen { probing: false } => {
                *self = Internal::HalfOpen { probing: true };
                Admission::Permitted
            }
            Internal::HalfOpen { probing: true } => Admission::Rejected,
            Internal::Open(opened_at) => {
                if clock::now().duration_since(*opened_at) >= reset_timeout {
                    *self = Internal::HalfOpen { probing: true };
                    Admission::PermittedAfterTransition
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    /// Accounts a success: zeroes the counter from `closed`, or closes the
    /// breaker from `half-open`. Returns `true` if this closed the breaker.
    pub(crate) fn on_success(&mut self, fail_counter: &mut u32) -> bool {
        match self {
            Internal::HalfOpen { .. } => {
                *self = Internal::Closed;
                *fail_counter = 0;
                true
            }
            Internal::Closed => {
                *fail_counter = 0;
                false
            }
            Internal::Open(_) => false,
        }
    }

    /// Accounts a failure: increments the counter and opens the breaker if
    /// it has reached `fail_max`, from either `closed` or `half-open`.
    pub(crate) fn on_failure(&mut self, fail_counter: &mut u32, fail_max: u32) -> FailureOutcome {
        match self {
            Internal::Closed => {
                *fail_counter += 1;
                if *fail_counter >= fail_max {
                    *self = Internal::Open(clock::now());
                    FailureOutcome::Opened
                } else {
                    FailureOutcome::Accounted
                }
            }
            Internal::HalfOpen { .. } => {
                *fail_counter += 1;
                *self = Internal::Open(clock::now());
                FailureOutcome::Opened
            }
            Internal::Open(_) => FailureOutcome::Accounted,
        }
    }

    pub(crate) fn force_open(&mut self) {
        *self = Internal::Open(clock::now());
    }

    pub(crate) fn force_half_open(&mut self) {
        *self = Internal::HalfOpen { probing: false };
    }

    pub(crate) fn force_closed(&mut self, fail_counter: &mut u32) {
        *self = Internal::Closed;
        *fail_counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_admits_and_accounts() {
        let mut state = Internal::Closed;
        let mut counter = 0;

        assert!(matches!(state.admit(Duration::from_secs(60)), Admission::Permitted));
        assert!(matches!(
            state.on_failure(&mut counter, 3),
            FailureOutcome::Accounted
        ));
        assert_eq!(1, counter);
        assert!(matches!(
            state.on_failure(&mut counter, 3),
            FailureOutcome::Accounted
        ));
        assert!(matches!(state.on_failure(&mut counter, 3), FailureOutcome::Opened));
        assert_eq!(3, counter);
        assert!(matches!(state.as_circuit_state(), CircuitState::Open));
    }

    #[test]
    fn success_zeroes_counter_when_closed() {
        let mut state = Internal::Closed;
        let mut counter = 2;
        assert!(!state.on_success(&mut counter));
        assert_eq!(0, counter);
    }

    #[test]
    fn open_rejects_until_timeout_elapses() {
        clock::freeze(|time| {
            let mut state = Internal::Open(clock::now());
            assert!(matches!(
                state.admit(Duration::from_secs(5)),
                Admission::Rejected
            ));

            time.advance(Duration::from_secs(5));
            assert!(matches!(
                state.admit(Duration::from_secs(5)),
                Admission::PermittedAfterTransition
            ));
            assert!(matches!(state.as_circuit_state(), CircuitState::HalfOpen));
        });
    }

    #[test]
    fn half_open_admits_exactly_one_probe() {
        let mut state = Internal::HalfOpen { probing: false };
        assert!(matches!(state.admit(Duration::from_secs(1)), Admission::Permitted));
        assert!(matches!(state.admit(Duration::from_secs(1)), Admission::Rejected));
    }

    #[test]
    fn half_open_success_closes() {
        let mut state = Internal::HalfOpen { probing: true };
        let mut counter = 1;
        assert!(state.on_success(&mut counter));
        assert_eq!(0, counter);
        assert!(matches!(state.as_circuit_state(), CircuitState::Closed));
    }

    #[test]
    fn half_open_failure_reopens() {
        let mut state = Internal::HalfOpen { probing: true };
        let mut counter = 0;
        assert!(matches!(state.on_failure(&mut counter, 5), FailureOutcome::Opened));
        assert_eq!(1, counter);
        assert!(matches!(state.as_circuit_state(), CircuitState::Open));
    }
}
