//! Observer hooks for breaker state changes and per-call events.

use std::fmt;

use crate::breaker::Breaker;

/// The breaker's externally observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls are admitted; failures are being counted.
    Closed,
    /// Calls are rejected until `reset_timeout` elapses.
    Open,
    /// A single probe call is admitted; its outcome decides the next state.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        write!(f, "{}", s)
    }
}

/// Observer hooks for a [`Breaker`](crate::Breaker)'s lifecycle. All hooks
/// default to no-ops, so implementors only override what they need.
///
/// Hooks run while the breaker's internal mutex is held: implementations
/// must not block indefinitely or call back into the same breaker.
pub trait Listener<E>: Send + Sync {
    /// Fires after admission succeeds, before the wrapped operation runs.
    fn before_call(&self, _breaker: &Breaker<E>) {}

    /// Fires after a call completes successfully and success accounting ran.
    fn success(&self, _breaker: &Breaker<E>) {}

    /// Fires after a non-excluded error and its accounting ran.
    fn failure(&self, _breaker: &Breaker<E>, _err: &E) {}

    /// Fires on every state transition, including administrative ones.
    /// `old` is `None` only for the (unused, by this implementation)
    /// synthetic construction event.
    fn state_change(&self, _breaker: &Breaker<E>, _old: Option<CircuitState>, _new: CircuitState) {}
}

/// A [`Listener`] that does nothing; a convenient base to extend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl<E> Listener<E> for NoopListener {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display() {
        assert_eq!("closed", CircuitState::Closed.to_string());
        assert_eq!("open", CircuitState::Open.to_string());
        assert_eq!("half-open", CircuitState::HalfOpen.to_string());
    }
}
