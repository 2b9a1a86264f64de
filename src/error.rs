use std::error::Error as StdError;
use std::fmt::{self, Display};

use crate::listener::CircuitState;

/// The error raised when a call is rejected because the breaker isn't
/// admitting calls: open and still within `reset_timeout`, or half-open
/// with a probe already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpenError {
    state: CircuitState,
}

impl CircuitOpenError {
    pub(crate) fn new(state: CircuitState) -> Self {
        CircuitOpenError { state }
    }

    /// The breaker's state at the time the call was rejected.
    pub fn state(&self) -> CircuitState {
        self.state
    }
}

impl Display for CircuitOpenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "circuit breaker rejected call, state is {}", self.state)
    }
}

impl StdError for CircuitOpenError {}

/// A `Breaker`'s error: either the call was rejected before running, or it
/// ran and the wrapped operation returned `err`.
#[derive(Debug)]
pub enum Error<E> {
    /// The call was rejected; the wrapped operation never ran.
    CircuitOpen(CircuitOpenError),
    /// The wrapped operation ran and returned this error.
    Inner(E),
}

impl<E> Error<E> {
    /// `true` if this is a rejection rather than a propagated error.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen(_))
    }

    /// The wrapped operation's error, if this isn't a rejection.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Error::Inner(err) => Some(err),
            Error::CircuitOpen(_) => None,
        }
    }
}

impl<E> Display for Error<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::CircuitOpen(err) => Display::fmt(err, f),
            Error::Inner(err) => Display::fmt(err, f),
        }
    }
}

impl<E> StdError for Error<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::CircuitOpen(err) => Some(err),
            Error::Inner(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_reports_state() {
        let err = CircuitOpenError::new(CircuitState::Open);
        assert_eq!(CircuitState::Open, err.state());
        assert_eq!("circuit breaker rejected call, state is open", err.to_string());
    }

    #[test]
    fn inner_roundtrips() {
        let err: Error<&'static str> = Error::Inner("boom");
        assert!(!err.is_circuit_open());
        assert_eq!(Some("boom"), err.into_inner());
    }
}
