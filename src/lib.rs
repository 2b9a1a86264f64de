//! A circuit breaker: detects failures of a protected call and, once they
//! pile up, stops making the call for a while instead of letting every
//! caller wait out its own timeout.
//!
//! # Example
//!
//! ```
//! use circuitbreak::{Category, Config, Error, ExceptionClass};
//!
//! #[derive(Debug)]
//! struct DangerousCallFailed;
//!
//! impl ExceptionClass for DangerousCallFailed {
//!     fn category(&self) -> Category {
//!         Category::new(&["dangerous_call"])
//!     }
//! }
//!
//! // A function that sometimes fails.
//! fn dangerous_call(n: u32) -> Result<(), DangerousCallFailed> {
//!   if n % 3 == 0 {
//!     return Err(DangerousCallFailed)
//!   }
//!   Ok(())
//! }
//!
//! // Build a breaker with the default threshold (5 consecutive failures)
//! // and reset timeout (60s).
//! let breaker = Config::new().build();
//!
//! // Call the function in a loop; once enough failures pile up the
//! // breaker moves to `open` and starts rejecting calls outright.
//! for n in 0..10 {
//!   match breaker.call(|| dangerous_call(n)) {
//!     Err(Error::Inner(_)) => eprintln!("{}: failed", n),
//!     Err(Error::CircuitOpen(_)) => eprintln!("{}: rejected, circuit open", n),
//!     Ok(()) => {}
//!   }
//! }
//! ```
//!
//! Or with a custom threshold, reset timeout, exclusion list and listener:
//!
//! ```
//! use std::time::Duration;
//! use circuitbreak::{Category, Config, ExceptionClass};
//!
//! #[derive(Debug)]
//! enum ApiError {
//!     NotFound,
//!     Timeout,
//! }
//!
//! impl ExceptionClass for ApiError {
//!     fn category(&self) -> Category {
//!         match self {
//!             ApiError::NotFound => Category::new(&["api", "not_found"]),
//!             ApiError::Timeout => Category::new(&["api", "timeout"]),
//!         }
//!     }
//! }
//!
//! // A 404 is an expected, non-actionable outcome: don't count it as a failure.
//! let breaker = Config::<ApiError>::new()
//!     .fail_max(3)
//!     .reset_timeout(Duration::from_secs(30))
//!     .exclude(vec![Category::new(&["api", "not_found"])])
//!     .build();
//! ```

#![deny(missing_debug_implementations)]
#![deny(missing_docs)]
#![cfg_attr(test, deny(warnings))]

extern crate parking_lot;

mod breaker;
mod category;
mod config;
mod error;
mod listener;

#[cfg(feature = "futures-support")]
mod futures_support;

#[doc(hidden)]
pub mod clock;

pub use self::breaker::{Breaker, Guarded, GuardedIter};
pub use self::category::{Category, ExceptionClass};
pub use self::config::Config;
pub use self::error::{CircuitOpenError, Error};
pub use self::listener::{CircuitState, Listener, NoopListener};

#[cfg(feature = "futures-support")]
pub use self::futures_support::BreakerStream;
