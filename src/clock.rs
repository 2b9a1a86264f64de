//! A monotonic clock, overridable from tests via a thread-local freeze.
//!
//! The breaker only ever needs `now()` to compare against an `opened_at`
//! timestamp; everything else here exists so tests can drive that comparison
//! without real sleeps.

use std::cell::Cell;
use std::time::{Duration, Instant};

thread_local!(static CLOCK: Cell<Option<*const MockClock>> = Cell::new(None));

/// A clock that can be advanced manually, installed via [`freeze`].
#[derive(Debug)]
pub struct MockClock(Instant);

impl MockClock {
    fn new() -> MockClock {
        MockClock(Instant::now())
    }

    /// Returns the frozen instant.
    pub fn now(&self) -> Instant {
        self.0
    }

    /// Moves the frozen instant forward by `diff`.
    pub fn advance(&mut self, diff: Duration) {
        self.0 += diff
    }
}

/// Installs a mock clock for the duration of `f`, letting tests control
/// what [`now`] returns without sleeping.
///
/// # Panics
///
/// If a clock is already frozen on the current thread.
pub fn freeze<F, R>(f: F) -> R
where
    F: FnOnce(&mut MockClock) -> R,
{
    CLOCK.with(|cell| {
        let mut clock = MockClock::new();

        assert!(
            cell.get().is_none(),
            "default clock already set for execution context"
        );

        // Ensure that the clock is removed from the thread-local context
        // when leaving the scope. This handles cases that involve panicking.
        struct Reset<'a>(&'a Cell<Option<*const MockClock>>);

        impl<'a> Drop for Reset<'a> {
            fn drop(&mut self) {
                self.0.set(None);
            }
        }

        let _reset = Reset(cell);

        cell.set(Some(&clock as *const MockClock));

        f(&mut clock)
    })
}

/// Returns the current instant: the frozen clock if one is installed on this
/// thread, otherwise `Instant::now()`.
pub fn now() -> Instant {
    CLOCK.with(|current| match current.get() {
        Some(ptr) => unsafe { (*ptr).now() },
        None => Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freezes_and_advances() {
        freeze(|time| {
            let start = now();
            time.advance(Duration::from_secs(5));
            assert_eq!(start + Duration::from_secs(5), now());
        });
    }
}
