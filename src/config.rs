//! A `Breaker`'s configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::Breaker;
use crate::category::Category;
use crate::listener::Listener;

const DEFAULT_FAIL_MAX: u32 = 5;
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds a [`Breaker`] with defaults (`fail_max=5`, `reset_timeout=60s`, no
/// exclusions, no listeners) and any overrides applied with the fluent
/// methods below.
///
/// ```
/// use circuitbreak::Config;
///
/// let breaker: circuitbreak::Breaker<()> = Config::new().build();
/// assert_eq!(5, breaker.fail_max());
/// ```
pub struct Config<E> {
    fail_max: u32,
    reset_timeout: Duration,
    excluded: Vec<Category>,
    listeners: Vec<Arc<dyn Listener<E>>>,
}

impl<E> fmt::Debug for Config<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("fail_max", &self.fail_max)
            .field("reset_timeout", &self.reset_timeout)
            .field("excluded", &self.excluded)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> Default for Config<E> {
    fn default() -> Self {
        Config {
            fail_max: DEFAULT_FAIL_MAX,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            excluded: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

impl<E> Config<E> {
    /// Creates a new configuration with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the consecutive-failure threshold at which `closed` opens.
    pub fn fail_max(mut self, fail_max: u32) -> Self {
        self.fail_max = fail_max;
        self
    }

    /// Sets the minimum time the breaker stays `open` before a probe is permitted.
    pub fn reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    /// Adds categories that should propagate to the caller without being
    /// accounted as failures.
    pub fn exclude(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.excluded.extend(categories);
        self
    }

    /// Adds listeners notified of transitions and call lifecycle events.
    pub fn listeners(mut self, listeners: impl IntoIterator<Item = Arc<dyn Listener<E>>>) -> Self {
        self.listeners.extend(listeners);
        self
    }

    /// Builds the breaker.
    pub fn build(self) -> Breaker<E> {
        Breaker::from_config(self.fail_max, self.reset_timeout, self.excluded, self.listeners)
    }
}
