//! The breaker itself: configuration, counters, current state, listeners,
//! exclusion list, and the mutex guarding all of it.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::ReentrantMutex;

use crate::category::{is_excluded, Category, ExceptionClass};
use crate::error::{CircuitOpenError, Error};
use crate::listener::{CircuitState, Listener};
use crate::state::{Admission, FailureOutcome, Internal};

struct Mutable<E> {
    state: Internal,
    fail_counter: u32,
    fail_max: u32,
    reset_timeout: Duration,
    excluded: Vec<Category>,
    listeners: Vec<Arc<dyn Listener<E>>>,
}

struct Inner<E> {
    // A `ReentrantMutex` rather than a plain `Mutex`: listener hooks are
    // handed `&Breaker<E>` and run while this lock is held, so a listener
    // that calls back into a getter (`breaker.fail_counter()`, etc.) must
    // not deadlock. Mirrors pybreaker's use of `threading.RLock`.
    mutex: ReentrantMutex<RefCell<Mutable<E>>>,
}

/// A circuit breaker guarding a single protected dependency.
///
/// Cheaply `Clone`-able; clones share the same underlying state, counters,
/// listeners and exclusion list (an `Arc` handle, not a fresh breaker).
pub struct Breaker<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Breaker<E> {
    fn clone(&self) -> Self {
        Breaker {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for Breaker<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let guard = self.inner.mutex.lock();
        let m = guard.borrow();
        f.debug_struct("Breaker")
            .field("state", &m.state.as_circuit_state().to_string())
            .field("fail_counter", &m.fail_counter)
            .field("fail_max", &m.fail_max)
            .field("reset_timeout", &m.reset_timeout)
            .finish()
    }
}

type Guard<'a, E> = parking_lot::ReentrantMutexGuard<'a, RefCell<Mutable<E>>>;

impl<E> Breaker<E> {
    pub(crate) fn from_config(
        fail_max: u32,
        reset_timeout: Duration,
        excluded: Vec<Category>,
        listeners: Vec<Arc<dyn Listener<E>>>,
    ) -> Self {
        Breaker {
            inner: Arc::new(Inner {
                mutex: ReentrantMutex::new(RefCell::new(Mutable {
                    state: Internal::Closed,
                    fail_counter: 0,
                    fail_max,
                    reset_timeout,
                    excluded,
                    listeners,
                })),
            }),
        }
    }

    fn listeners_snapshot(guard: &Guard<'_, E>) -> Vec<Arc<dyn Listener<E>>> {
        guard.borrow().listeners.clone()
    }

    fn notify_before_call(&self, guard: &Guard<'_, E>) {
        for listener in Self::listeners_snapshot(guard) {
            listener.before_call(self);
        }
    }

    fn notify_success(&self, guard: &Guard<'_, E>) {
        for listener in Self::listeners_snapshot(guard) {
            listener.success(self);
        }
    }

    fn notify_failure(&self, guard: &Guard<'_, E>, err: &E) {
        for listener in Self::listeners_snapshot(guard) {
            listener.failure(self, err);
        }
    }

    fn notify_state_change(&self, guard: &Guard<'_, E>, old: CircuitState, new: CircuitState) {
        for listener in Self::listeners_snapshot(guard) {
            listener.state_change(self, Some(old), new);
        }
    }

    /// Runs the admission check for the current state and notifies
    /// `before_call`, without running or accounting any operation. Used by
    /// every invocation adapter.
    fn admit(&self) -> Result<(), Error<E>> {
        let guard = self.inner.mutex.lock();

        let outcome = {
            let mut m = guard.borrow_mut();
            let reset_timeout = m.reset_timeout;
            m.state.admit(reset_timeout)
        };

        match outcome {
            Admission::Rejected => {
                let state = guard.borrow().state.as_circuit_state();
                drop(guard);
                Err(Error::CircuitOpen(CircuitOpenError::new(state)))
            }
            Admission::Permitted => {
                self.notify_before_call(&guard);
                drop(guard);
                Ok(())
            }
            Admission::PermittedAfterTransition => {
                self.notify_state_change(&guard, CircuitState::Open, CircuitState::HalfOpen);
                self.notify_before_call(&guard);
                drop(guard);
                Ok(())
            }
        }
    }

    fn account_success(&self) {
        let guard = self.inner.mutex.lock();

        let closed = {
            let mut m = guard.borrow_mut();
            m.state.on_success(&mut m.fail_counter)
        };

        if closed {
            self.notify_state_change(&guard, CircuitState::HalfOpen, CircuitState::Closed);
        }
        self.notify_success(&guard);
    }

    fn account_failure(&self, err: E) -> Error<E>
    where
        E: ExceptionClass,
    {
        let guard = self.inner.mutex.lock();

        let category = err.category();
        let excluded = {
            let m = guard.borrow();
            is_excluded(&m.excluded, &category)
        };

        if excluded {
            return Error::Inner(err);
        }

        let transition = {
            let mut m = guard.borrow_mut();
            let old = m.state.as_circuit_state();
            let outcome = m.state.on_failure(&mut m.fail_counter, m.fail_max);
            let new = m.state.as_circuit_state();
            (outcome, old, new)
        };

        if let (FailureOutcome::Opened, old, new) = transition {
            self.notify_state_change(&guard, old, new);
        }
        self.notify_failure(&guard, &err);

        Error::Inner(err)
    }

    fn transition(&self, apply: impl FnOnce(&mut Mutable<E>)) {
        let guard = self.inner.mutex.lock();
        let old = guard.borrow().state.as_circuit_state();
        {
            let mut m = guard.borrow_mut();
            apply(&mut m);
        }
        let new = guard.borrow().state.as_circuit_state();
        self.notify_state_change(&guard, old, new);
    }

    /// Forces the breaker into `open`, rejecting calls until `reset_timeout`
    /// elapses from now.
    pub fn open(&self) {
        self.transition(|m| m.state.force_open());
    }

    /// Forces the breaker into `half-open`, admitting the next probe.
    pub fn half_open(&self) {
        self.transition(|m| m.state.force_half_open());
    }

    /// Forces the breaker into `closed`, zeroing the failure counter.
    pub fn close(&self) {
        self.transition(|m| m.state.force_closed(&mut m.fail_counter));
    }

    /// Runs `op` under the breaker's discipline: admits or rejects the
    /// call, then accounts its outcome.
    pub fn call<F, T>(&self, op: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: ExceptionClass,
    {
        self.admit()?;
        match op() {
            Ok(value) => {
                self.account_success();
                Ok(value)
            }
            Err(err) => Err(self.account_failure(err)),
        }
    }

    /// The split "prepare/report" adapter: `prepare` runs only if admission
    /// succeeds, and the caller reports the outcome itself afterward via
    /// [`handle_success`](Breaker::handle_success),
    /// [`handle_error`](Breaker::handle_error) or
    /// [`handle_soft_success`](Breaker::handle_soft_success).
    pub fn call_future<F, R>(&self, prepare: F) -> Result<R, Error<E>>
    where
        F: FnOnce() -> R,
    {
        self.admit()?;
        Ok(prepare())
    }

    /// Reports a successful call performed outside of [`call`](Breaker::call).
    pub fn handle_success(&self) {
        self.account_success();
    }

    /// Reports the call completed without error, but not as a recovery:
    /// leaves the state and counter unchanged. Useful for a half-open
    /// caller that succeeded only partially.
    pub fn handle_soft_success(&self) {}

    /// Reports a call's error performed outside of [`call`](Breaker::call).
    ///
    /// `err = None` is a no-op. Accounting (exclusion check, counter,
    /// possible transition, `failure` listener) always runs for `Some(err)`
    /// regardless of `reraise`; `reraise = true` returns the error back to
    /// the caller, `reraise = false` swallows it.
    pub fn handle_error(&self, err: Option<E>, reraise: bool) -> Result<(), Error<E>>
    where
        E: ExceptionClass,
    {
        match err {
            None => Ok(()),
            Some(err) => {
                let error = self.account_failure(err);
                if reraise {
                    Err(error)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Wraps `op` into a reusable callable that routes every invocation
    /// through [`call`](Breaker::call).
    pub fn guard<F, T>(&self, op: F) -> Guarded<F, E>
    where
        F: Fn() -> Result<T, E>,
        E: ExceptionClass,
    {
        Guarded {
            breaker: self.clone(),
            op,
            name: None,
        }
    }

    /// Wraps a lazily-produced sequence: admission is checked once, before
    /// `make_iter` runs; each subsequent item is then accounted
    /// individually (a yielded `Ok` is a success, a yielded `Err` is a
    /// failure), and exhaustion is not an event.
    pub fn guard_iter<F, I, T>(&self, make_iter: F) -> Result<GuardedIter<I, E>, Error<E>>
    where
        F: FnOnce() -> I,
        I: Iterator<Item = Result<T, E>>,
    {
        self.admit()?;
        Ok(GuardedIter {
            breaker: self.clone(),
            inner: make_iter(),
        })
    }

    /// The breaker's current externally observable state.
    pub fn current_state(&self) -> CircuitState {
        let guard = self.inner.mutex.lock();
        guard.borrow().state.as_circuit_state()
    }

    /// The number of consecutive, non-excluded failures recorded in the
    /// current regime.
    pub fn fail_counter(&self) -> u32 {
        let guard = self.inner.mutex.lock();
        guard.borrow().fail_counter
    }

    /// The consecutive-failure threshold at which `closed` opens.
    pub fn fail_max(&self) -> u32 {
        let guard = self.inner.mutex.lock();
        guard.borrow().fail_max
    }

    /// Sets the consecutive-failure threshold. Takes effect on the next
    /// accounted failure.
    pub fn set_fail_max(&self, fail_max: u32) {
        let guard = self.inner.mutex.lock();
        guard.borrow_mut().fail_max = fail_max;
    }

    /// The minimum time the breaker stays `open` before a probe is permitted.
    pub fn reset_timeout(&self) -> Duration {
        let guard = self.inner.mutex.lock();
        guard.borrow().reset_timeout
    }

    /// Sets the reset timeout. Takes effect on the next admission attempt.
    pub fn set_reset_timeout(&self, reset_timeout: Duration) {
        let guard = self.inner.mutex.lock();
        guard.borrow_mut().reset_timeout = reset_timeout;
    }

    /// A snapshot of the currently excluded categories.
    pub fn excluded_exceptions(&self) -> Vec<Category> {
        let guard = self.inner.mutex.lock();
        guard.borrow().excluded.clone()
    }

    /// Excludes a category: matching errors propagate without being
    /// accounted as failures.
    pub fn add_excluded_exception(&self, category: Category) {
        let guard = self.inner.mutex.lock();
        guard.borrow_mut().excluded.push(category);
    }

    /// Excludes several categories at once.
    pub fn add_excluded_exceptions(&self, categories: impl IntoIterator<Item = Category>) {
        let guard = self.inner.mutex.lock();
        guard.borrow_mut().excluded.extend(categories);
    }

    /// Removes a previously excluded category, if present.
    pub fn remove_excluded_exception(&self, category: &Category) {
        let guard = self.inner.mutex.lock();
        guard.borrow_mut().excluded.retain(|c| c != category);
    }

    /// A snapshot of the currently registered listeners, in notification order.
    pub fn listeners(&self) -> Vec<Arc<dyn Listener<E>>> {
        let guard = self.inner.mutex.lock();
        guard.borrow().listeners.clone()
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn Listener<E>>) {
        let guard = self.inner.mutex.lock();
        guard.borrow_mut().listeners.push(listener);
    }

    /// Registers several listeners at once, preserving order.
    pub fn add_listeners(&self, listeners: impl IntoIterator<Item = Arc<dyn Listener<E>>>) {
        let guard = self.inner.mutex.lock();
        guard.borrow_mut().listeners.extend(listeners);
    }

    /// Removes a previously registered listener, if present (by pointer identity).
    pub fn remove_listener(&self, listener: &Arc<dyn Listener<E>>) {
        let guard = self.inner.mutex.lock();
        guard
            .borrow_mut()
            .listeners
            .retain(|l| !Arc::ptr_eq(l, listener));
    }
}

/// The decorator form: a callable wrapping an operation, routed through
/// [`Breaker::call`] on every invocation. Built with [`Breaker::guard`].
pub struct Guarded<F, E> {
    breaker: Breaker<E>,
    op: F,
    name: Option<&'static str>,
}

impl<F, E> fmt::Debug for Guarded<F, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("breaker", &self.breaker)
            .field("name", &self.name)
            .finish()
    }
}

impl<F, E> Guarded<F, E> {
    /// Attaches a label, so the wrapped operation stays identifiable in
    /// logs and listener output.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// The label attached via [`named`](Guarded::named), if any.
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// The breaker this callable routes through.
    pub fn breaker(&self) -> &Breaker<E> {
        &self.breaker
    }
}

impl<F, T, E> Guarded<F, E>
where
    F: Fn() -> Result<T, E>,
    E: ExceptionClass,
{
    /// Invokes the wrapped operation through the breaker.
    pub fn call(&self) -> Result<T, Error<E>> {
        self.breaker.call(|| (self.op)())
    }
}

/// The lazy-sequence adapter: wraps an iterator so each item is accounted
/// individually. Built with [`Breaker::guard_iter`].
pub struct GuardedIter<I, E> {
    breaker: Breaker<E>,
    inner: I,
}

impl<I, E> fmt::Debug for GuardedIter<I, E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GuardedIter").field("breaker", &self.breaker).finish()
    }
}

impl<I, T, E> Iterator for GuardedIter<I, E>
where
    I: Iterator<Item = Result<T, E>>,
    E: ExceptionClass,
{
    type Item = Result<T, Error<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next()? {
            Ok(value) => {
                self.breaker.account_success();
                Some(Ok(value))
            }
            Err(err) => Some(Err(self.breaker.account_failure(err))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::clock;

    #[derive(Debug)]
    struct BoomError;

    impl ExceptionClass for BoomError {
        fn category(&self) -> Category {
            Category::new(&["boom"])
        }
    }

    fn new_breaker(fail_max: u32, reset_timeout: Duration) -> Breaker<BoomError> {
        Breaker::from_config(fail_max, reset_timeout, Vec::new(), Vec::new())
    }

    #[test]
    fn closed_runs_the_operation() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        assert_eq!(42, breaker.call(|| Ok::<_, BoomError>(42)).unwrap());
        assert_eq!(0, breaker.fail_counter());
    }

    #[test]
    fn opens_after_fail_max_failures() {
        let breaker = new_breaker(3, Duration::from_secs(60));

        for _ in 0..2 {
            let result = breaker.call(|| Err::<(), _>(BoomError));
            assert!(matches!(result, Err(Error::Inner(_))));
            assert_eq!(CircuitState::Closed, breaker.current_state());
        }

        let result = breaker.call(|| Err::<(), _>(BoomError));
        assert!(matches!(result, Err(Error::Inner(_))));
        assert_eq!(CircuitState::Open, breaker.current_state());
        assert_eq!(3, breaker.fail_counter());

        let result = breaker.call(|| Ok::<_, BoomError>(()));
        assert!(matches!(result, Err(Error::CircuitOpen(_))));
    }

    #[test]
    fn half_open_probe_succeeds_and_closes() {
        clock::freeze(|time| {
            let breaker = new_breaker(1, Duration::from_millis(500));
            assert!(breaker.call(|| Err::<(), _>(BoomError)).is_err());
            assert_eq!(CircuitState::Open, breaker.current_state());

            time.advance(Duration::from_millis(600));

            let calls = AtomicU32::new(0);
            let result = breaker.call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoomError>(())
            });

            assert!(result.is_ok());
            assert_eq!(CircuitState::Closed, breaker.current_state());
            assert_eq!(0, breaker.fail_counter());
            assert_eq!(1, calls.load(Ordering::SeqCst));
        });
    }

    #[test]
    fn half_open_probe_fails_and_reopens() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        breaker.half_open();

        let result = breaker.call(|| Err::<(), _>(BoomError));
        assert!(result.is_err());
        assert_eq!(CircuitState::Open, breaker.current_state());
        assert_eq!(1, breaker.fail_counter());
    }

    #[test]
    fn excluded_category_does_not_account() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        breaker.add_excluded_exception(Category::new(&["boom"]));

        let result = breaker.call(|| Err::<(), _>(BoomError));
        assert!(matches!(result, Err(Error::Inner(_))));
        assert_eq!(0, breaker.fail_counter());
    }

    #[test]
    fn handle_error_none_is_a_noop() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        assert!(breaker.handle_error(None, true).is_ok());
        assert_eq!(0, breaker.fail_counter());
    }

    #[test]
    fn handle_error_accounts_without_reraise() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        assert!(breaker.handle_error(Some(BoomError), false).is_ok());
        assert_eq!(1, breaker.fail_counter());
    }

    #[test]
    fn handle_error_reraises_when_asked() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        assert!(breaker.handle_error(Some(BoomError), true).is_err());
        assert_eq!(1, breaker.fail_counter());
    }

    #[test]
    fn handle_soft_success_leaves_state_untouched() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        breaker.half_open();
        breaker.handle_soft_success();
        assert_eq!(CircuitState::HalfOpen, breaker.current_state());
        assert_eq!(0, breaker.fail_counter());
    }

    #[test]
    fn admin_transitions_round_trip() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        breaker.open();
        breaker.close();
        assert_eq!(CircuitState::Closed, breaker.current_state());
        assert_eq!(0, breaker.fail_counter());
    }

    #[test]
    fn add_and_remove_listener_restores_list() {
        #[derive(Debug)]
        struct L;
        impl Listener<BoomError> for L {}

        let breaker = new_breaker(5, Duration::from_secs(60));
        let listener: Arc<dyn Listener<BoomError>> = Arc::new(L);
        breaker.add_listener(listener.clone());
        assert_eq!(1, breaker.listeners().len());

        breaker.remove_listener(&listener);
        assert_eq!(0, breaker.listeners().len());
    }

    #[test]
    fn add_and_remove_excluded_exception_restores_set() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        let category = Category::new(&["boom"]);
        breaker.add_excluded_exception(category.clone());
        assert_eq!(vec![category.clone()], breaker.excluded_exceptions());

        breaker.remove_excluded_exception(&category);
        assert!(breaker.excluded_exceptions().is_empty());
    }

    #[test]
    fn guard_iter_accounts_each_item_without_rechecking_admission() {
        let breaker = new_breaker(2, Duration::from_secs(60));
        let items: Vec<Result<u32, BoomError>> = vec![Ok(1), Err(BoomError), Ok(2)];

        let mut guarded = breaker.guard_iter(|| items.into_iter()).unwrap();
        assert_eq!(1, guarded.next().unwrap().unwrap());
        assert!(guarded.next().unwrap().is_err());
        assert_eq!(1, breaker.fail_counter());
        assert_eq!(2, guarded.next().unwrap().unwrap());
        assert_eq!(0, breaker.fail_counter());
        assert!(guarded.next().is_none());
    }

    #[test]
    fn guard_decorator_preserves_a_name() {
        let breaker = new_breaker(5, Duration::from_secs(60));
        let guarded = breaker.guard(|| Ok::<_, BoomError>(7)).named("dangerous_call");
        assert_eq!(Some("dangerous_call"), guarded.name());
        assert_eq!(7, guarded.call().unwrap());
    }

    #[test]
    fn transition_listener_log_matches_spec_scenario() {
        #[derive(Debug, Default)]
        struct Log(std::sync::Mutex<String>);

        impl Listener<BoomError> for Log {
            fn state_change(
                &self,
                _breaker: &Breaker<BoomError>,
                old: Option<CircuitState>,
                new: CircuitState,
            ) {
                let mut out = self.0.lock().unwrap();
                if let Some(old) = old {
                    out.push_str(&old.to_string());
                    out.push_str("->");
                }
                out.push_str(&new.to_string());
                out.push(',');
            }
        }

        let breaker = new_breaker(5, Duration::from_secs(60));
        let log = Arc::new(Log::default());
        breaker.add_listener(log.clone());

        breaker.open();
        breaker.half_open();
        breaker.close();

        assert_eq!(
            "closed->open,open->half-open,half-open->closed,",
            *log.0.lock().unwrap()
        );
    }
}
