//! Async integration, enabled by the `futures-support` feature (on by
//! default): an `async fn` adapter on [`Breaker`] and a `Stream` wrapper
//! that accounts each item as it's polled.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;

use crate::breaker::Breaker;
use crate::category::ExceptionClass;
use crate::error::Error;

impl<E> Breaker<E> {
    /// Runs an async operation under the breaker's discipline: admits or
    /// rejects the call, awaits `op`, then accounts its outcome. The
    /// equivalent of [`call`](Breaker::call) for futures.
    pub async fn call_async<F, Fut, T>(&self, op: F) -> Result<T, Error<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ExceptionClass,
    {
        self.call_future(op)?.await.map_or_else(
            |err| Err(self.handle_error(Some(err), true).unwrap_err()),
            |value| {
                self.handle_success();
                Ok(value)
            },
        )
    }
}

pin_project! {
    /// Wraps a `Stream<Item = Result<T, E>>` so that each item is checked
    /// for admission and accounted as it's produced: rejects with
    /// [`Error::CircuitOpen`](crate::Error::CircuitOpen) instead of polling
    /// the inner stream while the breaker isn't admitting calls, accounts
    /// `Ok` items as successes and `Err` items as failures, and passes
    /// `None` straight through without accounting it.
    ///
    /// Admission is checked once per item, not once per `poll_next` call:
    /// a single item may be polled many times while `Pending` (normal
    /// executor/waker behavior), and re-admitting on every one of those
    /// polls would both reject a call still legitimately in flight and
    /// leave the breaker stuck `half-open` forever, since the aborted
    /// admission is never reported back via `handle_success`/`handle_error`.
    #[derive(Debug)]
    pub struct BreakerStream<S, E> {
        breaker: Breaker<E>,
        #[pin]
        stream: S,
        admitted: bool,
    }
}

impl<S, T, E> BreakerStream<S, E>
where
    S: Stream<Item = Result<T, E>>,
{
    /// Wraps `stream` with `breaker`.
    pub fn new(breaker: Breaker<E>, stream: S) -> Self {
        BreakerStream {
            breaker,
            stream,
            admitted: false,
        }
    }

    /// The breaker guarding this stream.
    pub fn breaker(&self) -> &Breaker<E> {
        &self.breaker
    }
}

impl<S, T, E> Stream for BreakerStream<S, E>
where
    S: Stream<Item = Result<T, E>>,
    E: ExceptionClass,
{
    type Item = Result<T, Error<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        if !*this.admitted {
            if let Err(err) = this.breaker.call_future(|| ()) {
                return Poll::Ready(Some(Err(err)));
            }
            *this.admitted = true;
        }

        match this.stream.poll_next(cx) {
            Poll::Ready(Some(Ok(value))) => {
                *this.admitted = false;
                this.breaker.handle_success();
                Poll::Ready(Some(Ok(value)))
            }
            Poll::Ready(Some(Err(err))) => {
                *this.admitted = false;
                Poll::Ready(Some(Err(this.breaker.handle_error(Some(err), true).unwrap_err())))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
