//! The asynchronous operation applied to every item by the mapper, and adapters that turn other
//! shapes of asynchronous code into one.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::ready;
use tokio::sync::oneshot;

use crate::error::CallbackError;

/// An asynchronous, fallible transformation of one item. Invoked exactly once per item, in input
/// order.
pub trait Operation<T> {
    /// Value produced on success.
    type Item;
    /// Error produced on failure.
    type Error;
    /// The future settling to the outcome of one invocation.
    type Future: Future<Output = Result<Self::Item, Self::Error>>;

    /// Starts the operation for the given item.
    fn run(&mut self, item: T) -> Self::Future;
}

impl<T, R, E, F, Fut> Operation<T> for F
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    type Item = R;
    type Error = E;
    type Future = Fut;

    fn run(&mut self, item: T) -> Self::Future {
        self(item)
    }
}

/// Operation that receives the input index along with the item, see [indexed].
pub struct Indexed<F> {
    next_index: usize,
    f: F,
}

/// Wraps `f` so it is called with `(index, item)`, where `index` is the item's position in the
/// input sequence.
pub fn indexed<F>(f: F) -> Indexed<F> {
    Indexed { next_index: 0, f }
}

impl<T, R, E, F, Fut> Operation<T> for Indexed<F>
where
    F: FnMut((usize, T)) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    type Item = R;
    type Error = E;
    type Future = Fut;

    fn run(&mut self, item: T) -> Self::Future {
        let index = self.next_index;
        self.next_index += 1;
        (self.f)((index, item))
    }
}

/// One-shot completion handle passed to callback-style operations. Consuming it settles the
/// operation; dropping it without a result settles it with [CallbackError::Dropped].
pub struct Callback<R, E> {
    tx: oneshot::Sender<Result<R, E>>,
}

impl<R, E> Callback<R, E> {
    pub fn done(self, value: R) {
        self.complete(Ok(value))
    }

    pub fn fail(self, error: E) {
        self.complete(Err(error))
    }

    /// Settles the operation with the given outcome.
    pub fn complete(self, outcome: Result<R, E>) {
        // the receiver is gone only if the mapping call itself was dropped
        let _ = self.tx.send(outcome);
    }
}

/// Operation bridged from a callback-style function, see [from_callback].
pub struct FromCallback<F, R, E> {
    f: F,
    _outcome: PhantomData<fn() -> (R, E)>,
}

/// Bridges a callback-style function into an [Operation]. `f` receives the item and a
/// [Callback] that it must eventually complete, from any task or thread.
pub fn from_callback<T, R, E, F>(f: F) -> FromCallback<F, R, E>
where
    F: FnMut(T, Callback<R, E>),
{
    FromCallback {
        f,
        _outcome: PhantomData,
    }
}

impl<T, R, E, F> Operation<T> for FromCallback<F, R, E>
where
    F: FnMut(T, Callback<R, E>),
{
    type Item = R;
    type Error = CallbackError<E>;
    type Future = CallbackFuture<R, E>;

    fn run(&mut self, item: T) -> Self::Future {
        let (tx, rx) = oneshot::channel();
        (self.f)(item, Callback { tx });
        CallbackFuture { rx }
    }
}

/// Settles once the [Callback] handed to a bridged operation is completed or dropped.
pub struct CallbackFuture<R, E> {
    rx: oneshot::Receiver<Result<R, E>>,
}

impl<R, E> Future for CallbackFuture<R, E> {
    type Output = Result<R, CallbackError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = match ready!(Pin::new(&mut self.rx).poll(cx)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CallbackError::Failed(e)),
            Err(_) => Err(CallbackError::Dropped),
        };
        Poll::Ready(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::future;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_closure_operation() {
        let mut op = |n: u32| future::ready(Ok::<_, ()>(n + 1));
        assert_eq!(op.run(1).await, Ok(2));
        assert_eq!(op.run(41).await, Ok(42));
    }

    #[tokio::test]
    async fn test_indexed_operation() {
        let mut op = indexed(|(i, s): (usize, &str)| future::ready(Ok::<_, ()>(format!("{i}:{s}"))));
        assert_eq!(op.run("a").await.unwrap(), "0:a");
        assert_eq!(op.run("b").await.unwrap(), "1:b");
        assert_eq!(op.run("c").await.unwrap(), "2:c");
    }

    #[tokio::test]
    async fn test_callback_done_and_fail() {
        let mut op = from_callback(|n: i32, cb: Callback<i32, String>| {
            if n < 0 {
                cb.fail(format!("negative input {n}"));
            } else {
                cb.done(n * 10);
            }
        });

        assert_eq!(op.run(3).await, Ok(30));
        assert_eq!(
            op.run(-1).await,
            Err(CallbackError::Failed("negative input -1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_callback_dropped() {
        let mut op = from_callback(|_: (), cb: Callback<(), ()>| drop(cb));
        assert_eq!(op.run(()).await, Err(CallbackError::Dropped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_completed_later() {
        let mut op = from_callback(|n: u64, cb: Callback<u64, ()>| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(n)).await;
                cb.complete(Ok(n));
            });
        });

        assert_eq!(op.run(250).await, Ok(250));
    }
}
