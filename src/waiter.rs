use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::{Error, Promise, Reason};

/// Awaits a [`Promise`] from async code. The outcome is delivered through
/// the promise's scheduler like any other reaction, so that scheduler has to
/// keep running for the waiter to complete.
///
/// # Examples
///
/// ```
/// use promise_plus::{MicrotaskQueue, Promise};
/// use futures::executor::block_on;
/// use std::future::IntoFuture;
/// use std::thread;
///
/// let queue = MicrotaskQueue::new();
/// let d = Promise::<String>::deferred(&queue.scheduler());
/// let waiter = d.promise.clone().into_future();
/// let task1 = thread::spawn(move || block_on(waiter));
/// d.resolver.fulfill(String::from("🍓"));
/// queue.run_until_stalled();
/// assert_eq!(task1.join().expect("The task1 thread has panicked.").unwrap(), "🍓");
/// ```
#[derive(Debug)]
pub struct Waiter<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

#[derive(Debug)]
enum WakerState {
    Fresh,
    Tainted,
}

#[derive(Debug)]
struct Slot<T> {
    outcome: Option<Result<T, Reason>>,
    waker: Result<Waker, WakerState>,
}

fn lock<T>(slot: &Mutex<Slot<T>>) -> MutexGuard<'_, Slot<T>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Held by both halves of the waiter's reaction. Dropping the last handle
/// without delivering (the promise or its queued task went away) wakes the
/// waiter with [`Error::Dropped`].
struct Delivery<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Delivery<T> {
    fn deliver(&self, outcome: Result<T, Reason>) {
        let mut slot = lock(&self.slot);
        slot.outcome = Some(outcome);
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T> Drop for Delivery<T> {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if matches!(slot.waker, Err(WakerState::Tainted)) {
            return;
        }
        slot.outcome = Some(Err(Error::Dropped.into()));
        if let Ok(waker) = std::mem::replace(&mut slot.waker, Err(WakerState::Tainted)) {
            waker.wake()
        }
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Promise<T> {
    type Output = Result<T, Reason>;
    type IntoFuture = Waiter<T>;

    fn into_future(self) -> Waiter<T> {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            waker: Err(WakerState::Fresh),
        }));
        let on_fulfilled = Arc::new(Delivery { slot: slot.clone() });
        let on_rejected = on_fulfilled.clone();
        self.shared().subscribe(
            move |value| on_fulfilled.deliver(Ok(value)),
            move |reason| on_rejected.deliver(Err(reason)),
        );
        Waiter { slot }
    }
}

impl<T> Future for Waiter<T> {
    type Output = Result<T, Reason>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.slot);
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => match std::mem::replace(&mut slot.waker, Ok(cx.waker().clone())) {
                Err(WakerState::Tainted) => Poll::Ready(Err(Error::Dropped.into())),
                _ => Poll::Pending,
            },
        }
    }
}
