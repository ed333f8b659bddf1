//! The resolution procedure: how a value handed to a resolver, or returned
//! from a reaction, becomes the settlement of a target promise.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::promise::{catch_panic, Shared};
use crate::{Error, Promise, Reason};

/// What a promise can be resolved with.
pub enum Resolution<T> {
    /// Fulfills as-is.
    Value(T),
    /// Adopts the outcome of a promise from this crate.
    Promise(Promise<T>),
    /// Adopts the outcome of any other future-like object.
    Thenable(Box<dyn Thenable<T>>),
}

impl<T> Resolution<T> {
    /// Wraps a `then`-like closure as a foreign thenable.
    ///
    /// ```
    /// use promise_plus::{MicrotaskQueue, Promise, Resolution};
    ///
    /// let queue = MicrotaskQueue::new();
    /// let thenable = Resolution::from_then(|resolve, reject| {
    ///     resolve.fulfill(5);
    ///     reject.reject(promise_plus::Reason::new(6));
    ///     Ok(())
    /// });
    /// let promise = Promise::resolve_with(&queue.scheduler(), thenable);
    /// queue.run_until_stalled();
    /// assert_eq!(promise.outcome().and_then(|o| o.value()), Some(5));
    /// ```
    pub fn from_then<F>(then: F) -> Self
    where
        T: 'static,
        F: FnOnce(ResolveHandle<T>, RejectHandle<T>) -> Result<(), Reason> + Send + 'static,
    {
        Resolution::Thenable(Box::new(ThenFn(then)))
    }
}

impl<T> From<Promise<T>> for Resolution<T> {
    fn from(promise: Promise<T>) -> Self {
        Resolution::Promise(promise)
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Promise(promise) => f.debug_tuple("Promise").field(promise).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// A future-like object that reports its outcome through two callbacks.
///
/// Implementations are not trusted: only the first callback invocation
/// counts, and an `Err` returned after a callback fired is ignored.
pub trait Thenable<T>: Send {
    fn then(
        self: Box<Self>,
        resolve: ResolveHandle<T>,
        reject: RejectHandle<T>,
    ) -> Result<(), Reason>;
}

struct ThenFn<F>(F);

impl<T, F> Thenable<T> for ThenFn<F>
where
    F: FnOnce(ResolveHandle<T>, RejectHandle<T>) -> Result<(), Reason> + Send,
{
    fn then(
        self: Box<Self>,
        resolve: ResolveHandle<T>,
        reject: RejectHandle<T>,
    ) -> Result<(), Reason> {
        (self.0)(resolve, reject)
    }
}

/// Adopting a promise through this impl behaves like
/// [`Resolution::Promise`], including rejecting a promise handed itself.
impl<T: Clone + Send + 'static> Thenable<T> for Promise<T> {
    fn then(
        self: Box<Self>,
        resolve: ResolveHandle<T>,
        reject: RejectHandle<T>,
    ) -> Result<(), Reason> {
        if self.is_shared(&resolve.target) {
            tracing::debug!("chaining cycle detected for promise thenable");
            reject.reject(Error::ChainCycle.into());
            return Ok(());
        }
        self.shared().subscribe(
            move |value| resolve.fulfill(value),
            move |reason| reject.reject(reason),
        );
        Ok(())
    }
}

/// Success callback handed to a [`Thenable`]. Shares its one-shot guard with
/// the matching [`RejectHandle`].
pub struct ResolveHandle<T> {
    called: Arc<AtomicBool>,
    target: Arc<Shared<T>>,
}

/// Failure callback handed to a [`Thenable`].
pub struct RejectHandle<T> {
    called: Arc<AtomicBool>,
    target: Arc<Shared<T>>,
}

impl<T> Clone for ResolveHandle<T> {
    fn clone(&self) -> Self {
        ResolveHandle {
            called: self.called.clone(),
            target: self.target.clone(),
        }
    }
}

impl<T> Clone for RejectHandle<T> {
    fn clone(&self) -> Self {
        RejectHandle {
            called: self.called.clone(),
            target: self.target.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> ResolveHandle<T> {
    pub fn resolve(&self, resolution: Resolution<T>) {
        if self.called.swap(true, Ordering::SeqCst) {
            tracing::debug!("thenable called back twice, ignoring");
            return;
        }
        resolve(&self.target, resolution);
    }

    pub fn fulfill(&self, value: T) {
        self.resolve(Resolution::Value(value))
    }
}

impl<T: Clone + Send + 'static> RejectHandle<T> {
    pub fn reject(&self, reason: Reason) {
        if self.called.swap(true, Ordering::SeqCst) {
            tracing::debug!(%reason, "thenable called back twice, ignoring");
            return;
        }
        self.target.reject(reason);
    }
}

/// Drives `target` to the settlement described by `x`.
pub(crate) fn resolve<T: Clone + Send + 'static>(target: &Arc<Shared<T>>, x: Resolution<T>) {
    match x {
        Resolution::Promise(promise) if promise.is_shared(target) => {
            tracing::debug!("chaining cycle detected for promise");
            target.reject(Error::ChainCycle.into());
        }
        Resolution::Promise(promise) => {
            let (on_fulfilled, on_rejected) = (target.clone(), target.clone());
            promise.shared().subscribe(
                move |value| on_fulfilled.fulfill(value),
                move |reason| on_rejected.reject(reason),
            );
        }
        Resolution::Thenable(thenable) => {
            let called = Arc::new(AtomicBool::new(false));
            let resolve = ResolveHandle {
                called: called.clone(),
                target: target.clone(),
            };
            let reject = RejectHandle {
                called: called.clone(),
                target: target.clone(),
            };
            if let Err(reason) = catch_panic(move || thenable.then(resolve, reject)) {
                if called.swap(true, Ordering::SeqCst) {
                    tracing::debug!(%reason, "thenable failed after calling back, ignoring");
                } else {
                    target.reject(reason);
                }
            }
        }
        Resolution::Value(value) => target.fulfill(value),
    }
}
