use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::panic_message;
use crate::resolution::{self, Resolution};
use crate::{Error, Reason, Scheduler};

/// Where a promise is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

/// The outcome of a settled promise.
#[derive(Debug, Clone)]
pub enum Settled<T> {
    Fulfilled(T),
    Rejected(Reason),
}

impl<T> Settled<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settled::Fulfilled(_))
    }

    pub fn value(self) -> Option<T> {
        match self {
            Settled::Fulfilled(value) => Some(value),
            Settled::Rejected(_) => None,
        }
    }

    pub fn reason(self) -> Option<Reason> {
        match self {
            Settled::Fulfilled(_) => None,
            Settled::Rejected(reason) => Some(reason),
        }
    }
}

enum State<T> {
    Pending,
    Fulfilled(T),
    Rejected(Reason),
}

/// One `then` registration. Exactly one half runs, once.
struct Reaction<T> {
    on_fulfilled: Box<dyn FnOnce(T) + Send>,
    on_rejected: Box<dyn FnOnce(Reason) + Send>,
}

struct Inner<T> {
    state: State<T>,
    // Set by the first accepted `Resolver` call, even while still pending.
    locked: bool,
    reactions: Vec<Reaction<T>>,
}

impl<T: Clone> Inner<T> {
    fn outcome(&self) -> Option<Settled<T>> {
        match &self.state {
            State::Pending => None,
            State::Fulfilled(value) => Some(Settled::Fulfilled(value.clone())),
            State::Rejected(reason) => Some(Settled::Rejected(reason.clone())),
        }
    }
}

pub(crate) struct Shared<T> {
    inner: Mutex<Inner<T>>,
    scheduler: Scheduler,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> Shared<T> {
    // Drained reactions are handed to the scheduler before the lock is
    // released, so a reaction attached concurrently from another thread is
    // queued behind them.
    pub(crate) fn fulfill(&self, value: T) {
        let mut inner = self.lock();
        if !matches!(inner.state, State::Pending) {
            return;
        }
        inner.state = State::Fulfilled(value.clone());
        let reactions = std::mem::take(&mut inner.reactions);
        tracing::trace!(reactions = reactions.len(), "promise fulfilled");
        for reaction in reactions {
            let (on_fulfilled, value) = (reaction.on_fulfilled, value.clone());
            self.scheduler.schedule(Box::new(move || on_fulfilled(value)));
        }
    }

    pub(crate) fn reject(&self, reason: Reason) {
        let mut inner = self.lock();
        if !matches!(inner.state, State::Pending) {
            return;
        }
        inner.state = State::Rejected(reason.clone());
        let reactions = std::mem::take(&mut inner.reactions);
        tracing::trace!(reactions = reactions.len(), %reason, "promise rejected");
        for reaction in reactions {
            let (on_rejected, reason) = (reaction.on_rejected, reason.clone());
            self.scheduler.schedule(Box::new(move || on_rejected(reason)));
        }
    }

    /// Registers a continuation pair. Whatever the current state, the
    /// continuation runs from the scheduler, never from this call. A settled
    /// promise schedules it under the lock so it keeps its attachment slot.
    pub(crate) fn subscribe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(Reason) + Send + 'static,
    {
        let mut inner = self.lock();
        match inner.outcome() {
            None => inner.reactions.push(Reaction {
                on_fulfilled: Box::new(on_fulfilled),
                on_rejected: Box::new(on_rejected),
            }),
            Some(Settled::Fulfilled(value)) => {
                self.scheduler.schedule(Box::new(move || on_fulfilled(value)))
            }
            Some(Settled::Rejected(reason)) => {
                self.scheduler.schedule(Box::new(move || on_rejected(reason)))
            }
        }
    }
}

/// Runs a user callback, turning a panic into a rejection reason.
pub(crate) fn catch_panic<V>(f: impl FnOnce() -> Result<V, Reason>) -> Result<V, Reason> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = panic_message(&*payload);
        tracing::warn!(%message, "callback panicked");
        Err(Error::Panicked(message).into())
    })
}

/// A single-assignment container for an eventual value or rejection reason.
///
/// Handles are cheap to clone and all observe the same settlement. Reactions
/// attached with [`then`](Promise::then) and friends always run from the
/// promise's [`Scheduler`], in the order they were attached.
///
/// # Examples
///
/// ```
/// use promise_plus::{MicrotaskQueue, Promise, Reason, Resolution};
///
/// let queue = MicrotaskQueue::new();
/// let scheduler = queue.scheduler();
/// let promise = Promise::new(&scheduler, |resolver| {
///     resolver.fulfill(1);
///     Ok(())
/// });
/// let chained = promise
///     .and_then(|v| Ok(Resolution::Value(v + 1)))
///     .and_then(|_| Err::<Resolution<i32>, _>(Reason::new("nope")))
///     .catch(|reason| Ok(Resolution::Value(reason.to_string().len() as i32)));
/// queue.run_until_stalled();
/// assert_eq!(chained.outcome().and_then(|o| o.value()), Some(4));
/// ```
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.state())
            .finish()
    }
}

/// The settle-as-success and settle-as-failure capabilities of one promise.
///
/// Only the first accepted call has any effect; later calls are silent
/// no-ops. Resolving with a pending promise or thenable counts as accepted
/// even though the promise stays pending until that value settles: a later
/// [`reject`](Resolver::reject) cannot override a pending adoption.
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Resolver {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resolver(..)")
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    fn lock_in(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.locked || !matches!(inner.state, State::Pending) {
            tracing::debug!("ignoring settlement of an already resolved promise");
            return false;
        }
        inner.locked = true;
        true
    }

    /// Resolves with a plain value, a promise or a foreign thenable.
    pub fn resolve(&self, resolution: Resolution<T>) {
        if self.lock_in() {
            resolution::resolve(&self.shared, resolution);
        }
    }

    pub fn fulfill(&self, value: T) {
        self.resolve(Resolution::Value(value))
    }

    pub fn reject(&self, reason: Reason) {
        if self.lock_in() {
            self.shared.reject(reason);
        }
    }
}

/// A pending promise together with its independently usable resolver.
#[derive(Debug)]
pub struct Deferred<T> {
    pub promise: Promise<T>,
    pub resolver: Resolver<T>,
}

impl<T> Promise<T> {
    pub fn state(&self) -> PromiseState {
        match self.shared.lock().state {
            State::Pending => PromiseState::Pending,
            State::Fulfilled(_) => PromiseState::Fulfilled,
            State::Rejected(_) => PromiseState::Rejected,
        }
    }
}

impl<T: Clone + Send + 'static> Promise<T> {
    fn pending(scheduler: &Scheduler) -> Self {
        Promise {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: State::Pending,
                    locked: false,
                    reactions: Vec::new(),
                }),
                scheduler: scheduler.clone(),
            }),
        }
    }

    /// Creates a promise and runs `producer` synchronously with its resolver.
    /// An `Err` or a panic from the producer rejects the promise unless the
    /// producer already resolved it.
    pub fn new<F>(scheduler: &Scheduler, producer: F) -> Self
    where
        F: FnOnce(Resolver<T>) -> Result<(), Reason>,
    {
        let Deferred { promise, resolver } = Self::deferred(scheduler);
        let handle = resolver.clone();
        if let Err(reason) = catch_panic(move || producer(handle)) {
            resolver.reject(reason);
        }
        promise
    }

    pub fn deferred(scheduler: &Scheduler) -> Deferred<T> {
        let promise = Self::pending(scheduler);
        let resolver = Resolver {
            shared: promise.shared.clone(),
        };
        Deferred { promise, resolver }
    }

    /// Returns a native promise unchanged, otherwise a new promise resolved
    /// with `resolution` (thenables are flattened).
    pub fn resolve_with(scheduler: &Scheduler, resolution: Resolution<T>) -> Self {
        match resolution {
            Resolution::Promise(promise) => promise,
            other => {
                let Deferred { promise, resolver } = Self::deferred(scheduler);
                resolver.resolve(other);
                promise
            }
        }
    }

    pub fn resolved(scheduler: &Scheduler, value: T) -> Self {
        Self::resolve_with(scheduler, Resolution::Value(value))
    }

    pub fn rejected(scheduler: &Scheduler, reason: Reason) -> Self {
        let Deferred { promise, resolver } = Self::deferred(scheduler);
        resolver.reject(reason);
        promise
    }

    /// Attaches both reactions and returns the promise driven by whichever
    /// of them fires. A handler's `Err` (or panic) rejects that promise;
    /// its `Ok` goes through the resolution procedure.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Resolution<U>, Reason> + Send + 'static,
        R: FnOnce(Reason) -> Result<Resolution<U>, Reason> + Send + 'static,
    {
        let next = Promise::<U>::pending(&self.shared.scheduler);
        let (fulfilled_target, rejected_target) = (next.shared.clone(), next.shared.clone());
        self.shared.subscribe(
            move |value| settle_derived(&fulfilled_target, move || on_fulfilled(value)),
            move |reason| settle_derived(&rejected_target, move || on_rejected(reason)),
        );
        next
    }

    /// `then` with the rejection passed through unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Resolution<U>, Reason> + Send + 'static,
    {
        self.then(on_fulfilled, |reason| Err(reason))
    }

    /// `then` with the value passed through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T>
    where
        R: FnOnce(Reason) -> Result<Resolution<T>, Reason> + Send + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }

    /// Runs `on_settled` whichever way this promise settles, waits for what
    /// it returns, then settles with the original outcome. A failure of
    /// `on_settled` replaces the outcome.
    pub fn finally<S, F>(&self, on_settled: F) -> Promise<T>
    where
        S: Clone + Send + 'static,
        F: FnOnce() -> Result<Resolution<S>, Reason> + Send + 'static,
    {
        let slot = Arc::new(Mutex::new(Some(on_settled)));
        let rejected_slot = slot.clone();
        let scheduler = self.shared.scheduler.clone();
        let rejected_scheduler = scheduler.clone();
        self.then(
            move |value| match take_callback(&slot) {
                Some(callback) => {
                    let gate = Promise::resolve_with(&scheduler, callback()?);
                    Ok(Resolution::Promise(
                        gate.and_then::<T, _>(move |_| Ok(Resolution::Value(value))),
                    ))
                }
                None => Ok(Resolution::Value(value)),
            },
            move |reason| match take_callback(&rejected_slot) {
                Some(callback) => {
                    let gate = Promise::resolve_with(&rejected_scheduler, callback()?);
                    Ok(Resolution::Promise(gate.and_then::<T, _>(move |_| Err(reason))))
                }
                None => Err(reason),
            },
        )
    }

    /// The settled value or reason, if any.
    pub fn outcome(&self) -> Option<Settled<T>> {
        self.shared.lock().outcome()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.shared.scheduler
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<T>> {
        &self.shared
    }

    pub(crate) fn is_shared(&self, target: &Arc<Shared<T>>) -> bool {
        Arc::ptr_eq(&self.shared, target)
    }
}

fn take_callback<F>(slot: &Mutex<Option<F>>) -> Option<F> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

fn settle_derived<U: Clone + Send + 'static>(
    target: &Arc<Shared<U>>,
    handler: impl FnOnce() -> Result<Resolution<U>, Reason>,
) {
    match catch_panic(handler) {
        Ok(resolution) => resolution::resolve(target, resolution),
        Err(reason) => target.reject(reason),
    }
}
