//! Aggregating several promises into one.
//!
//! Every input is first normalized with [`Promise::resolve_with`]. None of
//! the combinators cancel or detach from inputs that are still pending once
//! the aggregate has settled.
use std::sync::{Arc, Mutex, PoisonError};

use crate::{AggregateError, Deferred, Promise, Resolution, Scheduler, Settled};

/// Per-index results collected until every input reported.
struct Slots<V> {
    values: Vec<Option<V>>,
    remaining: usize,
}

impl<V> Slots<V> {
    fn new(len: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Slots {
            values: (0..len).map(|_| None).collect(),
            remaining: len,
        }))
    }

    /// Stores `value` at `index`; yields every value once the last slot fills.
    fn fill(slots: &Mutex<Self>, index: usize, value: V) -> Option<Vec<V>> {
        let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.values[index].replace(value).is_none() {
            slots.remaining -= 1;
        }
        if slots.remaining > 0 {
            return None;
        }
        Some(std::mem::take(&mut slots.values).into_iter().flatten().collect())
    }
}

fn normalize<T, I>(scheduler: &Scheduler, inputs: I) -> Vec<Promise<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Resolution<T>>,
{
    inputs
        .into_iter()
        .map(|input| Promise::resolve_with(scheduler, input))
        .collect()
}

impl<T: Clone + Send + 'static> Promise<T> {
    /// Fulfills with every value, in input order, once all inputs fulfill.
    /// Rejects with the first rejection observed.
    ///
    /// An empty input fulfills immediately with an empty `Vec`.
    pub fn all<I>(scheduler: &Scheduler, inputs: I) -> Promise<Vec<T>>
    where
        I: IntoIterator<Item = Resolution<T>>,
    {
        let inputs = normalize(scheduler, inputs);
        let Deferred { promise, resolver } = Promise::deferred(scheduler);
        if inputs.is_empty() {
            resolver.fulfill(Vec::new());
            return promise;
        }
        let slots = Slots::new(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let (on_fulfilled, on_rejected) = (resolver.clone(), resolver.clone());
            let slots = slots.clone();
            input.shared().subscribe(
                move |value| {
                    if let Some(values) = Slots::fill(&slots, index, value) {
                        on_fulfilled.fulfill(values);
                    }
                },
                move |reason| on_rejected.reject(reason),
            );
        }
        promise
    }

    /// Settles like whichever input settles first.
    ///
    /// An empty input never settles.
    pub fn race<I>(scheduler: &Scheduler, inputs: I) -> Promise<T>
    where
        I: IntoIterator<Item = Resolution<T>>,
    {
        let Deferred { promise, resolver } = Promise::deferred(scheduler);
        for input in normalize(scheduler, inputs) {
            let (on_fulfilled, on_rejected) = (resolver.clone(), resolver.clone());
            input.shared().subscribe(
                move |value| on_fulfilled.fulfill(value),
                move |reason| on_rejected.reject(reason),
            );
        }
        promise
    }

    /// Fulfills with the outcome of every input, in input order, once all of
    /// them settled. Never rejects.
    pub fn all_settled<I>(scheduler: &Scheduler, inputs: I) -> Promise<Vec<Settled<T>>>
    where
        I: IntoIterator<Item = Resolution<T>>,
    {
        let inputs = normalize(scheduler, inputs);
        let Deferred { promise, resolver } = Promise::deferred(scheduler);
        if inputs.is_empty() {
            resolver.fulfill(Vec::new());
            return promise;
        }
        let slots = Slots::new(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let (fulfilled_slots, rejected_slots) = (slots.clone(), slots.clone());
            let (on_fulfilled, on_rejected) = (resolver.clone(), resolver.clone());
            input.shared().subscribe(
                move |value| {
                    let outcome = Settled::Fulfilled(value);
                    if let Some(outcomes) = Slots::fill(&fulfilled_slots, index, outcome) {
                        on_fulfilled.fulfill(outcomes);
                    }
                },
                move |reason| {
                    let outcome = Settled::Rejected(reason);
                    if let Some(outcomes) = Slots::fill(&rejected_slots, index, outcome) {
                        on_rejected.fulfill(outcomes);
                    }
                },
            );
        }
        promise
    }

    /// Fulfills with the first value any input fulfills with. Rejects with an
    /// [`AggregateError`] holding every reason, in input order, only when all
    /// inputs reject.
    ///
    /// An empty input never settles.
    pub fn any<I>(scheduler: &Scheduler, inputs: I) -> Promise<T>
    where
        I: IntoIterator<Item = Resolution<T>>,
    {
        let inputs = normalize(scheduler, inputs);
        let Deferred { promise, resolver } = Promise::deferred(scheduler);
        let slots = Slots::new(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let (on_fulfilled, on_rejected) = (resolver.clone(), resolver.clone());
            let slots = slots.clone();
            input.shared().subscribe(
                move |value| on_fulfilled.fulfill(value),
                move |reason| {
                    if let Some(reasons) = Slots::fill(&slots, index, reason) {
                        on_rejected.reject(AggregateError { reasons }.into());
                    }
                },
            );
        }
        promise
    }
}
