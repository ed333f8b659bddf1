use thiserror::Error;

use crate::Reason;

/// Failures raised by the crate itself. They never surface as a returned
/// `Err` from the promise API; they travel as the [`Reason`] of a rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A handler resolved its derived promise with that same promise.
    #[error("chaining cycle detected for promise")]
    ChainCycle,
    /// A producer, handler or foreign `then` panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),
    /// The outcome could not be delivered to a waiter.
    #[error("promise was dropped before it settled")]
    Dropped,
}

/// Rejection reason of [`Promise::any`](crate::Promise::any) when every input
/// rejected. `reasons[i]` is the reason of input `i`.
#[derive(Error, Debug, Clone)]
#[error("all promises were rejected")]
pub struct AggregateError {
    pub reasons: Vec<Reason>,
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
