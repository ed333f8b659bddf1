//! Promise/A+ style promises.
//!
//! A [`Promise`] starts pending and settles exactly once, either fulfilled
//! with a value or rejected with a [`Reason`]. Reactions attached with
//! [`Promise::then`] run later, from a [`Scheduler`], in attachment order,
//! and each of them drives a new derived promise. Values returned from
//! reactions are unwrapped through [`Resolution`]: promises and foreign
//! [`Thenable`]s are adopted, self-resolution is rejected with
//! [`Error::ChainCycle`].
//!
//! ```
//! use promise_plus::{MicrotaskQueue, Promise, Resolution};
//!
//! let queue = MicrotaskQueue::new();
//! let scheduler = queue.scheduler();
//! let all = Promise::all(
//!     &scheduler,
//!     vec![
//!         Resolution::Value(1),
//!         Resolution::Promise(Promise::resolved(&scheduler, 2)),
//!     ],
//! );
//! queue.run_until_stalled();
//! assert_eq!(all.outcome().and_then(|o| o.value()), Some(vec![1, 2]));
//! ```
mod combinators;
mod error;
mod promise;
mod reason;
mod resolution;
pub mod scheduler;
mod waiter;

pub use error::{AggregateError, Error};
pub use promise::{Deferred, Promise, PromiseState, Resolver, Settled};
pub use reason::Reason;
pub use resolution::{RejectHandle, ResolveHandle, Resolution, Thenable};
pub use scheduler::{MicrotaskQueue, QueueConfig, Schedule, Scheduler, Task};
pub use waiter::Waiter;
