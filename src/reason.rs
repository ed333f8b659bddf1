use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::{AggregateError, Error};

/// The opaque reason a promise was rejected with.
///
/// Any `Send + Sync + 'static` value can be a reason. Cloning a `Reason` is
/// cheap and keeps its identity, so the reason observed at the end of a chain
/// is the very one that was passed to `reject`.
///
/// ```
/// use promise_plus::Reason;
///
/// let reason = Reason::new("boom");
/// assert_eq!(reason.downcast_ref::<&str>(), Some(&"boom"));
/// assert!(Reason::ptr_eq(&reason, &reason.clone()));
/// ```
#[derive(Clone)]
pub struct Reason(Arc<dyn Any + Send + Sync>);

impl Reason {
    pub fn new<E: Any + Send + Sync>(reason: E) -> Self {
        Reason(Arc::new(reason))
    }

    pub fn is<E: Any>(&self) -> bool {
        self.0.is::<E>()
    }

    pub fn downcast_ref<E: Any>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// Whether both handles point at the same reason.
    pub fn ptr_eq(this: &Reason, other: &Reason) -> bool {
        Arc::ptr_eq(&this.0, &other.0)
    }
}

impl From<Error> for Reason {
    fn from(err: Error) -> Self {
        Reason::new(err)
    }
}

impl From<AggregateError> for Reason {
    fn from(err: AggregateError) -> Self {
        Reason::new(err)
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<&str>() {
            f.debug_tuple("Reason").field(s).finish()
        } else if let Some(s) = self.downcast_ref::<String>() {
            f.debug_tuple("Reason").field(s).finish()
        } else if let Some(err) = self.downcast_ref::<Error>() {
            f.debug_tuple("Reason").field(err).finish()
        } else if let Some(err) = self.downcast_ref::<AggregateError>() {
            f.debug_tuple("Reason").field(err).finish()
        } else {
            f.write_str("Reason(..)")
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<&str>() {
            f.write_str(s)
        } else if let Some(s) = self.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(err) = self.downcast_ref::<Error>() {
            fmt::Display::fmt(err, f)
        } else if let Some(err) = self.downcast_ref::<AggregateError>() {
            fmt::Display::fmt(err, f)
        } else {
            f.write_str("promise rejected")
        }
    }
}
