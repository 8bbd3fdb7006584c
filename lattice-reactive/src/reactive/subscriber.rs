//! Subscriptions for plain callbacks.
//!
//! Runners subscribe implicitly by reading. Plain callbacks subscribe
//! explicitly through `Signal::subscribe` or `State::subscribe` and get a
//! [`Subscription`] back.

use std::fmt;
use std::rc::Rc;

/// A plain change callback attached to one source.
pub(crate) type Callback = Rc<dyn Fn()>;

/// Handle returned by `subscribe`.
///
/// Call [`unsubscribe`](Subscription::unsubscribe) to stop receiving
/// notifications. Dropping the handle leaves the callback registered, so a
/// subscription can be fire-and-forget.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub(crate) fn inert() -> Self {
        Self { cancel: None }
    }

    /// Remove the callback. Calling this more than once does nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Whether the callback is still registered through this handle.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
