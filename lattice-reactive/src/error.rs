//! Error types for the reactive core.
//!
//! Two kinds of failure exist:
//!
//! - [`ReactiveError`] is returned synchronously for invalid arguments
//!   (a non-object record, a reserved key, a malformed config).
//! - [`ReportedError`] describes a failure inside user code (an effect body,
//!   a computed body, a cleanup, a subscriber callback). These are never
//!   propagated to the caller that triggered them; the runtime logs and queues
//!   them, see [`Runtime::take_errors`](crate::Runtime::take_errors).

use std::any::Any;
use std::fmt;

use thiserror::Error;

use crate::graph::RunnerId;

/// Errors returned directly to the caller of a reactive operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A reactive state record must be built from a keyed object.
    #[error("reactive state requires an object, found {found}")]
    NotAnObject { found: String },

    /// The key is reserved for the state's own accessors.
    #[error("`{0}` is a reserved state key")]
    ReservedKey(String),

    /// A computed body failed and no previous value is cached.
    #[error("computed {runner:?} failed: {message}")]
    ComputationFailed { runner: RunnerId, message: String },

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime config: {0}")]
    InvalidConfig(String),
}

/// Where a reported failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The body of an effect.
    Effect,
    /// The compute function of a computed.
    Computed,
    /// A cleanup returned by a previous effect or computed run.
    Cleanup,
    /// A plain callback registered with `Signal::subscribe`.
    Subscriber,
    /// A global listener registered with `State::subscribe`.
    StateListener,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::Effect => "effect",
            Origin::Computed => "computed",
            Origin::Cleanup => "cleanup",
            Origin::Subscriber => "subscriber",
            Origin::StateListener => "state listener",
        };
        f.write_str(name)
    }
}

/// A failure caught inside user code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{origin} failed: {message}")]
pub struct ReportedError {
    /// The kind of callback that failed.
    pub origin: Origin,
    /// The runner the failure belongs to, if any.
    pub runner: Option<RunnerId>,
    /// Panic payload or error message.
    pub message: String,
}

impl ReportedError {
    pub(crate) fn new(origin: Origin, runner: Option<RunnerId>, message: impl Into<String>) -> Self {
        Self {
            origin,
            runner,
            message: message.into(),
        }
    }

    /// Build a report from a payload caught by `catch_unwind`.
    pub(crate) fn from_panic(
        origin: Origin,
        runner: Option<RunnerId>,
        payload: Box<dyn Any + Send>,
    ) -> Self {
        Self::new(origin, runner, panic_message(payload.as_ref()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let report = ReportedError::from_panic(Origin::Effect, None, Box::new("boom"));
        assert_eq!(report.message, "boom");

        let report =
            ReportedError::from_panic(Origin::Cleanup, None, Box::new(String::from("owned")));
        assert_eq!(report.message, "owned");

        let report = ReportedError::from_panic(Origin::Subscriber, None, Box::new(17_u8));
        assert_eq!(report.message, "unknown panic payload");
    }

    #[test]
    fn reported_error_display() {
        let report = ReportedError::new(Origin::StateListener, None, "bad key");
        assert_eq!(report.to_string(), "state listener failed: bad key");
    }
}
