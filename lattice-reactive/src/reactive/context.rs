//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a source is read,
//! the runner on top of the stack is registered as a subscriber.
//!
//! # Implementation
//!
//! Each [`Runtime`] owns its own stack of frames. Running an effect or
//! computed pushes a frame for its runner; the frame is popped when the
//! guard is dropped. Nested computations (a computed read inside an effect)
//! push on top, so reads are always attributed to the innermost runner.
//!
//! An untracked frame (`None`) hides every runner below it.

use tracing::trace;

use super::runtime::Runtime;
use crate::graph::RunnerId;

/// Guard that pops the frame when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext<'rt> {
    runtime: &'rt Runtime,
    runner: Option<RunnerId>,
}

impl<'rt> ReactiveContext<'rt> {
    /// Enter a tracking frame for `runner`.
    ///
    /// While the frame is on top, every tracked read subscribes `runner`.
    pub fn enter(runtime: &'rt Runtime, runner: RunnerId) -> Self {
        Self::push(runtime, Some(runner))
    }

    /// Enter a frame in which reads are not tracked.
    pub fn untracked(runtime: &'rt Runtime) -> Self {
        Self::push(runtime, None)
    }

    fn push(runtime: &'rt Runtime, runner: Option<RunnerId>) -> Self {
        let depth = runtime.push_frame(runner);
        trace!(?runner, depth, "entered reactive context");
        Self { runtime, runner }
    }

    /// The runner this frame tracks for, if any.
    pub fn runner(&self) -> Option<RunnerId> {
        self.runner
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let popped = self.runtime.pop_frame();

        // Frames must unwind in the order they were entered.
        debug_assert_eq!(
            popped,
            Some(self.runner),
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            self.runner,
            popped
        );
    }
}
