use crate::element::HookError;
use std::fmt;

/// Where a dispatched error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A component constructor failed.
    Constructor,
    /// A render call failed.
    Render,
    /// A `set_state` updater closure failed.
    StateCallback,
    /// An asynchronous state value resolved to an error.
    AsyncState,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Constructor => "constructor",
            Phase::Render => "render",
            Phase::StateCallback => "state callback",
            Phase::AsyncState => "async state",
        })
    }
}

/// Errors surfaced to the ambient caller by [`Runtime`](crate::Runtime)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A hook failed and no ancestor boundary handled it. The core has no
    /// default presentation; recovery is the caller's responsibility.
    #[error("uncaught {phase} error in <{component}>: {source}")]
    Uncaught {
        phase: Phase,
        component: String,
        source: HookError,
    },
}
