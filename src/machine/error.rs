//! Errors raised by state machine operations.

use crate::core::HookError;
use thiserror::Error;

/// Errors that can occur while stepping or transitioning a machine.
///
/// `UnknownState` and `EmptyStack` indicate wiring mistakes in the states
/// themselves. `Hook` carries whatever a state's enter or exit hook failed
/// with; the caller decides whether that is fatal to the frame.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("State '{0}' is not registered")]
    UnknownState(String),

    #[error("Cannot pop: the state stack is empty")]
    EmptyStack,

    #[error("Cannot move to '{requested}': another transition is in flight")]
    TransitionInProgress { requested: String },

    #[error("Cannot push '{requested}': the machine has not entered a state yet")]
    NotStarted { requested: String },

    #[error("State '{0}' is busy running a hook")]
    StateBusy(String),

    #[error("Hook on state '{state}' failed: {source}")]
    Hook {
        state: String,
        #[source]
        source: HookError,
    },

    #[error("More than {limit} transitions chained in one step (stopped in '{state}')")]
    TransitionLimit { limit: usize, state: String },

    #[error("Wait for stack depth {depth} abandoned: the machine was dropped")]
    WaitAbandoned { depth: usize },

    #[error("The owning state machine has been dropped")]
    Detached,
}
