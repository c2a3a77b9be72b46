//! Errors from saving, loading and restoring machine positions.

use thiserror::Error;

/// Why a checkpoint could not be encoded, decoded or restored.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The position could not be encoded
    #[error("Could not encode checkpoint: {0}")]
    SerializationFailed(String),

    /// The bytes or text are not a checkpoint
    #[error("Could not decode checkpoint: {0}")]
    DeserializationFailed(String),

    /// Written by a different checkpoint format
    #[error("Checkpoint format {found} is not readable (expected {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The checkpoint names a state the machine does not have
    #[error("Checkpoint refers to unregistered state '{0}'")]
    UnknownState(String),

    /// The saved position does not fit the machine it is restored into
    #[error("Checkpoint does not match this machine: {0}")]
    ValidationFailed(String),

    /// Restoring mid-transition would tear the hooks' view of the machine
    #[error("Cannot restore while a transition is in flight")]
    MachineBusy,
}
