//! Checkpoint and restore for state machines.
//!
//! A checkpoint records where a machine stands: the active state, the
//! stack of states waiting to be popped back to, and the transition
//! history. State instances and their private data are not captured; a
//! restored machine keeps the instances it was built with.

use crate::core::StateHistory;
use crate::machine::StateMachine;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::CheckpointError;

/// Format written by [`StateMachine::checkpoint`].
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable snapshot of a machine's position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format this snapshot was written with
    pub version: u32,

    /// Random v4 id, handy for naming save slots
    pub id: String,

    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,

    /// Key the machine bootstraps into
    pub initial_state: String,

    /// Active state, `None` if the machine had not stepped yet
    pub current_state: Option<String>,

    /// Stack contents, bottom first
    pub stack: Vec<String>,

    /// Recorded transitions
    pub history: StateHistory,
}

impl Checkpoint {
    /// Pretty-printed JSON, suitable for save files a person may read.
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    /// Decode JSON and reject foreign format versions.
    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Self = serde_json::from_str(json)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }

    /// Compact bincode encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    /// Decode bincode and reject foreign format versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let checkpoint: Self = bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }

    fn check_version(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Ok(())
    }
}

impl<C: 'static> StateMachine<C> {
    /// Capture the machine's current position.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            initial_state: self.initial_state().to_string(),
            current_state: self.current_key(),
            stack: self.stack(),
            history: self.history(),
        }
    }

    /// Move the machine to the position recorded in `checkpoint`.
    ///
    /// No hooks or lifecycle callbacks run. A restored state that has not
    /// been initialized yet gets `init` on its next entry through a
    /// transition. Pending `next_step` callbacks are kept.
    ///
    /// # Errors
    ///
    /// Leaves the machine untouched and returns:
    /// - [`CheckpointError::MachineBusy`] while a transition is in flight.
    /// - [`CheckpointError::UnsupportedVersion`] for a foreign format.
    /// - [`CheckpointError::ValidationFailed`] if the checkpoint was taken
    ///   from a machine with a different initial state.
    /// - [`CheckpointError::UnknownState`] if it names an unregistered key.
    pub fn restore(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if self.is_transitioning() {
            return Err(CheckpointError::MachineBusy);
        }
        checkpoint.check_version()?;
        if checkpoint.initial_state != self.initial_state() {
            return Err(CheckpointError::ValidationFailed(format!(
                "checkpoint starts in '{}' but this machine starts in '{}'",
                checkpoint.initial_state,
                self.initial_state()
            )));
        }
        if checkpoint.current_state.is_none() && !checkpoint.stack.is_empty() {
            return Err(CheckpointError::ValidationFailed(
                "stack is not empty but no state is active".to_string(),
            ));
        }
        for key in checkpoint.current_state.iter().chain(&checkpoint.stack) {
            if !self.contains_state(key) {
                return Err(CheckpointError::UnknownState(key.clone()));
            }
        }

        let inner = self.inner();
        *inner.current.borrow_mut() = checkpoint.current_state.clone();
        *inner.stack.borrow_mut() = checkpoint.stack.clone();
        *inner.history.borrow_mut() = checkpoint.history.rebound(inner.config.history_limit);

        debug!(
            target: "stagehand",
            "Restored checkpoint {} at '{}' (depth {})",
            checkpoint.id,
            checkpoint.current_state.as_deref().unwrap_or("<none>"),
            checkpoint.stack.len()
        );
        Ok(())
    }
}
