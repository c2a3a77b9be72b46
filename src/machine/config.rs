//! Machine configuration.

use crate::core::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};

/// Tunables for a [`StateMachine`](crate::StateMachine).
///
/// Deserializes from partial documents; missing fields take their defaults.
///
/// ```rust
/// use stagehand::MachineConfig;
///
/// let config: MachineConfig = serde_json::from_str(r#"{ "history_limit": 8 }"#).unwrap();
/// assert_eq!(config.history_limit, 8);
/// assert_eq!(config.max_chained_transitions, None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// How many transition records the machine keeps
    pub history_limit: usize,

    /// Upper bound on transitions chained inside a single step.
    ///
    /// `None` leaves cycles between states that always transition to each
    /// other to the caller.
    pub max_chained_transitions: Option<usize>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_chained_transitions: None,
        }
    }
}

impl MachineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of retained transition records.
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Bound the transitions chained within one step.
    pub fn max_chained_transitions(mut self, limit: usize) -> Self {
        self.max_chained_transitions = Some(limit);
        self
    }
}
