//! Transition history tracking.
//!
//! The machine records every completed transition in a bounded log so that
//! tooling (debug overlays, checkpoints) can see how it got where it is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of records a history keeps before dropping the oldest.
pub const DEFAULT_HISTORY_LIMIT: usize = 64;

/// How a transition was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionKind {
    /// First entry into the initial state on the first step
    Bootstrap,
    /// Plain transition, from `transition` or an `execute` result
    Direct,
    /// Transition that remembered the previous state on the stack
    Push,
    /// Return to the state on top of the stack
    Pop,
}

/// Record of a single completed transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state being left, `None` for the bootstrap entry
    pub from: Option<String>,
    /// The state entered
    pub to: String,
    /// How the transition was requested
    pub kind: TransitionKind,
    /// Stack depth once the transition completed
    pub depth: usize,
    /// When the transition completed
    pub timestamp: DateTime<Utc>,
}

/// Ordered, bounded history of transitions.
///
/// # Example
///
/// ```rust
/// use stagehand::core::{StateHistory, TransitionKind, TransitionRecord};
/// use chrono::Utc;
///
/// let mut history = StateHistory::with_limit(8);
/// history.record(TransitionRecord {
///     from: None,
///     to: "title".to_string(),
///     kind: TransitionKind::Bootstrap,
///     depth: 0,
///     timestamp: Utc::now(),
/// });
/// history.record(TransitionRecord {
///     from: Some("title".to_string()),
///     to: "room".to_string(),
///     kind: TransitionKind::Direct,
///     depth: 0,
///     timestamp: Utc::now(),
/// });
///
/// assert_eq!(history.get_path(), vec!["title", "room"]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateHistory {
    records: VecDeque<TransitionRecord>,
    limit: usize,
}

impl Default for StateHistory {
    fn default() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl StateHistory {
    /// Create an empty history with the default limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty history keeping at most `limit` records.
    ///
    /// A limit of zero disables recording.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: VecDeque::new(),
            limit,
        }
    }

    /// Append a record, dropping the oldest ones past the limit.
    pub fn record(&mut self, record: TransitionRecord) {
        if self.limit == 0 {
            return;
        }
        self.records.push_back(record);
        while self.records.len() > self.limit {
            self.records.pop_front();
        }
    }

    /// The states traversed, oldest first.
    ///
    /// Starts with the `from` of the oldest retained record (when there is
    /// one), followed by the `to` of every record.
    pub fn get_path(&self) -> Vec<&str> {
        let mut path = Vec::with_capacity(self.records.len() + 1);
        if let Some(from) = self.records.front().and_then(|r| r.from.as_deref()) {
            path.push(from);
        }
        path.extend(self.records.iter().map(|r| r.to.as_str()));
        path
    }

    /// Time between the oldest and newest retained records.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.front()?, self.records.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Copy of this history re-bounded to `limit`, keeping the newest records.
    pub fn rebound(&self, limit: usize) -> Self {
        let mut history = Self::with_limit(limit);
        for record in &self.records {
            history.record(record.clone());
        }
        history
    }
}
