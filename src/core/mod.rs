//! Core state types.
//!
//! This module holds the vocabulary shared by every machine:
//! - The `State` trait with default no-op lifecycle hooks
//! - `Next` directives returned from `execute`
//! - `Tick` step arguments and `EnterArgs` transition data
//! - Bounded transition history

mod args;
mod history;
mod state;

pub use args::EnterArgs;
pub use history::{StateHistory, TransitionKind, TransitionRecord, DEFAULT_HISTORY_LIMIT};
pub use state::{done, HookError, HookFuture, Next, State, Tick};
