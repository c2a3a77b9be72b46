//! The runtime half of the crate: the stack-based machine and everything a
//! transition touches on its way through.
//!
//! A [`StateMachine`] owns a registry of [`RegisteredState`] slots, the
//! state stack, and an event bus. States talk back to it through the
//! [`StateHandle`] they receive at registration.

mod config;
mod error;
mod events;
mod handle;
mod options;
mod registry;
pub(crate) mod state_machine;

pub use config::MachineConfig;
pub use error::MachineError;
pub use events::{ListenerId, MachineEvent, StackWait};
pub use handle::StateHandle;
pub use options::TransitionOptions;
pub use registry::RegisteredState;
pub use state_machine::{StateFactory, StateMachine};
