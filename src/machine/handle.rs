//! Handle injected into each state at registration.

use crate::core::Tick;
use crate::machine::error::MachineError;
use crate::machine::events::StackWait;
use crate::machine::state_machine::{Inner, StateMachine};
use crate::machine::options::TransitionOptions;
use std::fmt;
use std::rc::Weak;

/// A state's view of the machine that owns it.
///
/// Every state factory receives one of these. It holds a weak reference,
/// so a state storing its handle never keeps the machine alive; once the
/// machine is dropped, the forwarding methods fail with
/// [`MachineError::Detached`].
///
/// A state cannot transition the machine from inside its own hooks or
/// `execute` (the machine is mid-step or mid-transition there). Use the
/// [`Next`](crate::Next) result of `execute` for that, and these methods
/// from tasks the state hands its handle to.
pub struct StateHandle<C: 'static> {
    machine: Weak<Inner<C>>,
    key: String,
}

impl<C: 'static> StateHandle<C> {
    pub(crate) fn new(machine: Weak<Inner<C>>, key: String) -> Self {
        Self { machine, key }
    }

    /// The key this state is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The owning machine, if it is still alive.
    pub fn machine(&self) -> Option<StateMachine<C>> {
        self.machine.upgrade().map(StateMachine::from_inner)
    }

    /// Whether the owning machine is currently in this state.
    pub fn is_current(&self) -> bool {
        self.machine()
            .and_then(|machine| machine.current_key())
            .is_some_and(|current| current == self.key)
    }

    /// Queue a callback for the start of the next step.
    pub fn next_step<F>(&self, callback: F) -> Result<(), MachineError>
    where
        F: FnOnce(&C, Tick) + 'static,
    {
        self.attached()?.next_step(callback);
        Ok(())
    }

    /// See [`StateMachine::transition`].
    pub async fn transition(
        &self,
        key: impl Into<String>,
        options: TransitionOptions<C>,
    ) -> Result<(), MachineError> {
        self.attached()?.transition(key, options).await
    }

    /// See [`StateMachine::push_transition`].
    pub async fn push_transition(
        &self,
        key: impl Into<String>,
        options: TransitionOptions<C>,
    ) -> Result<(), MachineError> {
        self.attached()?.push_transition(key, options).await
    }

    /// See [`StateMachine::pop_transition`].
    pub async fn pop_transition(&self) -> Result<(), MachineError> {
        self.attached()?.pop_transition().await
    }

    /// See [`StateMachine::push_and_wait`].
    pub async fn push_and_wait(
        &self,
        key: impl Into<String>,
        options: TransitionOptions<C>,
    ) -> Result<StackWait, MachineError> {
        self.attached()?.push_and_wait(key, options).await
    }

    fn attached(&self) -> Result<StateMachine<C>, MachineError> {
        self.machine().ok_or(MachineError::Detached)
    }
}

impl<C: 'static> Clone for StateHandle<C> {
    fn clone(&self) -> Self {
        Self {
            machine: Weak::clone(&self.machine),
            key: self.key.clone(),
        }
    }
}

impl<C: 'static> fmt::Debug for StateHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandle")
            .field("key", &self.key)
            .field("attached", &(self.machine.strong_count() > 0))
            .finish()
    }
}
