//! Registry slots for state instances.

use crate::core::State;
use crate::machine::error::MachineError;
use std::cell::{Cell, RefCell, RefMut};
use std::fmt;

/// A state instance registered under a key, with its one-time init flag.
///
/// Slots live as long as the machine (or until replaced by a later
/// registration under the same key).
pub struct RegisteredState<C: 'static> {
    key: String,
    initialized: Cell<bool>,
    behavior: RefCell<Box<dyn State<C>>>,
}

impl<C: 'static> RegisteredState<C> {
    pub(crate) fn new(key: String, behavior: Box<dyn State<C>>) -> Self {
        Self {
            key,
            initialized: Cell::new(false),
            behavior: RefCell::new(behavior),
        }
    }

    /// The key this state was registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether `init` has run for this instance.
    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    /// Whether one of this state's hooks is currently running.
    pub fn is_busy(&self) -> bool {
        self.behavior.try_borrow_mut().is_err()
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.set(true);
    }

    pub(crate) fn behavior_mut(&self) -> Result<RefMut<'_, Box<dyn State<C>>>, MachineError> {
        self.behavior
            .try_borrow_mut()
            .map_err(|_| MachineError::StateBusy(self.key.clone()))
    }
}

impl<C: 'static> fmt::Debug for RegisteredState<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredState")
            .field("key", &self.key)
            .field("initialized", &self.initialized.get())
            .finish()
    }
}
