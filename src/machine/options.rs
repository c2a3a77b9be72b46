//! Per-transition lifecycle callbacks and enter data.

use crate::core::EnterArgs;
use serde_json::Value;
use std::fmt;

type LifecycleCallback<C> = Box<dyn FnOnce(&C)>;

/// Options for a single transition.
///
/// The four callbacks run around the exit and enter hooks in this order:
/// `pre_exit`, exit hook, `post_exit`, (`init` on first entry), `pre_enter`,
/// enter hook, `post_enter`. The exit pair is skipped when there is no
/// current state. Enter args are handed to the entered state's
/// `handle_entered`.
///
/// # Example
///
/// ```rust
/// use stagehand::TransitionOptions;
/// use std::cell::Cell;
///
/// let options = TransitionOptions::<Cell<u32>>::new()
///     .pre_exit(|fades: &Cell<u32>| fades.set(fades.get() + 1))
///     .arg("door", "east");
///
/// assert_eq!(options.enter_args().get::<String>("door").unwrap().as_deref(), Some("east"));
/// ```
pub struct TransitionOptions<C> {
    pub(crate) pre_exit: Option<LifecycleCallback<C>>,
    pub(crate) post_exit: Option<LifecycleCallback<C>>,
    pub(crate) pre_enter: Option<LifecycleCallback<C>>,
    pub(crate) post_enter: Option<LifecycleCallback<C>>,
    pub(crate) args: EnterArgs,
}

impl<C> TransitionOptions<C> {
    /// Options with no callbacks and empty enter args.
    pub fn new() -> Self {
        Self {
            pre_exit: None,
            post_exit: None,
            pre_enter: None,
            post_enter: None,
            args: EnterArgs::new(),
        }
    }

    /// Run before the current state's exit hook.
    pub fn pre_exit<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&C) + 'static,
    {
        self.pre_exit = Some(Box::new(callback));
        self
    }

    /// Run after the current state's exit hook completes.
    pub fn post_exit<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&C) + 'static,
    {
        self.post_exit = Some(Box::new(callback));
        self
    }

    /// Run before the new state's enter hook.
    pub fn pre_enter<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&C) + 'static,
    {
        self.pre_enter = Some(Box::new(callback));
        self
    }

    /// Run after the new state's enter hook completes.
    pub fn post_enter<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&C) + 'static,
    {
        self.post_enter = Some(Box::new(callback));
        self
    }

    /// Replace the enter args wholesale.
    pub fn args(mut self, args: EnterArgs) -> Self {
        self.args = args;
        self
    }

    /// Add one enter arg.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args = self.args.with(key, value);
        self
    }

    pub fn enter_args(&self) -> &EnterArgs {
        &self.args
    }
}

impl<C> Default for TransitionOptions<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> From<EnterArgs> for TransitionOptions<C> {
    fn from(args: EnterArgs) -> Self {
        Self::new().args(args)
    }
}

impl<C> fmt::Debug for TransitionOptions<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionOptions")
            .field("pre_exit", &self.pre_exit.is_some())
            .field("post_exit", &self.post_exit.is_some())
            .field("pre_enter", &self.pre_enter.is_some())
            .field("post_enter", &self.post_enter.is_some())
            .field("args", &self.args)
            .finish()
    }
}
