//! The `State` capability trait and the values that flow through it.
//!
//! Every hook has a default no-op implementation, so a state only
//! overrides the behaviors it actually needs.

use super::args::EnterArgs;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Error produced by a suspending hook.
///
/// Anything implementing `std::error::Error` converts into it with `?`,
/// as do `&str` and `String`.
pub type HookError = Box<dyn std::error::Error + 'static>;

/// Future returned by [`State::handle_entered`] and [`State::handle_exited`].
///
/// Hooks run on a single logical thread, so the future does not need to
/// be `Send`.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HookError>> + 'a>>;

/// A hook future that completes immediately.
///
/// Useful for hooks that only do synchronous work:
///
/// ```rust
/// use stagehand::core::{done, EnterArgs, HookFuture, State};
/// use std::cell::Cell;
///
/// struct Counter;
///
/// impl State<Cell<u32>> for Counter {
///     fn handle_entered<'a>(&'a mut self, entries: &'a Cell<u32>, _args: &'a EnterArgs) -> HookFuture<'a> {
///         entries.set(entries.get() + 1);
///         done()
///     }
/// }
/// ```
pub fn done<'a>() -> HookFuture<'a> {
    Box::pin(std::future::ready(Ok(())))
}

/// Opaque per-frame values forwarded from the host's tick to `execute`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Host time at the start of the frame
    pub time: f64,
    /// Time elapsed since the previous frame
    pub delta: f64,
}

impl Tick {
    pub fn new(time: f64, delta: f64) -> Self {
        Self { time, delta }
    }
}

/// What a state asks the machine to do after `execute`.
///
/// Plain state names convert into [`Next::Transition`], so the common case
/// reads `Some("walking".into())`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Next {
    /// Leave the current state and enter the named one
    Transition(String),

    /// Remember the current state on the stack, then enter the named one
    Push(String),

    /// Return to the state on top of the stack
    Pop,
}

impl Next {
    /// Shorthand for [`Next::Transition`].
    pub fn to(key: impl Into<String>) -> Self {
        Self::Transition(key.into())
    }

    /// Shorthand for [`Next::Push`].
    pub fn push(key: impl Into<String>) -> Self {
        Self::Push(key.into())
    }

    /// The state this directive names, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Transition(key) | Self::Push(key) => Some(key),
            Self::Pop => None,
        }
    }
}

impl From<&str> for Next {
    fn from(key: &str) -> Self {
        Self::Transition(key.to_string())
    }
}

impl From<String> for Next {
    fn from(key: String) -> Self {
        Self::Transition(key)
    }
}

/// A named behavior unit driven by a [`StateMachine`](crate::StateMachine).
///
/// `C` is the context shared by every state of one machine. It is handed to
/// each hook by reference; collaborators that need mutation (a scene, an
/// entity) carry their own interior mutability.
///
/// # Lifecycle
///
/// - `init` runs once, the first time the state becomes active.
/// - `handle_entered` runs on every activation, after `init` on the first.
/// - `execute` runs once per step while the state is active.
/// - `handle_exited` runs when the machine leaves the state.
///
/// # Example
///
/// ```rust
/// use stagehand::core::{Next, State, Tick};
///
/// struct Player {
///     grounded: bool,
/// }
///
/// struct Falling;
///
/// impl State<std::cell::RefCell<Player>> for Falling {
///     fn execute(&mut self, player: &std::cell::RefCell<Player>, _tick: Tick) -> Option<Next> {
///         player.borrow().grounded.then(|| "idle".into())
///     }
/// }
/// ```
pub trait State<C> {
    /// One-time setup, before the first `handle_entered`.
    fn init(&mut self, _context: &C) {}

    /// Called every time the state becomes active.
    ///
    /// `args` carries the per-transition data supplied through
    /// [`TransitionOptions`](crate::TransitionOptions).
    fn handle_entered<'a>(&'a mut self, _context: &'a C, _args: &'a EnterArgs) -> HookFuture<'a> {
        done()
    }

    /// Called when the machine leaves this state.
    fn handle_exited<'a>(&'a mut self, _context: &'a C) -> HookFuture<'a> {
        done()
    }

    /// Called once per step while the state is active.
    ///
    /// Returning `None` keeps the machine in this state. Returning a
    /// directive makes the machine act on it within the same step.
    fn execute(&mut self, _context: &C, _tick: Tick) -> Option<Next> {
        None
    }
}
