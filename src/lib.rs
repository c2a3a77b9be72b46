//! Stagehand: a hierarchical, stack-based state machine for game loops
//!
//! Stagehand drives a set of named states sharing one context. Each frame,
//! the active state's `execute` runs and may hand control to another state,
//! push a state on top of itself, or pop back to whoever pushed it. Enter
//! and exit hooks are asynchronous, so a state can wait on a fade or a
//! dialog before the machine moves on.
//!
//! # Core Concepts
//!
//! - **State**: Lifecycle hooks via the [`State`] trait
//! - **Machine**: Registry, stack and per-frame [`step`](StateMachine::step)
//! - **Transitions**: Plain, push and pop moves with lifecycle callbacks
//! - **Checkpoints**: Serializable snapshots of where a machine stands
//!
//! # Example
//!
//! ```rust
//! use stagehand::{Next, State, StateMachine, Tick, TransitionOptions};
//! use std::cell::RefCell;
//!
//! #[derive(Default)]
//! struct Game {
//!     log: RefCell<Vec<String>>,
//! }
//!
//! struct Explore;
//! struct Inventory;
//!
//! impl State<Game> for Explore {
//!     fn execute(&mut self, game: &Game, _tick: Tick) -> Option<Next> {
//!         game.log.borrow_mut().push("explore".to_string());
//!         None
//!     }
//! }
//!
//! impl State<Game> for Inventory {
//!     fn execute(&mut self, game: &Game, _tick: Tick) -> Option<Next> {
//!         game.log.borrow_mut().push("inventory".to_string());
//!         Some(Next::Pop)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), stagehand::MachineError> {
//! let machine = StateMachine::new("explore", Game::default());
//! machine.add_state("explore", |_| Explore);
//! machine.add_state("inventory", |_| Inventory);
//!
//! machine.step(Tick::new(0.0, 16.0)).await?;
//! machine
//!     .push_transition("inventory", TransitionOptions::new())
//!     .await?;
//! assert_eq!(machine.stack(), vec!["explore".to_string()]);
//!
//! machine.step(Tick::new(16.0, 16.0)).await?;
//! assert_eq!(machine.current_key().as_deref(), Some("explore"));
//! assert_eq!(machine.stack_depth(), 0);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod checkpoint;
pub mod core;
pub mod machine;

// Re-export commonly used types
pub use builder::{BuildError, BuildViolation, StateMachineBuilder};
pub use checkpoint::{Checkpoint, CheckpointError};
pub use self::core::{EnterArgs, HookError, HookFuture, Next, State, Tick};
pub use machine::{
    ListenerId, MachineConfig, MachineError, MachineEvent, StackWait, StateHandle, StateMachine,
    TransitionOptions,
};
