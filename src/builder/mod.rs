//! Builder API for validated state machine construction.
//!
//! The builder collects the initial state, configuration and state
//! factories, then checks the whole definition with stillwater's
//! `Validation` so that every mistake is reported in one pass.

pub mod error;
pub mod machine;

pub use error::{BuildError, BuildViolation};
pub use machine::StateMachineBuilder;
