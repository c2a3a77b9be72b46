//! Build errors for the state machine builder.

use stillwater::NonEmptyVec;
use thiserror::Error;

/// A single problem found in a machine definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildViolation {
    #[error("Initial state not specified. Call .initial(key) before .build()")]
    MissingInitialState,

    #[error("No states defined. Add at least one state")]
    NoStates,

    #[error("A state was registered with an empty key")]
    EmptyStateKey,

    #[error("State '{0}' is registered more than once")]
    DuplicateState(String),

    #[error("Initial state '{0}' is not registered")]
    UnregisteredInitialState(String),
}

/// Every violation found while building a machine.
///
/// The builder reports all problems at once rather than stopping at the
/// first.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildError {
    violations: NonEmptyVec<BuildViolation>,
}

impl BuildError {
    pub(crate) fn new(violations: NonEmptyVec<BuildViolation>) -> Self {
        Self { violations }
    }

    pub fn violations(&self) -> &NonEmptyVec<BuildViolation> {
        &self.violations
    }

    pub fn contains(&self, violation: &BuildViolation) -> bool {
        self.violations.iter().any(|found| found == violation)
    }

    pub fn into_violations(self) -> Vec<BuildViolation> {
        self.violations.into_vec()
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid state machine definition: ")?;
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildError {}
