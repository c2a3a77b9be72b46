//! Builder for constructing state machines.

use crate::builder::error::{BuildError, BuildViolation};
use crate::core::State;
use crate::machine::{MachineConfig, StateFactory, StateHandle, StateMachine};
use std::collections::HashSet;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<BuildViolation>>;

/// Builder for constructing state machines with a fluent API.
///
/// Unlike [`StateMachine::new`], the builder checks the definition before
/// handing out a machine and reports every problem it finds at once.
///
/// # Example
///
/// ```rust
/// use stagehand::{BuildViolation, State, StateMachine};
///
/// struct Title;
/// impl State<()> for Title {}
///
/// let machine = StateMachine::builder(())
///     .initial("title")
///     .state("title", |_| Title)
///     .build()
///     .unwrap();
/// assert!(machine.contains_state("title"));
///
/// let error = StateMachine::<()>::builder(())
///     .initial("missing")
///     .state("", |_| Title)
///     .build()
///     .unwrap_err();
/// assert!(error.contains(&BuildViolation::EmptyStateKey));
/// assert!(error.contains(&BuildViolation::UnregisteredInitialState("missing".into())));
/// ```
pub struct StateMachineBuilder<C: 'static> {
    context: C,
    initial: Option<String>,
    config: MachineConfig,
    states: Vec<(String, StateFactory<C>)>,
}

impl<C: 'static> StateMachineBuilder<C> {
    /// Create a new builder around the shared context.
    pub fn new(context: C) -> Self {
        Self {
            context,
            initial: None,
            config: MachineConfig::default(),
            states: Vec::new(),
        }
    }

    /// Set the initial state (required).
    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.initial = Some(key.into());
        self
    }

    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a state built by `factory` once the machine exists.
    pub fn state<S, F>(mut self, key: impl Into<String>, factory: F) -> Self
    where
        F: FnOnce(StateHandle<C>) -> S + 'static,
        S: State<C> + 'static,
    {
        let factory: StateFactory<C> = Box::new(move |handle| Box::new(factory(handle)));
        self.states.push((key.into(), factory));
        self
    }

    /// Add several boxed factories at once.
    pub fn states<K, I>(mut self, states: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, StateFactory<C>)>,
    {
        self.states
            .extend(states.into_iter().map(|(key, factory)| (key.into(), factory)));
        self
    }

    /// Build the state machine.
    ///
    /// Returns every violation in the definition if it is not valid.
    pub fn build(self) -> Result<StateMachine<C>, BuildError> {
        match self.validate() {
            Validation::Success(()) => {}
            Validation::Failure(violations) => return Err(BuildError::new(violations)),
        }

        let Self {
            context,
            initial,
            config,
            states,
        } = self;
        let initial = initial.unwrap_or_default();
        let machine = StateMachine::with_config(initial, context, config);
        machine.add_states(states);
        Ok(machine)
    }

    fn validate(&self) -> Check {
        let keys: Vec<&str> = self.states.iter().map(|(key, _)| key.as_str()).collect();
        let checks = vec![
            check_initial(self.initial.as_deref(), &keys),
            check_not_empty(&keys),
            check_keys(&keys),
        ];
        Validation::all_vec(checks).map(|_| ())
    }
}

fn check_initial(initial: Option<&str>, keys: &[&str]) -> Check {
    match initial {
        None => Validation::fail(BuildViolation::MissingInitialState),
        Some(initial) if !keys.contains(&initial) => {
            Validation::fail(BuildViolation::UnregisteredInitialState(initial.to_string()))
        }
        Some(_) => Validation::success(()),
    }
}

fn check_not_empty(keys: &[&str]) -> Check {
    if keys.is_empty() {
        Validation::fail(BuildViolation::NoStates)
    } else {
        Validation::success(())
    }
}

fn check_keys(keys: &[&str]) -> Check {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    if keys.iter().any(|key| key.is_empty()) {
        violations.push(BuildViolation::EmptyStateKey);
    }
    for key in keys.iter().filter(|key| !key.is_empty()) {
        if !seen.insert(*key) && reported.insert(*key) {
            violations.push(BuildViolation::DuplicateState(key.to_string()));
        }
    }

    match NonEmptyVec::from_vec(violations) {
        Some(violations) => Validation::failure(violations),
        None => Validation::success(()),
    }
}
