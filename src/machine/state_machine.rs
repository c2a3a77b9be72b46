//! The state machine: registry, per-frame step, and the transition protocol.

use crate::builder::StateMachineBuilder;
use crate::core::{Next, State, StateHistory, Tick, TransitionKind, TransitionRecord};
use crate::machine::config::MachineConfig;
use crate::machine::error::MachineError;
use crate::machine::events::{EventBus, ListenerId, MachineEvent, StackWait};
use crate::machine::handle::StateHandle;
use crate::machine::options::TransitionOptions;
use crate::machine::registry::RegisteredState;
use chrono::Utc;
use log::{debug, trace, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tokio::sync::oneshot;

/// Builds a state given the handle to its owning machine.
pub type StateFactory<C> = Box<dyn FnOnce(StateHandle<C>) -> Box<dyn State<C>>>;

type DeferredCallback<C> = Box<dyn FnOnce(&C, Tick)>;

pub(crate) struct Inner<C: 'static> {
    pub(crate) context: C,
    pub(crate) config: MachineConfig,
    pub(crate) initial_state: String,
    pub(crate) states: RefCell<HashMap<String, Rc<RegisteredState<C>>>>,
    pub(crate) current: RefCell<Option<String>>,
    pub(crate) stack: RefCell<Vec<String>>,
    pub(crate) transitioning: Cell<bool>,
    pub(crate) history: RefCell<StateHistory>,
    next_step_callbacks: RefCell<Vec<DeferredCallback<C>>>,
    events: Rc<EventBus>,
}

/// Clears the in-flight flag even if a transition future is dropped early.
struct TransitionGuard<'a>(&'a Cell<bool>);

impl<'a> TransitionGuard<'a> {
    fn engage(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

enum StackUndo {
    /// Drop the pushed key unless the machine left `from`.
    Push { from: String },
    /// Put the popped key back unless the machine reached `to`.
    Pop { to: String },
}

/// Keeps the stack in step with the machine when a push or pop fails or
/// its future is dropped before the transition completes.
struct StackGuard<'a> {
    current: &'a RefCell<Option<String>>,
    stack: &'a RefCell<Vec<String>>,
    undo: Option<StackUndo>,
}

impl<'a> StackGuard<'a> {
    fn push<C: 'static>(inner: &'a Inner<C>, from: String) -> Self {
        inner.stack.borrow_mut().push(from.clone());
        Self {
            current: &inner.current,
            stack: &inner.stack,
            undo: Some(StackUndo::Push { from }),
        }
    }

    fn pop<C: 'static>(inner: &'a Inner<C>) -> Option<(Self, String)> {
        let to = inner.stack.borrow_mut().pop()?;
        let guard = Self {
            current: &inner.current,
            stack: &inner.stack,
            undo: Some(StackUndo::Pop { to: to.clone() }),
        };
        Some((guard, to))
    }

    fn disarm(mut self) {
        self.undo = None;
    }
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        let current = self.current.borrow();
        match self.undo.take() {
            Some(StackUndo::Push { from }) if current.as_deref() == Some(from.as_str()) => {
                self.stack.borrow_mut().pop();
            }
            Some(StackUndo::Pop { to }) if current.as_deref() != Some(to.as_str()) => {
                self.stack.borrow_mut().push(to);
            }
            _ => {}
        }
    }
}

/// A stack-based state machine over named states sharing a context `C`.
///
/// The machine is a cheap handle: clones share the same states, stack and
/// context. All operations run on one logical thread; hooks may suspend,
/// so stepping and transitioning are `async` and can be driven by any
/// single-threaded executor.
///
/// Nothing runs at construction. The first [`step`](Self::step) enters the
/// initial state.
///
/// # Example
///
/// ```rust
/// use stagehand::{Next, State, StateMachine, Tick};
/// use std::cell::Cell;
///
/// struct Idle;
/// struct Walking;
///
/// impl State<Cell<u32>> for Idle {
///     fn execute(&mut self, frames: &Cell<u32>, _tick: Tick) -> Option<Next> {
///         frames.set(frames.get() + 1);
///         (frames.get() > 1).then(|| "walking".into())
///     }
/// }
///
/// impl State<Cell<u32>> for Walking {}
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), stagehand::MachineError> {
/// let machine = StateMachine::new("idle", Cell::new(0u32));
/// machine.add_state("idle", |_| Idle);
/// machine.add_state("walking", |_| Walking);
///
/// machine.step(Tick::new(0.0, 16.0)).await?;
/// assert_eq!(machine.current_key().as_deref(), Some("idle"));
///
/// machine.step(Tick::new(16.0, 16.0)).await?;
/// assert_eq!(machine.current_key().as_deref(), Some("walking"));
/// # Ok(())
/// # }
/// ```
pub struct StateMachine<C: 'static> {
    inner: Rc<Inner<C>>,
}

impl<C: 'static> Clone for StateMachine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<C: 'static> StateMachine<C> {
    //--- Construction -----------------------------------------------------

    /// Create a machine that will enter `initial_state` on its first step.
    pub fn new(initial_state: impl Into<String>, context: C) -> Self {
        Self::with_config(initial_state, context, MachineConfig::default())
    }

    /// Create a machine with explicit configuration.
    pub fn with_config(initial_state: impl Into<String>, context: C, config: MachineConfig) -> Self {
        let history = StateHistory::with_limit(config.history_limit);
        Self {
            inner: Rc::new(Inner {
                context,
                config,
                initial_state: initial_state.into(),
                states: RefCell::new(HashMap::new()),
                current: RefCell::new(None),
                stack: RefCell::new(Vec::new()),
                transitioning: Cell::new(false),
                history: RefCell::new(history),
                next_step_callbacks: RefCell::new(Vec::new()),
                events: Rc::new(EventBus::new()),
            }),
        }
    }

    /// Start a validated builder.
    pub fn builder(context: C) -> StateMachineBuilder<C> {
        StateMachineBuilder::new(context)
    }

    pub(crate) fn from_inner(inner: Rc<Inner<C>>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner<C>> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn inner(&self) -> &Inner<C> {
        &self.inner
    }

    //--- Registration -----------------------------------------------------

    /// Register a state under `key`.
    ///
    /// The factory receives the handle the state should keep if it wants to
    /// reach its machine later. Registering an existing key replaces the
    /// previous instance.
    pub fn add_state<S, F>(&self, key: impl Into<String>, factory: F)
    where
        F: FnOnce(StateHandle<C>) -> S,
        S: State<C> + 'static,
    {
        let key = key.into();
        let state = factory(StateHandle::new(self.downgrade(), key.clone()));
        self.register(key, Box::new(state));
    }

    /// Register several boxed factories at once.
    pub fn add_states<K, I>(&self, states: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, StateFactory<C>)>,
    {
        for (key, factory) in states {
            let key = key.into();
            let state = factory(StateHandle::new(self.downgrade(), key.clone()));
            self.register(key, state);
        }
    }

    fn register(&self, key: String, state: Box<dyn State<C>>) {
        let slot = Rc::new(RegisteredState::new(key.clone(), state));
        let replaced = self.inner.states.borrow_mut().insert(key.clone(), slot);
        if replaced.is_some() {
            warn!(target: "stagehand", "State '{}' was already registered and has been replaced", key);
        } else {
            trace!(target: "stagehand", "Registered state '{}'", key);
        }
    }

    //--- Inspection -------------------------------------------------------

    /// The shared context handed to every state.
    pub fn context(&self) -> &C {
        &self.inner.context
    }

    pub fn config(&self) -> &MachineConfig {
        &self.inner.config
    }

    pub fn initial_state(&self) -> &str {
        &self.inner.initial_state
    }

    /// Key of the active state, `None` before the first step.
    pub fn current_key(&self) -> Option<String> {
        self.inner.current.borrow().clone()
    }

    /// The active state's registry slot, `None` before the first step.
    pub fn current_state(&self) -> Option<Rc<RegisteredState<C>>> {
        let key = self.current_key()?;
        self.state(&key)
    }

    pub fn state(&self, key: &str) -> Option<Rc<RegisteredState<C>>> {
        self.inner.states.borrow().get(key).cloned()
    }

    pub fn contains_state(&self, key: &str) -> bool {
        self.inner.states.borrow().contains_key(key)
    }

    /// Registered keys in sorted order.
    pub fn state_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.states.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remembered states, bottom of the stack first.
    pub fn stack(&self) -> Vec<String> {
        self.inner.stack.borrow().clone()
    }

    pub fn stack_depth(&self) -> usize {
        self.inner.stack.borrow().len()
    }

    /// Whether a transition's hooks are still running.
    pub fn is_transitioning(&self) -> bool {
        self.inner.transitioning.get()
    }

    /// Snapshot of the recorded transitions.
    pub fn history(&self) -> StateHistory {
        self.inner.history.borrow().clone()
    }

    /// Number of registered event listeners, including pending stack waits.
    pub fn listener_count(&self) -> usize {
        self.inner.events.len()
    }

    /// Number of callbacks waiting for the next step.
    pub fn pending_callbacks(&self) -> usize {
        self.inner.next_step_callbacks.borrow().len()
    }

    //--- Notifications ----------------------------------------------------

    /// Subscribe to machine events.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&MachineEvent) + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Deliver an event to every listener.
    pub fn emit(&self, event: &MachineEvent) {
        self.inner.events.emit(event);
    }

    //--- Update Loop ------------------------------------------------------

    /// Queue a callback to run at the start of the next step.
    ///
    /// Callbacks queued while the queue is being drained wait for the step
    /// after.
    pub fn next_step<F>(&self, callback: F)
    where
        F: FnOnce(&C, Tick) + 'static,
    {
        self.inner
            .next_step_callbacks
            .borrow_mut()
            .push(Box::new(callback));
    }

    /// Advance the machine by one frame.
    ///
    /// 1. On the first call, enters the initial state (`init`, then
    ///    `handle_entered`).
    /// 2. Runs callbacks queued with [`next_step`](Self::next_step), in order.
    /// 3. Calls `execute` on the active state and acts on its result,
    ///    repeating with the new state until one returns `None`.
    ///
    /// The loop in step 3 stops early while another transition is in flight.
    /// States that always hand control to each other loop forever unless
    /// [`MachineConfig::max_chained_transitions`] is set.
    pub async fn step(&self, tick: Tick) -> Result<(), MachineError> {
        trace!(target: "stagehand", "Step at {} (delta {})", tick.time, tick.delta);

        let needs_bootstrap = self.inner.current.borrow().is_none();
        if needs_bootstrap && !self.is_transitioning() {
            let initial = self.inner.initial_state.clone();
            debug!(target: "stagehand", "Bootstrapping into '{}'", initial);
            self.run_transition(initial, TransitionOptions::new(), TransitionKind::Bootstrap)
                .await?;
        }

        self.drain_callbacks(tick);

        let limit = self.inner.config.max_chained_transitions;
        let mut chained = 0usize;
        while !self.is_transitioning() {
            let Some(next) = self.execute_current(tick)? else {
                break;
            };

            chained += 1;
            if let Some(limit) = limit {
                if chained > limit {
                    let state = self.current_key().unwrap_or_default();
                    warn!(target: "stagehand", "Transition limit {} hit in '{}'", limit, state);
                    return Err(MachineError::TransitionLimit { limit, state });
                }
            }

            match next {
                Next::Transition(key) => self.transition(key, TransitionOptions::new()).await?,
                Next::Push(key) => self.push_transition(key, TransitionOptions::new()).await?,
                Next::Pop => self.pop_transition().await?,
            }
        }

        Ok(())
    }

    fn drain_callbacks(&self, tick: Tick) {
        let callbacks = std::mem::take(&mut *self.inner.next_step_callbacks.borrow_mut());
        if callbacks.is_empty() {
            return;
        }
        trace!(target: "stagehand", "Running {} deferred callback(s)", callbacks.len());
        for callback in callbacks {
            callback(&self.inner.context, tick);
        }
    }

    fn execute_current(&self, tick: Tick) -> Result<Option<Next>, MachineError> {
        let Some(key) = self.current_key() else {
            return Ok(None);
        };
        let slot = self.lookup(&key)?;
        let mut state = slot.behavior_mut()?;
        Ok(state.execute(&self.inner.context, tick))
    }

    //--- Transitions ------------------------------------------------------

    /// Leave the current state and enter `key`.
    ///
    /// Runs `pre_exit`, the current state's `handle_exited`, `post_exit`,
    /// then (`init` on first entry) `pre_enter`, the new state's
    /// `handle_entered` with the options' enter args, and `post_enter`, each
    /// after the previous completes.
    ///
    /// # Errors
    ///
    /// - [`MachineError::UnknownState`] if `key` is not registered.
    /// - [`MachineError::TransitionInProgress`] if another transition has
    ///   not finished.
    /// - [`MachineError::Hook`] if an exit or enter hook fails. A failed exit
    ///   leaves the machine in the old state; a failed enter leaves it in the
    ///   new one.
    ///
    /// Nothing changes in the first two cases.
    pub async fn transition(
        &self,
        key: impl Into<String>,
        options: TransitionOptions<C>,
    ) -> Result<(), MachineError> {
        self.run_transition(key.into(), options, TransitionKind::Direct)
            .await
    }

    /// Remember the current state on the stack, then transition to `key`.
    ///
    /// The stack is left untouched if the machine never leaves the current
    /// state, including when this future is dropped before it completes.
    pub async fn push_transition(
        &self,
        key: impl Into<String>,
        options: TransitionOptions<C>,
    ) -> Result<(), MachineError> {
        let to = key.into();
        if self.is_transitioning() {
            return Err(MachineError::TransitionInProgress { requested: to });
        }
        let Some(from) = self.current_key() else {
            return Err(MachineError::NotStarted { requested: to });
        };

        let guard = StackGuard::push(self.inner(), from.clone());
        self.run_transition(to, options, TransitionKind::Push).await?;
        guard.disarm();

        let depth = self.stack_depth();
        debug!(target: "stagehand", "Pushed '{}' (depth {})", from, depth);
        self.emit(&MachineEvent::StackPushed { depth });
        Ok(())
    }

    /// Transition back to the state on top of the stack.
    ///
    /// Emits [`MachineEvent::StackPopped`] with the new depth once the
    /// transition completes.
    ///
    /// # Errors
    ///
    /// [`MachineError::EmptyStack`] if nothing was pushed, plus anything
    /// [`transition`](Self::transition) can fail with.
    pub async fn pop_transition(&self) -> Result<(), MachineError> {
        if self.is_transitioning() {
            let requested = self.inner.stack.borrow().last().cloned().unwrap_or_default();
            return Err(MachineError::TransitionInProgress { requested });
        }
        let Some((guard, to)) = StackGuard::pop(self.inner()) else {
            return Err(MachineError::EmptyStack);
        };
        self.run_transition(to.clone(), TransitionOptions::new(), TransitionKind::Pop)
            .await?;
        guard.disarm();

        let depth = self.stack_depth();
        debug!(target: "stagehand", "Popped back to '{}' (depth {})", to, depth);
        self.emit(&MachineEvent::StackPopped { depth });
        Ok(())
    }

    /// Push `key` and return a wait that resolves once the stack unwinds
    /// back to the current depth.
    ///
    /// Pops belonging to pushes nested inside `key` do not resolve the wait;
    /// only the pop that returns to the caller's own level does.
    ///
    /// ```rust
    /// use stagehand::{Next, State, StateMachine, Tick, TransitionOptions};
    ///
    /// struct Room;
    /// struct Dialog;
    ///
    /// impl State<()> for Room {}
    ///
    /// impl State<()> for Dialog {
    ///     fn execute(&mut self, _: &(), _tick: Tick) -> Option<Next> {
    ///         Some(Next::Pop)
    ///     }
    /// }
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), stagehand::MachineError> {
    /// let machine = StateMachine::new("room", ());
    /// machine.add_state("room", |_| Room);
    /// machine.add_state("dialog", |_| Dialog);
    /// machine.step(Tick::default()).await?;
    ///
    /// let mut wait = machine.push_and_wait("dialog", TransitionOptions::new()).await?;
    /// assert!(!wait.is_settled());
    ///
    /// machine.step(Tick::default()).await?;
    /// wait.await?;
    /// assert_eq!(machine.current_key().as_deref(), Some("room"));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn push_and_wait(
        &self,
        key: impl Into<String>,
        options: TransitionOptions<C>,
    ) -> Result<StackWait, MachineError> {
        let depth = self.stack_depth();
        let (sender, receiver) = oneshot::channel();
        let mut sender = Some(sender);

        let listener = self.inner.events.subscribe_until(move |event| match event {
            MachineEvent::StackPopped { depth: popped } if *popped == depth => {
                if let Some(sender) = sender.take() {
                    // The wait may have been dropped; nothing to notify then.
                    let _ = sender.send(());
                }
                true
            }
            _ => false,
        });

        let wait = StackWait::new(depth, receiver).watching(&self.inner.events, listener);
        self.push_transition(key, options).await?;
        Ok(wait)
    }

    fn lookup(&self, key: &str) -> Result<Rc<RegisteredState<C>>, MachineError> {
        self.state(key)
            .ok_or_else(|| MachineError::UnknownState(key.to_string()))
    }

    async fn run_transition(
        &self,
        to: String,
        options: TransitionOptions<C>,
        kind: TransitionKind,
    ) -> Result<(), MachineError> {
        if self.is_transitioning() {
            return Err(MachineError::TransitionInProgress { requested: to });
        }
        let target = self.lookup(&to)?;
        if target.is_busy() {
            return Err(MachineError::StateBusy(to));
        }

        let _guard = TransitionGuard::engage(&self.inner.transitioning);
        self.perform(to, target, options, kind).await
    }

    async fn perform(
        &self,
        to: String,
        target: Rc<RegisteredState<C>>,
        options: TransitionOptions<C>,
        kind: TransitionKind,
    ) -> Result<(), MachineError> {
        let context = &self.inner.context;
        let TransitionOptions {
            pre_exit,
            post_exit,
            pre_enter,
            post_enter,
            args,
        } = options;
        let from = self.current_key();

        if let Some(from_key) = &from {
            let leaving = self.lookup(from_key)?;
            if let Some(callback) = pre_exit {
                callback(context);
            }
            {
                let mut state = leaving.behavior_mut()?;
                state
                    .handle_exited(context)
                    .await
                    .map_err(|source| MachineError::Hook {
                        state: from_key.clone(),
                        source,
                    })?;
            }
            if let Some(callback) = post_exit {
                callback(context);
            }
        }

        *self.inner.current.borrow_mut() = Some(to.clone());

        {
            let mut state = target.behavior_mut()?;
            if !target.is_initialized() {
                trace!(target: "stagehand", "Initializing state '{}'", to);
                state.init(context);
                target.mark_initialized();
            }
            if let Some(callback) = pre_enter {
                callback(context);
            }
            state
                .handle_entered(context, &args)
                .await
                .map_err(|source| MachineError::Hook {
                    state: to.clone(),
                    source,
                })?;
        }
        if let Some(callback) = post_enter {
            callback(context);
        }

        let depth = self.stack_depth();
        debug!(
            target: "stagehand",
            "{} -> {} ({:?}, depth {})",
            from.as_deref().unwrap_or("<none>"),
            to,
            kind,
            depth
        );
        self.inner.history.borrow_mut().record(TransitionRecord {
            from: from.clone(),
            to: to.clone(),
            kind,
            depth,
            timestamp: Utc::now(),
        });
        self.emit(&MachineEvent::Transitioned { from, to });
        Ok(())
    }
}

impl<C: 'static> fmt::Debug for StateMachine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("initial_state", &self.inner.initial_state)
            .field("current", &self.current_key())
            .field("stack", &self.stack())
            .field("transitioning", &self.is_transitioning())
            .field("states", &self.state_keys())
            .finish()
    }
}
