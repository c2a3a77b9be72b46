//! End-to-end behavior of stepping, stacking and waiting.

use stagehand::core::TransitionKind;
use stagehand::{
    EnterArgs, HookFuture, MachineError, MachineEvent, Next, State, StateHandle, StateMachine,
    Tick, TransitionOptions,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tokio::sync::oneshot;
use tokio::task::LocalSet;

#[derive(Default)]
struct World {
    log: RefCell<Vec<String>>,
}

impl World {
    fn note(&self, entry: impl Into<String>) {
        self.log.borrow_mut().push(entry.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}

/// Replays a fixed list of `execute` results, then stays put.
struct Scripted {
    name: &'static str,
    script: VecDeque<Option<Next>>,
}

impl Scripted {
    fn new(name: &'static str, script: Vec<Option<Next>>) -> Self {
        Self {
            name,
            script: script.into(),
        }
    }
}

impl State<World> for Scripted {
    fn handle_entered<'a>(&'a mut self, world: &'a World, _args: &'a EnterArgs) -> HookFuture<'a> {
        Box::pin(async move {
            world.note(format!("enter {}", self.name));
            Ok(())
        })
    }

    fn handle_exited<'a>(&'a mut self, world: &'a World) -> HookFuture<'a> {
        Box::pin(async move {
            world.note(format!("exit {}", self.name));
            Ok(())
        })
    }

    fn execute(&mut self, _world: &World, _tick: Tick) -> Option<Next> {
        self.script.pop_front().flatten()
    }
}

/// Holds its enter hook open until the gate is released.
struct Gated {
    gate: Option<oneshot::Receiver<()>>,
}

impl State<World> for Gated {
    fn handle_entered<'a>(&'a mut self, world: &'a World, _args: &'a EnterArgs) -> HookFuture<'a> {
        Box::pin(async move {
            if let Some(gate) = self.gate.take() {
                gate.await?;
            }
            world.note("loaded");
            Ok(())
        })
    }

    fn execute(&mut self, world: &World, _tick: Tick) -> Option<Next> {
        world.note("loading.execute");
        None
    }
}

/// Holds its exit hook open until the gate is released.
struct HeldExit {
    gate: Option<oneshot::Receiver<()>>,
}

impl State<World> for HeldExit {
    fn handle_exited<'a>(&'a mut self, world: &'a World) -> HookFuture<'a> {
        Box::pin(async move {
            if let Some(gate) = self.gate.take() {
                gate.await?;
            }
            world.note("left");
            Ok(())
        })
    }
}

async fn wait_until_transitioning(machine: &StateMachine<World>) {
    while !machine.is_transitioning() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn push_and_wait_ignores_nested_pops() {
    let machine = StateMachine::new("world", World::default());
    machine.add_state("world", |_| Scripted::new("world", vec![]));
    machine.add_state("dialog", |_| {
        Scripted::new(
            "dialog",
            vec![Some(Next::push("confirm")), None, Some(Next::Pop)],
        )
    });
    machine.add_state("confirm", |_| Scripted::new("confirm", vec![Some(Next::Pop)]));
    machine.step(Tick::default()).await.unwrap();

    let mut wait = machine
        .push_and_wait("dialog", TransitionOptions::new())
        .await
        .unwrap();
    assert_eq!(wait.depth(), 0);
    assert_eq!(machine.stack_depth(), 1);

    // confirm is pushed and popped inside this step
    machine.step(Tick::new(16.0, 16.0)).await.unwrap();
    assert_eq!(machine.current_key().as_deref(), Some("dialog"));
    assert!(!wait.is_settled());

    machine.step(Tick::new(32.0, 16.0)).await.unwrap();
    assert!(wait.is_settled());
    wait.await.unwrap();

    assert_eq!(machine.current_key().as_deref(), Some("world"));
    assert_eq!(
        machine.context().take(),
        vec![
            "enter world",
            "exit world",
            "enter dialog",
            "exit dialog",
            "enter confirm",
            "exit confirm",
            "enter dialog",
            "exit dialog",
            "enter world",
        ]
    );
}

#[tokio::test]
async fn dropping_the_machine_abandons_waits() {
    let machine = StateMachine::new("world", World::default());
    machine.add_state("world", |_| Scripted::new("world", vec![]));
    machine.add_state("dialog", |_| Scripted::new("dialog", vec![]));
    machine.step(Tick::default()).await.unwrap();

    let wait = machine
        .push_and_wait("dialog", TransitionOptions::new())
        .await
        .unwrap();
    drop(machine);

    assert!(matches!(wait.await, Err(MachineError::WaitAbandoned { depth: 0 })));
}

#[tokio::test]
async fn step_skips_execute_while_transition_is_pending() {
    let (release, gate) = oneshot::channel();
    let machine = StateMachine::new("world", World::default());
    machine.add_state("world", |_| Scripted::new("world", vec![]));
    machine.add_state("loading", move |_| Gated { gate: Some(gate) });
    machine.step(Tick::default()).await.unwrap();
    machine.context().take();

    LocalSet::new()
        .run_until(async {
            let driver = machine.clone();
            let pending = tokio::task::spawn_local(async move {
                driver.transition("loading", TransitionOptions::new()).await
            });
            wait_until_transitioning(&machine).await;

            machine.step(Tick::new(16.0, 16.0)).await.unwrap();
            assert!(machine.context().take().iter().all(|e| e != "loading.execute"));

            let blocked = machine.transition("world", TransitionOptions::new()).await;
            assert!(matches!(
                blocked,
                Err(MachineError::TransitionInProgress { requested }) if requested == "world"
            ));
            assert!(matches!(
                machine.pop_transition().await,
                Err(MachineError::TransitionInProgress { .. })
            ));

            release.send(()).unwrap();
            pending.await.unwrap().unwrap();
        })
        .await;

    assert!(!machine.is_transitioning());
    assert_eq!(machine.context().take(), vec!["loaded"]);

    machine.step(Tick::new(32.0, 16.0)).await.unwrap();
    assert_eq!(machine.context().take(), vec!["loading.execute"]);
}

#[tokio::test]
async fn dropped_transition_clears_in_flight_flag() {
    let (_release, gate) = oneshot::channel::<()>();
    let machine = StateMachine::new("world", World::default());
    machine.add_state("world", |_| Scripted::new("world", vec![]));
    machine.add_state("loading", move |_| Gated { gate: Some(gate) });
    machine.step(Tick::default()).await.unwrap();

    LocalSet::new()
        .run_until(async {
            let driver = machine.clone();
            let pending = tokio::task::spawn_local(async move {
                driver.transition("loading", TransitionOptions::new()).await
            });
            wait_until_transitioning(&machine).await;
            pending.abort();
            let _ = pending.await;
        })
        .await;

    assert!(!machine.is_transitioning());
}

#[tokio::test]
async fn dropped_push_leaves_stack_untouched() {
    let (_release, gate) = oneshot::channel::<()>();
    let machine = StateMachine::new("world", World::default());
    machine.add_state("world", move |_| HeldExit { gate: Some(gate) });
    machine.add_state("map", |_| Scripted::new("map", vec![]));
    machine.step(Tick::default()).await.unwrap();

    LocalSet::new()
        .run_until(async {
            let driver = machine.clone();
            let pending = tokio::task::spawn_local(async move {
                driver.push_transition("map", TransitionOptions::new()).await
            });
            wait_until_transitioning(&machine).await;
            assert_eq!(machine.stack(), vec!["world".to_string()]);

            pending.abort();
            let _ = pending.await;
        })
        .await;

    assert_eq!(machine.current_key().as_deref(), Some("world"));
    assert!(machine.stack().is_empty());
    assert!(!machine.is_transitioning());
}

#[tokio::test]
async fn dropped_pop_keeps_key_on_stack() {
    let (_release, gate) = oneshot::channel::<()>();
    let machine = StateMachine::new("world", World::default());
    machine.add_state("world", |_| Scripted::new("world", vec![]));
    machine.add_state("map", move |_| HeldExit { gate: Some(gate) });
    machine.step(Tick::default()).await.unwrap();
    machine
        .push_transition("map", TransitionOptions::new())
        .await
        .unwrap();

    LocalSet::new()
        .run_until(async {
            let driver = machine.clone();
            let pending = tokio::task::spawn_local(async move { driver.pop_transition().await });
            wait_until_transitioning(&machine).await;
            assert!(machine.stack().is_empty());

            pending.abort();
            let _ = pending.await;
        })
        .await;

    assert_eq!(machine.current_key().as_deref(), Some("map"));
    assert_eq!(machine.stack(), vec!["world".to_string()]);
    assert!(!machine.is_transitioning());

    // The held exit was consumed by the dropped pop, so this one completes.
    machine.pop_transition().await.unwrap();
    assert_eq!(machine.current_key().as_deref(), Some("world"));
    assert!(machine.stack().is_empty());
    assert_eq!(
        machine.context().take(),
        vec!["enter world", "exit world", "left", "enter world"]
    );
}

/// Counts frames and asks the machine to note the tick on the next one.
struct Scheduler {
    handle: StateHandle<World>,
}

impl State<World> for Scheduler {
    fn execute(&mut self, world: &World, tick: Tick) -> Option<Next> {
        world.note(format!("execute {}", tick.time));
        let handle = self.handle.clone();
        let scheduled = self.handle.next_step(move |world: &World, tick| {
            world.note(format!("deferred {}", tick.time));
            // Queued during the drain, so it waits for the following step.
            let _ = handle.next_step(|world: &World, tick| {
                world.note(format!("chained {}", tick.time));
            });
        });
        if scheduled.is_err() {
            world.note("detached");
        }
        None
    }
}

#[tokio::test]
async fn deferred_callbacks_run_at_the_start_of_later_steps() {
    let machine = StateMachine::new("clock", World::default());
    machine.add_state("clock", |handle| Scheduler { handle });

    machine.step(Tick::new(0.0, 16.0)).await.unwrap();
    machine.step(Tick::new(16.0, 16.0)).await.unwrap();
    machine.step(Tick::new(32.0, 16.0)).await.unwrap();

    assert_eq!(
        machine.context().take(),
        vec![
            "execute 0",
            "deferred 16",
            "execute 16",
            "chained 32",
            "deferred 32",
            "execute 32",
        ]
    );
    assert_eq!(machine.pending_callbacks(), 2);
}

#[tokio::test]
async fn handles_drive_the_machine_from_outside_hooks() {
    let handles: Rc<RefCell<Vec<StateHandle<World>>>> = Rc::default();
    let machine = StateMachine::new("world", World::default());
    let sink = Rc::clone(&handles);
    machine.add_state("world", move |handle| {
        sink.borrow_mut().push(handle);
        Scripted::new("world", vec![])
    });
    machine.add_state("map", |_| Scripted::new("map", vec![]));
    machine.step(Tick::default()).await.unwrap();

    let world = handles.borrow()[0].clone();
    assert!(world.is_current());

    world
        .push_transition("map", TransitionOptions::new().arg("zoom", 2))
        .await
        .unwrap();
    assert!(!world.is_current());
    assert_eq!(machine.stack(), vec!["world".to_string()]);

    world.pop_transition().await.unwrap();
    assert!(world.is_current());
}

#[tokio::test]
async fn listeners_see_transitions_and_stack_changes() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let machine = StateMachine::new("world", World::default());
    machine.add_state("world", |_| Scripted::new("world", vec![]));
    machine.add_state("pause", |_| Scripted::new("pause", vec![Some(Next::Pop)]));

    let sink = Rc::clone(&events);
    let id = machine.on(move |event| sink.borrow_mut().push(event.clone()));

    machine.step(Tick::default()).await.unwrap();
    machine
        .push_transition("pause", TransitionOptions::new())
        .await
        .unwrap();
    machine.step(Tick::default()).await.unwrap();
    assert!(machine.off(id));
    machine.emit(&MachineEvent::StackPushed { depth: 9 });

    assert_eq!(
        *events.borrow(),
        vec![
            MachineEvent::Transitioned {
                from: None,
                to: "world".to_string()
            },
            MachineEvent::Transitioned {
                from: Some("world".to_string()),
                to: "pause".to_string()
            },
            MachineEvent::StackPushed { depth: 1 },
            MachineEvent::Transitioned {
                from: Some("pause".to_string()),
                to: "world".to_string()
            },
            MachineEvent::StackPopped { depth: 0 },
        ]
    );

    let kinds: Vec<TransitionKind> = machine.history().transitions().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![TransitionKind::Bootstrap, TransitionKind::Push, TransitionKind::Pop]
    );
}

#[tokio::test]
async fn builder_and_checkpoint_resume_a_session() {
    let build = || {
        StateMachine::builder(World::default())
            .initial("world")
            .state("world", |_| Scripted::new("world", vec![]))
            .state("pause", |_| Scripted::new("pause", vec![]))
            .build()
            .unwrap()
    };

    let first = build();
    first.step(Tick::default()).await.unwrap();
    first
        .push_transition("pause", TransitionOptions::new())
        .await
        .unwrap();
    let saved = first.checkpoint().to_bytes().unwrap();

    let second = build();
    let checkpoint = stagehand::Checkpoint::from_bytes(&saved).unwrap();
    second.restore(&checkpoint).unwrap();
    assert_eq!(second.current_key().as_deref(), Some("pause"));

    // Already positioned, so the first step does not bootstrap.
    second.step(Tick::default()).await.unwrap();
    assert!(second.context().take().is_empty());

    second.pop_transition().await.unwrap();
    assert_eq!(second.context().take(), vec!["exit pause", "enter world"]);
}
