//! A player wandering between rooms, with a pause menu pushed on top.
//!
//! Run with `cargo run --example room_flow`.

use stagehand::{
    EnterArgs, HookFuture, MachineError, MachineEvent, Next, State, StateHandle, StateMachine,
    Tick, TransitionOptions,
};
use std::cell::{Cell, RefCell};

#[derive(Default)]
struct Player {
    room: RefCell<String>,
    steps: Cell<u32>,
    fade: Cell<f64>,
}

struct Room {
    name: &'static str,
    exit_after: u32,
    next: &'static str,
}

impl State<Player> for Room {
    fn handle_entered<'a>(&'a mut self, player: &'a Player, args: &'a EnterArgs) -> HookFuture<'a> {
        Box::pin(async move {
            let door = args.get::<String>("door")?.unwrap_or_else(|| "nowhere".to_string());
            *player.room.borrow_mut() = self.name.to_string();
            player.steps.set(0);
            println!("  entered {} through the {} door", self.name, door);
            Ok(())
        })
    }

    fn execute(&mut self, player: &Player, _tick: Tick) -> Option<Next> {
        player.steps.set(player.steps.get() + 1);
        (player.steps.get() >= self.exit_after).then(|| Next::to(self.next))
    }
}

struct Pause {
    handle: StateHandle<Player>,
}

impl State<Player> for Pause {
    fn init(&mut self, _player: &Player) {
        println!("  building the pause menu for '{}'", self.handle.key());
    }

    fn execute(&mut self, player: &Player, _tick: Tick) -> Option<Next> {
        println!("  paused in {}", player.room.borrow());
        Some(Next::Pop)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let machine = StateMachine::builder(Player::default())
        .initial("hall")
        .state("hall", |_| Room {
            name: "hall",
            exit_after: 2,
            next: "library",
        })
        .state("library", |_| Room {
            name: "library",
            exit_after: 3,
            next: "hall",
        })
        .state("pause", |handle| Pause { handle })
        .build()?;

    machine.on(|event| {
        if let MachineEvent::Transitioned { from, to } = event {
            println!("[{} -> {}]", from.as_deref().unwrap_or("start"), to);
        }
    });

    let mut tick = Tick::new(0.0, 16.0);
    for frame in 0..6 {
        println!("frame {}", frame);
        machine.step(tick).await?;
        tick = Tick::new(tick.time + tick.delta, tick.delta);
    }

    let options = TransitionOptions::new()
        .pre_exit(|player: &Player| player.fade.set(1.0))
        .post_enter(|player: &Player| player.fade.set(0.0))
        .arg("door", "east");
    machine.transition("library", options).await?;

    let wait = machine
        .push_and_wait("pause", TransitionOptions::new())
        .await?;
    machine.step(tick).await?;
    wait.await?;
    println!("back in {} after the pause", machine.context().room.borrow());

    match machine.pop_transition().await {
        Err(MachineError::EmptyStack) => println!("nothing left to pop"),
        other => other?,
    }

    let checkpoint = machine.checkpoint();
    println!("checkpoint:\n{}", checkpoint.to_json()?);
    println!("path: {:?}", machine.history().get_path());
    Ok(())
}
