// End-to-end integration tests for the lockstep pipeline.
//
// Each test starts a real relay, connects real `ClientSession`s (via
// `TestGameClient`), and checks the full path:
// ready barrier → command → relay turn → both controllers → identical model.
//
// Models are compared by their per-step digest traces over the span of time
// both have simulated, since two clients are never paused at exactly the
// same model time.

use std::thread;
use std::time::Duration;

use lockstep_core::{ClientEvent, LockstepConfig, ReplayLoader, ServerConfig, SessionConfig};
use lockstep_protocol::{Command, CommandAction};
use lockstep_relay::{RelayConfig, RelayHandle, start_relay};
use multiplayer_tests::{TestGameClient, TestModel, init_logging, pump_until};

/// Start delay for tests: long enough for both clients to see
/// AllClientsReady before turn 1, short enough to keep tests fast.
const TEST_START_DELAY_MS: i32 = 200;

/// Start a two-slot relay on a random port and connect both clients.
fn start_test_session() -> (RelayHandle, TestGameClient, TestGameClient) {
    init_logging();
    let config = RelayConfig {
        port: 0,
        session: SessionConfig {
            lockstep: LockstepConfig::default(),
            server: ServerConfig {
                max_clients: 2,
                start_delay_ms: TEST_START_DELAY_MS,
                max_pending_turns: 600,
            },
        },
    };
    let (handle, addr) = start_relay(config).unwrap();
    thread::sleep(Duration::from_millis(50));

    let alice = TestGameClient::connect(addr);
    let bob = TestGameClient::connect(addr);
    (handle, alice, bob)
}

/// Both clients send ClientReady and pump until their turn clocks run.
fn start_game(alice: &mut TestGameClient, bob: &mut TestGameClient) {
    alice.ready();
    bob.ready();
    pump_until(&mut [alice, bob], "simulation start", |c| {
        c.iter().all(|c| c.controller().model_time() > 0)
    });
}

fn assert_same_trace(a: &TestModel, b: &TestModel) {
    let common = a.common_trace(b);
    assert!(!common.is_empty(), "models share no simulated time");
    for (time, da, db) in common {
        assert_eq!(da, db, "models diverged at {time} ms");
    }
}

fn count_events(client: &TestGameClient, pred: impl Fn(&ClientEvent) -> bool) -> usize {
    client.events().iter().filter(|e| pred(e)).count()
}

// ---------------------------------------------------------------------------
// Test scenarios
// ---------------------------------------------------------------------------

/// Both clients receive the relay's config and start their turn clocks.
#[test]
fn two_client_lifecycle() {
    let (handle, mut alice, mut bob) = start_test_session();
    assert_eq!(alice.controller().config(), &LockstepConfig::default());
    assert_eq!(bob.controller().config(), alice.controller().config());

    start_game(&mut alice, &mut bob);

    for client in [&alice, &bob] {
        assert_eq!(
            count_events(client, |e| matches!(e, ClientEvent::SimulationStartScheduled { .. })),
            1
        );
        assert_eq!(count_events(client, |e| matches!(e, ClientEvent::SimulationStarted)), 1);
    }

    alice.disconnect();
    bob.disconnect();
    handle.stop();
}

/// Commands from both clients reach both models in the same turn and order.
#[test]
fn commands_reach_both_models() {
    let (handle, mut alice, mut bob) = start_test_session();
    start_game(&mut alice, &mut bob);

    let actions = [
        CommandAction::SpawnUnit { unit: 1, x: 5, y: 5 },
        CommandAction::Click { x: -2, y: 9 },
        CommandAction::AdjustValue { delta: 40 },
        CommandAction::SpawnUnit { unit: 2, x: 0, y: 1 },
    ];
    alice.issue(actions[0].clone());
    bob.issue(actions[1].clone());
    alice.issue(actions[2].clone());
    bob.issue(actions[3].clone());

    pump_until(&mut [&mut alice, &mut bob], "all commands applied", |c| {
        c.iter()
            .all(|c| actions.iter().all(|a| c.model().has_applied(a)))
    });

    let last = alice.controller().last_applied_turn().min(bob.controller().last_applied_turn());
    assert_eq!(
        alice.model().applied_through(last),
        bob.model().applied_through(last)
    );
    assert_same_trace(alice.model(), bob.model());

    alice.disconnect();
    bob.disconnect();
    handle.stop();
}

/// Models stay identical over many turns of interleaved commands.
#[test]
fn multi_turn_determinism() {
    let (handle, mut alice, mut bob) = start_test_session();
    start_game(&mut alice, &mut bob);

    for i in 0..12 {
        let client = if i % 2 == 0 { &mut alice } else { &mut bob };
        client.issue(CommandAction::AdjustValue { delta: i });
        if i % 3 == 0 {
            client.issue(CommandAction::SpawnUnit {
                unit: i as u8,
                x: i,
                y: -i,
            });
        }
        for _ in 0..5 {
            alice.pump();
            bob.pump();
            thread::sleep(Duration::from_millis(20));
        }
    }

    pump_until(&mut [&mut alice, &mut bob], "all adjustments applied", |c| {
        c.iter().all(|c| {
            (0..12).all(|i| c.model().has_applied(&CommandAction::AdjustValue { delta: i }))
        })
    });
    assert_same_trace(alice.model(), bob.model());
    let last = alice.controller().last_applied_turn().min(bob.controller().last_applied_turn());
    assert_eq!(
        alice.model().applied_through(last),
        bob.model().applied_through(last)
    );

    alice.disconnect();
    bob.disconnect();
    handle.stop();
}

/// A command that reaches the relay after its turn sealed is retried at a
/// later turn and still lands on both clients.
#[test]
fn late_command_is_retried() {
    let (handle, mut alice, mut bob) = start_test_session();
    start_game(&mut alice, &mut bob);

    // Target the next turn, then hold the command back long enough for the
    // relay to seal that turn without it.
    let turn = alice.controller().current_turn() + 1;
    thread::sleep(Duration::from_millis(400));
    let action = CommandAction::Click { x: 77, y: 78 };
    alice
        .controller_mut()
        .add_pending_command(Command::new(turn, action.clone()));

    pump_until(&mut [&mut alice, &mut bob], "retried command applied", |c| {
        c.iter().all(|c| c.model().has_applied(&action))
    });

    let submissions: Vec<&Command> = alice
        .events()
        .iter()
        .filter_map(|e| match e {
            ClientEvent::PendingCommandAdded(c) if c.action() == &action => Some(c),
            _ => None,
        })
        .collect();
    assert!(submissions.len() >= 2, "expected a retry: {submissions:?}");
    assert_eq!(submissions[0].turn(), turn);
    assert!(submissions[1].turn() > turn);
    assert_eq!(submissions[1].retries(), 1);
    assert_eq!(
        count_events(&alice, |e| matches!(e, ClientEvent::CommandDiscarded(_))),
        0
    );

    let applied_turn = |m: &TestModel| {
        m.applied
            .iter()
            .find(|(_, a)| a == &action)
            .map(|(t, _)| *t)
    };
    assert_eq!(applied_turn(alice.model()), applied_turn(bob.model()));
    assert!(applied_turn(alice.model()).unwrap() > turn);

    alice.disconnect();
    bob.disconnect();
    handle.stop();
}

/// When one client leaves, the relay keeps sealing turns for the other.
#[test]
fn survivor_keeps_running_after_disconnect() {
    let (handle, mut alice, mut bob) = start_test_session();
    start_game(&mut alice, &mut bob);

    bob.disconnect();
    drop(bob);
    let confirmed = alice.controller().last_confirmed_turn();
    pump_until(&mut [&mut alice], "turns after disconnect", |c| {
        c[0].controller().last_confirmed_turn() > confirmed + 5
    });

    alice.issue(CommandAction::AdjustValue { delta: 3 });
    pump_until(&mut [&mut alice], "command after disconnect", |c| {
        c[0].model().has_applied(&CommandAction::AdjustValue { delta: 3 })
    });

    alice.disconnect();
    handle.stop();
}

/// A recorded session replays offline into the same model trace.
#[test]
fn recorded_session_replays() {
    let (handle, mut alice, mut bob) = start_test_session();
    start_game(&mut alice, &mut bob);

    alice.issue(CommandAction::SpawnUnit { unit: 9, x: 3, y: 3 });
    bob.issue(CommandAction::AdjustValue { delta: -5 });
    pump_until(&mut [&mut alice, &mut bob], "commands applied", |c| {
        c[0].model().has_applied(&CommandAction::AdjustValue { delta: -5 })
            && c[0].model().has_applied(&CommandAction::SpawnUnit { unit: 9, x: 3, y: 3 })
    });
    alice.disconnect();
    bob.disconnect();
    handle.stop();

    let mut file = Vec::new();
    alice.recorder().write_to(&mut file).unwrap();
    let replay = ReplayLoader::read_from(file.as_slice()).unwrap();
    assert_eq!(replay.commands.len(), alice.model().applied.len());

    let live = alice.model();
    let mut controller = replay.into_controller(TestModel::default()).unwrap();
    controller.start(0);
    let mut now = 0;
    while controller.model_time() < live.time_ms {
        now += 50;
        controller.update(now);
    }
    assert_eq!(controller.model().applied, live.applied);
    for (time, digest) in &live.trace {
        assert_eq!(controller.model().trace.get(time), Some(digest), "replay diverged at {time} ms");
    }
}
