// Test-only game client for lockstep integration tests.
//
// Wraps the real `ClientSession` (from `lockstep_relay::client`) around a
// small deterministic `TestModel` to give the end-to-end tests a
// synchronous API for the full pipeline:
// connect → config → ready → start → command → turn → model → compare.
//
// The only test-specific code is the model and the blocking pump loops.
// Networking, turn scheduling, and command application all run the same
// code paths as a real game.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use lockstep_core::{
    ClientEvent, ClientLockstepController, LockstepRecorder, Simulateable,
};
use lockstep_protocol::{Command, CommandAction, Turn};
use lockstep_relay::{ClientSession, MonotonicClock};
use serde::Serialize;

/// Default timeout for blocking pump loops.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep between pumps.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Enable log output for a test run.
pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init()
        .ok();
}

/// A tiny deterministic world: a cursor, some units, and a value that
/// drifts by the unit count every step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TestModel {
    pub time_ms: i64,
    pub value: i64,
    pub cursor: (i32, i32),
    pub units: BTreeMap<u8, (i32, i32)>,
    pub applied: Vec<(Turn, CommandAction)>,
    /// State digest after every simulation step, keyed by model time.
    pub trace: BTreeMap<i64, u64>,
}

impl TestModel {
    /// FNV-1a over the JSON of the mutable state.
    pub fn digest(&self) -> u64 {
        let bytes = serde_json::to_vec(&(self.value, self.cursor, &self.units))
            .expect("serialize test model");
        bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
            (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
    }

    /// Digests at every time both models reached.
    pub fn common_trace(&self, other: &TestModel) -> Vec<(i64, u64, u64)> {
        self.trace
            .iter()
            .filter_map(|(t, &a)| other.trace.get(t).map(|&b| (*t, a, b)))
            .collect()
    }

    /// Commands applied up to and including `turn`.
    pub fn applied_through(&self, turn: Turn) -> Vec<(Turn, CommandAction)> {
        self.applied
            .iter()
            .filter(|(t, _)| *t <= turn)
            .cloned()
            .collect()
    }

    pub fn has_applied(&self, action: &CommandAction) -> bool {
        self.applied.iter().any(|(_, a)| a == action)
    }
}

impl Simulateable for TestModel {
    fn simulate(&mut self, time_ms: i64) {
        self.time_ms = time_ms;
        self.value = self.value.wrapping_add(self.units.len() as i64);
        self.trace.insert(time_ms, self.digest());
    }

    fn apply_command(&mut self, command: &Command) {
        match *command.action() {
            CommandAction::Click { x, y } => self.cursor = (x, y),
            CommandAction::SpawnUnit { unit, x, y } => {
                self.units.insert(unit, (x, y));
            }
            CommandAction::AdjustValue { delta } => {
                self.value = self.value.wrapping_add(i64::from(delta));
            }
        }
        self.applied.push((command.turn(), command.action().clone()));
    }
}

/// A test game client: a real relay connection driving a `TestModel`.
pub struct TestGameClient {
    session: ClientSession<TestModel>,
    clock: MonotonicClock,
    recorder: LockstepRecorder,
    events: Vec<ClientEvent>,
}

impl TestGameClient {
    /// Connect to a relay and receive the lockstep config.
    pub fn connect(addr: SocketAddr) -> Self {
        let session = ClientSession::connect(addr, TestModel::default())
            .expect("TestGameClient::connect failed");
        let recorder = LockstepRecorder::new(session.controller().config().clone());
        Self {
            session,
            clock: MonotonicClock::new(),
            recorder,
            events: Vec::new(),
        }
    }

    pub fn ready(&mut self) {
        self.session.send_ready().expect("send ClientReady failed");
    }

    pub fn issue(&mut self, action: CommandAction) -> Command {
        self.session.issue(action)
    }

    /// One host frame: receive, update, send. Events are kept in `events()`
    /// and applied commands in `recorder()`.
    pub fn pump(&mut self) {
        let events = self
            .session
            .pump(self.clock.now())
            .expect("ClientSession::pump failed");
        self.recorder.observe(&events);
        self.events.extend(events);
    }

    pub fn controller(&self) -> &ClientLockstepController<TestModel> {
        self.session.controller()
    }

    pub fn controller_mut(&mut self) -> &mut ClientLockstepController<TestModel> {
        self.session.controller_mut()
    }

    pub fn model(&self) -> &TestModel {
        self.session.controller().model()
    }

    pub fn events(&self) -> &[ClientEvent] {
        &self.events
    }

    pub fn recorder(&self) -> &LockstepRecorder {
        &self.recorder
    }

    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }
}

/// Pump every client in turn until `done` holds, panicking after
/// `POLL_TIMEOUT`.
pub fn pump_until(
    clients: &mut [&mut TestGameClient],
    what: &str,
    done: impl Fn(&[&mut TestGameClient]) -> bool,
) {
    let start = Instant::now();
    loop {
        for client in clients.iter_mut() {
            client.pump();
        }
        if done(clients) {
            return;
        }
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
        thread::sleep(POLL_INTERVAL);
    }
}
