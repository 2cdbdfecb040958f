// Controller output events.
//
// Neither controller holds callbacks. Each buffers what happened during an
// `update()` or message handler in a queue, and the embedding code drains it
// with `drain_events()` and reacts: sending messages, recording, showing a
// stall indicator. Event order within a drain is the order things happened.
//
// See also: `client.rs` and `server.rs` for when each event fires,
// `recorder.rs` which consumes `ClientEvent::CommandApplied`.

use lockstep_protocol::{ClientId, Command, Turn, TurnData};
use serde::{Deserialize, Serialize};

/// Something a `ClientLockstepController` did that the outside world may
/// care about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// `start()` was called; turn clock counts from `timestamp`.
    SimulationStartScheduled { timestamp: i64 },
    /// The first update that advanced simulation time.
    SimulationStarted,
    /// A command was queued locally and must be sent to the server. Also
    /// fires for retries, with the new target turn.
    PendingCommandAdded(Command),
    /// Turns were stored from a server confirmation and must be
    /// acknowledged.
    TurnsConfirmed(Vec<Turn>),
    /// Simulation is blocked waiting for `turn`. Fires once per stall.
    MissingTurnConfirmation { turn: Turn },
    /// The stall cleared; simulation resumed at `turn`.
    MissingTurnConfirmationReceived { turn: Turn },
    /// A command was applied to the model.
    CommandApplied(Command),
    /// A pending command ran out of retries and was dropped.
    CommandDiscarded(Command),
}

/// Something a `ServerLockstepController` needs the transport to do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// Send every turn `client` has not acknowledged yet, ascending.
    SendTurns { client: ClientId, turns: Vec<TurnData> },
    /// `client` has more than the configured number of unacknowledged turns.
    /// Fires once when the limit is crossed.
    ClientStalled { client: ClientId, pending: usize },
}
