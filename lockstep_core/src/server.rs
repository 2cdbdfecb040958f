// Server-side lockstep controller: the authority on what happens each turn.
//
// The server runs the same turn clock as the clients (no anticipation, no
// model). It collects commands into per-turn buckets and, as the clock
// passes each turn, seals that turn and distributes it. A sealed turn never
// changes: commands arriving for a turn at or before `last_turn` are dropped.
// Commands for turns further ahead than any client can legitimately target
// are dropped too, so a bucket is never opened that the clock won't reach.
//
// Delivery is acknowledged per client. Each client has a set of sealed turns
// it has not acknowledged yet; every update that seals at least one turn
// sends each client its whole set again, ascending. There is no other retry
// or timeout. A bucket is evicted once it is sealed and no client's set
// references it, so one client that never acknowledges keeps every turn
// alive. To bound that, a client whose set grows past `max_pending_turns` is
// reported with `ServerEvent::ClientStalled` (once per crossing), and
// `remove_client` drops its set outright.
//
// See also: `client.rs` for the consuming side, `event.rs` for
// `ServerEvent`, `config.rs` for `ServerConfig`.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use lockstep_protocol::{ClientId, Command, Turn, TurnData};

use crate::config::{ConfigError, LockstepConfig, ServerConfig};
use crate::event::ServerEvent;

/// Turns a client's clock may run ahead of the server's before its commands
/// fall past the admission horizon.
const MAX_CLOCK_SKEW_TURNS: Turn = 10;

/// Per-client delivery state.
#[derive(Debug, Default)]
struct ClientAcks {
    /// Sealed turns this client has not acknowledged.
    pending: BTreeSet<Turn>,
    /// Set while `pending` is over the stall limit.
    stalled: bool,
}

#[derive(Debug)]
pub struct ServerLockstepController {
    config: LockstepConfig,
    server_config: ServerConfig,
    command_step: i64,
    started: bool,
    last_timestamp: i64,
    simulation_time: i64,
    last_turn: Turn,
    turns: BTreeMap<Turn, TurnData>,
    clients: BTreeMap<ClientId, ClientAcks>,
    events: Vec<ServerEvent>,
}

impl ServerLockstepController {
    pub fn new(config: LockstepConfig, server_config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        server_config.validate()?;
        Ok(Self {
            command_step: config.command_step(),
            config,
            server_config,
            started: false,
            last_timestamp: 0,
            simulation_time: 0,
            last_turn: 0,
            turns: BTreeMap::new(),
            clients: BTreeMap::new(),
            events: Vec::new(),
        })
    }

    /// Register a client. Only turns sealed after this point are sent to it.
    pub fn add_client(&mut self, client: ClientId) {
        if self.clients.contains_key(&client) {
            return;
        }
        info!("lockstep server: {client} joined at turn {}", self.last_turn);
        self.clients.insert(client, ClientAcks::default());
    }

    /// Forget a client and its unacknowledged turns. Returns whether it was
    /// registered.
    pub fn remove_client(&mut self, client: ClientId) -> bool {
        match self.clients.remove(&client) {
            Some(acks) => {
                info!(
                    "lockstep server: {client} left with {} unacknowledged turns",
                    acks.pending.len()
                );
                true
            }
            None => false,
        }
    }

    /// Start the turn clock at `timestamp`. The first turn is sealed one
    /// command step later.
    pub fn start(&mut self, timestamp: i64) {
        self.started = true;
        self.last_timestamp = timestamp;
        info!("lockstep server: turn clock starts at {timestamp}");
    }

    pub fn update(&mut self, timestamp: i64) {
        if !self.started {
            return;
        }
        let elapsed = timestamp.saturating_sub(self.last_timestamp);
        if elapsed <= 0 {
            return;
        }
        self.simulation_time += elapsed;
        self.last_timestamp = timestamp;

        let current_turn = self.current_turn();
        let mut sealed_any = false;
        while self.last_turn < current_turn {
            self.evict_acknowledged();
            self.last_turn += 1;
            let turn = self.last_turn;
            for acks in self.clients.values_mut() {
                acks.pending.insert(turn);
            }
            self.turns.entry(turn).or_insert_with(|| TurnData::new(turn));
            sealed_any = true;
        }

        if sealed_any {
            self.send_pending_turns();
            self.check_stalls();
        }
    }

    /// Drop sealed buckets that every client has acknowledged.
    fn evict_acknowledged(&mut self) {
        let last_turn = self.last_turn;
        let clients = &self.clients;
        self.turns.retain(|&turn, _| {
            turn > last_turn || clients.values().any(|acks| acks.pending.contains(&turn))
        });
    }

    fn send_pending_turns(&mut self) {
        for (&client, acks) in &self.clients {
            let turns: Vec<TurnData> = acks
                .pending
                .iter()
                .filter_map(|turn| self.turns.get(turn).cloned())
                .collect();
            if !turns.is_empty() {
                self.events.push(ServerEvent::SendTurns { client, turns });
            }
        }
    }

    fn check_stalls(&mut self) {
        let limit = self.server_config.max_pending_turns;
        for (&client, acks) in &mut self.clients {
            let pending = acks.pending.len();
            if pending > limit && !acks.stalled {
                acks.stalled = true;
                warn!("lockstep server: {client} stalled with {pending} unacknowledged turns");
                self.events
                    .push(ServerEvent::ClientStalled { client, pending });
            } else if pending <= limit && acks.stalled {
                acks.stalled = false;
                info!("lockstep server: {client} recovered ({pending} unacknowledged turns)");
            }
        }
    }

    /// Accept a client command into its turn's bucket. Commands for a turn
    /// that is already sealed, or beyond `admission_horizon()`, are dropped;
    /// returns whether it was accepted.
    pub fn on_client_command_received(&mut self, client: ClientId, command: Command) -> bool {
        let turn = command.turn();
        if turn <= self.last_turn {
            debug!(
                "lockstep server: dropped late {:?} from {client} for turn {turn} (last turn {})",
                command.kind(),
                self.last_turn
            );
            return false;
        }
        let horizon = self.admission_horizon();
        if turn > horizon {
            debug!(
                "lockstep server: dropped {:?} from {client} for turn {turn} (horizon {horizon})",
                command.kind()
            );
            return false;
        }
        if !self.clients.contains_key(&client) {
            debug!("lockstep server: dropped command from unknown {client}");
            return false;
        }
        self.turns
            .entry(turn)
            .or_insert_with(|| TurnData::new(turn))
            .push(command);
        true
    }

    /// Record that `client` has received `turn`.
    pub fn on_client_turn_reception_confirmed(&mut self, client: ClientId, turn: Turn) {
        match self.clients.get_mut(&client) {
            Some(acks) => {
                acks.pending.remove(&turn);
            }
            None => debug!("lockstep server: ack for turn {turn} from unknown {client}"),
        }
    }

    /// Take every event raised since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn config(&self) -> &LockstepConfig {
        &self.config
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.server_config
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Furthest turn a command is accepted for: the latest turn a client can
    /// target (maximum anticipation plus every retry) with some room for the
    /// client's turn clock running ahead of this one.
    pub fn admission_horizon(&self) -> Turn {
        let retries = Turn::try_from(self.config.max_retries).unwrap_or(Turn::MAX);
        self.last_turn
            .saturating_add(self.config.max_anticipation)
            .saturating_add(retries)
            .saturating_add(1 + MAX_CLOCK_SKEW_TURNS)
    }

    /// Most recently sealed turn; 0 before the first.
    pub fn last_turn(&self) -> Turn {
        self.last_turn
    }

    pub fn current_turn(&self) -> Turn {
        Turn::try_from(self.simulation_time / self.command_step).unwrap_or(Turn::MAX)
    }

    pub fn turn_bucket(&self, turn: Turn) -> Option<&TurnData> {
        self.turns.get(&turn)
    }

    pub fn bucket_count(&self) -> usize {
        self.turns.len()
    }

    pub fn pending_acks(&self, client: ClientId) -> Option<&BTreeSet<Turn>> {
        self.clients.get(&client).map(|acks| &acks.pending)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn has_client(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }
}
