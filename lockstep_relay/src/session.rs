// Relay session: client slots, the start barrier, and the server controller.
//
// A `Session` owns one `ServerLockstepController` plus the write half of
// every connected client's socket. The flow for a session of N slots:
//
// 1. A connection takes the lowest free slot and is immediately sent
//    `SetLockstepConfig`. Connections beyond N, or arriving after the
//    session started, are refused.
// 2. Each client answers `ClientReady` once its own controller exists.
//    Duplicates are ignored.
// 3. When all N slots are filled and ready, everyone gets
//    `AllClientsReady { remaining_ms_to_start = start_delay_ms }` and the
//    server controller starts one command step before that moment, so its
//    turn 1 seals right as the clients' turn clocks begin.
//
// After the barrier, `update(now)` advances the controller and forwards its
// events: `SendTurns` becomes one or more `ConfirmTurns` frames, and
// `ClientStalled` disconnects the client (its socket is shut down, so the
// reader thread reports the disconnect too; removal is idempotent).
//
// This is the only writer to client sockets. Reader threads in `server.rs`
// only read.

use std::collections::BTreeMap;
use std::io::BufWriter;
use std::net::{Shutdown, TcpStream};

use lockstep_core::{
    ConfigError, LockstepConfig, ServerEvent, ServerLockstepController, SessionConfig,
};
use lockstep_protocol::{
    ClientId, ClientMessage, ServerMessage, SetLockstepConfig, send_server_message,
};
use log::{debug, info, warn};

use crate::error::NetError;

pub struct Session {
    controller: ServerLockstepController,
    clients: BTreeMap<ClientId, ClientState>,
    barrier_released: bool,
}

struct ClientState {
    writer: BufWriter<TcpStream>,
    ready: bool,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            controller: ServerLockstepController::new(config.lockstep, config.server)?,
            clients: BTreeMap::new(),
            barrier_released: false,
        })
    }

    /// Give `stream` the lowest free slot and send it the lockstep config.
    pub fn add_client(&mut self, stream: TcpStream) -> Result<ClientId, NetError> {
        if self.barrier_released {
            return Err(NetError::SessionStarted);
        }
        let max_clients = self.controller.server_config().max_clients;
        let id = (0..max_clients)
            .filter_map(|slot| u8::try_from(slot).ok())
            .map(ClientId)
            .find(|id| !self.clients.contains_key(id))
            .ok_or(NetError::SessionFull)?;

        let mut writer = BufWriter::new(stream);
        let config = SetLockstepConfig::from(self.controller.config());
        send_server_message(&mut writer, &ServerMessage::SetLockstepConfig(config))?;

        self.clients.insert(id, ClientState {
            writer,
            ready: false,
        });
        self.controller.add_client(id);
        info!("relay: {id} connected ({}/{max_clients})", self.clients.len());
        Ok(id)
    }

    pub fn remove_client(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            self.controller.remove_client(id);
            info!("relay: {id} disconnected");
        }
    }

    /// Dispatch one decoded message from `id`. `now` is the relay clock,
    /// used if this message releases the start barrier.
    pub fn handle_message(&mut self, id: ClientId, message: ClientMessage, now: i64) {
        if !self.clients.contains_key(&id) {
            debug!("relay: ignoring message from departed {id}");
            return;
        }
        match message {
            ClientMessage::LockstepCommand { command } => {
                self.controller.on_client_command_received(id, command);
            }
            ClientMessage::ConfirmTurnsReception { turns } => {
                for turn in turns {
                    self.controller.on_client_turn_reception_confirmed(id, turn);
                }
            }
            ClientMessage::ClientReady => self.mark_ready(id, now),
        }
    }

    fn mark_ready(&mut self, id: ClientId, now: i64) {
        let Some(state) = self.clients.get_mut(&id) else {
            return;
        };
        if state.ready {
            debug!("relay: duplicate ready from {id}");
            return;
        }
        state.ready = true;
        info!("relay: {id} ready");
        self.check_all_ready(now);
    }

    fn check_all_ready(&mut self, now: i64) {
        let server_config = self.controller.server_config();
        if self.barrier_released
            || self.clients.len() != server_config.max_clients
            || !self.clients.values().all(|c| c.ready)
        {
            return;
        }
        let delay = server_config.start_delay_ms;
        self.barrier_released = true;
        let release = ServerMessage::AllClientsReady {
            network_timestamp: i32::try_from(now).unwrap_or(i32::MAX),
            remaining_ms_to_start: delay,
        };
        self.broadcast(&release);
        let start = now + i64::from(delay) - self.controller.config().command_step();
        info!("relay: all clients ready, turn clock starts at {start}");
        self.controller.start(start);
    }

    /// Advance the controller to `now` and deliver what it produced.
    pub fn update(&mut self, now: i64) {
        self.controller.update(now);
        for event in self.controller.drain_events() {
            match event {
                ServerEvent::SendTurns { client, turns } => {
                    for message in ServerMessage::confirm_turns_chunked(turns) {
                        if !self.send_to(client, &message) {
                            break;
                        }
                    }
                }
                ServerEvent::ClientStalled { client, pending } => {
                    warn!("relay: dropping {client}, {pending} turns unacknowledged");
                    self.disconnect(client);
                }
            }
        }
    }

    /// Returns false if the send failed and the client was dropped.
    fn send_to(&mut self, id: ClientId, message: &ServerMessage) -> bool {
        let Some(state) = self.clients.get_mut(&id) else {
            return false;
        };
        match send_server_message(&mut state.writer, message) {
            Ok(()) => true,
            Err(e) => {
                warn!("relay: send to {id} failed: {e}");
                self.disconnect(id);
                false
            }
        }
    }

    fn broadcast(&mut self, message: &ServerMessage) {
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        for id in ids {
            self.send_to(id, message);
        }
    }

    fn disconnect(&mut self, id: ClientId) {
        if let Some(state) = self.clients.get(&id) {
            state.writer.get_ref().shutdown(Shutdown::Both).ok();
        }
        self.remove_client(id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn ready_count(&self) -> usize {
        self.clients.values().filter(|c| c.ready).count()
    }

    pub fn is_started(&self) -> bool {
        self.barrier_released
    }

    pub fn lockstep_config(&self) -> &LockstepConfig {
        self.controller.config()
    }

    pub fn controller(&self) -> &ServerLockstepController {
        &self.controller
    }
}
