// lockstep_core — turn controllers for deterministic lockstep sessions.
//
// Pure, single-threaded state machines with no I/O and no clock of their
// own: every entry point takes an explicit millisecond timestamp, and every
// side effect the outside world needs (messages to send, stalls, applied
// commands) comes back as an event from `drain_events()`. The TCP transport
// lives in `lockstep_relay`; this crate only depends on the wire types.
//
// Module overview:
// - `config.rs`:   `LockstepConfig`, `ServerConfig`, `SessionConfig`, their
//                  invariants, JSON loading, and handshake conversion.
// - `event.rs`:    `ClientEvent` / `ServerEvent`.
// - `model.rs`:    `Simulateable`, the simulation the client drives.
// - `client.rs`:   `ClientLockstepController`: turn clock, confirmation
//                  gating, bounded model stepping, pending-command retry,
//                  adaptive anticipation.
// - `server.rs`:   `ServerLockstepController`: turn sealing, command
//                  admission, per-client acknowledgement tracking.
// - `recorder.rs`: `LockstepRecorder` / `ReplayLoader` command traces.
//
// **Critical constraint: determinism.** Given the same config and the same
// confirmed turns, two client controllers make the same `simulate` and
// `apply_command` calls in the same order. Turn and model time are integers
// and all per-turn state lives in ordered maps.

pub mod client;
pub mod config;
pub mod event;
pub mod model;
pub mod recorder;
pub mod server;

pub use client::{ClientLockstepController, MAX_SIMULATION_STEPS_PER_UPDATE};
pub use config::{ConfigError, LockstepConfig, ServerConfig, SessionConfig};
pub use event::{ClientEvent, ServerEvent};
pub use model::{NullModel, Simulateable};
pub use recorder::{LockstepRecorder, Replay, ReplayError, ReplayLoader};
pub use server::ServerLockstepController;
