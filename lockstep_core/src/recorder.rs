// Deterministic command traces for bug repro and QA.
//
// `LockstepRecorder` collects every command a client applied, in application
// order, from the controller's `ClientEvent::CommandApplied` events. The
// trace is written in the same binary field encoding as the wire protocol:
//
//   config:     the six SetLockstepConfig int32 fields
//   count:      int32
//   commands:   count x (turn:int32, kind:uint8, payload)
//
// `ReplayLoader` reads a trace back into a `Replay`, which builds a client
// controller with turn confirmation disabled and every recorded command
// pre-loaded as confirmed. Stepping that controller over the same span of
// time reproduces the recorded `apply_command` sequence without a server.

use std::io::{Read, Write};

use lockstep_protocol::{Command, ProtocolError, SetLockstepConfig, Turn, WireReader, WireWriter};
use thiserror::Error;

use crate::client::ClientLockstepController;
use crate::config::{ConfigError, LockstepConfig};
use crate::event::ClientEvent;
use crate::model::Simulateable;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("replay encoding: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("replay config: {0}")]
    Config(#[from] ConfigError),

    #[error("replay i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("replay has invalid command count {0}")]
    InvalidCount(i32),

    #[error("replay too long to encode: {0} commands")]
    TooLong(usize),
}

/// Accumulates applied commands for later replay.
#[derive(Clone, Debug)]
pub struct LockstepRecorder {
    config: LockstepConfig,
    commands: Vec<Command>,
}

impl LockstepRecorder {
    pub fn new(config: LockstepConfig) -> Self {
        Self {
            config,
            commands: Vec::new(),
        }
    }

    /// Record every `CommandApplied` in a batch of drained events.
    pub fn observe(&mut self, events: &[ClientEvent]) {
        for event in events {
            if let ClientEvent::CommandApplied(command) = event {
                self.record(command);
            }
        }
    }

    pub fn record(&mut self, command: &Command) {
        self.commands.push(Command::new(command.turn(), command.action().clone()));
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ReplayError> {
        let mut writer = WireWriter::new();
        SetLockstepConfig::from(&self.config).write(&mut writer);
        let count =
            i32::try_from(self.commands.len()).map_err(|_| ReplayError::TooLong(self.commands.len()))?;
        writer.write_i32(count);
        for command in &self.commands {
            command.write(&mut writer);
        }
        Ok(writer.into_bytes())
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), ReplayError> {
        writer.write_all(&self.serialize()?)?;
        writer.flush()?;
        Ok(())
    }
}

/// A decoded trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Replay {
    pub config: LockstepConfig,
    pub commands: Vec<Command>,
}

impl Replay {
    /// Last turn with a recorded command, or 0 for an empty trace.
    pub fn last_turn(&self) -> Turn {
        self.commands.iter().map(Command::turn).max().unwrap_or(0)
    }

    /// Model time at which the last recorded command has been applied.
    pub fn duration_ms(&self) -> i64 {
        i64::from(self.last_turn()) * self.config.command_step()
    }

    /// Build a controller that replays this trace into `model`. Call
    /// `start` and `update` on it as usual.
    pub fn into_controller<M: Simulateable>(
        self,
        model: M,
    ) -> Result<ClientLockstepController<M>, ConfigError> {
        let mut controller = ClientLockstepController::new(model, self.config)?;
        controller.set_needs_turn_confirmation(false);
        for command in self.commands {
            controller.add_confirmed_command(command);
        }
        Ok(controller)
    }
}

/// Reads traces written by `LockstepRecorder`.
pub struct ReplayLoader;

impl ReplayLoader {
    pub fn read(bytes: &[u8]) -> Result<Replay, ReplayError> {
        let mut reader = WireReader::new(bytes);
        let config = LockstepConfig::try_from(SetLockstepConfig::read(&mut reader)?)?;
        let count = reader.read_i32()?;
        let count = usize::try_from(count).map_err(|_| ReplayError::InvalidCount(count))?;
        let mut commands = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            commands.push(Command::read(&mut reader)?);
        }
        reader.finish()?;
        Ok(Replay { config, commands })
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Replay, ReplayError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::read(&bytes)
    }
}
