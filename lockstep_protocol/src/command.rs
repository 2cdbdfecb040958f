// Player commands scheduled into lockstep turns.
//
// A `Command` is a unit of player intent bound to the turn it should execute
// on. The intent itself is a `CommandAction`, a closed enum: adding a new
// kind of command means adding a variant here, a kind byte in `CommandKind`,
// and the payload layout in `write_payload` / `read_payload`. The compiler
// then points at every match that needs updating.
//
// Wire layout of an action: one kind byte, then a fixed-size big-endian
// payload determined by the kind. Payloads carry no length prefix, so an
// unknown kind byte makes the rest of the message unreadable and is reported
// as `ProtocolError::UnknownCommandKind`.
//
// Identity: two commands are equal when their turn and action are equal. The
// retry counter is local bookkeeping and is neither compared nor sent. This
// is what lets a client recognise its own pending command when the server
// echoes it back in a confirmed turn.
//
// See also: `turn.rs` for `TurnData`, `message.rs` for the messages that carry
// commands.

use serde::{Deserialize, Serialize};

use crate::codec::{WireReader, WireWriter};
use crate::error::ProtocolError;
use crate::types::Turn;

/// Discriminant of a `CommandAction`, as sent on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandKind {
    Click = 1,
    SpawnUnit = 2,
    AdjustValue = 3,
}

impl CommandKind {
    /// Every known kind, in kind-byte order.
    pub const ALL: [CommandKind; 3] = [
        CommandKind::Click,
        CommandKind::SpawnUnit,
        CommandKind::AdjustValue,
    ];

    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            1 => Ok(CommandKind::Click),
            2 => Ok(CommandKind::SpawnUnit),
            3 => Ok(CommandKind::AdjustValue),
            other => Err(ProtocolError::UnknownCommandKind(other)),
        }
    }
}

/// What a command does when applied to the simulation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandAction {
    /// A click/tap on the playfield.
    Click { x: i32, y: i32 },
    /// Spawn a unit of the given type at a position.
    SpawnUnit { unit: u8, x: i32, y: i32 },
    /// Add `delta` to a shared counter.
    AdjustValue { delta: i32 },
}

impl CommandAction {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandAction::Click { .. } => CommandKind::Click,
            CommandAction::SpawnUnit { .. } => CommandKind::SpawnUnit,
            CommandAction::AdjustValue { .. } => CommandKind::AdjustValue,
        }
    }

    /// Write the kind byte followed by the payload.
    pub fn write(&self, writer: &mut WireWriter) {
        writer.write_u8(self.kind().byte());
        self.write_payload(writer);
    }

    fn write_payload(&self, writer: &mut WireWriter) {
        match *self {
            CommandAction::Click { x, y } => {
                writer.write_i32(x);
                writer.write_i32(y);
            }
            CommandAction::SpawnUnit { unit, x, y } => {
                writer.write_u8(unit);
                writer.write_i32(x);
                writer.write_i32(y);
            }
            CommandAction::AdjustValue { delta } => {
                writer.write_i32(delta);
            }
        }
    }

    /// Read a kind byte and the payload it implies.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let kind = CommandKind::try_from(reader.read_u8()?)?;
        Self::read_payload(kind, reader)
    }

    /// Construct an action of a known kind from its payload.
    pub fn read_payload(kind: CommandKind, reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(match kind {
            CommandKind::Click => CommandAction::Click {
                x: reader.read_i32()?,
                y: reader.read_i32()?,
            },
            CommandKind::SpawnUnit => CommandAction::SpawnUnit {
                unit: reader.read_u8()?,
                x: reader.read_i32()?,
                y: reader.read_i32()?,
            },
            CommandKind::AdjustValue => CommandAction::AdjustValue {
                delta: reader.read_i32()?,
            },
        })
    }
}

/// A command bound to a target turn.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    turn: Turn,
    retries: u32,
    action: CommandAction,
}

impl Command {
    pub fn new(turn: Turn, action: CommandAction) -> Self {
        Self {
            turn,
            retries: 0,
            action,
        }
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    /// How many times this command has been rescheduled.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn action(&self) -> &CommandAction {
        &self.action
    }

    pub fn kind(&self) -> CommandKind {
        self.action.kind()
    }

    /// Reschedule to `turn` after a missed confirmation.
    pub fn retry(&mut self, turn: Turn) {
        self.retries += 1;
        self.turn = turn;
    }

    /// Write `turn:int32` followed by the action (the `LockstepCommand` body).
    pub fn write(&self, writer: &mut WireWriter) {
        writer.write_i32(self.turn);
        self.action.write(writer);
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let turn = reader.read_i32()?;
        let action = CommandAction::read(reader)?;
        Ok(Self::new(turn, action))
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.turn == other.turn && self.action == other.action
    }
}

impl Eq for Command {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_bytes_are_a_total_mapping() {
        for kind in CommandKind::ALL {
            assert_eq!(CommandKind::try_from(kind.byte()).unwrap(), kind);
        }
        for byte in [0u8, 4, 200, 255] {
            assert!(matches!(
                CommandKind::try_from(byte),
                Err(ProtocolError::UnknownCommandKind(b)) if b == byte
            ));
        }
    }

    #[test]
    fn equality_ignores_retries() {
        let original = Command::new(5, CommandAction::Click { x: 1, y: 2 });
        let mut retried = Command::new(3, CommandAction::Click { x: 1, y: 2 });
        retried.retry(5);
        assert_eq!(retried.retries(), 1);
        assert_eq!(original, retried);
    }

    #[test]
    fn equality_is_structural_over_turn_and_payload() {
        let a = Command::new(5, CommandAction::AdjustValue { delta: 1 });
        assert_ne!(a, Command::new(6, CommandAction::AdjustValue { delta: 1 }));
        assert_ne!(a, Command::new(5, CommandAction::AdjustValue { delta: 2 }));
        assert_ne!(a, Command::new(5, CommandAction::Click { x: 1, y: 0 }));
    }

    #[test]
    fn spawn_unit_wire_layout() {
        let command = Command::new(
            7,
            CommandAction::SpawnUnit {
                unit: 9,
                x: -1,
                y: 2,
            },
        );
        let mut writer = WireWriter::new();
        command.write(&mut writer);
        assert_eq!(
            writer.as_bytes(),
            &[0, 0, 0, 7, 2, 9, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 2]
        );

        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes);
        let decoded = Command::read(&mut reader).unwrap();
        reader.finish().unwrap();
        assert_eq!(decoded, command);
        assert_eq!(decoded.retries(), 0);
    }

    #[test]
    fn unknown_kind_is_a_protocol_error() {
        let mut reader = WireReader::new(&[0, 0, 0, 1, 42, 0, 0, 0, 0]);
        assert!(matches!(
            Command::read(&mut reader),
            Err(ProtocolError::UnknownCommandKind(42))
        ));
    }

    #[test]
    fn short_payload_is_a_protocol_error() {
        // Click needs 8 payload bytes; only 4 present.
        let mut reader = WireReader::new(&[1, 0, 0, 0, 1]);
        assert!(matches!(
            CommandAction::read(&mut reader),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
