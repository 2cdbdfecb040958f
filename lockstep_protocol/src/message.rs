// Message types for client-server lockstep communication.
//
// Defines `ClientMessage` (client -> server) and `ServerMessage` (server ->
// client). Each message is encoded as one type byte followed by its body;
// framing (the length prefix) is added separately by `framing.rs`.
//
// Bodies, fields in send order:
// - `LockstepCommand`:       turn:int32, kind:uint8, payload
// - `ConfirmTurns`:          turnCount:uint8, then per turn
//                            {turn:int32, commandCount:uint8, [kind + payload]}
// - `ConfirmTurnsReception`: turnCount:uint8, turns:[int32]
// - `SetLockstepConfig`:     six int32 config fields
// - `ClientReady`:           empty
// - `AllClientsReady`:       networkTimestamp:int32, remainingMsToStart:int32
//
// The type byte space is shared by both directions, but each side only
// decodes the types it can legitimately receive. A server-only type arriving
// at the server is `UnknownMessageType`, same as a byte nobody defined.
//
// Counts are `uint8`. `ServerMessage::confirm_turns_chunked` and
// `ClientMessage::confirm_reception_chunked` split long turn lists into
// several messages so callers never hit `ProtocolError::TooMany` for a list
// of turns. A single turn with more than 255 commands still fails to encode.

use serde::{Deserialize, Serialize};

use crate::codec::{MAX_LIST_LEN, WireReader, WireWriter};
use crate::command::Command;
use crate::error::ProtocolError;
use crate::turn::TurnData;
use crate::types::Turn;

/// The leading byte of every encoded message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    LockstepCommand = 2,
    ConfirmTurns = 3,
    ConfirmTurnsReception = 4,
    SetLockstepConfig = 5,
    ClientReady = 6,
    AllClientsReady = 7,
}

impl MessageType {
    pub fn byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            2 => Ok(MessageType::LockstepCommand),
            3 => Ok(MessageType::ConfirmTurns),
            4 => Ok(MessageType::ConfirmTurnsReception),
            5 => Ok(MessageType::SetLockstepConfig),
            6 => Ok(MessageType::ClientReady),
            7 => Ok(MessageType::AllClientsReady),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}

/// Lockstep timing parameters as they travel in the config handshake.
///
/// Kept as raw `int32` fields; validation and the typed config live in
/// `lockstep_core::config`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLockstepConfig {
    pub command_step_factor: i32,
    pub simulation_step: i32,
    pub min_anticipation: i32,
    pub max_anticipation: i32,
    pub execution_anticipation: i32,
    pub max_retries: i32,
}

impl SetLockstepConfig {
    pub fn write(&self, writer: &mut WireWriter) {
        writer.write_i32(self.command_step_factor);
        writer.write_i32(self.simulation_step);
        writer.write_i32(self.min_anticipation);
        writer.write_i32(self.max_anticipation);
        writer.write_i32(self.execution_anticipation);
        writer.write_i32(self.max_retries);
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            command_step_factor: reader.read_i32()?,
            simulation_step: reader.read_i32()?,
            min_anticipation: reader.read_i32()?,
            max_anticipation: reader.read_i32()?,
            execution_anticipation: reader.read_i32()?,
            max_retries: reader.read_i32()?,
        })
    }
}

/// Messages sent from a client to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Submit a command for the turn it targets.
    LockstepCommand { command: Command },
    /// Acknowledge that these turns were received and stored.
    ConfirmTurnsReception { turns: Vec<Turn> },
    /// The client has applied the config and is ready to start.
    ClientReady,
}

impl ClientMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::LockstepCommand { .. } => MessageType::LockstepCommand,
            ClientMessage::ConfirmTurnsReception { .. } => MessageType::ConfirmTurnsReception,
            ClientMessage::ClientReady => MessageType::ClientReady,
        }
    }

    /// Encode as type byte + body.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut writer = WireWriter::new();
        writer.write_u8(self.message_type().byte());
        match self {
            ClientMessage::LockstepCommand { command } => command.write(&mut writer),
            ClientMessage::ConfirmTurnsReception { turns } => {
                writer.write_count("turns", turns.len())?;
                for &turn in turns {
                    writer.write_i32(turn);
                }
            }
            ClientMessage::ClientReady => {}
        }
        Ok(writer.into_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = WireReader::new(bytes);
        let type_byte = reader.read_u8()?;
        let message = match MessageType::try_from(type_byte)? {
            MessageType::LockstepCommand => ClientMessage::LockstepCommand {
                command: Command::read(&mut reader)?,
            },
            MessageType::ConfirmTurnsReception => {
                let count = reader.read_u8()?;
                let turns = (0..count)
                    .map(|_| reader.read_i32())
                    .collect::<Result<Vec<_>, _>>()?;
                ClientMessage::ConfirmTurnsReception { turns }
            }
            MessageType::ClientReady => ClientMessage::ClientReady,
            MessageType::ConfirmTurns
            | MessageType::SetLockstepConfig
            | MessageType::AllClientsReady => {
                return Err(ProtocolError::UnknownMessageType(type_byte));
            }
        };
        reader.finish()?;
        Ok(message)
    }

    /// Split an acknowledgement list into messages of at most 255 turns.
    pub fn confirm_reception_chunked(turns: &[Turn]) -> Vec<ClientMessage> {
        turns
            .chunks(MAX_LIST_LEN)
            .map(|chunk| ClientMessage::ConfirmTurnsReception {
                turns: chunk.to_vec(),
            })
            .collect()
    }
}

/// Messages sent from the server to a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    /// Config handshake, sent once right after the connection is accepted.
    SetLockstepConfig(SetLockstepConfig),
    /// Confirmed turn contents. May repeat turns the client already has.
    ConfirmTurns { turns: Vec<TurnData> },
    /// Start barrier released.
    AllClientsReady {
        network_timestamp: i32,
        remaining_ms_to_start: i32,
    },
}

impl ServerMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            ServerMessage::SetLockstepConfig(_) => MessageType::SetLockstepConfig,
            ServerMessage::ConfirmTurns { .. } => MessageType::ConfirmTurns,
            ServerMessage::AllClientsReady { .. } => MessageType::AllClientsReady,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut writer = WireWriter::new();
        writer.write_u8(self.message_type().byte());
        match self {
            ServerMessage::SetLockstepConfig(config) => config.write(&mut writer),
            ServerMessage::ConfirmTurns { turns } => {
                writer.write_count("turns", turns.len())?;
                for turn in turns {
                    turn.write(&mut writer)?;
                }
            }
            ServerMessage::AllClientsReady {
                network_timestamp,
                remaining_ms_to_start,
            } => {
                writer.write_i32(*network_timestamp);
                writer.write_i32(*remaining_ms_to_start);
            }
        }
        Ok(writer.into_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = WireReader::new(bytes);
        let type_byte = reader.read_u8()?;
        let message = match MessageType::try_from(type_byte)? {
            MessageType::SetLockstepConfig => {
                ServerMessage::SetLockstepConfig(SetLockstepConfig::read(&mut reader)?)
            }
            MessageType::ConfirmTurns => {
                let count = reader.read_u8()?;
                let turns = (0..count)
                    .map(|_| TurnData::read(&mut reader))
                    .collect::<Result<Vec<_>, _>>()?;
                ServerMessage::ConfirmTurns { turns }
            }
            MessageType::AllClientsReady => ServerMessage::AllClientsReady {
                network_timestamp: reader.read_i32()?,
                remaining_ms_to_start: reader.read_i32()?,
            },
            MessageType::LockstepCommand
            | MessageType::ConfirmTurnsReception
            | MessageType::ClientReady => {
                return Err(ProtocolError::UnknownMessageType(type_byte));
            }
        };
        reader.finish()?;
        Ok(message)
    }

    /// Split a turn list into `ConfirmTurns` messages of at most 255 turns,
    /// preserving order.
    pub fn confirm_turns_chunked(turns: Vec<TurnData>) -> Vec<ServerMessage> {
        let mut messages = Vec::with_capacity(turns.len().div_ceil(MAX_LIST_LEN));
        let mut iter = turns.into_iter().peekable();
        while iter.peek().is_some() {
            let chunk: Vec<TurnData> = iter.by_ref().take(MAX_LIST_LEN).collect();
            messages.push(ServerMessage::ConfirmTurns { turns: chunk });
        }
        messages
    }
}
