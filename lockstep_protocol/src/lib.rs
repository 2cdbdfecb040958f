// lockstep_protocol — wire protocol for deterministic lockstep sessions.
//
// This crate defines the command model, the message contracts, the binary
// codec, and the framing shared by the lockstep controllers
// (`lockstep_core`) and the TCP relay (`lockstep_relay`). It has no timers,
// no controller state, and no simulation logic.
//
// Module overview:
// - `types.rs`:    `Turn` and `ClientId`.
// - `error.rs`:    `ProtocolError`, the fatal decode/encode failures.
// - `codec.rs`:    `WireWriter` / `WireReader`: big-endian int32 and uint8
//                  fields with bounds-checked reads.
// - `command.rs`:  `CommandKind`, `CommandAction` (the closed command set),
//                  and `Command` (an action bound to a turn).
// - `turn.rs`:     `TurnData`, the ordered commands confirmed for one turn.
// - `message.rs`:  `ClientMessage` / `ServerMessage` and their binary bodies.
// - `framing.rs`:  4-byte big-endian length prefix over any `Read`/`Write`.
//
// Design decisions:
// - **Binary bodies.** Commands travel as kind byte + fixed payload, turns as
//   int32, counts as uint8. Both peers must agree on every byte because the
//   payloads have no self-describing structure.
// - **Closed command set.** `CommandAction` is an enum rather than a trait
//   object registry, so decoding is total over the known kinds and an
//   unknown kind byte is an error rather than a lookup miss.
// - **No async runtime.** Framing uses `std::io::Read`/`Write`, compatible
//   with blocking TCP streams and buffered wrappers.

pub mod codec;
pub mod command;
pub mod error;
pub mod framing;
pub mod message;
pub mod turn;
pub mod types;

pub use codec::{MAX_LIST_LEN, WireReader, WireWriter};
pub use command::{Command, CommandAction, CommandKind};
pub use error::ProtocolError;
pub use framing::{
    MAX_FRAME_SIZE, read_frame, recv_client_message, recv_server_message, send_client_message,
    send_server_message, write_frame,
};
pub use message::{ClientMessage, MessageType, ServerMessage, SetLockstepConfig};
pub use turn::TurnData;
pub use types::{ClientId, Turn};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn client_roundtrip(msg: &ClientMessage) {
        let mut wire = Vec::new();
        send_client_message(&mut wire, msg).unwrap();
        let mut cursor = Cursor::new(&wire);
        assert_eq!(&recv_client_message(&mut cursor).unwrap(), msg);
    }

    fn server_roundtrip(msg: &ServerMessage) {
        let mut wire = Vec::new();
        send_server_message(&mut wire, msg).unwrap();
        let mut cursor = Cursor::new(&wire);
        assert_eq!(&recv_server_message(&mut cursor).unwrap(), msg);
    }

    #[test]
    fn roundtrip_every_client_message() {
        for action in [
            CommandAction::Click { x: -5, y: 7 },
            CommandAction::SpawnUnit {
                unit: 255,
                x: i32::MIN,
                y: i32::MAX,
            },
            CommandAction::AdjustValue { delta: 0 },
        ] {
            client_roundtrip(&ClientMessage::LockstepCommand {
                command: Command::new(42, action),
            });
        }
        client_roundtrip(&ClientMessage::ConfirmTurnsReception {
            turns: vec![3, 4, 5],
        });
        client_roundtrip(&ClientMessage::ClientReady);
    }

    #[test]
    fn roundtrip_every_server_message() {
        server_roundtrip(&ServerMessage::SetLockstepConfig(SetLockstepConfig {
            command_step_factor: 10,
            simulation_step: 10,
            min_anticipation: 1,
            max_anticipation: 20,
            execution_anticipation: 2,
            max_retries: 2,
        }));
        server_roundtrip(&ServerMessage::ConfirmTurns {
            turns: vec![
                TurnData::new(7),
                TurnData::with_actions(
                    8,
                    [
                        CommandAction::SpawnUnit { unit: 1, x: 2, y: 3 },
                        CommandAction::SpawnUnit { unit: 1, x: 2, y: 3 },
                    ],
                ),
            ],
        });
        server_roundtrip(&ServerMessage::AllClientsReady {
            network_timestamp: -1,
            remaining_ms_to_start: 0,
        });
    }

    #[test]
    fn command_action_json_is_tagged_by_variant() {
        // Replay tooling and test fixtures dump actions as JSON.
        let json = serde_json::to_value(CommandAction::Click { x: 1, y: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({ "Click": { "x": 1, "y": 2 } }));
    }
}
