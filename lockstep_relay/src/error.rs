// Transport errors for the relay and the client connection.

use std::io;

use lockstep_core::ConfigError;
use lockstep_protocol::{MessageType, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("network i/o: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid lockstep config: {0}")]
    Config(#[from] ConfigError),

    #[error("expected SetLockstepConfig during handshake, got {0:?}")]
    UnexpectedHandshake(MessageType),

    #[error("session is full")]
    SessionFull,

    #[error("session already started")]
    SessionStarted,
}
