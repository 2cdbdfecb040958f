// Protocol desync errors.
//
// Everything that can go wrong while decoding or encoding a lockstep message.
// These are always fatal for the message (and, in the relay, for the
// connection): the decoder never guesses past an unknown kind byte or a short
// payload, because the command payloads carry no length prefix and there is
// no way to resynchronize the stream.

use thiserror::Error;

/// A malformed, truncated, or unencodable lockstep message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A command kind byte outside the known command table.
    #[error("unknown command kind byte {0}")]
    UnknownCommandKind(u8),

    /// A message type byte that is not valid for this direction.
    #[error("unknown message type byte {0}")]
    UnknownMessageType(u8),

    /// The body ended before a field could be read.
    #[error("truncated message: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// The body was fully decoded but bytes were left over.
    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),

    /// A list too long for its `uint8` count prefix.
    #[error("too many {what} for one message: {count} (max 255)")]
    TooMany { what: &'static str, count: usize },

    /// Framing-level I/O failure.
    #[error("frame i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
