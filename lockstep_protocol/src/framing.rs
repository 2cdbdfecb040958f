// Length-delimited message framing over TCP.
//
// Each frame is a 4-byte big-endian length prefix followed by an encoded
// message (type byte + body, see `message.rs`). `write_frame` and
// `read_frame` work on raw bytes; the `send_*_message` / `recv_*_message`
// helpers combine framing with encoding for the common case.
//
// `MAX_FRAME_SIZE` (1 MB) protects against unbounded allocation from a
// malformed length prefix. The largest legitimate frame is a chunk of 255
// turns at 255 commands each, well under the limit.

use std::io::{self, Read, Write};

use crate::error::ProtocolError;
use crate::message::{ClientMessage, ServerMessage};

/// Maximum allowed frame size (1 MB).
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Write a length-delimited frame: 4-byte big-endian length, then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len();
    let len_u32 = u32::try_from(len)
        .ok()
        .filter(|&l| l <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
            )
        })?;
    writer.write_all(&len_u32.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited frame.
///
/// Returns `UnexpectedEof` if the stream closes before or during a frame and
/// `InvalidData` if the length exceeds `MAX_FRAME_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Encode and frame a client message.
pub fn send_client_message<W: Write>(
    writer: &mut W,
    message: &ClientMessage,
) -> Result<(), ProtocolError> {
    write_frame(writer, &message.encode()?)?;
    Ok(())
}

/// Encode and frame a server message.
pub fn send_server_message<W: Write>(
    writer: &mut W,
    message: &ServerMessage,
) -> Result<(), ProtocolError> {
    write_frame(writer, &message.encode()?)?;
    Ok(())
}

/// Read one frame and decode it as a client message.
pub fn recv_client_message<R: Read>(reader: &mut R) -> Result<ClientMessage, ProtocolError> {
    ClientMessage::decode(&read_frame(reader)?)
}

/// Read one frame and decode it as a server message.
pub fn recv_server_message<R: Read>(reader: &mut R) -> Result<ServerMessage, ProtocolError> {
    ServerMessage::decode(&read_frame(reader)?)
}
