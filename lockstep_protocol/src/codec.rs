// Binary field codec for message bodies.
//
// `WireWriter` appends big-endian fixed-width fields to a growable buffer;
// `WireReader` walks a borrowed byte slice and fails with
// `ProtocolError::Truncated` instead of panicking when a field runs past the
// end. Only the field widths the message contracts use are provided: `uint8`
// for kind bytes and list counts, `int32` for everything else.
//
// Counts are written with `write_count`, which refuses lists longer than 255
// entries rather than silently wrapping the `uint8`.

use crate::error::ProtocolError;

/// Largest list length a `uint8` count prefix can describe.
pub const MAX_LIST_LEN: usize = u8::MAX as usize;

/// Append-only encoder for message bodies.
#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a `uint8` list count. `what` names the list in the error.
    pub fn write_count(&mut self, what: &'static str, count: usize) -> Result<(), ProtocolError> {
        let byte = u8::try_from(count).map_err(|_| ProtocolError::TooMany { what, count })?;
        self.write_u8(byte);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Cursor over a received message body.
#[derive(Debug)]
pub struct WireReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ProtocolError::Truncated { needed, remaining });
        }
        let slice = &self.bytes[self.position..self.position + needed];
        self.position += needed;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(i32::from_be_bytes(raw))
    }

    /// Require that the whole body was consumed.
    pub fn finish(self) -> Result<(), ProtocolError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(ProtocolError::TrailingBytes(extra)),
        }
    }
}
