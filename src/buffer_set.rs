//! Buffer set for state machine operations.

use std::io::{ErrorKind, Read};

use crate::error::Result;
use crate::protocol::backend::RawMessage;
use crate::protocol::codec::{FRAME_HEADER_LEN, parse_frame_header};

/// Buffer set for state machine operations.
pub struct BufferSet {
    /// Read buffer for incoming messages
    pub read_buffer: Vec<u8>,
    /// Write buffer for outgoing messages
    pub write_buffer: Vec<u8>,
    /// Type byte of the last message read
    pub type_byte: u8,
}

impl BufferSet {
    /// Create a new buffer set.
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(8192),
            type_byte: 0,
        }
    }

    /// The last message read.
    pub fn message(&self) -> RawMessage<'_> {
        RawMessage::new(self.type_byte, &self.read_buffer)
    }

    /// Read one frame into `read_buffer`.
    ///
    /// Returns `Ok(false)` if the reader is at end of input before the type
    /// byte. End of input inside a frame is an `UnexpectedEof` I/O error.
    pub fn read_frame<R: Read>(&mut self, reader: &mut R) -> Result<bool> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        match reader.read(&mut header[..1]) {
            Ok(0) => return Ok(false),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return self.read_frame(reader),
            Err(e) => return Err(e.into()),
        }
        reader.read_exact(&mut header[1..])?;

        let (type_byte, payload_len) = parse_frame_header(&header)?;
        self.type_byte = type_byte;
        self.read_buffer.clear();
        self.read_buffer.resize(payload_len, 0);
        reader.read_exact(&mut self.read_buffer)?;
        Ok(true)
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
