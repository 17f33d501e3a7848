//! Relay backend (server → client) messages.
//!
//! Every message has a `parse` for the client and a `write` used by the
//! result cache, which stores backend frames verbatim.

pub mod error;
pub mod query;
pub mod session;

pub use error::ErrorResponse;
pub use query::{BatchEnd, ColumnDescription, DataRow, Describe, OutputBinds};
pub use session::{SessionReady, Suspended, Value};

/// Backend message type bytes.
pub mod msg_type {
    /// Session established
    pub const SESSION_READY: u8 = b'K';
    /// Error
    pub const ERROR: u8 = b'E';
    /// Success without payload
    pub const OK: u8 = b'O';
    /// Single string value
    pub const VALUE: u8 = b'V';
    /// Result set description
    pub const DESCRIBE: u8 = b'T';
    /// Output bind values
    pub const OUTPUT_BINDS: u8 = b'o';
    /// One row
    pub const DATA_ROW: u8 = b'D';
    /// End of a batch of rows
    pub const BATCH_END: u8 = b'C';
    /// Session parked
    pub const SUSPENDED: u8 = b'z';
}

/// Raw message from the relay server.
///
/// This is a thin wrapper around the message type byte and payload.
/// Individual message types are parsed on demand by state machines.
#[derive(Debug, Clone, Copy)]
pub struct RawMessage<'a> {
    /// Message type byte
    pub type_byte: u8,
    /// Message payload (after length field)
    pub payload: &'a [u8],
}

impl<'a> RawMessage<'a> {
    /// Create a new RawMessage.
    pub fn new(type_byte: u8, payload: &'a [u8]) -> Self {
        Self { type_byte, payload }
    }

    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        self.type_byte == msg_type::ERROR
    }
}
