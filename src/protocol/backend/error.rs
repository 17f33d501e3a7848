//! Error response message.

use crate::error::{Error, Result};
use crate::protocol::codec::{MessageBuilder, read_i64, read_lstr, read_u8};
use crate::protocol::types::ErrorKind;

use super::msg_type;

/// Error message from the server.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// Classification
    pub kind: ErrorKind,
    /// Backend error number
    pub code: i64,
    /// Human readable message
    pub message: String,
}

impl ErrorResponse {
    /// Parse an Error message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (kind, rest) = read_u8(payload)?;
        let (code, rest) = read_i64(rest)?;
        let (message, _) = read_lstr(rest)?;
        Ok(Self {
            kind: ErrorKind::from_u8(kind),
            code,
            message: message.to_string(),
        })
    }

    /// Write an Error message.
    pub fn write(buf: &mut Vec<u8>, kind: ErrorKind, code: i64, message: &str) {
        let mut msg = MessageBuilder::new(buf, msg_type::ERROR);
        msg.write_u8(kind as u8);
        msg.write_i64(code);
        msg.write_lbytes(message.as_bytes());
        msg.finish();
    }

    /// Convert to an Error.
    pub fn into_error(self) -> Error {
        Error::from_server(self.kind, self.code, self.message)
    }
}
