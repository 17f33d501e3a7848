//! Session-level backend messages.

use crate::error::Result;
use crate::protocol::codec::{MessageBuilder, read_cstr, read_lstr, read_u8, read_u16};

use super::msg_type;

/// Session flag: autocommit is on.
pub const SESSION_AUTOCOMMIT: u8 = 0x01;
/// Session flag: a transaction is open.
pub const SESSION_IN_TRANSACTION: u8 = 0x02;

/// SessionReady message - the server accepted the startup or resume.
#[derive(Debug, Clone, Copy)]
pub struct SessionReady<'a> {
    /// Backend identity, e.g. "oracle" or "mysql"
    pub server_name: &'a str,
    /// Proxy server version
    pub server_version: &'a str,
    /// `SESSION_AUTOCOMMIT` | `SESSION_IN_TRANSACTION`
    pub flags: u8,
}

impl<'a> SessionReady<'a> {
    /// Parse a SessionReady message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (server_name, rest) = read_cstr(payload)?;
        let (server_version, rest) = read_cstr(rest)?;
        let (flags, _) = read_u8(rest)?;
        Ok(Self {
            server_name,
            server_version,
            flags,
        })
    }

    /// Write a SessionReady message.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let mut msg = MessageBuilder::new(buf, msg_type::SESSION_READY);
        msg.write_cstr(self.server_name);
        msg.write_cstr(self.server_version);
        msg.write_u8(self.flags);
        msg.finish();
    }
}

/// Value message - a single string answer (identify).
#[derive(Debug, Clone, Copy)]
pub struct Value<'a>(pub &'a str);

impl<'a> Value<'a> {
    /// Parse a Value message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (value, _) = read_cstr(payload)?;
        Ok(Self(value))
    }

    /// Write a Value message.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let mut msg = MessageBuilder::new(buf, msg_type::VALUE);
        msg.write_cstr(self.0);
        msg.finish();
    }
}

/// Suspended message - where and how to reclaim a parked session.
#[derive(Debug, Clone, Copy)]
pub struct Suspended<'a> {
    /// Host to reconnect to (empty = same host)
    pub host: &'a str,
    /// Port to reconnect to
    pub port: u16,
    /// Single-use token
    pub token: &'a str,
}

impl<'a> Suspended<'a> {
    /// Parse a Suspended message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (host, rest) = read_cstr(payload)?;
        let (port, rest) = read_u16(rest)?;
        let (token, _) = read_lstr(rest)?;
        Ok(Self { host, port, token })
    }

    /// Write a Suspended message.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let mut msg = MessageBuilder::new(buf, msg_type::SUSPENDED);
        msg.write_cstr(self.host);
        msg.write_u16(self.port);
        msg.write_lbytes(self.token.as_bytes());
        msg.finish();
    }
}

/// Write an Ok message.
pub fn write_ok(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, msg_type::OK).finish();
}
