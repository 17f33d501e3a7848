//! Relay wire protocol encoding and decoding primitives.
//!
//! All integers are big-endian. Identifiers are NUL-terminated, values are
//! length-prefixed so they may contain NUL bytes.

use crate::error::{Error, Result};
use zerocopy::FromBytes;

use super::types::{I32BE, I64BE, U16BE, U32BE, U64BE};

/// Size of the frame header: type byte plus 4-byte length.
pub const FRAME_HEADER_LEN: usize = 5;

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((first, rest)) => Ok((*first, rest)),
        None => Err(Error::Protocol("read_u8: empty buffer".into())),
    }
}

macro_rules! read_be {
    ($(#[$doc:meta])* $fn_name:ident, $wrapper:ident, $native:ty, $len:literal) => {
        $(#[$doc])*
        #[inline]
        pub fn $fn_name(data: &[u8]) -> Result<($native, &[u8])> {
            if data.len() < $len {
                return Err(Error::Protocol(format!(
                    concat!(stringify!($fn_name), ": buffer too short: {} < ", $len),
                    data.len()
                )));
            }
            let (head, rest) = data.split_at($len);
            let value = $wrapper::ref_from_bytes(head)
                .map_err(|e| Error::Protocol(format!(concat!(stringify!($fn_name), ": {:?}"), e)))?
                .get();
            Ok((value, rest))
        }
    };
}

read_be!(
    /// Read 2-byte big-endian unsigned integer.
    read_u16, U16BE, u16, 2
);
read_be!(
    /// Read 4-byte big-endian unsigned integer.
    read_u32, U32BE, u32, 4
);
read_be!(
    /// Read 4-byte big-endian signed integer.
    read_i32, I32BE, i32, 4
);
read_be!(
    /// Read 8-byte big-endian unsigned integer.
    read_u64, U64BE, u64, 8
);
read_be!(
    /// Read 8-byte big-endian signed integer.
    read_i64, I64BE, i64, 8
);

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::Protocol(format!(
            "read_bytes: buffer too short: {} < {}",
            data.len(),
            len
        )));
    }
    Ok(data.split_at(len))
}

/// Read null-terminated string.
/// Returns the string bytes (without the null terminator) and remaining data.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::Protocol(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::basic::from_utf8(bytes)
        .map_err(|_| Error::Protocol("read_cstr: invalid UTF-8".into()))?;
    Ok((s, rest))
}

/// Read u32 length-prefixed bytes.
#[inline]
pub fn read_lbytes(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_u32(data)?;
    read_bytes(rest, len as usize)
}

/// Read u32 length-prefixed UTF-8 string.
#[inline]
pub fn read_lstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_lbytes(data)?;
    let s = simdutf8::basic::from_utf8(bytes)
        .map_err(|_| Error::Protocol("read_lstr: invalid UTF-8".into()))?;
    Ok((s, rest))
}

/// Read i32 length-prefixed bytes where -1 means NULL.
#[inline]
pub fn read_nullable(data: &[u8]) -> Result<(Option<&[u8]>, &[u8])> {
    let (len, rest) = read_i32(data)?;
    if len < 0 {
        return Ok((None, rest));
    }
    let (bytes, rest) = read_bytes(rest, len as usize)?;
    Ok((Some(bytes), rest))
}

/// Write 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte big-endian unsigned integer.
#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian signed integer.
#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 8-byte big-endian unsigned integer.
#[inline]
pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 8-byte big-endian signed integer.
#[inline]
pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write raw bytes.
#[inline]
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write null-terminated string.
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Write u32 length-prefixed bytes.
#[inline]
pub fn write_lbytes(out: &mut Vec<u8>, data: &[u8]) {
    write_u32(out, data.len() as u32);
    out.extend_from_slice(data);
}

/// Write i32 length-prefixed bytes, -1 for NULL.
#[inline]
pub fn write_nullable(out: &mut Vec<u8>, data: Option<&[u8]>) {
    match data {
        Some(bytes) => {
            write_i32(out, bytes.len() as i32);
            out.extend_from_slice(bytes);
        }
        None => write_i32(out, -1),
    }
}

/// Split a frame header into its type byte and payload length.
pub fn parse_frame_header(header: &[u8; FRAME_HEADER_LEN]) -> Result<(u8, usize)> {
    let length = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
    if length < 4 {
        return Err(Error::Protocol(format!(
            "Invalid message length: {}",
            length
        )));
    }
    Ok((header[0], (length - 4) as usize))
}

/// Message builder helper that handles the length field.
///
/// Relay message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        Self { buf, start }
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    /// Write a u16.
    pub fn write_u16(&mut self, value: u16) {
        write_u16(self.buf, value);
    }

    /// Write a u32.
    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    /// Write a u64.
    pub fn write_u64(&mut self, value: u64) {
        write_u64(self.buf, value);
    }

    /// Write an i64.
    pub fn write_i64(&mut self, value: i64) {
        write_i64(self.buf, value);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        write_bytes(self.buf, data);
    }

    /// Write null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Write length-prefixed bytes.
    pub fn write_lbytes(&mut self, data: &[u8]) {
        write_lbytes(self.buf, data);
    }

    /// Write nullable length-prefixed bytes.
    pub fn write_nullable(&mut self, data: Option<&[u8]>) {
        write_nullable(self.buf, data);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as u32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}
