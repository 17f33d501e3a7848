//! Session startup and termination messages.

use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::PROTOCOL_VERSION;

use super::msg_type;

/// Write a Startup message.
///
/// Credentials are passed through as-is; the server decides how to check them.
pub fn write_startup(buf: &mut Vec<u8>, user: &str, password: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::STARTUP);
    msg.write_u16(PROTOCOL_VERSION);
    msg.write_cstr(user);
    msg.write_lbytes(password.as_bytes());
    msg.finish();
}

/// Write a ResumeSession message carrying the token minted at suspend time.
pub fn write_resume_session(buf: &mut Vec<u8>, token: &str) {
    let mut msg = MessageBuilder::new(buf, msg_type::RESUME_SESSION);
    msg.write_u16(PROTOCOL_VERSION);
    msg.write_lbytes(token.as_bytes());
    msg.finish();
}

/// Write an EndSession message.
pub fn write_end_session(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, msg_type::END_SESSION);
    msg.finish();
}
