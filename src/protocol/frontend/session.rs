//! Session-level control messages. Each expects a single reply frame.

use crate::protocol::codec::MessageBuilder;

use super::msg_type;

fn write_empty(buf: &mut Vec<u8>, type_byte: u8) {
    MessageBuilder::new(buf, type_byte).finish();
}

/// Write a Ping message.
pub fn write_ping(buf: &mut Vec<u8>) {
    write_empty(buf, msg_type::PING);
}

/// Write an Identify message.
pub fn write_identify(buf: &mut Vec<u8>) {
    write_empty(buf, msg_type::IDENTIFY);
}

/// Write a Commit message.
pub fn write_commit(buf: &mut Vec<u8>) {
    write_empty(buf, msg_type::COMMIT);
}

/// Write a Rollback message.
pub fn write_rollback(buf: &mut Vec<u8>) {
    write_empty(buf, msg_type::ROLLBACK);
}

/// Write an Autocommit message.
pub fn write_autocommit(buf: &mut Vec<u8>, on: bool) {
    let mut msg = MessageBuilder::new(buf, msg_type::AUTOCOMMIT);
    msg.write_u8(u8::from(on));
    msg.finish();
}

/// Write a SuspendSession message.
pub fn write_suspend_session(buf: &mut Vec<u8>) {
    write_empty(buf, msg_type::SUSPEND_SESSION);
}
