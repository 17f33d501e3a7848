//! Single round-trip session commands.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::{ErrorResponse, Suspended, Value, msg_type};
use crate::protocol::frontend::{
    write_abort_result_set, write_autocommit, write_commit, write_identify, write_ping,
    write_rollback, write_suspend_session,
};
use crate::protocol::types::ResultSetId;

use super::StateMachine;
use super::action::Action;

/// A command answered by exactly one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Identify,
    Commit,
    Rollback,
    Autocommit(bool),
    SuspendSession,
    AbortResultSet(ResultSetId),
}

/// Reply to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain acknowledgement
    Ok,
    /// String answer (identify)
    Value(String),
    /// The session was parked
    Suspended {
        /// Host to reconnect to (empty = same host)
        host: String,
        /// Port to reconnect to
        port: u16,
        /// Single-use token
        token: String,
    },
}

/// State machine for a [`Command`].
pub struct CommandStateMachine {
    command: Command,
    reply: Option<Reply>,
}

impl CommandStateMachine {
    /// Create a new command state machine.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            reply: None,
        }
    }

    /// Take the reply after the state machine finished.
    pub fn take_reply(&mut self) -> Result<Reply> {
        self.reply
            .take()
            .ok_or_else(|| Error::Protocol("command finished without a reply".into()))
    }

    fn unexpected(&self, type_byte: u8) -> Error {
        Error::Protocol(format!(
            "Unexpected reply '{}' to {:?}",
            type_byte as char, self.command
        ))
    }
}

impl StateMachine for CommandStateMachine {
    fn start(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let buf = &mut buffer_set.write_buffer;
        buf.clear();
        match self.command {
            Command::Ping => write_ping(buf),
            Command::Identify => write_identify(buf),
            Command::Commit => write_commit(buf),
            Command::Rollback => write_rollback(buf),
            Command::Autocommit(on) => write_autocommit(buf, on),
            Command::SuspendSession => write_suspend_session(buf),
            Command::AbortResultSet(id) => write_abort_result_set(buf, id),
        }
        Ok(Action::WriteAndReadMessage)
    }

    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let payload = &buffer_set.read_buffer;

        let reply = match (self.command, buffer_set.type_byte) {
            (_, msg_type::ERROR) => return Err(ErrorResponse::parse(payload)?.into_error()),
            (Command::Identify, msg_type::VALUE) => {
                Reply::Value(Value::parse(payload)?.0.to_string())
            }
            (Command::SuspendSession, msg_type::SUSPENDED) => {
                let suspended = Suspended::parse(payload)?;
                Reply::Suspended {
                    host: suspended.host.to_string(),
                    port: suspended.port,
                    token: suspended.token.to_string(),
                }
            }
            (Command::Identify | Command::SuspendSession, _) => {
                return Err(self.unexpected(buffer_set.type_byte));
            }
            (_, msg_type::OK) => Reply::Ok,
            (_, type_byte) => return Err(self.unexpected(type_byte)),
        };

        self.reply = Some(reply);
        Ok(Action::Finished)
    }
}
