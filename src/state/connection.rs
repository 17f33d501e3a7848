//! Session startup and resume state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::backend::session::{SESSION_AUTOCOMMIT, SESSION_IN_TRANSACTION};
use crate::protocol::backend::{ErrorResponse, SessionReady, msg_type};
use crate::protocol::frontend::{write_resume_session, write_startup};
use crate::protocol::types::TransactionStatus;

use super::StateMachine;
use super::action::Action;

/// Connection state during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    WaitingReady,
    Ready,
    Failed,
}

/// How the session is obtained.
#[derive(Debug, Clone)]
pub enum Handshake {
    /// Authenticate a new session
    Startup {
        /// User name
        user: String,
        /// Password, passed through as-is
        password: String,
    },
    /// Reclaim a suspended session
    Resume {
        /// Token minted by the server at suspend time
        token: String,
    },
}

/// Session handshake state machine.
pub struct ConnectionStateMachine {
    state: ConnectionState,
    handshake: Handshake,
    server_name: String,
    server_version: String,
    autocommit: bool,
    transaction_status: TransactionStatus,
}

impl ConnectionStateMachine {
    /// Create a new connection state machine.
    pub fn new(handshake: Handshake) -> Self {
        Self {
            state: ConnectionState::Initial,
            handshake,
            server_name: String::new(),
            server_version: String::new(),
            autocommit: false,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Backend identity reported by the server.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Server version reported by the server.
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Autocommit mode of the session.
    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// Transaction state of the session. A resumed session may have one open.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }
}

impl StateMachine for ConnectionStateMachine {
    fn start(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        buffer_set.write_buffer.clear();
        match &self.handshake {
            Handshake::Startup { user, password } => {
                write_startup(&mut buffer_set.write_buffer, user, password);
            }
            Handshake::Resume { token } => {
                write_resume_session(&mut buffer_set.write_buffer, token);
            }
        }
        self.state = ConnectionState::WaitingReady;
        Ok(Action::WriteAndReadMessage)
    }

    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let payload = &buffer_set.read_buffer;

        match (self.state, buffer_set.type_byte) {
            (_, msg_type::ERROR) => {
                self.state = ConnectionState::Failed;
                Err(ErrorResponse::parse(payload)?.into_error())
            }
            (ConnectionState::WaitingReady, msg_type::SESSION_READY) => {
                let ready = SessionReady::parse(payload)?;
                self.server_name = ready.server_name.to_string();
                self.server_version = ready.server_version.to_string();
                self.autocommit = ready.flags & SESSION_AUTOCOMMIT != 0;
                self.transaction_status = if ready.flags & SESSION_IN_TRANSACTION != 0 {
                    TransactionStatus::InTransaction
                } else {
                    TransactionStatus::Idle
                };
                self.state = ConnectionState::Ready;
                Ok(Action::Finished)
            }
            (state, type_byte) => {
                self.state = ConnectionState::Failed;
                Err(Error::Protocol(format!(
                    "Unexpected message '{}' in state {:?}",
                    type_byte as char, state
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;
    use crate::protocol::types::ErrorKind;

    #[test]
    fn startup_then_ready() {
        let mut sm = ConnectionStateMachine::new(Handshake::Startup {
            user: "u".into(),
            password: "p".into(),
        });
        let mut buffer_set = BufferSet::new();
        assert_eq!(sm.start(&mut buffer_set).unwrap(), Action::WriteAndReadMessage);
        assert_eq!(buffer_set.write_buffer[0], b'S');

        let mut reply = Vec::new();
        SessionReady {
            server_name: "oracle",
            server_version: "1.0",
            flags: SESSION_IN_TRANSACTION,
        }
        .write(&mut reply);
        buffer_set.type_byte = reply[0];
        buffer_set.read_buffer = reply[5..].to_vec();

        assert_eq!(sm.step(&mut buffer_set).unwrap(), Action::Finished);
        assert_eq!(sm.state(), ConnectionState::Ready);
        assert_eq!(sm.server_name(), "oracle");
        assert!(!sm.autocommit());
        assert!(sm.transaction_status().in_transaction());
    }

    #[test]
    fn rejected_credentials() {
        let mut sm = ConnectionStateMachine::new(Handshake::Startup {
            user: "u".into(),
            password: "bad".into(),
        });
        let mut buffer_set = BufferSet::new();
        sm.start(&mut buffer_set).unwrap();

        let mut reply = Vec::new();
        ErrorResponse::write(&mut reply, ErrorKind::AuthRejected, 0, "bad password");
        buffer_set.type_byte = reply[0];
        buffer_set.read_buffer = reply[5..].to_vec();

        assert!(matches!(
            sm.step(&mut buffer_set),
            Err(Error::Connect(ConnectError::AuthRejected))
        ));
        assert_eq!(sm.state(), ConnectionState::Failed);
    }
}
