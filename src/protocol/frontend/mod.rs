//! Relay frontend (client → server) messages.

pub mod query;
pub mod session;
pub mod startup;

pub use query::{write_abort_result_set, write_execute, write_fetch, write_resume_result_set};
pub use session::{
    write_autocommit, write_commit, write_identify, write_ping, write_rollback,
    write_suspend_session,
};
pub use startup::{write_end_session, write_resume_session, write_startup};

/// Frontend message type bytes.
pub mod msg_type {
    /// Startup with credentials
    pub const STARTUP: u8 = b'S';
    /// Reclaim a suspended session
    pub const RESUME_SESSION: u8 = b'r';
    /// Liveness check
    pub const PING: u8 = b'p';
    /// Ask for the backend identity
    pub const IDENTIFY: u8 = b'i';
    /// Commit the open transaction
    pub const COMMIT: u8 = b'c';
    /// Roll back the open transaction
    pub const ROLLBACK: u8 = b'b';
    /// Toggle autocommit
    pub const AUTOCOMMIT: u8 = b'a';
    /// Execute a statement
    pub const EXECUTE: u8 = b'Q';
    /// Fetch more rows of a result set
    pub const FETCH: u8 = b'F';
    /// Discard a result set on the server
    pub const ABORT_RESULT_SET: u8 = b'A';
    /// Reattach a parked result set
    pub const RESUME_RESULT_SET: u8 = b'R';
    /// Park the session for another process
    pub const SUSPEND_SESSION: u8 = b'Z';
    /// End the session
    pub const END_SESSION: u8 = b'X';
}
