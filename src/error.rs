//! Error types for zero-relay.

use thiserror::Error;

use crate::protocol::types::ErrorKind;

/// Result type for zero-relay operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error reported by the proxy server for a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Classification sent by the server
    pub kind: QueryErrorKind,
    /// Backend error number (0 if the backend did not report one)
    pub code: i64,
    /// Backend error message
    pub message: String,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if self.code != 0 {
            write!(f, " (code {})", self.code)?;
        }
        Ok(())
    }
}

/// Statement failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The statement could not be parsed by the backend
    Syntax,
    /// The statement parsed but referenced something invalid
    Semantic,
    /// The backend or the proxy failed while running the statement
    ServerFault,
}

/// Connection establishment failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// No endpoint accepted a connection within the retry budget
    #[error("no server reachable")]
    Unreachable,
    /// The server refused the credentials
    #[error("authentication rejected")]
    AuthRejected,
    /// The server speaks a different protocol version
    #[error("protocol version mismatch")]
    ProtocolMismatch,
}

/// Bind validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// A bound key has no matching placeholder in the statement
    #[error("no placeholder for bind variable {0}")]
    UnknownPlaceholder(String),
}

/// Session or result set resume failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResumeError {
    /// The server discarded the parked session
    #[error("suspended session expired")]
    Expired,
    /// The token was already redeemed
    #[error("suspended session already resumed")]
    AlreadyResumed,
    /// The endpoint named by the token could not be reached
    #[error("suspended session endpoint unreachable")]
    Unreachable,
}

/// Result cache file failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The cache file TTL has passed
    #[error("cache file expired")]
    Expired,
    /// The cache file does not exist
    #[error("cache file not found")]
    NotFound,
    /// The cache file is not a result cache or is damaged
    #[error("cache file corrupt")]
    Corrupt,
}

/// Error type for zero-relay.
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting or authenticating failed
    #[error("Connect error: {0}")]
    Connect(ConnectError),

    /// Server reported a statement error
    #[error("Query error: {0}")]
    Query(ServerError),

    /// Bind set does not fit the statement
    #[error("Bind error: {0}")]
    Bind(#[from] BindError),

    /// Resuming a suspended session or result set failed
    #[error("Resume error: {0}")]
    Resume(ResumeError),

    /// Result cache file error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The server refused to park the session
    #[error("Session cannot be suspended")]
    NotSuspendable,

    /// The session was suspended and has not been resumed
    #[error("Session is suspended")]
    Suspended,

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection is broken and cannot be reused
    #[error("Connection is broken")]
    ConnectionBroken,

    /// Invalid usage (e.g., mismatched bind arrays)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionBroken | Error::Protocol(_)
        )
    }

    /// Get the server error if this is a statement failure.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Query(err) => Some(err),
            _ => None,
        }
    }

    /// Map an error frame from the server onto the error taxonomy.
    pub(crate) fn from_server(kind: ErrorKind, code: i64, message: String) -> Self {
        let query = |kind| {
            Error::Query(ServerError {
                kind,
                code,
                message: message.clone(),
            })
        };
        match kind {
            ErrorKind::Syntax => query(QueryErrorKind::Syntax),
            ErrorKind::Semantic => query(QueryErrorKind::Semantic),
            ErrorKind::ServerFault => query(QueryErrorKind::ServerFault),
            ErrorKind::AuthRejected => Error::Connect(ConnectError::AuthRejected),
            ErrorKind::ProtocolMismatch => Error::Connect(ConnectError::ProtocolMismatch),
            ErrorKind::ResumeExpired => Error::Resume(ResumeError::Expired),
            ErrorKind::AlreadyResumed => Error::Resume(ResumeError::AlreadyResumed),
            ErrorKind::NotSuspendable => Error::NotSuspendable,
            ErrorKind::UnknownResultSet => Error::InvalidUsage(message),
        }
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::CastError<Src, Dst>> for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Protocol(format!("zerocopy cast error: {err:?}"))
    }
}
