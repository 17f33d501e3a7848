//! Synchronous relay connection.

use std::thread;

use tracing::{debug, warn};

use crate::buffer_set::BufferSet;
use crate::error::{ConnectError, Error, ResumeError, Result};
use crate::opts::{Endpoint, Opts};
use crate::protocol::frontend::write_end_session;
use crate::protocol::types::TransactionStatus;
use crate::state::{
    Action, Command, CommandStateMachine, ConnectionStateMachine, Handshake, Reply, StateMachine,
};
use crate::token::SuspendToken;

use super::stream::Stream;

/// Drive a state machine to completion over `stream`.
fn drive<S: StateMachine>(
    stream: &mut Stream,
    buffer_set: &mut BufferSet,
    state_machine: &mut S,
) -> Result<()> {
    let mut action = state_machine.start(buffer_set)?;
    loop {
        match action {
            Action::WriteAndReadMessage => {
                stream.write_all(&buffer_set.write_buffer)?;
                stream.flush()?;
            }
            Action::ReadMessage => {}
            Action::Finished => return Ok(()),
        }
        if !buffer_set.read_frame(stream)? {
            return Err(Error::ConnectionBroken);
        }
        action = state_machine.step(buffer_set)?;
    }
}

/// Synchronous relay connection.
///
/// A `Conn` owns one server session. Statements run through a
/// [`Cursor`](super::Cursor), which borrows the connection mutably.
pub struct Conn {
    /// `None` while the session is suspended
    stream: Option<Stream>,
    endpoint: Endpoint,
    buffer_set: BufferSet,
    opts: Opts,
    server_name: String,
    server_version: String,
    autocommit: bool,
    transaction_status: TransactionStatus,
    epoch: u64,
    is_broken: bool,
}

impl Conn {
    /// Connect to a relay server.
    ///
    /// The unix socket (if any) and every endpoint are tried in order, for
    /// `opts.tries` rounds with `opts.retry_interval` between rounds.
    /// Rejected credentials and protocol mismatches are not retried.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let handshake = Handshake::Startup {
            user: opts.user.clone(),
            password: opts.password.clone(),
        };

        for round in 0..opts.tries.max(1) {
            if round > 0 && !opts.retry_interval.is_zero() {
                thread::sleep(opts.retry_interval);
            }

            if let Some(path) = &opts.socket {
                debug!(socket = %path, round, "connecting");
                let endpoint = Endpoint::new("localhost", 0);
                match Stream::connect_unix(path)
                    .map_err(Error::Io)
                    .and_then(|s| Self::handshake(s, endpoint, &opts, handshake.clone()))
                {
                    Ok(conn) => return Ok(conn),
                    Err(e @ Error::Connect(_)) => return Err(e),
                    Err(e) => warn!(socket = %path, error = %e, "connect attempt failed"),
                }
            }

            for endpoint in &opts.endpoints {
                debug!(%endpoint, round, "connecting");
                match Stream::connect(endpoint)
                    .map_err(Error::Io)
                    .and_then(|s| Self::handshake(s, endpoint.clone(), &opts, handshake.clone()))
                {
                    Ok(conn) => return Ok(conn),
                    Err(e @ Error::Connect(_)) => return Err(e),
                    Err(e) => warn!(%endpoint, error = %e, "connect attempt failed"),
                }
            }
        }

        Err(Error::Connect(ConnectError::Unreachable))
    }

    /// Reclaim a suspended session in a new connection.
    pub fn resume(opts: Opts, token: &SuspendToken) -> Result<Self> {
        let endpoint = Endpoint::new(token.host.clone(), token.port);
        debug!(%endpoint, "resuming session");
        let stream = Stream::connect(&endpoint).map_err(|e| {
            warn!(%endpoint, error = %e, "suspended session endpoint unreachable");
            Error::Resume(ResumeError::Unreachable)
        })?;
        Self::handshake(
            stream,
            endpoint,
            &opts,
            Handshake::Resume {
                token: token.id.clone(),
            },
        )
    }

    fn handshake(
        mut stream: Stream,
        endpoint: Endpoint,
        opts: &Opts,
        handshake: Handshake,
    ) -> Result<Self> {
        let mut buffer_set = BufferSet::new();
        let mut state_machine = ConnectionStateMachine::new(handshake);
        drive(&mut stream, &mut buffer_set, &mut state_machine)?;
        debug!(
            %endpoint,
            server = state_machine.server_name(),
            version = state_machine.server_version(),
            "session ready"
        );

        Ok(Self {
            stream: Some(stream),
            endpoint,
            buffer_set,
            opts: opts.clone(),
            server_name: state_machine.server_name().to_string(),
            server_version: state_machine.server_version().to_string(),
            autocommit: state_machine.autocommit(),
            transaction_status: state_machine.transaction_status(),
            epoch: 0,
            is_broken: false,
        })
    }

    /// Run a state machine on the session.
    ///
    /// Transport errors mark the connection broken. Nothing is retried.
    pub(crate) fn run<S: StateMachine>(&mut self, state_machine: &mut S) -> Result<()> {
        if self.is_broken {
            return Err(Error::ConnectionBroken);
        }
        let stream = self.stream.as_mut().ok_or(Error::Suspended)?;
        let result = drive(stream, &mut self.buffer_set, state_machine);
        if let Err(e) = &result
            && e.is_connection_broken()
        {
            warn!(error = %e, "connection broken");
            self.is_broken = true;
        }
        result
    }

    fn command(&mut self, command: Command) -> Result<Reply> {
        let mut state_machine = CommandStateMachine::new(command);
        self.run(&mut state_machine)?;
        state_machine.take_reply()
    }

    /// Record that a statement ran outside autocommit.
    pub(crate) fn statement_executed(&mut self) {
        if !self.autocommit {
            self.transaction_status = TransactionStatus::InTransaction;
        }
    }

    /// Incremented on every suspend. Result sets from an older epoch are stale.
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Check that the server answers. Never fails; errors yield `false`.
    pub fn ping(&mut self) -> bool {
        match self.command(Command::Ping) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "ping failed");
                false
            }
        }
    }

    /// Backend identity, e.g. `oracle` or `mysql`.
    pub fn identify(&mut self) -> Result<String> {
        match self.command(Command::Identify)? {
            Reply::Value(value) => Ok(value),
            other => Err(Error::Protocol(format!("identify: unexpected {other:?}"))),
        }
    }

    /// Backend identity reported at handshake.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Relay server version reported at handshake.
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Endpoint the session is attached to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Options the connection was created with.
    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Commit the open transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.command(Command::Commit)?;
        self.transaction_status = TransactionStatus::Idle;
        Ok(())
    }

    /// Roll back the open transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.command(Command::Rollback)?;
        self.transaction_status = TransactionStatus::Idle;
        Ok(())
    }

    /// Commit every following statement on its own.
    pub fn autocommit_on(&mut self) -> Result<()> {
        self.command(Command::Autocommit(true))?;
        self.autocommit = true;
        Ok(())
    }

    /// Group following statements until commit or rollback.
    pub fn autocommit_off(&mut self) -> Result<()> {
        self.command(Command::Autocommit(false))?;
        self.autocommit = false;
        Ok(())
    }

    /// Whether autocommit is on.
    pub fn autocommit(&self) -> bool {
        self.autocommit
    }

    /// Get the current transaction status.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Check if currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction_status.in_transaction()
    }

    /// Check if the connection is broken.
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Check if the session is parked on the server.
    pub fn is_suspended(&self) -> bool {
        self.stream.is_none() && !self.is_broken
    }

    /// Park the session on the server and release the transport.
    ///
    /// Statements fail with [`Error::Suspended`] until the session is resumed,
    /// here or in another process.
    pub fn suspend_session(&mut self) -> Result<SuspendToken> {
        let (host, port, id) = match self.command(Command::SuspendSession)? {
            Reply::Suspended { host, port, token } => (host, port, token),
            other => return Err(Error::Protocol(format!("suspend: unexpected {other:?}"))),
        };

        self.stream = None;
        self.epoch += 1;
        let token = SuspendToken {
            host: if host.is_empty() {
                self.endpoint.host.clone()
            } else {
                host
            },
            port,
            id,
        };
        debug!(%token, "session suspended");
        Ok(token)
    }

    /// Reclaim a suspended session on this connection.
    pub fn resume_session(&mut self, token: &SuspendToken) -> Result<()> {
        let resumed = Self::resume(self.opts.clone(), token)?;
        self.replace_with(resumed);
        Ok(())
    }

    fn replace_with(&mut self, mut other: Conn) {
        self.stream = other.stream.take();
        self.endpoint = other.endpoint.clone();
        self.server_name = std::mem::take(&mut other.server_name);
        self.server_version = std::mem::take(&mut other.server_version);
        self.autocommit = other.autocommit;
        self.transaction_status = other.transaction_status;
        self.epoch += 1;
        self.is_broken = false;
    }

    /// End the session on the server and close the connection.
    pub fn end_session(mut self) -> Result<()> {
        self.send_end_session()
    }

    fn send_end_session(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        self.buffer_set.write_buffer.clear();
        write_end_session(&mut self.buffer_set.write_buffer);
        stream.write_all(&self.buffer_set.write_buffer)?;
        stream.flush()?;
        Ok(())
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        // A suspended session has no stream and stays parked.
        if !self.is_broken {
            let _ = self.send_end_session();
        }
    }
}
