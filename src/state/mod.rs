//! Sans-I/O state machines for the relay protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! They produce `Action` values that tell the caller what to do next.

pub mod action;
pub mod command;
pub mod connection;
pub mod query;

pub use action::Action;
pub use command::{Command, CommandStateMachine, Reply};
pub use connection::{ConnectionState, ConnectionStateMachine, Handshake};
pub use query::QueryStateMachine;

use crate::buffer_set::BufferSet;
use crate::error::Result;

/// A request/response exchange driven by the caller's I/O loop.
pub trait StateMachine {
    /// Encode the request into `buffer_set.write_buffer`.
    ///
    /// Fails without touching the wire if the request cannot be encoded.
    fn start(&mut self, buffer_set: &mut BufferSet) -> Result<Action>;

    /// Process the message in `buffer_set.read_buffer`.
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action>;
}
