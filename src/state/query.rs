//! Execute, fetch and result set resume state machine.

use crate::bind::BindSet;
use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::handler::RowHandler;
use crate::protocol::backend::{
    BatchEnd, DataRow, Describe, ErrorResponse, OutputBinds, msg_type,
};
use crate::protocol::frontend::query::ExecuteOptions;
use crate::protocol::frontend::{write_execute, write_fetch, write_resume_result_set};
use crate::protocol::types::ResultSetId;

use super::StateMachine;
use super::action::Action;

/// Query state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingDescribe,
    ProcessingRows,
    Finished,
}

/// Request driven by a [`QueryStateMachine`].
#[derive(Debug)]
enum Request<'q> {
    Execute {
        sql: &'q str,
        binds: &'q BindSet,
        opts: ExecuteOptions,
    },
    Fetch {
        id: ResultSetId,
        skip: u64,
        limit: u32,
    },
    Resume {
        id: ResultSetId,
        opts: ExecuteOptions,
    },
}

/// State machine for requests answered with result set frames.
pub struct QueryStateMachine<'a, 'q, H> {
    state: State,
    request: Request<'q>,
    handler: &'a mut H,
    rows: u64,
}

impl<'a, 'q, H: RowHandler> QueryStateMachine<'a, 'q, H> {
    /// Execute a statement with its binds.
    pub fn execute(
        handler: &'a mut H,
        sql: &'q str,
        binds: &'q BindSet,
        opts: ExecuteOptions,
    ) -> Self {
        Self::new(handler, Request::Execute { sql, binds, opts })
    }

    /// Fetch more rows of an open result set.
    pub fn fetch(handler: &'a mut H, id: ResultSetId, skip: u64, limit: u32) -> Self {
        Self::new(handler, Request::Fetch { id, skip, limit })
    }

    /// Reattach a parked result set.
    pub fn resume(handler: &'a mut H, id: ResultSetId, opts: ExecuteOptions) -> Self {
        Self::new(handler, Request::Resume { id, opts })
    }

    fn new(handler: &'a mut H, request: Request<'q>) -> Self {
        Self {
            state: State::Initial,
            request,
            handler,
            rows: 0,
        }
    }

    /// Rows delivered to the handler.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl<H: RowHandler> StateMachine for QueryStateMachine<'_, '_, H> {
    fn start(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let buf = &mut buffer_set.write_buffer;
        buf.clear();
        self.state = match &self.request {
            Request::Execute { sql, binds, opts } => {
                write_execute(buf, sql, binds.iter(), *opts)?;
                State::WaitingDescribe
            }
            Request::Fetch { id, skip, limit } => {
                write_fetch(buf, *id, *skip, *limit);
                State::ProcessingRows
            }
            Request::Resume { id, opts } => {
                write_resume_result_set(buf, *id, *opts);
                State::WaitingDescribe
            }
        };
        Ok(Action::WriteAndReadMessage)
    }

    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let payload = &buffer_set.read_buffer;

        match (self.state, buffer_set.type_byte) {
            (_, msg_type::ERROR) => {
                // The server sends nothing else after an error.
                self.state = State::Finished;
                Err(ErrorResponse::parse(payload)?.into_error())
            }
            (State::WaitingDescribe, msg_type::DESCRIBE) => {
                self.handler.describe(&Describe::parse(payload)?)?;
                self.state = State::ProcessingRows;
                Ok(Action::ReadMessage)
            }
            (State::ProcessingRows, msg_type::OUTPUT_BINDS) => {
                self.handler.output_binds(&OutputBinds::parse(payload)?)?;
                Ok(Action::ReadMessage)
            }
            (State::ProcessingRows, msg_type::DATA_ROW) => {
                self.handler.row(DataRow::parse(payload)?)?;
                self.rows += 1;
                Ok(Action::ReadMessage)
            }
            (State::ProcessingRows, msg_type::BATCH_END) => {
                self.handler.batch_end(BatchEnd::parse(payload)?)?;
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            (state, type_byte) => Err(Error::Protocol(format!(
                "Unexpected message '{}' in state {:?}",
                type_byte as char, state
            ))),
        }
    }
}
