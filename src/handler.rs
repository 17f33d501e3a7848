//! Result set handlers.

use crate::error::Result;
use crate::protocol::backend::{BatchEnd, DataRow, Describe, OutputBinds};

/// Handler for result set frames.
///
/// Callback patterns by request:
/// - Execute: `describe` → `output_binds`? → `row*` → `batch_end`
/// - Fetch: `row*` → `batch_end`
/// - ResumeResultSet: `describe` → `row*` → `batch_end`
///
/// DML statements produce a describe with no columns and an immediate
/// `batch_end` with the end flag set.
pub trait RowHandler {
    /// Called when a result set is opened or reattached.
    fn describe(&mut self, desc: &Describe<'_>) -> Result<()>;

    /// Called with the values of output bind variables.
    fn output_binds(&mut self, binds: &OutputBinds<'_>) -> Result<()> {
        let _ = binds;
        Ok(())
    }

    /// Called for each data row.
    fn row(&mut self, row: DataRow<'_>) -> Result<()>;

    /// Called when a batch of rows ends.
    fn batch_end(&mut self, end: BatchEnd) -> Result<()>;
}

/// A handler that discards all rows.
#[derive(Debug, Default)]
pub struct DropHandler {
    rows: u64,
}

impl DropHandler {
    /// Create a new drop handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows discarded.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl RowHandler for DropHandler {
    fn describe(&mut self, _desc: &Describe<'_>) -> Result<()> {
        Ok(())
    }

    fn row(&mut self, _row: DataRow<'_>) -> Result<()> {
        self.rows += 1;
        Ok(())
    }

    fn batch_end(&mut self, _end: BatchEnd) -> Result<()> {
        Ok(())
    }
}

/// Forwards every frame to two handlers, `first` before `second`.
///
/// Used to buffer a result set while writing it to a cache file.
pub struct Tee<'a, A, B> {
    first: &'a mut A,
    second: &'a mut B,
}

impl<'a, A, B> Tee<'a, A, B> {
    /// Create a new tee.
    pub fn new(first: &'a mut A, second: &'a mut B) -> Self {
        Self { first, second }
    }
}

impl<A: RowHandler, B: RowHandler> RowHandler for Tee<'_, A, B> {
    fn describe(&mut self, desc: &Describe<'_>) -> Result<()> {
        self.first.describe(desc)?;
        self.second.describe(desc)
    }

    fn output_binds(&mut self, binds: &OutputBinds<'_>) -> Result<()> {
        self.first.output_binds(binds)?;
        self.second.output_binds(binds)
    }

    fn row(&mut self, row: DataRow<'_>) -> Result<()> {
        self.first.row(row)?;
        self.second.row(row)
    }

    fn batch_end(&mut self, end: BatchEnd) -> Result<()> {
        self.first.batch_end(end)?;
        self.second.batch_end(end)
    }
}

impl<H: RowHandler> RowHandler for Option<H> {
    fn describe(&mut self, desc: &Describe<'_>) -> Result<()> {
        match self {
            Some(h) => h.describe(desc),
            None => Ok(()),
        }
    }

    fn output_binds(&mut self, binds: &OutputBinds<'_>) -> Result<()> {
        match self {
            Some(h) => h.output_binds(binds),
            None => Ok(()),
        }
    }

    fn row(&mut self, row: DataRow<'_>) -> Result<()> {
        match self {
            Some(h) => h.row(row),
            None => Ok(()),
        }
    }

    fn batch_end(&mut self, end: BatchEnd) -> Result<()> {
        match self {
            Some(h) => h.batch_end(end),
            None => Ok(()),
        }
    }
}
