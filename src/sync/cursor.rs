//! Statement execution and result set access.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::bind::{BindKey, BindSet, BindValue};
use crate::cache::{CacheReader, CacheWriter, DEFAULT_CACHE_TTL};
use crate::error::{CacheError, Error, Result};
use crate::handler::Tee;
use crate::protocol::frontend::query::ExecuteOptions;
use crate::protocol::types::{ResultSetId, ValueType};
use crate::result_set::{ColumnClass, ColumnMeta, FieldKey, ResultSet};
use crate::state::{Command, CommandStateMachine, QueryStateMachine};
use crate::substitution::Substitutions;

use super::Conn;

/// Statement executor and result set reader bound to a session.
///
/// A cursor borrows its [`Conn`] mutably, so one session runs one statement
/// at a time. Mode settings (buffer size, column info, null handling,
/// caching) take effect at the next execute.
///
/// Row indices are absolute. With a buffer size of `n`, reading a row past
/// the buffer fetches the next `n` rows starting at that row and drops the
/// old ones, so earlier rows read as `None` afterwards.
pub struct Cursor<'c> {
    conn: &'c mut Conn,
    sql: String,
    binds: BindSet,
    substitutions: Substitutions,
    validate: bool,
    buffer_size: u32,
    column_info: bool,
    nulls_as_empty: bool,
    cache_target: Option<PathBuf>,
    cache_ttl: u64,
    cache: Option<CacheWriter>,
    source: Option<CacheReader>,
    result: ResultSet,
    epoch: u64,
    error: Option<(String, i64)>,
}

impl<'c> Cursor<'c> {
    /// Create a cursor on a session.
    pub fn new(conn: &'c mut Conn) -> Self {
        let epoch = conn.epoch();
        Self {
            conn,
            sql: String::new(),
            binds: BindSet::new(),
            substitutions: Substitutions::new(),
            validate: false,
            buffer_size: 0,
            column_info: true,
            nulls_as_empty: false,
            cache_target: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: None,
            source: None,
            result: ResultSet::new(),
            epoch,
            error: None,
        }
    }

    /// The session this cursor runs on.
    pub fn conn(&self) -> &Conn {
        &*self.conn
    }

    /// The session this cursor runs on, for transaction control and suspend.
    pub fn conn_mut(&mut self) -> &mut Conn {
        self.conn
    }

    // ---- statements ----

    /// Run `sql` right away without binds. The stored bind set is kept.
    pub fn send_query(&mut self, sql: &str) -> Result<()> {
        self.prepare_query(sql);
        self.execute_with(&BindSet::new())
    }

    /// Store a statement template for [`execute_query`](Self::execute_query).
    pub fn prepare_query(&mut self, sql: &str) {
        self.sql.clear();
        self.sql.push_str(sql);
    }

    /// Run the prepared template with the current binds and substitutions.
    pub fn execute_query(&mut self) -> Result<()> {
        let binds = std::mem::take(&mut self.binds);
        let result = self.execute_with(&binds);
        self.binds = binds;
        result
    }

    fn execute_with(&mut self, binds: &BindSet) -> Result<()> {
        self.error = None;
        let result = self.execute_inner(binds);
        if let Err(e) = &result {
            self.record(e);
        }
        result
    }

    fn execute_inner(&mut self, binds: &BindSet) -> Result<()> {
        self.close_result_set()?;

        let sql = self.substitutions.apply(&self.sql);
        if self.validate {
            binds.validate(&sql)?;
        }

        self.cache = match &self.cache_target {
            Some(path) => Some(CacheWriter::create(path, self.cache_ttl)?),
            None => None,
        };

        debug!(sql = %sql, binds = binds.len(), "executing statement");
        let opts = self.execute_options();
        let mut handler = Tee::new(&mut self.result, &mut self.cache);
        let mut state_machine = QueryStateMachine::execute(&mut handler, &sql, binds, opts);
        if let Err(e) = self.conn.run(&mut state_machine) {
            if let Some(cache) = self.cache.take()
                && let Err(abandon) = cache.abandon()
            {
                warn!(error = %abandon, "failed to abandon result cache");
            }
            return Err(e);
        }

        self.conn.statement_executed();
        self.epoch = self.conn.epoch();
        Ok(())
    }

    fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            column_info: self.column_info,
            buffer_size: self.buffer_size,
        }
    }

    fn record(&mut self, err: &Error) {
        self.error = Some(match err.server_error() {
            Some(server) => (server.message.clone(), server.code),
            None => (err.to_string(), 0),
        });
    }

    /// Message of the last failed statement.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|(message, _)| message.as_str())
    }

    /// Backend error number of the last failed statement, 0 if none.
    pub fn error_number(&self) -> i64 {
        self.error.as_ref().map_or(0, |(_, code)| *code)
    }

    /// Rows affected by the last DML statement, -1 if unknown.
    pub fn affected_rows(&self) -> i64 {
        self.result.affected_rows()
    }

    // ---- binds ----

    /// Bind an input value by name (`name`, `:name`, `@name`) or position.
    pub fn input_bind(&mut self, key: impl Into<BindKey>, value: impl Into<BindValue>) {
        self.binds.input(key.into(), value.into());
    }

    /// Bind a double with display precision and scale.
    pub fn input_bind_double(
        &mut self,
        key: impl Into<BindKey>,
        value: f64,
        precision: u32,
        scale: u32,
    ) {
        self.binds.input(
            key.into(),
            BindValue::from(value).with_precision(precision, scale),
        );
    }

    /// Bind several values at once.
    ///
    /// `precisions` and `scales` may be empty; otherwise every slice must
    /// have the length of `keys`.
    pub fn input_binds(
        &mut self,
        keys: &[&str],
        values: &[BindValue],
        precisions: &[u32],
        scales: &[u32],
    ) -> Result<()> {
        for (key, value) in zip_parallel(keys, values, precisions, scales)? {
            self.binds.input(BindKey::name(key), value);
        }
        Ok(())
    }

    /// Declare a string output bind of at most `capacity` bytes.
    pub fn define_output_bind_string(&mut self, key: impl Into<BindKey>, capacity: u32) {
        self.binds.output(key.into(), ValueType::String, capacity);
    }

    /// Declare an integer output bind.
    pub fn define_output_bind_integer(&mut self, key: impl Into<BindKey>) {
        self.binds.output(key.into(), ValueType::Integer, 8);
    }

    /// Declare a double output bind.
    pub fn define_output_bind_double(&mut self, key: impl Into<BindKey>) {
        self.binds.output(key.into(), ValueType::Double, 8);
    }

    /// Declare a blob output bind of at most `capacity` bytes.
    pub fn define_output_bind_blob(&mut self, key: impl Into<BindKey>, capacity: u32) {
        self.binds.output(key.into(), ValueType::Blob, capacity);
    }

    /// Declare a clob output bind of at most `capacity` bytes.
    pub fn define_output_bind_clob(&mut self, key: impl Into<BindKey>, capacity: u32) {
        self.binds.output(key.into(), ValueType::Clob, capacity);
    }

    fn output_bytes(&self, key: &str) -> Option<&[u8]> {
        self.result.output(key)?.value.as_deref()
    }

    /// Returned value of a string or clob output bind.
    pub fn output_bind_string(&self, key: &str) -> Option<Cow<'_, str>> {
        self.output_bytes(key).map(String::from_utf8_lossy)
    }

    /// Returned value of an integer output bind.
    pub fn output_bind_integer(&self, key: &str) -> Option<i64> {
        simdutf8::basic::from_utf8(self.output_bytes(key)?)
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Returned value of a double output bind.
    pub fn output_bind_double(&self, key: &str) -> Option<f64> {
        simdutf8::basic::from_utf8(self.output_bytes(key)?)
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Returned value of a blob output bind.
    pub fn output_bind_blob(&self, key: &str) -> Option<&[u8]> {
        self.output_bytes(key)
    }

    /// Length of the returned value, not the declared capacity.
    pub fn output_bind_length(&self, key: &str) -> usize {
        self.output_bytes(key).map_or(0, <[u8]>::len)
    }

    /// Remove all input and output binds.
    pub fn clear_binds(&mut self) {
        self.binds.clear();
    }

    /// Fail executes whose binds name a placeholder missing from the statement.
    pub fn validate_binds(&mut self) {
        self.validate = true;
    }

    /// Send binds without checking them against the statement.
    pub fn dont_validate_binds(&mut self) {
        self.validate = false;
    }

    // ---- substitutions ----

    /// Replace `$(name)` with `value` before the statement is sent.
    pub fn substitution(&mut self, name: &str, value: impl Into<BindValue>) {
        self.substitutions.set(name, value.into());
    }

    /// Substitute a double formatted with `scale` fractional digits.
    pub fn substitution_double(&mut self, name: &str, value: f64, precision: u32, scale: u32) {
        self.substitutions
            .set(name, BindValue::from(value).with_precision(precision, scale));
    }

    /// Set several substitutions at once. Lengths follow
    /// [`input_binds`](Self::input_binds).
    pub fn substitutions(
        &mut self,
        names: &[&str],
        values: &[BindValue],
        precisions: &[u32],
        scales: &[u32],
    ) -> Result<()> {
        for (name, value) in zip_parallel(names, values, precisions, scales)? {
            self.substitutions.set(name, value);
        }
        Ok(())
    }

    /// Remove all substitutions.
    pub fn clear_substitutions(&mut self) {
        self.substitutions.clear();
    }

    // ---- modes ----

    /// Rows to fetch per round trip, 0 for all rows at once.
    pub fn set_result_set_buffer_size(&mut self, rows: u32) {
        self.buffer_size = rows;
    }

    /// Rows fetched per round trip.
    pub fn result_set_buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Skip column metadata from the next execute on.
    pub fn dont_get_column_info(&mut self) {
        self.column_info = false;
    }

    /// Request column metadata from the next execute on.
    pub fn get_column_info(&mut self) {
        self.column_info = true;
    }

    /// Read NULL fields as empty strings from the next execute on.
    pub fn get_nulls_as_empty_strings(&mut self) {
        self.nulls_as_empty = true;
    }

    /// Read NULL fields as `None` from the next execute on.
    pub fn get_nulls_as_nulls(&mut self) {
        self.nulls_as_empty = false;
    }

    // ---- rows ----

    /// Treat the buffer as suspended once the session was suspended or
    /// resumed underneath it.
    fn check_epoch(&mut self) {
        if self.source.is_none()
            && self.result.id().is_some()
            && !self.result.is_suspended()
            && self.conn.epoch() != self.epoch
        {
            debug!("session changed, discarding result set buffer");
            self.result.suspend();
            if let Some(cache) = self.cache.take()
                && let Err(e) = cache.detach()
            {
                warn!(error = %e, "failed to detach result cache");
            }
        }
    }

    fn ensure_row(&mut self, row: u64) {
        self.check_epoch();
        while self.result.needs_fetch(row) {
            // Rows may only be skipped when nobody records them.
            let skip = if self.cache.is_some() {
                0
            } else {
                row - self.result.row_count()
            };
            match self.fetch_page(skip) {
                Ok(0) if !self.result.end_of_result_set() => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, row, "fetching rows failed");
                    self.record(&e);
                    break;
                }
            }
        }
    }

    fn fetch_page(&mut self, skip: u64) -> Result<usize> {
        let Some(id) = self.result.id() else {
            return Ok(0);
        };
        let limit = self.buffer_size;
        self.result.begin_page();
        debug!(id, skip, limit, "fetching rows");

        let mut handler = Tee::new(&mut self.result, &mut self.cache);
        match &mut self.source {
            Some(reader) => reader.fetch(skip, limit, &mut handler)?,
            None => {
                let mut state_machine = QueryStateMachine::fetch(&mut handler, id, skip, limit);
                self.conn.run(&mut state_machine)?;
            }
        }
        Ok(self.result.buffered_rows())
    }

    /// Field bytes, fetching more rows if needed.
    ///
    /// NULL fields and rows that do not exist or are no longer buffered are
    /// both `None`; consult [`row_count`](Self::row_count) and
    /// [`end_of_result_set`](Self::end_of_result_set) to tell them apart.
    pub fn field<'k>(&mut self, row: u64, col: impl Into<FieldKey<'k>>) -> Option<&[u8]> {
        self.ensure_row(row);
        self.result.field(row, col.into())
    }

    /// Field as text, fetching more rows if needed.
    pub fn field_str<'k>(&mut self, row: u64, col: impl Into<FieldKey<'k>>) -> Option<Cow<'_, str>> {
        self.ensure_row(row);
        self.result.field_str(row, col.into())
    }

    /// Field length in bytes, 0 for NULL or missing rows.
    pub fn field_length<'k>(&mut self, row: u64, col: impl Into<FieldKey<'k>>) -> usize {
        self.ensure_row(row);
        self.result.field_length(row, col.into())
    }

    /// All fields of a row.
    pub fn row(&mut self, row: u64) -> Option<Vec<Option<Cow<'_, str>>>> {
        self.ensure_row(row);
        self.result.row(row)
    }

    /// Field lengths of a row.
    pub fn row_lengths(&mut self, row: u64) -> Option<Vec<usize>> {
        self.ensure_row(row);
        self.result.row_lengths(row)
    }

    /// Column name to field pairs of a row. Requires column info.
    pub fn row_map(&mut self, row: u64) -> Option<Vec<(&str, Option<Cow<'_, str>>)>> {
        self.ensure_row(row);
        self.result.row_map(row)
    }

    /// Highest fetched row index plus one.
    pub fn row_count(&self) -> u64 {
        self.result.row_count()
    }

    /// Index of the first buffered row.
    pub fn first_row_index(&self) -> u64 {
        self.result.first_row_index()
    }

    /// No more rows remain.
    pub fn end_of_result_set(&self) -> bool {
        self.result.end_of_result_set()
    }

    /// Total rows once known, else the server hint.
    pub fn total_rows(&self) -> Option<u64> {
        self.result.total_rows()
    }

    // ---- columns ----

    /// Number of columns.
    pub fn col_count(&self) -> usize {
        self.result.col_count()
    }

    fn column<'k>(&self, col: impl Into<FieldKey<'k>>) -> Option<&ColumnMeta> {
        self.result.column(col.into())
    }

    /// Column name. `None` when column info is off.
    pub fn column_name(&self, col: usize) -> Option<&str> {
        self.column(col).map(|c| c.name.as_str())
    }

    /// All column names. Empty when column info is off.
    pub fn column_names(&self) -> Vec<&str> {
        self.result.columns().iter().map(|c| c.name.as_str()).collect()
    }

    /// Backend type name. `None` when column info is off.
    pub fn column_type<'k>(&self, col: impl Into<FieldKey<'k>>) -> Option<&str> {
        self.column(col).map(|c| c.type_name.as_str())
    }

    /// Declared length, 0 when column info is off.
    pub fn column_length<'k>(&self, col: impl Into<FieldKey<'k>>) -> u32 {
        self.column(col).map_or(0, |c| c.length)
    }

    /// Numeric precision, 0 when unknown.
    pub fn column_precision<'k>(&self, col: impl Into<FieldKey<'k>>) -> u32 {
        self.column(col).map_or(0, |c| c.precision)
    }

    /// Numeric scale, 0 when unknown.
    pub fn column_scale<'k>(&self, col: impl Into<FieldKey<'k>>) -> u32 {
        self.column(col).map_or(0, |c| c.scale)
    }

    /// Column accepts NULL.
    pub fn column_is_nullable<'k>(&self, col: impl Into<FieldKey<'k>>) -> bool {
        self.column(col).is_some_and(|c| c.nullable)
    }

    /// Column is part of the primary key.
    pub fn column_is_primary_key<'k>(&self, col: impl Into<FieldKey<'k>>) -> bool {
        self.column(col).is_some_and(|c| c.primary_key)
    }

    /// Display class of the column type.
    pub fn column_class<'k>(&self, col: impl Into<FieldKey<'k>>) -> Option<ColumnClass> {
        self.column(col).map(|c| c.class)
    }

    /// Longest field seen in the column since the statement ran.
    pub fn longest<'k>(&self, col: impl Into<FieldKey<'k>>) -> usize {
        self.result.longest(col.into())
    }

    // ---- suspend / resume ----

    /// Server id of the current result set.
    pub fn result_set_id(&self) -> Option<ResultSetId> {
        self.result.id()
    }

    /// Leave the result set parked on the server.
    ///
    /// The local buffer is discarded; counters and the id are kept. A cache
    /// file being written is closed without an end marker so it can be
    /// continued with [`resume_cached_result_set`](Self::resume_cached_result_set).
    pub fn suspend_result_set(&mut self) -> Result<()> {
        debug!(id = ?self.result.id(), "suspending result set");
        self.result.suspend();
        self.source = None;
        match self.cache.take() {
            Some(cache) => cache.detach(),
            None => Ok(()),
        }
    }

    /// Reattach a result set parked on the server. Rows continue from the
    /// server's position.
    pub fn resume_result_set(&mut self, id: ResultSetId) -> Result<()> {
        self.resume_inner(id, None)
    }

    /// Reattach a parked result set and append its remaining rows to `path`.
    pub fn resume_cached_result_set(&mut self, id: ResultSetId, path: impl AsRef<Path>) -> Result<()> {
        self.resume_inner(id, Some(path.as_ref()))
    }

    fn resume_inner(&mut self, id: ResultSetId, path: Option<&Path>) -> Result<()> {
        self.error = None;
        let result = self.resume_result(id, path);
        if let Err(e) = &result {
            self.record(e);
        }
        result
    }

    fn resume_result(&mut self, id: ResultSetId, path: Option<&Path>) -> Result<()> {
        self.check_epoch();
        if self.result.id() != Some(id) || !self.result.is_suspended() {
            self.close_result_set()?;
        }
        self.source = None;
        self.result.reset(self.nulls_as_empty);

        self.cache = match path {
            Some(path) => Some(match CacheWriter::append(path) {
                Err(Error::Cache(CacheError::NotFound)) => CacheWriter::create(path, self.cache_ttl)?,
                other => other?,
            }),
            None => None,
        };

        debug!(id, "resuming result set");
        let opts = self.execute_options();
        let mut handler = Tee::new(&mut self.result, &mut self.cache);
        let mut state_machine = QueryStateMachine::resume(&mut handler, id, opts);
        self.conn.run(&mut state_machine)?;
        self.epoch = self.conn.epoch();
        Ok(())
    }

    // ---- cache ----

    /// Write the result sets of following executes to `path`.
    pub fn cache_to_file(&mut self, path: impl Into<PathBuf>) {
        self.cache_target = Some(path.into());
    }

    /// Seconds until cache files written from now on expire, 0 for never.
    pub fn set_cache_ttl(&mut self, ttl: u64) {
        self.cache_ttl = ttl;
    }

    /// File the next execute caches to.
    pub fn cache_file_name(&self) -> Option<&Path> {
        self.cache_target.as_deref()
    }

    /// Stop caching. Existing files are left alone.
    pub fn cache_off(&mut self) {
        self.cache_target = None;
    }

    /// Read a result set from a cache file instead of the server.
    ///
    /// Fails with `CacheError::NotFound` or `CacheError::Expired`; there is
    /// no fallback to running the statement. If caching is on, rows read are
    /// copied to the cache target.
    pub fn open_cached_result_set(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.error = None;
        let result = self.open_cached(path.as_ref());
        if let Err(e) = &result {
            self.record(e);
        }
        result
    }

    fn open_cached(&mut self, path: &Path) -> Result<()> {
        if self.cache_target.as_deref() == Some(path) {
            return Err(Error::InvalidUsage(
                "cannot cache a result set into the file it is read from".into(),
            ));
        }
        self.close_result_set()?;

        let mut reader = CacheReader::open(path)?;
        self.cache = match &self.cache_target {
            Some(target) => Some(CacheWriter::create(target, self.cache_ttl)?),
            None => None,
        };

        let mut handler = Tee::new(&mut self.result, &mut self.cache);
        reader.describe(&mut handler)?;
        reader.fetch(0, self.buffer_size, &mut handler)?;
        self.source = Some(reader);
        Ok(())
    }

    /// Finish the current result set.
    ///
    /// While caching, the remaining rows are drained into the cache file
    /// first. Otherwise an unfinished server result set is discarded.
    pub fn close_result_set(&mut self) -> Result<()> {
        self.check_epoch();
        let mut result = Ok(());

        if let Some(mut cache) = self.cache.take() {
            if !cache.is_finished() {
                if let Some(reader) = self.source.as_mut() {
                    result = reader.fetch(0, 0, &mut cache);
                } else if let Some(id) = self.result.id()
                    && !self.result.end_of_result_set()
                    && !self.result.is_suspended()
                {
                    debug!(id, path = %cache.path().display(), "draining result set into cache");
                    let mut state_machine = QueryStateMachine::fetch(&mut cache, id, 0, 0);
                    result = self.conn.run(&mut state_machine);
                }
            }
            result = match result {
                Ok(()) => cache.finish(),
                Err(e) => {
                    if let Err(detach) = cache.detach() {
                        warn!(error = %detach, "failed to detach result cache");
                    }
                    Err(e)
                }
            };
        } else if self.source.is_none()
            && let Some(id) = self.result.id()
            && !self.result.end_of_result_set()
            && !self.result.is_suspended()
        {
            debug!(id, "aborting result set");
            let mut state_machine = CommandStateMachine::new(Command::AbortResultSet(id));
            result = self.conn.run(&mut state_machine);
        }

        self.source = None;
        self.result.reset(self.nulls_as_empty);
        result
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close_result_set() {
            debug!(error = %e, "closing result set on drop failed");
        }
    }
}

/// Pair keys with values, applying precision and scale where given.
fn zip_parallel<'k>(
    keys: &[&'k str],
    values: &[BindValue],
    precisions: &[u32],
    scales: &[u32],
) -> Result<Vec<(&'k str, BindValue)>> {
    let n = keys.len();
    if values.len() != n
        || (!precisions.is_empty() && precisions.len() != n)
        || (!scales.is_empty() && scales.len() != n)
    {
        return Err(Error::InvalidUsage(format!(
            "mismatched bind arrays: {} keys, {} values, {} precisions, {} scales",
            n,
            values.len(),
            precisions.len(),
            scales.len()
        )));
    }

    Ok(keys
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (key, value))| {
            let precision = precisions.get(i).copied().unwrap_or(0);
            let scale = scales.get(i).copied().unwrap_or(0);
            (*key, value.clone().with_precision(precision, scale))
        })
        .collect())
}
