//! Buffered result sets.
//!
//! A [`ResultSet`] keeps one page of rows. Paging replaces the page, so
//! [`ResultSet::first_row_index`] only moves forward until the next execute.

use std::borrow::Cow;

use crate::error::Result;
use crate::handler::RowHandler;
use crate::protocol::backend::query::OutputBind;
use crate::protocol::backend::{BatchEnd, DataRow, Describe, OutputBinds};
use crate::protocol::types::{ResultSetId, ValueType};

/// Coarse classification of a backend type name, for display helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    /// Character data and anything unrecognized
    Textual,
    /// Integer, decimal and floating point types
    Numeric,
    /// Raw bytes
    Binary,
    /// Dates, times and intervals
    Temporal,
}

impl ColumnClass {
    /// Classify a backend type name such as `VARCHAR2` or `NUMBER`.
    pub fn classify(type_name: &str) -> Self {
        let upper = type_name.to_ascii_uppercase();
        let has = |needles: &[&str]| needles.iter().any(|n| upper.contains(n));

        if has(&["DATE", "TIME", "INTERVAL", "YEAR"]) {
            ColumnClass::Temporal
        } else if has(&["BLOB", "BINARY", "RAW", "BYTEA", "IMAGE"]) {
            ColumnClass::Binary
        } else if has(&[
            "INT", "NUMBER", "NUMERIC", "DECIMAL", "FLOAT", "DOUBLE", "REAL", "MONEY", "SERIAL",
        ]) {
            ColumnClass::Numeric
        } else {
            ColumnClass::Textual
        }
    }

    /// Numeric columns are conventionally right-aligned when printed.
    pub fn right_aligned(self) -> bool {
        self == ColumnClass::Numeric
    }
}

/// Column metadata reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name
    pub name: String,
    /// Backend type name
    pub type_name: String,
    /// Declared length
    pub length: u32,
    /// Numeric precision
    pub precision: u32,
    /// Numeric scale
    pub scale: u32,
    /// Column accepts NULL
    pub nullable: bool,
    /// Column is part of the primary key
    pub primary_key: bool,
    /// Classification of `type_name`
    pub class: ColumnClass,
}

/// Column lookup key: position or case-insensitive name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey<'a> {
    /// 0-based column index
    Index(usize),
    /// Column name
    Name(&'a str),
}

impl From<usize> for FieldKey<'_> {
    fn from(value: usize) -> Self {
        FieldKey::Index(value)
    }
}

impl<'a> From<&'a str> for FieldKey<'a> {
    fn from(value: &'a str) -> Self {
        FieldKey::Name(value)
    }
}

impl<'a> From<&'a String> for FieldKey<'a> {
    fn from(value: &'a String) -> Self {
        FieldKey::Name(value)
    }
}

/// Value returned for an output bind variable.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputValue {
    /// Placeholder name without sigil
    pub name: String,
    /// Type of the returned value
    pub value_type: ValueType,
    /// Returned value, `None` for NULL
    pub value: Option<Vec<u8>>,
}

type Row = Vec<Option<Vec<u8>>>;

/// One page of a result set plus its paging counters.
#[derive(Debug, Default)]
pub struct ResultSet {
    id: Option<ResultSetId>,
    columns: Vec<ColumnMeta>,
    col_count: usize,
    rows: Vec<Row>,
    first_row_index: u64,
    row_count: u64,
    page_start: u64,
    end_of_result_set: bool,
    affected_rows: i64,
    total_rows_hint: i64,
    longest: Vec<usize>,
    output: Vec<OutputValue>,
    nulls_as_empty: bool,
    suspended: bool,
}

impl ResultSet {
    /// Create an empty result set.
    pub fn new() -> Self {
        Self {
            affected_rows: -1,
            total_rows_hint: -1,
            ..Self::default()
        }
    }

    /// Forget everything and prepare for a new statement.
    pub(crate) fn reset(&mut self, nulls_as_empty: bool) {
        *self = Self::new();
        self.nulls_as_empty = nulls_as_empty;
    }

    /// Replace the page before rows from a fetch arrive.
    ///
    /// The counters move only once the batch end reports how many rows the
    /// server really skipped.
    pub(crate) fn begin_page(&mut self) {
        self.rows.clear();
        self.page_start = self.row_count;
        self.first_row_index = self.row_count;
    }

    /// Drop the buffered rows but keep the counters and the server id.
    pub(crate) fn suspend(&mut self) {
        self.rows.clear();
        self.suspended = true;
    }

    /// Server result set id, if a statement produced one.
    pub fn id(&self) -> Option<ResultSetId> {
        self.id
    }

    /// The buffer was discarded by a suspend.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether `row` lies past the buffer and more rows may exist.
    pub fn needs_fetch(&self, row: u64) -> bool {
        row >= self.row_count && !self.end_of_result_set && !self.suspended && self.id.is_some()
    }

    /// Resolve a field key to a column index.
    pub fn column_index(&self, key: FieldKey<'_>) -> Option<usize> {
        match key {
            FieldKey::Index(i) if i < self.col_count => Some(i),
            FieldKey::Index(_) => None,
            FieldKey::Name(name) => self
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name)),
        }
    }

    fn buffered_row(&self, row: u64) -> Option<&Row> {
        if row < self.first_row_index {
            return None;
        }
        let offset = usize::try_from(row - self.first_row_index).ok()?;
        self.rows.get(offset)
    }

    /// Field bytes. NULL and rows outside the buffer are `None`, unless
    /// nulls are read as empty strings.
    pub fn field(&self, row: u64, key: FieldKey<'_>) -> Option<&[u8]> {
        let col = self.column_index(key)?;
        match self.buffered_row(row)?.get(col)? {
            Some(value) => Some(value.as_slice()),
            None if self.nulls_as_empty => Some(&[][..]),
            None => None,
        }
    }

    /// Field as text. Invalid UTF-8 is replaced.
    pub fn field_str(&self, row: u64, key: FieldKey<'_>) -> Option<Cow<'_, str>> {
        self.field(row, key).map(decode)
    }

    /// Length of a field in bytes, 0 for NULL or rows outside the buffer.
    pub fn field_length(&self, row: u64, key: FieldKey<'_>) -> usize {
        self.field(row, key).map_or(0, <[u8]>::len)
    }

    /// All fields of a buffered row.
    pub fn row(&self, row: u64) -> Option<Vec<Option<Cow<'_, str>>>> {
        let fields = self.buffered_row(row)?;
        Some(
            fields
                .iter()
                .map(|f| match f {
                    Some(v) => Some(decode(v)),
                    None if self.nulls_as_empty => Some(Cow::Borrowed("")),
                    None => None,
                })
                .collect(),
        )
    }

    /// Field lengths of a buffered row.
    pub fn row_lengths(&self, row: u64) -> Option<Vec<usize>> {
        let fields = self.buffered_row(row)?;
        Some(fields.iter().map(|f| f.as_ref().map_or(0, Vec::len)).collect())
    }

    /// Column name to field pairs of a buffered row. Requires column info.
    pub fn row_map(&self, row: u64) -> Option<Vec<(&str, Option<Cow<'_, str>>)>> {
        if self.columns.is_empty() {
            return None;
        }
        let values = self.row(row)?;
        Some(
            self.columns
                .iter()
                .map(|c| c.name.as_str())
                .zip(values)
                .collect(),
        )
    }

    /// Number of columns.
    pub fn col_count(&self) -> usize {
        self.col_count
    }

    /// Column metadata. Empty when column info was not requested.
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Metadata of one column.
    pub fn column(&self, key: FieldKey<'_>) -> Option<&ColumnMeta> {
        self.columns.get(self.column_index(key)?)
    }

    /// Longest field seen in a column since the statement ran.
    pub fn longest(&self, key: FieldKey<'_>) -> usize {
        self.column_index(key)
            .and_then(|i| self.longest.get(i).copied())
            .unwrap_or(0)
    }

    /// Index of the first buffered row.
    pub fn first_row_index(&self) -> u64 {
        self.first_row_index
    }

    /// Highest fetched row index plus one.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Number of rows currently buffered.
    pub fn buffered_rows(&self) -> usize {
        self.rows.len()
    }

    /// The server has no more rows.
    pub fn end_of_result_set(&self) -> bool {
        self.end_of_result_set
    }

    /// Rows affected by DML, -1 if unknown.
    pub fn affected_rows(&self) -> i64 {
        self.affected_rows
    }

    /// Total rows: exact once the end is reached, otherwise the server hint.
    pub fn total_rows(&self) -> Option<u64> {
        if self.end_of_result_set {
            Some(self.row_count)
        } else {
            u64::try_from(self.total_rows_hint).ok()
        }
    }

    /// Values returned for output binds by the last execute.
    pub fn output(&self, name: &str) -> Option<&OutputValue> {
        let name = name
            .strip_prefix(':')
            .or_else(|| name.strip_prefix('@'))
            .unwrap_or(name);
        self.output
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
    }
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match simdutf8::basic::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => String::from_utf8_lossy(bytes),
    }
}

impl RowHandler for ResultSet {
    fn describe(&mut self, desc: &Describe<'_>) -> Result<()> {
        self.id = Some(desc.id());
        self.first_row_index = desc.first_row_index();
        self.row_count = self.first_row_index;
        self.page_start = self.first_row_index;
        self.end_of_result_set = false;
        self.suspended = false;
        self.rows.clear();
        self.affected_rows = desc.affected_rows();
        self.total_rows_hint = desc.total_rows();
        self.col_count = desc.num_columns();
        self.columns = desc
            .columns()
            .iter()
            .map(|c| ColumnMeta {
                name: c.name.to_string(),
                type_name: c.type_name.to_string(),
                length: c.length(),
                precision: c.precision(),
                scale: c.scale(),
                nullable: c.nullable(),
                primary_key: c.primary_key(),
                class: ColumnClass::classify(c.type_name),
            })
            .collect();
        self.longest.resize(self.col_count, 0);
        Ok(())
    }

    fn output_binds(&mut self, binds: &OutputBinds<'_>) -> Result<()> {
        self.output = binds
            .iter()
            .map(|b: &OutputBind<'_>| OutputValue {
                name: b.name.to_string(),
                value_type: b.value_type,
                value: b.value.map(<[u8]>::to_vec),
            })
            .collect();
        Ok(())
    }

    fn row(&mut self, row: DataRow<'_>) -> Result<()> {
        let fields: Row = row.iter().map(|f| f.map(<[u8]>::to_vec)).collect();
        if self.longest.len() < fields.len() {
            self.longest.resize(fields.len(), 0);
        }
        for (longest, field) in self.longest.iter_mut().zip(&fields) {
            *longest = (*longest).max(field.as_ref().map_or(0, Vec::len));
        }
        self.rows.push(fields);
        Ok(())
    }

    fn batch_end(&mut self, end: BatchEnd) -> Result<()> {
        self.first_row_index = self.page_start + end.rows_skipped;
        self.row_count = self.first_row_index + self.rows.len() as u64;
        if end.end_of_result_set {
            self.end_of_result_set = true;
        }
        Ok(())
    }
}
