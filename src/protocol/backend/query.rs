//! Result set backend messages.

use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{
    MessageBuilder, read_cstr, read_nullable, read_u8, read_u16, read_u64,
};
use crate::protocol::types::{I64BE, ResultSetId, U16BE, U32BE, U64BE, ValueType};

use super::msg_type;

/// Column is nullable.
pub const COLUMN_NULLABLE: u8 = 0x01;
/// Column is part of the primary key.
pub const COLUMN_PRIMARY_KEY: u8 = 0x02;

/// Describe message header (29 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DescribeHead {
    /// Server result set id
    pub id: U16BE,
    /// Index of the first row that follows
    pub first_row_index: U64BE,
    /// Rows affected by DML (-1 if unknown)
    pub affected_rows: I64BE,
    /// Total rows hint (-1 if unknown)
    pub total_rows: I64BE,
    /// 1 if column descriptions follow
    pub has_columns: u8,
    /// Number of columns in each row
    pub num_columns: U16BE,
}

/// Fixed-size tail of a column description (13 bytes).
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ColumnTail {
    /// Declared length
    pub length: U32BE,
    /// Numeric precision
    pub precision: U32BE,
    /// Numeric scale
    pub scale: U32BE,
    /// `COLUMN_NULLABLE` | `COLUMN_PRIMARY_KEY`
    pub flags: u8,
}

/// Column description within a Describe.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDescription<'a> {
    /// Column name
    pub name: &'a str,
    /// Backend type name, e.g. "VARCHAR2"
    pub type_name: &'a str,
    /// Fixed-size metadata
    pub tail: ColumnTail,
}

impl ColumnDescription<'_> {
    /// Declared length
    pub fn length(&self) -> u32 {
        self.tail.length.get()
    }

    /// Numeric precision
    pub fn precision(&self) -> u32 {
        self.tail.precision.get()
    }

    /// Numeric scale
    pub fn scale(&self) -> u32 {
        self.tail.scale.get()
    }

    /// Column accepts NULL
    pub fn nullable(&self) -> bool {
        self.tail.flags & COLUMN_NULLABLE != 0
    }

    /// Column is part of the primary key
    pub fn primary_key(&self) -> bool {
        self.tail.flags & COLUMN_PRIMARY_KEY != 0
    }
}

/// Describe message - opens (or reopens) a result set.
#[derive(Debug)]
pub struct Describe<'a> {
    head: DescribeHead,
    columns: Vec<ColumnDescription<'a>>,
    payload: &'a [u8],
}

impl<'a> Describe<'a> {
    /// Parse a Describe message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        const HEAD_SIZE: usize = size_of::<DescribeHead>();
        const TAIL_SIZE: usize = size_of::<ColumnTail>();

        let (head, mut data) = payload
            .split_at_checked(HEAD_SIZE)
            .ok_or_else(|| Error::Protocol("Describe header truncated".into()))?;
        let head = DescribeHead::read_from_bytes(head)
            .map_err(|e| Error::Protocol(format!("Describe header: {e:?}")))?;

        let mut columns = Vec::new();
        if head.has_columns != 0 {
            columns.reserve(head.num_columns.get() as usize);
            for _ in 0..head.num_columns.get() {
                let (name, rest) = read_cstr(data)?;
                let (type_name, rest) = read_cstr(rest)?;
                let (tail, rest) = rest
                    .split_at_checked(TAIL_SIZE)
                    .ok_or_else(|| Error::Protocol("ColumnDescription truncated".into()))?;
                let tail = ColumnTail::read_from_bytes(tail)
                    .map_err(|e| Error::Protocol(format!("ColumnDescription tail: {e:?}")))?;
                columns.push(ColumnDescription {
                    name,
                    type_name,
                    tail,
                });
                data = rest;
            }
        }

        Ok(Self {
            head,
            columns,
            payload,
        })
    }

    /// Write a Describe message.
    pub fn write(buf: &mut Vec<u8>, head: &DescribeHead, columns: &[ColumnDescription<'_>]) {
        let mut msg = MessageBuilder::new(buf, msg_type::DESCRIBE);
        msg.write_bytes(head.as_bytes());
        if head.has_columns != 0 {
            for column in columns {
                msg.write_cstr(column.name);
                msg.write_cstr(column.type_name);
                msg.write_bytes(column.tail.as_bytes());
            }
        }
        msg.finish();
    }

    /// Re-emit this message exactly as received.
    pub fn write_raw(&self, buf: &mut Vec<u8>) {
        let mut msg = MessageBuilder::new(buf, msg_type::DESCRIBE);
        msg.write_bytes(self.payload);
        msg.finish();
    }

    /// Server result set id
    pub fn id(&self) -> ResultSetId {
        self.head.id.get()
    }

    /// Index of the first row that follows
    pub fn first_row_index(&self) -> u64 {
        self.head.first_row_index.get()
    }

    /// Rows affected by DML (-1 if unknown)
    pub fn affected_rows(&self) -> i64 {
        self.head.affected_rows.get()
    }

    /// Total rows hint (-1 if unknown)
    pub fn total_rows(&self) -> i64 {
        self.head.total_rows.get()
    }

    /// Number of columns in each row
    pub fn num_columns(&self) -> usize {
        self.head.num_columns.get() as usize
    }

    /// Column descriptions (empty when column info is off)
    pub fn columns(&self) -> &[ColumnDescription<'a>] {
        &self.columns
    }
}

/// One output bind value.
#[derive(Debug, Clone, Copy)]
pub struct OutputBind<'a> {
    /// Placeholder name without sigil
    pub name: &'a str,
    /// Type of the returned value
    pub value_type: ValueType,
    /// Returned value, `None` for NULL
    pub value: Option<&'a [u8]>,
}

/// OutputBinds message - values returned for output bind variables.
#[derive(Debug)]
pub struct OutputBinds<'a> {
    binds: Vec<OutputBind<'a>>,
}

impl<'a> OutputBinds<'a> {
    /// Parse an OutputBinds message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (count, mut data) = read_u16(payload)?;
        let mut binds = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (name, rest) = read_cstr(data)?;
            let (ty, rest) = read_u8(rest)?;
            let value_type = ValueType::from_u8(ty)
                .ok_or_else(|| Error::Protocol(format!("unknown value type {ty}")))?;
            let (value, rest) = read_nullable(rest)?;
            binds.push(OutputBind {
                name,
                value_type,
                value,
            });
            data = rest;
        }
        Ok(Self { binds })
    }

    /// Write an OutputBinds message.
    pub fn write(buf: &mut Vec<u8>, binds: &[OutputBind<'_>]) {
        let mut msg = MessageBuilder::new(buf, msg_type::OUTPUT_BINDS);
        msg.write_u16(binds.len() as u16);
        for bind in binds {
            msg.write_cstr(bind.name);
            msg.write_u8(bind.value_type as u8);
            msg.write_nullable(bind.value);
        }
        msg.finish();
    }

    /// Iterate over returned binds.
    pub fn iter(&self) -> impl Iterator<Item = &OutputBind<'a>> {
        self.binds.iter()
    }
}

/// DataRow message - contains a single row of data.
#[derive(Debug, Clone, Copy)]
pub struct DataRow<'a> {
    /// Number of columns
    num_columns: u16,
    /// Column data (after the column count)
    columns_data: &'a [u8],
}

impl<'a> DataRow<'a> {
    /// Parse a DataRow message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (num_columns, columns_data) = read_u16(payload)?;
        Ok(Self {
            num_columns,
            columns_data,
        })
    }

    /// Write a DataRow message.
    pub fn write(buf: &mut Vec<u8>, values: &[Option<&[u8]>]) {
        let mut msg = MessageBuilder::new(buf, msg_type::DATA_ROW);
        msg.write_u16(values.len() as u16);
        for value in values {
            msg.write_nullable(*value);
        }
        msg.finish();
    }

    /// Re-emit this row exactly as received.
    pub fn write_raw(&self, buf: &mut Vec<u8>) {
        let mut msg = MessageBuilder::new(buf, msg_type::DATA_ROW);
        msg.write_u16(self.num_columns);
        msg.write_bytes(self.columns_data);
        msg.finish();
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.num_columns as usize
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.num_columns == 0
    }

    /// Create an iterator over column values.
    ///
    /// Each item is `Option<&[u8]>` where `None` represents NULL.
    pub fn iter(&self) -> DataRowIter<'a> {
        DataRowIter {
            remaining: self.columns_data,
        }
    }
}

/// Iterator over column values in a DataRow.
#[derive(Debug, Clone)]
pub struct DataRowIter<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for DataRowIter<'a> {
    type Item = Option<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        let len;
        (len, self.remaining) = self.remaining.split_at_checked(4)?;
        let len = i32::from_be_bytes([len[0], len[1], len[2], len[3]]);

        if len < 0 {
            Some(None)
        } else {
            let value;
            (value, self.remaining) = self.remaining.split_at_checked(len as usize)?;
            Some(Some(value))
        }
    }
}

/// BatchEnd message - closes a batch of rows.
#[derive(Debug, Clone, Copy)]
pub struct BatchEnd {
    /// No rows remain on the server
    pub end_of_result_set: bool,
    /// Rows the server actually skipped before this batch
    pub rows_skipped: u64,
}

impl BatchEnd {
    /// End of a batch that skipped nothing.
    pub fn new(end_of_result_set: bool) -> Self {
        Self {
            end_of_result_set,
            rows_skipped: 0,
        }
    }

    /// Parse a BatchEnd message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (end, rest) = read_u8(payload)?;
        let (rows_skipped, _) = read_u64(rest)?;
        Ok(Self {
            end_of_result_set: end != 0,
            rows_skipped,
        })
    }

    /// Write a BatchEnd message.
    pub fn write(&self, buf: &mut Vec<u8>) {
        let mut msg = MessageBuilder::new(buf, msg_type::BATCH_END);
        msg.write_u8(u8::from(self.end_of_result_set));
        msg.write_u64(self.rows_skipped);
        msg.finish();
    }
}

impl DescribeHead {
    /// Create a header.
    pub fn new(
        id: ResultSetId,
        first_row_index: u64,
        affected_rows: i64,
        total_rows: i64,
        num_columns: u16,
        has_columns: bool,
    ) -> Self {
        Self {
            id: id.into(),
            first_row_index: first_row_index.into(),
            affected_rows: affected_rows.into(),
            total_rows: total_rows.into(),
            has_columns: u8::from(has_columns),
            num_columns: num_columns.into(),
        }
    }
}

impl ColumnTail {
    /// Create a column tail.
    pub fn new(length: u32, precision: u32, scale: u32, flags: u8) -> Self {
        Self {
            length: length.into(),
            precision: precision.into(),
            scale: scale.into(),
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_with_and_without_columns() {
        let columns = [ColumnDescription {
            name: "COL1",
            type_name: "NUMBER",
            tail: ColumnTail::new(22, 10, 2, COLUMN_NULLABLE | COLUMN_PRIMARY_KEY),
        }];

        let mut buf = Vec::new();
        Describe::write(&mut buf, &DescribeHead::new(7, 4, -1, 9, 1, true), &columns);
        let desc = Describe::parse(&buf[5..]).unwrap();
        assert_eq!((desc.id(), desc.first_row_index(), desc.total_rows()), (7, 4, 9));
        let col = &desc.columns()[0];
        assert_eq!((col.name, col.type_name, col.length()), ("COL1", "NUMBER", 22));
        assert!(col.nullable() && col.primary_key());

        buf.clear();
        Describe::write(&mut buf, &DescribeHead::new(7, 0, 3, -1, 1, false), &columns);
        let desc = Describe::parse(&buf[5..]).unwrap();
        assert_eq!(desc.num_columns(), 1);
        assert!(desc.columns().is_empty());
        assert_eq!(desc.affected_rows(), 3);

        let mut raw = Vec::new();
        desc.write_raw(&mut raw);
        assert_eq!(raw, buf);
    }

    #[test]
    fn data_row_with_nulls() {
        let mut buf = Vec::new();
        DataRow::write(&mut buf, &[Some(&b"1"[..]), None, Some(&b""[..])]);
        let row = DataRow::parse(&buf[5..]).unwrap();
        let values: Vec<_> = row.iter().collect();
        assert_eq!(values, vec![Some(&b"1"[..]), None, Some(&b""[..])]);
    }

    #[test]
    fn truncated_describe_fails() {
        assert!(Describe::parse(&[0, 1, 0]).is_err());
    }
}
