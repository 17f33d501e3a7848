//! Statement execution and result set paging messages.

use crate::bind::{Bind, BindValue};
use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{BindDirection, ResultSetId};

use super::msg_type;

/// Per-execute options sent with the statement.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteOptions {
    /// Send column metadata with the result
    pub column_info: bool,
    /// Rows to send right away (0 = all)
    pub buffer_size: u32,
}

/// Write an Execute message.
///
/// Bind layout: name, direction, value type, value (input binds only),
/// declared capacity. Fails with `Error::InvalidUsage`, writing nothing, when
/// there are more binds than the u16 count can carry.
pub fn write_execute<'a>(
    buf: &mut Vec<u8>,
    sql: &str,
    binds: impl ExactSizeIterator<Item = &'a Bind>,
    opts: ExecuteOptions,
) -> Result<()> {
    let count = u16::try_from(binds.len()).map_err(|_| {
        Error::InvalidUsage(format!("{} binds exceed the limit of {}", binds.len(), u16::MAX))
    })?;
    let mut msg = MessageBuilder::new(buf, msg_type::EXECUTE);
    msg.write_u8(u8::from(opts.column_info));
    msg.write_u32(opts.buffer_size);
    msg.write_lbytes(sql.as_bytes());
    msg.write_u16(count);
    for bind in binds {
        msg.write_cstr(&bind.key.wire_name());
        msg.write_u8(bind.direction as u8);
        msg.write_u8(bind.out_type as u8);
        if bind.direction == BindDirection::In {
            write_bind_value(&mut msg, &bind.value);
        }
        msg.write_u32(bind.capacity);
    }
    msg.finish();
    Ok(())
}

fn write_bind_value(msg: &mut MessageBuilder<'_>, value: &BindValue) {
    match value {
        BindValue::Null => {}
        BindValue::String(s) | BindValue::Clob(s) => msg.write_lbytes(s.as_bytes()),
        BindValue::Integer(i) => msg.write_i64(*i),
        BindValue::Double {
            value,
            precision,
            scale,
        } => {
            msg.write_u64(value.to_bits());
            msg.write_u32(*precision);
            msg.write_u32(*scale);
        }
        BindValue::Blob(bytes) => msg.write_lbytes(bytes),
    }
}

/// Write a Fetch message.
///
/// The server skips `skip` rows, then sends at most `limit` rows (0 = all).
pub fn write_fetch(buf: &mut Vec<u8>, id: ResultSetId, skip: u64, limit: u32) {
    let mut msg = MessageBuilder::new(buf, msg_type::FETCH);
    msg.write_u16(id);
    msg.write_u64(skip);
    msg.write_u32(limit);
    msg.finish();
}

/// Write an AbortResultSet message.
pub fn write_abort_result_set(buf: &mut Vec<u8>, id: ResultSetId) {
    let mut msg = MessageBuilder::new(buf, msg_type::ABORT_RESULT_SET);
    msg.write_u16(id);
    msg.finish();
}

/// Write a ResumeResultSet message.
pub fn write_resume_result_set(buf: &mut Vec<u8>, id: ResultSetId, opts: ExecuteOptions) {
    let mut msg = MessageBuilder::new(buf, msg_type::RESUME_RESULT_SET);
    msg.write_u16(id);
    msg.write_u8(u8::from(opts.column_info));
    msg.write_u32(opts.buffer_size);
    msg.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{BindKey, BindSet};
    use crate::protocol::codec::{read_cstr, read_i64, read_lstr, read_u16, read_u32, read_u8};
    use crate::protocol::types::ValueType;

    #[test]
    fn execute_encodes_input_and_output_binds() {
        let mut binds = BindSet::new();
        binds.input(BindKey::name("n"), 42.into());
        binds.output(BindKey::name("out"), ValueType::String, 100);

        let mut buf = Vec::new();
        write_execute(
            &mut buf,
            "call p(:n, :out)",
            binds.iter(),
            ExecuteOptions {
                column_info: true,
                buffer_size: 2,
            },
        )
        .unwrap();

        assert_eq!(buf[0], b'Q');
        let data = &buf[5..];
        let (column_info, data) = read_u8(data).unwrap();
        let (buffer_size, data) = read_u32(data).unwrap();
        let (sql, data) = read_lstr(data).unwrap();
        let (count, data) = read_u16(data).unwrap();
        assert_eq!((column_info, buffer_size, sql, count), (1, 2, "call p(:n, :out)", 2));

        let (name, data) = read_cstr(data).unwrap();
        let (direction, data) = read_u8(data).unwrap();
        let (ty, data) = read_u8(data).unwrap();
        let (value, data) = read_i64(data).unwrap();
        let (_capacity, data) = read_u32(data).unwrap();
        assert_eq!((name, direction, ty, value), ("n", 0, ValueType::Integer as u8, 42));

        let (name, data) = read_cstr(data).unwrap();
        let (direction, data) = read_u8(data).unwrap();
        let (ty, data) = read_u8(data).unwrap();
        let (capacity, data) = read_u32(data).unwrap();
        assert_eq!((name, direction, ty, capacity), ("out", 1, ValueType::String as u8, 100));
        assert!(data.is_empty());
    }

    #[test]
    fn execute_rejects_too_many_binds() {
        let mut binds = BindSet::new();
        binds.input(BindKey::name("n"), 1.into());
        let bind = binds.iter().next().unwrap();

        let mut buf = Vec::new();
        let opts = ExecuteOptions {
            column_info: false,
            buffer_size: 0,
        };
        let err = write_execute(&mut buf, "select", std::iter::repeat_n(bind, 65_536), opts)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)));
        assert!(buf.is_empty());

        write_execute(&mut buf, "select", std::iter::repeat_n(bind, 65_535), opts).unwrap();
        assert_eq!(&buf[5 + 1 + 4 + 4 + 6..][..2], [0xff, 0xff]);
    }
}
