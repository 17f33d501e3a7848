//! Bind variables for prepared statements.

use crate::error::BindError;
use crate::protocol::types::{BindDirection, ValueType};

/// Key of a bind variable: a placeholder name or a 1-based position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindKey {
    /// Named placeholder such as `:name` or `@name` (stored without the sigil)
    Name(String),
    /// Positional placeholder such as `?`, `$1` or `:1`
    Position(u16),
}

impl BindKey {
    /// Create a key from a placeholder name, stripping a leading `:` or `@`.
    pub fn name(name: &str) -> Self {
        let name = name
            .strip_prefix(':')
            .or_else(|| name.strip_prefix('@'))
            .unwrap_or(name);
        match name.parse::<u16>() {
            Ok(pos) if pos > 0 => BindKey::Position(pos),
            _ => BindKey::Name(name.to_string()),
        }
    }

    /// Text sent on the wire: the name, or the position in decimal.
    pub fn wire_name(&self) -> String {
        self.to_string()
    }

    fn matches(&self, other: &BindKey) -> bool {
        match (self, other) {
            (BindKey::Name(a), BindKey::Name(b)) => a.eq_ignore_ascii_case(b),
            (BindKey::Position(a), BindKey::Position(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for BindKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindKey::Name(name) => f.write_str(name),
            BindKey::Position(pos) => write!(f, "{pos}"),
        }
    }
}

impl From<&str> for BindKey {
    fn from(value: &str) -> Self {
        BindKey::name(value)
    }
}

impl From<&String> for BindKey {
    fn from(value: &String) -> Self {
        BindKey::name(value)
    }
}

impl From<String> for BindKey {
    fn from(value: String) -> Self {
        BindKey::name(&value)
    }
}

impl From<u16> for BindKey {
    fn from(value: u16) -> Self {
        BindKey::Position(value)
    }
}

/// Value of a bind variable or substitution.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// SQL NULL
    Null,
    /// Character data
    String(String),
    /// Integer
    Integer(i64),
    /// Floating point with display precision and scale (0/0 = shortest form)
    Double {
        /// The value
        value: f64,
        /// Total digits
        precision: u32,
        /// Digits after the decimal point
        scale: u32,
    },
    /// Binary large object
    Blob(Vec<u8>),
    /// Character large object
    Clob(String),
}

impl BindValue {
    /// Wire type tag for this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            BindValue::Null => ValueType::Null,
            BindValue::String(_) => ValueType::String,
            BindValue::Integer(_) => ValueType::Integer,
            BindValue::Double { .. } => ValueType::Double,
            BindValue::Blob(_) => ValueType::Blob,
            BindValue::Clob(_) => ValueType::Clob,
        }
    }

    /// Attach precision and scale. Only doubles carry them; other values are returned unchanged.
    pub fn with_precision(self, precision: u32, scale: u32) -> Self {
        match self {
            BindValue::Double { value, .. } => BindValue::Double {
                value,
                precision,
                scale,
            },
            other => other,
        }
    }

    /// Render the value as SQL-ready text. NULL renders as `NULL`.
    pub fn to_text(&self) -> String {
        match self {
            BindValue::Null => "NULL".to_string(),
            BindValue::String(s) | BindValue::Clob(s) => s.clone(),
            BindValue::Integer(i) => i.to_string(),
            BindValue::Double { value, scale, .. } => format_double(*value, *scale),
            BindValue::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Format a double with `scale` fractional digits, or the shortest exact form when `scale` is 0.
pub fn format_double(value: f64, scale: u32) -> String {
    if scale == 0 {
        format!("{value}")
    } else {
        format!("{:.*}", scale as usize, value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::String(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::String(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Integer(value)
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        BindValue::Integer(i64::from(value))
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Double {
            value,
            precision: 0,
            scale: 0,
        }
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(value: Vec<u8>) -> Self {
        BindValue::Blob(value)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(BindValue::Null, Into::into)
    }
}

/// A bind variable attached to a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    /// Placeholder key
    pub key: BindKey,
    /// Value sent for input binds (NULL for output binds)
    pub value: BindValue,
    /// Whether the value is sent or returned
    pub direction: BindDirection,
    /// Declared type of an output bind
    pub out_type: ValueType,
    /// Declared capacity of an output bind in bytes
    pub capacity: u32,
}

/// Ordered bind variables of a statement. Re-binding a key overwrites it.
#[derive(Debug, Clone, Default)]
pub struct BindSet {
    entries: Vec<Bind>,
}

impl BindSet {
    /// Create an empty bind set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an input bind.
    pub fn input(&mut self, key: BindKey, value: BindValue) {
        self.upsert(Bind {
            key,
            out_type: value.value_type(),
            value,
            direction: BindDirection::In,
            capacity: 0,
        });
    }

    /// Add or replace an output bind.
    pub fn output(&mut self, key: BindKey, out_type: ValueType, capacity: u32) {
        self.upsert(Bind {
            key,
            value: BindValue::Null,
            direction: BindDirection::Out,
            out_type,
            capacity,
        });
    }

    fn upsert(&mut self, bind: Bind) {
        match self
            .entries
            .iter_mut()
            .find(|b| b.direction == bind.direction && b.key.matches(&bind.key))
        {
            Some(existing) => *existing = bind,
            None => self.entries.push(bind),
        }
    }

    /// Remove all binds.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All binds in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Bind> {
        self.entries.iter()
    }

    /// Number of binds.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no binds are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check every bind against the placeholders of `sql`.
    pub fn validate(&self, sql: &str) -> Result<(), BindError> {
        let placeholders = Placeholders::scan(sql);
        match self.entries.iter().find(|b| !placeholders.contains(&b.key)) {
            Some(bind) => Err(BindError::UnknownPlaceholder(bind.key.to_string())),
            None => Ok(()),
        }
    }
}

/// Placeholders found in a statement.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Placeholders {
    /// Named placeholders without their sigil
    pub names: Vec<String>,
    /// Highest positional placeholder
    pub max_position: u16,
}

impl Placeholders {
    /// Scan `sql` for `:name`, `@name`, `:n`, `$n` and `?` outside of quoted text.
    pub fn scan(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut found = Placeholders::default();
        let mut anonymous: u16 = 0;
        let mut quote: Option<u8> = None;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            if let Some(q) = quote {
                if b == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'?' => {
                    anonymous = anonymous.saturating_add(1);
                    found.max_position = found.max_position.max(anonymous);
                }
                b':' if bytes.get(i + 1) == Some(&b':') => {
                    // type cast
                    i += 2;
                    continue;
                }
                b':' | b'@' | b'$' => {
                    let start = i + 1;
                    let end = start
                        + bytes[start..]
                            .iter()
                            .take_while(|c| c.is_ascii_alphanumeric() || **c == b'_')
                            .count();
                    if end > start {
                        let ident = &sql[start..end];
                        match ident.parse::<u16>() {
                            Ok(pos) => found.max_position = found.max_position.max(pos),
                            Err(_) if b != b'$' => found.names.push(ident.to_string()),
                            Err(_) => {}
                        }
                        i = end;
                        continue;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        found
    }

    /// Check whether a bind key has a matching placeholder.
    pub fn contains(&self, key: &BindKey) -> bool {
        match key {
            BindKey::Name(name) => self.names.iter().any(|n| n.eq_ignore_ascii_case(name)),
            BindKey::Position(pos) => *pos <= self.max_position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_overwrites() {
        let mut binds = BindSet::new();
        binds.input("var1".into(), "a".into());
        binds.input(":VAR1".into(), "b".into());
        binds.input(BindKey::Position(1), 5.into());

        assert_eq!(binds.len(), 2);
        let first = binds.iter().next().unwrap();
        assert_eq!(first.value, BindValue::String("b".into()));
    }

    #[test]
    fn output_and_input_with_same_name_coexist() {
        let mut binds = BindSet::new();
        binds.input("x".into(), 1.into());
        binds.output("x".into(), ValueType::String, 10);
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn scan_skips_quotes_and_casts() {
        let p = Placeholders::scan(
            "insert into t values (:var1, '01:00:00', @var2, x::int, $3, ?)",
        );
        assert_eq!(p.names, vec!["var1".to_string(), "var2".to_string()]);
        assert_eq!(p.max_position, 3);
    }

    #[test]
    fn validation_reports_unknown_key() {
        let mut binds = BindSet::new();
        binds.input("var1".into(), "x".into());
        binds.input("var9".into(), "junk".into());

        let err = binds.validate("select :var1 from t").unwrap_err();
        assert_eq!(err, BindError::UnknownPlaceholder("var9".into()));

        binds.clear();
        binds.input(BindKey::Position(2), 1.into());
        assert!(binds.validate("select ?, ? from t").is_ok());
        assert!(binds.validate("select ? from t").is_err());
    }

    #[test]
    fn double_formatting() {
        assert_eq!(format_double(5.0, 2), "5.00");
        assert_eq!(format_double(10.5556, 4), "10.5556");
        assert_eq!(format_double(5.1, 0), "5.1");
        assert_eq!(BindValue::from(6.1).with_precision(2, 1).to_text(), "6.1");
        assert_eq!(BindValue::from(None::<i64>).to_text(), "NULL");
    }
}
