//! Common relay wire protocol types.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Protocol version sent in the startup message.
pub const PROTOCOL_VERSION: u16 = 1;

/// Server-assigned result set identifier.
pub type ResultSetId = u16;

/// Error classification carried by an error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    /// Statement syntax error
    Syntax = 0,
    /// Statement semantic error (unknown table, wrong column count, ...)
    Semantic = 1,
    /// Backend or proxy failure
    ServerFault = 2,
    /// Credentials refused
    AuthRejected = 10,
    /// Unsupported protocol version
    ProtocolMismatch = 11,
    /// Suspended session is gone
    ResumeExpired = 20,
    /// Suspended session was already reclaimed
    AlreadyResumed = 21,
    /// Session has state that cannot be parked
    NotSuspendable = 30,
    /// Result set id not known to the session
    UnknownResultSet = 31,
}

impl ErrorKind {
    /// Create an ErrorKind from a raw byte. Unknown values are server faults.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ErrorKind::Syntax,
            1 => ErrorKind::Semantic,
            10 => ErrorKind::AuthRejected,
            11 => ErrorKind::ProtocolMismatch,
            20 => ErrorKind::ResumeExpired,
            21 => ErrorKind::AlreadyResumed,
            30 => ErrorKind::NotSuspendable,
            31 => ErrorKind::UnknownResultSet,
            _ => ErrorKind::ServerFault,
        }
    }
}

/// Direction of a bind variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BindDirection {
    /// Value is sent to the server
    #[default]
    In = 0,
    /// Value is returned by the server
    Out = 1,
}

impl BindDirection {
    /// Create a BindDirection from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BindDirection::In),
            1 => Some(BindDirection::Out),
            _ => None,
        }
    }
}

/// Value type tag used for binds and output binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    /// SQL NULL
    Null = 0,
    /// Character data
    String = 1,
    /// 64-bit signed integer
    Integer = 2,
    /// Double with display precision and scale
    Double = 3,
    /// Binary large object
    Blob = 4,
    /// Character large object
    Clob = 5,
}

impl ValueType {
    /// Create a ValueType from a raw byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ValueType::Null),
            1 => Some(ValueType::String),
            2 => Some(ValueType::Integer),
            3 => Some(ValueType::Double),
            4 => Some(ValueType::Blob),
            5 => Some(ValueType::Clob),
            _ => None,
        }
    }
}

/// Transaction state as tracked by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionStatus {
    /// No statement has run since the last commit or rollback
    #[default]
    Idle,
    /// Statements ran that are not yet committed
    InTransaction,
}

impl TransactionStatus {
    /// Returns true if there is uncommitted work.
    pub fn in_transaction(self) -> bool {
        matches!(self, TransactionStatus::InTransaction)
    }
}

macro_rules! be_int {
    ($(#[$doc:meta])* $name:ident, $native:ty, $len:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
        #[repr(C)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Create from a native value.
            pub const fn new(value: $native) -> Self {
                Self(value.to_be_bytes())
            }

            /// Get the native value.
            pub const fn get(self) -> $native {
                <$native>::from_be_bytes(self.0)
            }
        }

        impl From<$native> for $name {
            fn from(value: $native) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for $native {
            fn from(value: $name) -> Self {
                value.get()
            }
        }
    };
}

be_int!(
    /// Big-endian 16-bit unsigned integer for zerocopy.
    U16BE, u16, 2
);
be_int!(
    /// Big-endian 32-bit unsigned integer for zerocopy.
    U32BE, u32, 4
);
be_int!(
    /// Big-endian 32-bit signed integer for zerocopy.
    I32BE, i32, 4
);
be_int!(
    /// Big-endian 64-bit unsigned integer for zerocopy.
    U64BE, u64, 8
);
be_int!(
    /// Big-endian 64-bit signed integer for zerocopy.
    I64BE, i64, 8
);
