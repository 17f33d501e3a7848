//! Suspended session tokens.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Capability to reclaim a suspended session, redeemable once.
///
/// The token is plain data. It can be printed, handed to another process
/// and parsed back:
///
/// ```
/// use zero_relay::SuspendToken;
///
/// let token: SuspendToken = "db1:9000/0b9f-17".parse().unwrap();
/// assert_eq!(token.port, 9000);
/// assert_eq!(token.to_string(), "db1:9000/0b9f-17");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuspendToken {
    /// Host holding the parked session
    pub host: String,
    /// Port to reconnect to
    pub port: u16,
    /// Server-minted session id
    pub id: String,
}

impl fmt::Display for SuspendToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.id)
    }
}

impl FromStr for SuspendToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidUsage(format!("Invalid suspend token: {s}"));
        let (addr, id) = s.split_once('/').ok_or_else(invalid)?;
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse().map_err(|_| invalid())?;
        if host.is_empty() || id.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port,
            id: id.to_string(),
        })
    }
}
