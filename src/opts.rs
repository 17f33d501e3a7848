//! Connection options.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Default relay server port.
pub const DEFAULT_PORT: u16 = 9000;

/// A relay server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address
    pub host: String,
    /// Port number
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    /// Parse `host:port` or `host` (default port).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| Error::InvalidUsage(format!("Invalid port in endpoint: {s}")))?;
                Ok(Endpoint::new(host, port))
            }
            None => Ok(Endpoint::new(s, DEFAULT_PORT)),
        }
    }
}

/// Connection options for a relay server.
#[derive(Debug, Clone)]
pub struct Opts {
    /// Servers to try, in order.
    ///
    /// Default: `[]`
    pub endpoints: Vec<Endpoint>,

    /// Unix socket path. Tried before the endpoints when set.
    ///
    /// Default: `None`
    pub socket: Option<String>,

    /// Username for authentication.
    ///
    /// Default: `""`
    pub user: String,

    /// Password for authentication, passed through to the server.
    ///
    /// Default: `""`
    pub password: String,

    /// Pause between connect rounds.
    ///
    /// Default: `0s`
    pub retry_interval: Duration,

    /// Connect rounds over all endpoints before giving up (at least 1).
    ///
    /// Default: `1`
    pub tries: u32,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            socket: None,
            user: String::new(),
            password: String::new(),
            retry_interval: Duration::ZERO,
            tries: 1,
        }
    }
}

impl Opts {
    /// Options for a single server.
    pub fn new(host: impl Into<String>, port: u16, user: &str, password: &str) -> Self {
        Self {
            endpoints: vec![Endpoint::new(host, port)],
            user: user.to_string(),
            password: password.to_string(),
            ..Opts::default()
        }
    }
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a relay connection URL.
    ///
    /// Format: `relay://[user[:password]@]host[:port][/][?param1=value1&param2=value2&..]`
    ///
    /// Supported query parameters:
    /// - `socket`: unix socket path
    /// - `retry_interval`: seconds between connect rounds
    /// - `tries`: connect rounds (positive integer)
    /// - `fallback`: additional `host:port`, may repeat
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if url.scheme() != "relay" {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'relay://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            user: url.username().to_string(),
            password: url.password().unwrap_or_default().to_string(),
            ..Opts::default()
        };
        if let Some(host) = url.host_str() {
            opts.endpoints
                .push(Endpoint::new(host, url.port().unwrap_or(DEFAULT_PORT)));
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "socket" => {
                    opts.socket = Some(value.to_string());
                }
                "retry_interval" => {
                    let secs: u64 = value.parse().map_err(|_| {
                        Error::InvalidUsage(format!("Invalid retry_interval: {}", value))
                    })?;
                    opts.retry_interval = Duration::from_secs(secs);
                }
                "tries" => {
                    opts.tries = match value.parse() {
                        Ok(n) if n > 0 => n,
                        _ => {
                            return Err(Error::InvalidUsage(format!("Invalid tries: {}", value)));
                        }
                    };
                }
                "fallback" => {
                    opts.endpoints.push(value.parse()?);
                }
                _ => {
                    return Err(Error::InvalidUsage(format!(
                        "Unknown connection parameter: {}",
                        key
                    )));
                }
            }
        }

        if opts.endpoints.is_empty() && opts.socket.is_none() {
            return Err(Error::InvalidUsage("no host or socket given".into()));
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {}", e)))?;
        Self::try_from(&url)
    }
}
