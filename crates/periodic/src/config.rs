//! Connection configuration and builders

use crate::{Client, PeriodicError, Result, Worker};
use periodic_proto::MAX_RECORD_SIZE;
use std::fmt;
use std::path::PathBuf;

/// Server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port` reached over TCP
    Tcp(String),
    /// Path of a Unix domain socket
    Unix(PathBuf),
}

impl Endpoint {
    /// Parse `tcp://host:port`, `unix:///path` or a bare `host:port`
    pub fn parse(addr: &str) -> Result<Self> {
        // A bare address is TCP.
        let (scheme, rest) = match addr.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("tcp", addr),
        };

        if rest.is_empty() {
            return Err(PeriodicError::InvalidEndpoint(format!("missing address in {:?}", addr)));
        }

        match scheme {
            "tcp" => {
                // Split on the last colon so IPv6 hosts keep theirs.
                let port_ok = rest
                    .rsplit_once(':')
                    .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                    .unwrap_or(false);
                if !port_ok {
                    return Err(PeriodicError::InvalidEndpoint(format!("expected host:port, got {:?}", rest)));
                }
                Ok(Self::Tcp(rest.to_string()))
            }
            "unix" => Ok(Self::Unix(PathBuf::from(rest))),
            other => Err(PeriodicError::InvalidEndpoint(format!("unsupported scheme {:?}", other))),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{}", addr),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = PeriodicError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Address used when none is given
pub const DEFAULT_ADDR: &str = "127.0.0.1:5000";

impl Default for Endpoint {
    fn default() -> Self {
        Self::Tcp(DEFAULT_ADDR.to_string())
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address
    pub endpoint: Endpoint,
    /// Largest record accepted or sent
    pub max_record_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            max_record_size: MAX_RECORD_SIZE,
        }
    }
}

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Server address
    pub endpoint: Endpoint,
    /// Maximum number of handlers running at once
    pub size: usize,
    /// Largest record accepted or sent
    pub max_record_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            size: 1,
            max_record_size: MAX_RECORD_SIZE,
        }
    }
}

/// Builder for [`Client`]
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    addr: String,
    max_record_size: usize,
}

impl ClientBuilder {
    /// Create a builder for the server at `addr`
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            max_record_size: MAX_RECORD_SIZE,
        }
    }

    /// Set the largest record accepted or sent
    pub fn with_max_record_size(mut self, max_record_size: usize) -> Self {
        self.max_record_size = max_record_size;
        self
    }

    /// Build the client configuration
    pub fn build_config(self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            endpoint: Endpoint::parse(&self.addr)?,
            max_record_size: self.max_record_size,
        })
    }

    /// Connect and create the client
    pub async fn connect(self) -> Result<Client> {
        Client::with_config(self.build_config()?).await
    }
}

/// Builder for [`Worker`]
#[derive(Debug, Clone)]
pub struct WorkerBuilder {
    addr: String,
    size: usize,
    max_record_size: usize,
}

impl WorkerBuilder {
    /// Create a builder for the server at `addr`
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            size: 1,
            max_record_size: MAX_RECORD_SIZE,
        }
    }

    /// Set how many handlers may run at once. Zero is treated as one.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the largest record accepted or sent
    pub fn with_max_record_size(mut self, max_record_size: usize) -> Self {
        self.max_record_size = max_record_size;
        self
    }

    /// Build the worker configuration
    pub fn build_config(self) -> Result<WorkerConfig> {
        Ok(WorkerConfig {
            endpoint: Endpoint::parse(&self.addr)?,
            size: self.size.max(1),
            max_record_size: self.max_record_size,
        })
    }

    /// Connect and create the worker
    pub async fn connect(self) -> Result<Worker> {
        Worker::with_config(self.build_config()?).await
    }
}
