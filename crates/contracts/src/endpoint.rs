//! Endpoint - where the receiver accepts connections

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Transport family of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Filesystem-path addressed Unix stream socket
    Local,
    /// `ip:port` addressed TCP socket
    Network,
}

/// Accept endpoint, immutable after construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Transport family
    pub transport: TransportKind,

    /// Socket path (`Local`) or `ip:port` (`Network`)
    pub address: String,
}

impl Endpoint {
    /// Network endpoint
    pub fn network(address: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Network,
            address: address.into(),
        }
    }

    /// Local (Unix socket) endpoint
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Local,
            address: path.into(),
        }
    }

    /// Parse the address as a socket address (network endpoints)
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.address.parse()
    }

    /// Socket path (local endpoints)
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.address)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            TransportKind::Local => write!(f, "unix:{}", self.address),
            TransportKind::Network => write!(f, "tcp:{}", self.address),
        }
    }
}
