//! Receiver error types

use contracts::DestinationTag;
use thiserror::Error;

/// Receiver-level errors
///
/// Only startup failures and fatal routing inconsistencies surface here.
/// Per-connection I/O and protocol errors retire the connection and are
/// logged, they never stop the event loop.
#[derive(Debug, Error)]
pub enum ReceiverError {
    /// Socket creation or bind failed
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Listen failed
    #[error("failed to listen on {endpoint}: {source}")]
    Listen {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Item carried a destination tag absent from the routing table
    #[error("destination tag {tag} is not in the routing table")]
    UnknownDestination { tag: DestinationTag },

    /// Downstream output channel has been dropped
    #[error("output channel {channel} is closed")]
    OutputClosed { channel: usize },

    /// Inconsistent construction parameters
    #[error("invalid receiver configuration: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReceiverError {
    pub fn bind(endpoint: impl ToString, source: std::io::Error) -> Self {
        Self::Bind {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    pub fn listen(endpoint: impl ToString, source: std::io::Error) -> Self {
        Self::Listen {
            endpoint: endpoint.to_string(),
            source,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Receiver Result 类型别名
pub type Result<T> = std::result::Result<T, ReceiverError>;
