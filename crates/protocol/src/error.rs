//! Protocol error types

use thiserror::Error;

/// Framing and codec errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Peer closed the stream before or inside a message
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// Length-prefixed handshake message (token or reply) over its ceiling
    #[error("handshake frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: u64, max: u64 },

    /// Handshake token is not UTF-8
    #[error("handshake token is not valid UTF-8")]
    InvalidToken,

    /// Item payload larger than the configured ceiling
    #[error("item payload of {len} bytes exceeds limit of {max}")]
    PayloadTooLarge { len: u64, max: u64 },

    /// Batch header declared a negative item count
    #[error("batch header declared negative size {0}")]
    NegativeBatchSize(i32),

    /// Acknowledgement byte did not match
    #[error("unexpected acknowledgement byte {0:#04x}")]
    UnexpectedAck(u8),

    /// Routing table (de)serialization failed
    #[error("routing table codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Map an IO error, folding EOF into `ConnectionClosed`
    pub fn from_io(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::ConnectionClosed
        } else {
            Self::Io(e)
        }
    }

    /// Whether the peer simply went away
    pub fn is_peer_closed(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// Protocol Result 类型别名
pub type Result<T> = std::result::Result<T, ProtocolError>;
