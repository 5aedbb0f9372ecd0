//! # Protocol
//!
//! Wire format spoken between upstream senders and a receiver node.
//!
//! All multi-byte integers are big-endian on the wire.
//!
//! | Message | Layout |
//! |---|---|
//! | Handshake request | `u64 len` + `len` bytes of group name |
//! | Handshake reply | `u64 len` + `len` bytes of encoded destination tags |
//! | Batch header | `i32 count` |
//! | Batch acknowledgement | one byte, [`ACK`] |
//! | Item frame | `i32 source_id`, `i32 destination_tag`, `u64 payload_size`, payload |
//!
//! A `payload_size` of zero is an end-of-stream marker, no payload follows.
//!
//! - [`codec`] holds the pure encode/decode functions
//! - [`frame`] reads and writes whole messages over any tokio stream, for
//!   both the receiving and the sending side

pub mod codec;
mod error;
pub mod frame;

pub use codec::{
    decode_routing_table, encode_routing_table, ItemHeader, ACK, BATCH_HEADER_LEN,
    ITEM_HEADER_LEN, LENGTH_PREFIX_LEN,
};
pub use error::{ProtocolError, Result};
pub use frame::{AckOutcome, Frame, FrameLimits};
