//! Pure encode/decode functions, no I/O

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::{DestinationTag, Item};

use crate::Result;

/// Acknowledgement token written after every batch header
pub const ACK: u8 = b'A';

/// Size of the `u64` length prefix on handshake messages
pub const LENGTH_PREFIX_LEN: usize = 8;

/// Size of a batch header
pub const BATCH_HEADER_LEN: usize = 4;

/// Size of an item frame header
pub const ITEM_HEADER_LEN: usize = 16;

/// Fixed item frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    pub source_id: i32,
    pub destination_tag: DestinationTag,
    pub payload_size: u64,
}

impl ItemHeader {
    /// Decode from network byte order
    pub fn decode(buf: &[u8; ITEM_HEADER_LEN]) -> Self {
        let mut buf = &buf[..];
        Self {
            source_id: buf.get_i32(),
            destination_tag: buf.get_i32(),
            payload_size: buf.get_u64(),
        }
    }

    /// Encode in network byte order
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32(self.source_id);
        dst.put_i32(self.destination_tag);
        dst.put_u64(self.payload_size);
    }

    /// Zero-length frames mark the end of a connection's stream
    pub fn is_end_of_stream(&self) -> bool {
        self.payload_size == 0
    }
}

/// Serialize a destination tag sequence (without the wire length prefix)
///
/// bincode fixed-int layout: `u64` LE element count then `i32` LE elements.
pub fn encode_routing_table(ids: &[DestinationTag]) -> Result<Bytes> {
    Ok(Bytes::from(bincode::serialize(ids)?))
}

/// Inverse of [`encode_routing_table`]
pub fn decode_routing_table(buf: &[u8]) -> Result<Vec<DestinationTag>> {
    Ok(bincode::deserialize(buf)?)
}

/// `u64` length prefix followed by the payload
pub fn encode_length_prefixed(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    buf.put_u64(payload.len() as u64);
    buf.put_slice(payload);
    buf.freeze()
}

/// Handshake request carrying the sender's group name
pub fn encode_handshake_request(token: &str) -> Bytes {
    encode_length_prefixed(token.as_bytes())
}

/// Handshake reply carrying the reachable destinations
pub fn encode_handshake_reply(ids: &[DestinationTag]) -> Result<Bytes> {
    let table = encode_routing_table(ids)?;
    Ok(encode_length_prefixed(&table))
}

/// Batch header
pub fn encode_batch_header(count: i32) -> [u8; BATCH_HEADER_LEN] {
    count.to_be_bytes()
}

/// Batch header, host order
pub fn decode_batch_header(buf: [u8; BATCH_HEADER_LEN]) -> i32 {
    i32::from_be_bytes(buf)
}

/// Full item frame: header + payload
pub fn encode_item_frame(item: &Item) -> Bytes {
    let header = ItemHeader {
        source_id: item.source_id,
        destination_tag: item.destination_tag,
        payload_size: item.payload.len() as u64,
    };
    let mut buf = BytesMut::with_capacity(ITEM_HEADER_LEN + item.payload.len());
    header.encode(&mut buf);
    buf.put_slice(&item.payload);
    buf.freeze()
}

/// End-of-stream marker frame
pub fn encode_end_of_stream(source_id: i32) -> Bytes {
    let header = ItemHeader {
        source_id,
        destination_tag: contracts::UNSET_DESTINATION,
        payload_size: 0,
    };
    let mut buf = BytesMut::with_capacity(ITEM_HEADER_LEN);
    header.encode(&mut buf);
    buf.freeze()
}
