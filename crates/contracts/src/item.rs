//! Item - decoded upstream data unit
//!
//! Owned payload plus the routing metadata carried by its frame header.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Destination tag carried by every item frame
pub type DestinationTag = i32;

/// Tag value meaning "no destination preference"
pub const UNSET_DESTINATION: DestinationTag = -1;

/// A decoded data item
///
/// Created by the batch decoder, ownership moves to exactly one output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Id of the upstream producer
    pub source_id: i32,

    /// Requested destination (`UNSET_DESTINATION` = none)
    pub destination_tag: DestinationTag,

    /// Payload bytes (never empty for a real item)
    pub payload: Bytes,
}

impl Item {
    /// Create a new item
    pub fn new(source_id: i32, destination_tag: DestinationTag, payload: impl Into<Bytes>) -> Self {
        Self {
            source_id,
            destination_tag,
            payload: payload.into(),
        }
    }

    /// Whether the sender asked for a specific destination
    pub fn has_destination(&self) -> bool {
        self.destination_tag != UNSET_DESTINATION
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// What an output channel carries downstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A data item
    Item(Item),
    /// Downstream termination marker
    EndOfStream,
}

impl Delivery {
    /// Whether this is the termination marker
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Delivery::EndOfStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_destination() {
        let item = Item::new(3, UNSET_DESTINATION, vec![1u8, 2, 3]);
        assert!(!item.has_destination());
        assert_eq!(item.len(), 3);

        let tagged = Item::new(3, 7, Bytes::from_static(b"x"));
        assert!(tagged.has_destination());
    }

    #[test]
    fn test_delivery_marker() {
        assert!(Delivery::EndOfStream.is_end_of_stream());
        assert!(!Delivery::Item(Item::new(0, 0, vec![0u8])).is_end_of_stream());
    }
}
