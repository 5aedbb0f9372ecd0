//! Message-level reads and writes over tokio streams
//!
//! `read_exact` retries partial reads until the requested byte count is
//! satisfied, so every function here either yields a whole message or an
//! error. EOF anywhere maps to [`ProtocolError::ConnectionClosed`].

use std::io;

use bytes::{Bytes, BytesMut};
use contracts::{DestinationTag, Item};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::codec::{self, ItemHeader, ACK, BATCH_HEADER_LEN, ITEM_HEADER_LEN, LENGTH_PREFIX_LEN};
use crate::{ProtocolError, Result};

/// Upper bounds applied before any allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Handshake token ceiling in bytes
    pub max_token_bytes: u64,
    /// Item payload ceiling in bytes
    pub max_payload_bytes: u64,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_token_bytes: 64 * 1024,
            max_payload_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// One decoded item frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A real item (payload never empty)
    Item(Item),
    /// Zero-length frame: the sender is done
    EndOfStream { source_id: i32 },
}

/// Result of writing the batch acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Delivered,
    /// Peer reset or closed its read side; the batch is still read
    PeerGone,
}

async fn read_array<R, const N: usize>(reader: &mut R) -> Result<[u8; N]>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(ProtocolError::from_io)?;
    Ok(buf)
}

async fn read_bytes<R>(reader: &mut R, len: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(len);
    reader
        .read_exact(&mut buf)
        .await
        .map_err(ProtocolError::from_io)?;
    Ok(buf.freeze())
}

async fn read_length_prefixed<R>(reader: &mut R, max: u64) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let len = u64::from_be_bytes(read_array::<_, LENGTH_PREFIX_LEN>(reader).await?);
    if len > max {
        return Err(ProtocolError::FrameTooLarge { len, max });
    }
    read_bytes(reader, len as usize).await
}

async fn write_all_flush<W>(writer: &mut W, buf: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(buf).await?;
    writer.flush().await
}

// ===== Receiving side =====

/// Read the group name a new connection identifies itself with
pub async fn read_handshake_request<R>(reader: &mut R, limits: &FrameLimits) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let raw = read_length_prefixed(reader, limits.max_token_bytes).await?;
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidToken)
}

/// Reply with the destinations reachable through this node
pub async fn write_handshake_reply<W>(writer: &mut W, ids: &[DestinationTag]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let msg = codec::encode_handshake_reply(ids)?;
    write_all_flush(writer, &msg).await?;
    trace!(destinations = ids.len(), "handshake reply sent");
    Ok(())
}

/// Read a batch header, returning the declared item count
pub async fn read_batch_header<R>(reader: &mut R) -> Result<u32>
where
    R: AsyncRead + Unpin,
{
    let count = codec::decode_batch_header(read_array::<_, BATCH_HEADER_LEN>(reader).await?);
    u32::try_from(count).map_err(|_| ProtocolError::NegativeBatchSize(count))
}

/// Acknowledge a batch header
///
/// Reset and broken-pipe conditions are tolerated and reported as
/// [`AckOutcome::PeerGone`]; any other write failure is an error.
pub async fn write_ack<W>(writer: &mut W) -> Result<AckOutcome>
where
    W: AsyncWrite + Unpin,
{
    match write_all_flush(writer, &[ACK]).await {
        Ok(()) => Ok(AckOutcome::Delivered),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
            ) =>
        {
            debug!(error = %e, "peer gone before acknowledgement");
            Ok(AckOutcome::PeerGone)
        }
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

/// Read one item frame
///
/// Allocates exactly `payload_size` bytes for a real item and nothing for an
/// end-of-stream marker.
pub async fn read_item_frame<R>(reader: &mut R, limits: &FrameLimits) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let header = ItemHeader::decode(&read_array::<_, ITEM_HEADER_LEN>(reader).await?);
    if header.is_end_of_stream() {
        return Ok(Frame::EndOfStream {
            source_id: header.source_id,
        });
    }
    if header.payload_size > limits.max_payload_bytes {
        return Err(ProtocolError::PayloadTooLarge {
            len: header.payload_size,
            max: limits.max_payload_bytes,
        });
    }

    let payload = read_bytes(reader, header.payload_size as usize).await?;
    Ok(Frame::Item(Item {
        source_id: header.source_id,
        destination_tag: header.destination_tag,
        payload,
    }))
}

// ===== Sending side =====

/// Identify this sender with its group name
pub async fn write_handshake_request<W>(writer: &mut W, token: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_all_flush(writer, &codec::encode_handshake_request(token)).await?;
    Ok(())
}

/// Read the receiver's reachable destinations
pub async fn read_handshake_reply<R>(
    reader: &mut R,
    limits: &FrameLimits,
) -> Result<Vec<DestinationTag>>
where
    R: AsyncRead + Unpin,
{
    let raw = read_length_prefixed(reader, limits.max_payload_bytes).await?;
    codec::decode_routing_table(&raw)
}

/// Announce a batch of `count` item frames
pub async fn write_batch_header<W>(writer: &mut W, count: i32) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_all_flush(writer, &codec::encode_batch_header(count)).await?;
    Ok(())
}

/// Wait for the receiver's batch acknowledgement
pub async fn read_ack<R>(reader: &mut R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    match read_array::<_, 1>(reader).await?[0] {
        ACK => Ok(()),
        other => Err(ProtocolError::UnexpectedAck(other)),
    }
}

/// Send one item frame
pub async fn write_item_frame<W>(writer: &mut W, item: &Item) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_all_flush(writer, &codec::encode_item_frame(item)).await?;
    Ok(())
}

/// Send the end-of-stream marker
pub async fn write_end_of_stream<W>(writer: &mut W, source_id: i32) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_all_flush(writer, &codec::encode_end_of_stream(source_id)).await?;
    Ok(())
}
