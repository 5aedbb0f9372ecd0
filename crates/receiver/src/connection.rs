//! Per-connection task: Handshake Handler and Batch Protocol Handler
//!
//! The task performs only I/O. Every decision (classification, routing,
//! termination) is taken by the event loop, which receives the task's
//! [`ConnectionEvent`]s in order on one shared queue.

use contracts::{DestinationTag, Item};
use protocol::frame::{self, AckOutcome, Frame, FrameLimits};
use protocol::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::registry::ConnectionId;

/// Why a connection was retired without an end-of-stream marker
#[derive(Debug)]
pub enum CloseReason {
    /// Handshake could not be read or answered
    HandshakeFailed(ProtocolError),
    /// Peer closed between batches
    PeerClosed,
    /// Read/write failure or malformed frame
    Failed(ProtocolError),
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::HandshakeFailed(_) => "handshake_failed",
            CloseReason::PeerClosed => "peer_closed",
            CloseReason::Failed(_) => "error",
        }
    }
}

/// Reported by a connection task to the event loop
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Handshake token read, the loop answers with the destinations to advertise
    Handshake {
        conn: ConnectionId,
        token: String,
        reply: oneshot::Sender<Vec<DestinationTag>>,
    },
    /// Batch header read and acknowledged
    Batch { conn: ConnectionId, request_size: u32 },
    /// One decoded item
    Item { conn: ConnectionId, item: Item },
    /// Zero-length frame, the connection is done. Always the task's last event.
    EndOfStream { conn: ConnectionId, source_id: i32 },
    /// Connection retired. Always the task's last event.
    Closed {
        conn: ConnectionId,
        reason: CloseReason,
    },
}

enum Exit {
    EndOfStream(i32),
    Closed(CloseReason),
    /// Event loop is gone, nothing left to report to
    LoopGone,
}

/// Serve one accepted connection until end-of-stream, failure or loop shutdown
pub(crate) async fn serve_connection<S>(
    conn: ConnectionId,
    stream: S,
    events: mpsc::Sender<ConnectionEvent>,
    limits: FrameLimits,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let final_event = match drive(conn, &mut stream, &events, &limits).await {
        Exit::EndOfStream(source_id) => ConnectionEvent::EndOfStream { conn, source_id },
        Exit::Closed(reason) => ConnectionEvent::Closed { conn, reason },
        Exit::LoopGone => return,
    };
    if events.send(final_event).await.is_err() {
        trace!(conn, "event loop gone before final event");
    }
}

async fn drive<S>(
    conn: ConnectionId,
    stream: &mut BufReader<S>,
    events: &mpsc::Sender<ConnectionEvent>,
    limits: &FrameLimits,
) -> Exit
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // ===== Handshake =====
    let token = match frame::read_handshake_request(stream, limits).await {
        Ok(token) => token,
        Err(e) => return Exit::Closed(CloseReason::HandshakeFailed(e)),
    };
    let (reply_tx, reply_rx) = oneshot::channel();
    let handshake = ConnectionEvent::Handshake {
        conn,
        token,
        reply: reply_tx,
    };
    if events.send(handshake).await.is_err() {
        return Exit::LoopGone;
    }
    let Ok(destinations) = reply_rx.await else {
        return Exit::LoopGone;
    };
    if let Err(e) = frame::write_handshake_reply(stream.get_mut(), &destinations).await {
        return Exit::Closed(CloseReason::HandshakeFailed(e));
    }

    // ===== Batches =====
    loop {
        let request_size = match frame::read_batch_header(stream).await {
            Ok(n) => n,
            Err(ProtocolError::ConnectionClosed) => return Exit::Closed(CloseReason::PeerClosed),
            Err(e) => return Exit::Closed(CloseReason::Failed(e)),
        };
        match frame::write_ack(stream.get_mut()).await {
            Ok(AckOutcome::Delivered) => {}
            Ok(AckOutcome::PeerGone) => {
                debug!(conn, request_size, "ack not delivered, peer gone; reading batch anyway")
            }
            Err(e) => return Exit::Closed(CloseReason::Failed(e)),
        }
        if events
            .send(ConnectionEvent::Batch { conn, request_size })
            .await
            .is_err()
        {
            return Exit::LoopGone;
        }

        for index in 0..request_size {
            match frame::read_item_frame(stream, limits).await {
                Ok(Frame::Item(item)) => {
                    if events.send(ConnectionEvent::Item { conn, item }).await.is_err() {
                        return Exit::LoopGone;
                    }
                }
                Ok(Frame::EndOfStream { source_id }) => {
                    if index + 1 < request_size {
                        warn!(
                            conn,
                            remaining = request_size - index - 1,
                            "end-of-stream before batch end, remaining frames ignored"
                        );
                    }
                    return Exit::EndOfStream(source_id);
                }
                Err(e) => return Exit::Closed(CloseReason::Failed(e)),
            }
        }
    }
}
