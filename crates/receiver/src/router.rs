//! Router - hands decoded items to downstream output channels
//!
//! Each output channel is the sending end of a bounded queue owned by a
//! downstream consumer. A send waits for queue capacity, never for the
//! consumer to process the item.

use contracts::{Delivery, Item};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{ReceiverError, Result};
use crate::policy::Route;

/// The receiver's output channels
#[derive(Debug)]
pub struct OutputSet {
    senders: Vec<mpsc::Sender<Delivery>>,
    terminated: Vec<bool>,
    next_generic: usize,
}

impl OutputSet {
    /// Wrap the downstream senders, index = channel number
    pub fn new(senders: Vec<mpsc::Sender<Delivery>>) -> Result<Self> {
        if senders.is_empty() {
            return Err(ReceiverError::config("at least one output channel is required"));
        }
        let terminated = vec![false; senders.len()];
        Ok(Self {
            senders,
            terminated,
            next_generic: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn is_terminated(&self, channel: usize) -> bool {
        self.terminated.get(channel).copied().unwrap_or(false)
    }

    /// Forward an item, returning the channel it went to
    pub async fn send(&mut self, route: Route, item: Item) -> Result<usize> {
        let channel = match route {
            Route::Channel(channel) => channel,
            Route::Generic => {
                let channel = self.next_generic;
                self.next_generic = (self.next_generic + 1) % self.senders.len();
                channel
            }
        };
        let sender = self.senders.get(channel).ok_or_else(|| {
            ReceiverError::config(format!(
                "route to channel {channel} but only {} outputs exist",
                self.senders.len()
            ))
        })?;
        if self.terminated[channel] {
            warn!(channel, source_id = item.source_id, "item sent after termination marker");
        }
        sender
            .send(Delivery::Item(item))
            .await
            .map_err(|_| ReceiverError::OutputClosed { channel })?;
        Ok(channel)
    }

    /// Send the termination marker to one channel
    ///
    /// Idempotent: returns false if the channel was already terminated.
    pub async fn terminate(&mut self, channel: usize) -> Result<bool> {
        match self.terminated.get(channel) {
            None => Err(ReceiverError::config(format!(
                "cannot terminate channel {channel}, only {} outputs exist",
                self.senders.len()
            ))),
            Some(true) => Ok(false),
            Some(false) => {
                self.senders[channel]
                    .send(Delivery::EndOfStream)
                    .await
                    .map_err(|_| ReceiverError::OutputClosed { channel })?;
                self.terminated[channel] = true;
                observability::metrics::record_termination_sent(channel);
                debug!(channel, "termination marker sent");
                Ok(true)
            }
        }
    }

    /// Terminate every channel that has not been terminated yet
    ///
    /// Returns the channels terminated by this call.
    pub async fn terminate_all(&mut self) -> Result<Vec<usize>> {
        let mut sent = Vec::new();
        for channel in 0..self.senders.len() {
            if self.terminate(channel).await? {
                sent.push(channel);
            }
        }
        Ok(sent)
    }
}
