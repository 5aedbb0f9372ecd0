//! In-memory summary of a receiver run

use std::fmt;
use std::time::Duration;

use observability::{RunningStats, StatsSummary};

use crate::event_loop::ReceiverState;
use crate::policy::ConnectionClass;

/// Counters accumulated by the event loop
#[derive(Debug, Clone)]
pub struct ReceiverReport {
    /// Policy name (`flat` / `hierarchical`)
    pub policy: &'static str,
    /// Connections accepted
    pub connections_accepted: u64,
    /// Handshakes completed, per class
    pub handshakes_flat: u64,
    pub handshakes_internal: u64,
    pub handshakes_external: u64,
    /// Connections retired on a handshake, protocol or task failure
    pub connections_failed: u64,
    /// Connections the peer closed between batches without an end-of-stream marker
    pub connections_closed: u64,
    /// Batch headers received
    pub batches: u64,
    /// Items forwarded, index = output channel
    pub items_per_channel: Vec<u64>,
    /// Payload bytes forwarded
    pub bytes_forwarded: u64,
    /// End-of-stream markers received
    pub end_of_stream: u64,
    /// Output channels in the order they received their termination marker
    pub terminated_channels: Vec<usize>,
    /// State the loop ended in
    pub final_state: ReceiverState,
    /// Wall time spent serving
    pub duration: Duration,
    batch_sizes: RunningStats,
}

impl ReceiverReport {
    pub fn new(policy: &'static str, outputs: usize) -> Self {
        Self {
            policy,
            connections_accepted: 0,
            handshakes_flat: 0,
            handshakes_internal: 0,
            handshakes_external: 0,
            connections_failed: 0,
            connections_closed: 0,
            batches: 0,
            items_per_channel: vec![0; outputs],
            bytes_forwarded: 0,
            end_of_stream: 0,
            terminated_channels: Vec::new(),
            final_state: ReceiverState::Initializing,
            duration: Duration::ZERO,
            batch_sizes: RunningStats::default(),
        }
    }

    pub(crate) fn record_handshake(&mut self, class: ConnectionClass) {
        match class {
            ConnectionClass::Flat => self.handshakes_flat += 1,
            ConnectionClass::Internal => self.handshakes_internal += 1,
            ConnectionClass::External => self.handshakes_external += 1,
        }
    }

    pub(crate) fn record_batch(&mut self, request_size: u32) {
        self.batches += 1;
        self.batch_sizes.push(request_size as f64);
    }

    pub(crate) fn record_item(&mut self, channel: usize, payload_len: usize) {
        if let Some(count) = self.items_per_channel.get_mut(channel) {
            *count += 1;
        }
        self.bytes_forwarded += payload_len as u64;
    }

    /// Total items forwarded
    pub fn items_forwarded(&self) -> u64 {
        self.items_per_channel.iter().sum()
    }

    /// Batch size distribution
    pub fn batch_sizes(&self) -> StatsSummary {
        self.batch_sizes.summary()
    }

    /// Items per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.items_forwarded() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl fmt::Display for ReceiverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Receiver Summary ({}) ===", self.policy)?;
        writeln!(f, "Final state: {:?}", self.final_state)?;
        writeln!(f, "Duration: {:.2}s", self.duration.as_secs_f64())?;
        writeln!(f, "Connections accepted: {}", self.connections_accepted)?;
        writeln!(
            f,
            "Handshakes: flat={}, internal={}, external={}",
            self.handshakes_flat, self.handshakes_internal, self.handshakes_external
        )?;
        writeln!(
            f,
            "Connections failed: {}, closed early: {}",
            self.connections_failed, self.connections_closed
        )?;
        writeln!(f, "Batches: {}", self.batches)?;
        writeln!(f, "Batch size: {}", self.batch_sizes())?;
        writeln!(
            f,
            "Items forwarded: {} ({} bytes, {:.1} items/s)",
            self.items_forwarded(),
            self.bytes_forwarded,
            self.throughput()
        )?;
        for (channel, count) in self.items_per_channel.iter().enumerate() {
            writeln!(f, "  channel {}: {}", channel, count)?;
        }
        writeln!(f, "End-of-stream markers: {}", self.end_of_stream)?;
        writeln!(f, "Terminated channels: {:?}", self.terminated_channels)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counters() {
        let mut report = ReceiverReport::new("flat", 2);
        report.record_batch(4);
        report.record_batch(2);
        report.record_item(0, 10);
        report.record_item(1, 5);
        report.record_item(1, 5);
        report.record_item(7, 1);
        report.record_handshake(ConnectionClass::External);

        assert_eq!(report.items_forwarded(), 3);
        assert_eq!(report.bytes_forwarded, 21);
        assert_eq!(report.batch_sizes().count, 2);
        assert!((report.batch_sizes().mean - 3.0).abs() < 1e-10);
        assert_eq!(report.handshakes_external, 1);

        let text = report.to_string();
        assert!(text.contains("Items forwarded: 3"));
        assert!(text.contains("channel 1: 2"));
    }
}
