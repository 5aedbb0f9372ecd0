//! Run statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use receiver::ReceiverReport;

/// Statistics from one node run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Receiver summary, absent when the run was interrupted
    pub report: Option<ReceiverReport>,

    /// Final per-output counters, index = output channel
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// Total duration including output shutdown
    pub duration: Duration,

    /// Stopped by a signal before every sender finished
    pub interrupted: bool,
}

impl PipelineStats {
    /// Total sink write failures
    pub fn sink_failures(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.failure_count).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        match &self.report {
            Some(report) => print!("{report}"),
            None => println!("=== Receiver interrupted before draining ==="),
        }

        println!("\nOutputs ({})", self.sinks.len());
        for (channel, (name, metrics)) in self.sinks.iter().enumerate() {
            println!(
                "  [{}] {}: writes={}, failures={}, end-of-stream={}",
                channel, name, metrics.write_count, metrics.failure_count, metrics.eos_count
            );
        }
        println!("\nTotal time: {:.2}s", self.duration.as_secs_f64());
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(write_count: u64, failure_count: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: 0,
            write_count,
            failure_count,
            eos_count: 1,
        }
    }

    #[test]
    fn test_sink_failures_sum() {
        let stats = PipelineStats {
            sinks: vec![("a".into(), snapshot(3, 1)), ("b".into(), snapshot(2, 2))],
            ..Default::default()
        };
        assert_eq!(stats.sink_failures(), 3);
    }
}
