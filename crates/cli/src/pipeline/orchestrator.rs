//! Node orchestrator - wires the receiver to its output channels.

use std::future::Future;
use std::time::{Duration, Instant};

use contracts::ReceiverBlueprint;
use receiver::Receiver;
use tracing::{info, warn};

use super::PipelineStats;
use crate::error::{CliError, Result};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The receiver blueprint, overrides already applied
    pub blueprint: ReceiverBlueprint,

    /// Receiver timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main node orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the receiver until it drains, times out or `shutdown` resolves
    ///
    /// Output channels are always shut down before returning so every sink
    /// gets flushed and closed.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            if let Err(e) = observability::init_metrics_only(port) {
                warn!(port, error = %e, "Metrics endpoint unavailable, continuing without it");
            }
        }

        info!(
            outputs = blueprint.outputs.len(),
            "Starting output channels"
        );
        let dispatcher = dispatcher::create_dispatcher(blueprint.outputs.clone()).await?;

        let node = Receiver::from_blueprint(&blueprint, dispatcher.senders())?;

        let outcome = match self.config.timeout {
            Some(limit) => tokio::select! {
                result = tokio::time::timeout(limit, node.run()) => match result {
                    Ok(run) => Some(run.map_err(CliError::from)),
                    Err(_) => Some(Err(CliError::Timeout { secs: limit.as_secs() })),
                },
                _ = shutdown => None,
            },
            None => tokio::select! {
                run = node.run() => Some(run.map_err(CliError::from)),
                _ = shutdown => None,
            },
        };

        // The receiver future is gone at this point, so every sender it held
        // has been dropped and the workers can drain.
        let sinks = dispatcher.shutdown().await;

        let mut stats = PipelineStats {
            report: None,
            sinks,
            duration: start_time.elapsed(),
            interrupted: false,
        };

        match outcome {
            Some(Ok(report)) => {
                stats.report = Some(report);
                Ok(stats)
            }
            Some(Err(e)) => Err(e),
            None => {
                warn!("Received shutdown signal, receiver stopped before draining");
                stats.interrupted = true;
                Ok(stats)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigVersion, Endpoint, Item, ReceiverSettings, RouteEntry, SinkConfig, SinkType,
    };
    use protocol::frame::{self, FrameLimits};
    use std::collections::HashMap;

    fn blueprint(address: &str) -> ReceiverBlueprint {
        ReceiverBlueprint {
            version: ConfigVersion::V1,
            receiver: ReceiverSettings {
                endpoint: Endpoint::network(address),
                input_channels: 1,
                backlog: 16,
                event_queue_capacity: 16,
                max_token_bytes: 1024,
                max_payload_bytes: 1024,
            },
            routing: vec![RouteEntry { tag: 3, channel: 0 }],
            hierarchical: None,
            outputs: vec![SinkConfig {
                name: "out0".into(),
                sink_type: SinkType::Log,
                queue_capacity: 4,
                params: HashMap::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_shutdown_signal_still_closes_sinks() {
        let pipeline = Pipeline::new(PipelineConfig {
            blueprint: blueprint("127.0.0.1:0"),
            timeout: None,
            metrics_port: None,
        });

        let stats = pipeline.run(async {}).await.unwrap();
        assert!(stats.interrupted);
        assert!(stats.report.is_none());
        assert_eq!(stats.sinks.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let pipeline = Pipeline::new(PipelineConfig {
            blueprint: blueprint("127.0.0.1:0"),
            timeout: Some(Duration::from_millis(50)),
            metrics_port: None,
        });

        let err = pipeline
            .run(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_single_sender_run_completes() {
        use tokio::net::UnixStream;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.sock");
        let mut bp = blueprint("unused");
        bp.receiver.endpoint = Endpoint::local(path.to_string_lossy());

        let pipeline = Pipeline::new(PipelineConfig {
            blueprint: bp,
            timeout: Some(Duration::from_secs(10)),
            metrics_port: None,
        });
        let node = tokio::spawn(pipeline.run(std::future::pending::<()>()));

        let mut stream = loop {
            match UnixStream::connect(&path).await {
                Ok(stream) => break stream,
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        };
        frame::write_handshake_request(&mut stream, "G1").await.unwrap();
        let reachable = frame::read_handshake_reply(&mut stream, &FrameLimits::default())
            .await
            .unwrap();
        assert_eq!(reachable, vec![3]);

        frame::write_batch_header(&mut stream, 2).await.unwrap();
        frame::read_ack(&mut stream).await.unwrap();
        frame::write_item_frame(&mut stream, &Item::new(1, 3, &b"hello"[..]))
            .await
            .unwrap();
        frame::write_end_of_stream(&mut stream, 1).await.unwrap();

        let stats = node.await.unwrap().unwrap();
        let report = stats.report.unwrap();
        assert_eq!(report.items_forwarded(), 1);
        assert_eq!(report.terminated_channels, vec![0]);
        assert_eq!(stats.sinks[0].1.write_count, 1);
        assert_eq!(stats.sinks[0].1.eos_count, 1);
        assert!(!path.exists());
    }
}
