//! SinkHandle - one output channel: bounded queue plus worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use contracts::{DataSink, Delivery};

use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Queue into the worker
    tx: mpsc::Sender<Delivery>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// A sending end of this channel's queue
    pub fn sender(&self) -> mpsc::Sender<Delivery> {
        self.tx.clone()
    }

    /// Enqueue a delivery, waiting for queue capacity
    ///
    /// Returns false if the worker is gone.
    pub async fn send(&self, delivery: Delivery) -> bool {
        match self.tx.send(delivery).await {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(_) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the sink worker gracefully
    ///
    /// The worker drains its queue once every other sender is dropped too.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes deliveries and drives the sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Delivery>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(delivery) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match delivery {
            Delivery::Item(item) => match sink.write(&item).await {
                Ok(()) => {
                    metrics.inc_write_count();
                    observability::metrics::record_sink_write(&name, true);
                }
                Err(e) => {
                    metrics.inc_failure_count();
                    observability::metrics::record_sink_write(&name, false);
                    error!(
                        sink = %name,
                        source_id = item.source_id,
                        error = %e,
                        "Write failed"
                    );
                    // Continue processing - don't crash on single failure
                }
            },
            Delivery::EndOfStream => {
                if metrics.inc_eos_count() > 1 {
                    warn!(sink = %name, "Repeated termination marker");
                }
                if let Err(e) = sink.end_of_stream().await {
                    error!(sink = %name, error = %e, "End-of-stream handling failed");
                }
            }
        }
    }

    // Cleanup
    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
