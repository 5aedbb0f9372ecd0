//! LogSink - logs item summaries via tracing

use contracts::{ContractError, DataSink, Item};
use tracing::{info, instrument};

/// Sink that logs item summaries for debugging
pub struct LogSink {
    name: String,
    items: u64,
    bytes: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: 0,
            bytes: 0,
        }
    }

    fn log_item_summary(&self, item: &Item) {
        info!(
            sink = %self.name,
            source_id = item.source_id,
            tag = item.destination_tag,
            len = item.len(),
            seq = self.items,
            "Item received"
        );
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, item),
        fields(sink = %self.name, source_id = item.source_id)
    )]
    async fn write(&mut self, item: &Item) -> Result<(), ContractError> {
        self.items += 1;
        self.bytes += item.len() as u64;
        self.log_item_summary(item);
        Ok(())
    }

    #[instrument(name = "log_sink_end_of_stream", skip(self))]
    async fn end_of_stream(&mut self) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            items = self.items,
            bytes = self.bytes,
            "End of stream"
        );
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_write() {
        let mut sink = LogSink::new("test_log");
        let item = Item::new(1, 3, vec![0u8; 16]);

        assert!(sink.write(&item).await.is_ok());
        assert!(sink.end_of_stream().await.is_ok());
        assert_eq!(sink.items, 1);
        assert_eq!(sink.bytes, 16);
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
