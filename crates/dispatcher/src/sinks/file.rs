//! FileSink - writes item payloads to disk with folder structure
//!
//! ```text
//! <base_path>/<source_id>/<seq>.bin   payload bytes
//! <base_path>/meta/<seq>.json         item metadata
//! <base_path>/EOS                     written on the termination marker
//! ```

use contracts::{ContractError, DataSink, DestinationTag, Item};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        Self { base_path }
    }
}

/// Metadata sidecar of one stored item
#[derive(Debug, Serialize)]
struct ItemMeta {
    seq: u64,
    source_id: i32,
    destination_tag: DestinationTag,
    len: usize,
}

/// Sink that writes item payloads to disk files
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    created_dirs: HashSet<PathBuf>,
    next_seq: u64,
}

impl FileSink {
    /// Create a new FileSink
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            created_dirs: HashSet::new(),
            next_seq: 0,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let config = FileSinkConfig::from_params(params);
        Self::new(name, config)
    }

    fn ensure_dir(&mut self, dir: &PathBuf) -> std::io::Result<()> {
        if !self.created_dirs.contains(dir) {
            fs::create_dir_all(dir)?;
            self.created_dirs.insert(dir.clone());
        }
        Ok(())
    }

    fn write_item_to_disk(&mut self, item: &Item) -> std::io::Result<u64> {
        let seq = self.next_seq;

        // 1. Payload
        let source_dir = self.config.base_path.join(item.source_id.to_string());
        self.ensure_dir(&source_dir)?;
        let mut payload_file = File::create(source_dir.join(format!("{}.bin", seq)))?;
        payload_file.write_all(&item.payload)?;

        // 2. Metadata
        let meta_dir = self.config.base_path.join("meta");
        self.ensure_dir(&meta_dir)?;
        let meta_file = File::create(meta_dir.join(format!("{}.json", seq)))?;
        let meta = ItemMeta {
            seq,
            source_id: item.source_id,
            destination_tag: item.destination_tag,
            len: item.len(),
        };
        serde_json::to_writer(meta_file, &meta)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        self.next_seq += 1;
        Ok(seq)
    }

    fn persist_item(&mut self, item: &Item) -> Result<(), ContractError> {
        match self.write_item_to_disk(item) {
            Ok(seq) => {
                debug!(sink = %self.name, seq, "Item stored");
                Ok(())
            }
            Err(e) => {
                error!(sink = %self.name, source_id = item.source_id, error = %e, "Write failed");
                Err(ContractError::sink_write(&self.name, e.to_string()))
            }
        }
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, item),
        fields(sink = %self.name, source_id = item.source_id)
    )]
    async fn write(&mut self, item: &Item) -> Result<(), ContractError> {
        self.persist_item(item)
    }

    #[instrument(name = "file_sink_end_of_stream", skip(self))]
    async fn end_of_stream(&mut self) -> Result<(), ContractError> {
        let marker = self.config.base_path.join("EOS");
        fs::write(&marker, self.next_seq.to_string())
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        debug!(sink = %self.name, items = self.next_seq, "End-of-stream marker written");
        Ok(())
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_sink_write() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig {
            base_path: dir.path().to_path_buf(),
        };

        let mut sink = FileSink::new("test_file", config).unwrap();
        sink.write(&Item::new(7, 2, b"hello".to_vec())).await.unwrap();
        sink.write(&Item::new(8, -1, b"world!".to_vec())).await.unwrap();
        sink.flush().await.unwrap();

        assert_eq!(fs::read(dir.path().join("7").join("0.bin")).unwrap(), b"hello");
        assert_eq!(fs::read(dir.path().join("8").join("1.bin")).unwrap(), b"world!");

        let meta: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("meta").join("1.json")).unwrap())
                .unwrap();
        assert_eq!(meta["source_id"], 8);
        assert_eq!(meta["destination_tag"], -1);
        assert_eq!(meta["len"], 6);
    }

    #[tokio::test]
    async fn test_file_sink_end_of_stream_marker() {
        let dir = tempdir().unwrap();
        let mut params = HashMap::new();
        params.insert("base_path".to_string(), dir.path().display().to_string());

        let mut sink = FileSink::from_params("files", &params).unwrap();
        sink.write(&Item::new(1, 0, vec![1u8])).await.unwrap();
        sink.end_of_stream().await.unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("EOS")).unwrap(), "1");
    }
}
