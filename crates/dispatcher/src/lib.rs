//! # Dispatcher
//!
//! 下游输出通道。
//!
//! 负责：
//! - 每个输出通道一个有界队列 + worker 任务
//! - 接收端只持有队列的发送端 (`Dispatcher::senders`)
//! - 隔离慢 sink，写入失败不影响其他通道

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{DataSink, Delivery};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
