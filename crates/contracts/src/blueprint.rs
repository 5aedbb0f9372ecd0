//! ReceiverBlueprint - Config Loader output
//!
//! Describes one receiver node: accept endpoint, expected senders, routing
//! table, optional hierarchical classification and the output channels.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use validator::Validate;

use crate::{DestinationTag, Endpoint, RouteEntry, RoutingTable};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的接收节点配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiverBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 监听与协议设置
    #[validate(nested)]
    pub receiver: ReceiverSettings,

    /// 目的标签 -> 输出通道
    #[serde(default)]
    pub routing: Vec<RouteEntry>,

    /// 分层模式 (内部/外部连接)，缺省为扁平模式
    #[serde(default)]
    #[validate(nested)]
    pub hierarchical: Option<HierarchicalConfig>,

    /// 输出通道，下标即通道号
    #[validate(nested)]
    pub outputs: Vec<SinkConfig>,
}

/// 接收端设置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiverSettings {
    /// 监听端点
    pub endpoint: Endpoint,

    /// 预期的上游连接数 (end-of-stream 计数目标)
    #[validate(range(min = 1))]
    pub input_channels: usize,

    /// listen backlog
    #[serde(default = "default_backlog")]
    #[validate(range(min = 1))]
    pub backlog: u32,

    /// 连接任务 -> 事件循环 队列容量
    #[serde(default = "default_event_queue_capacity")]
    #[validate(range(min = 1))]
    pub event_queue_capacity: usize,

    /// 握手 token 上限 (字节)
    #[serde(default = "default_max_token_bytes")]
    #[validate(range(min = 1))]
    pub max_token_bytes: u64,

    /// 单个 item 载荷上限 (字节)
    #[serde(default = "default_max_payload_bytes")]
    #[validate(range(min = 1))]
    pub max_payload_bytes: u64,
}

fn default_backlog() -> u32 {
    128
}

fn default_event_queue_capacity() -> usize {
    1024
}

fn default_max_token_bytes() -> u64 {
    64 * 1024
}

fn default_max_payload_bytes() -> u64 {
    1024 * 1024 * 1024
}

/// 分层模式配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HierarchicalConfig {
    /// 视为内部连接的组名
    #[validate(length(min = 1))]
    pub internal_groups: BTreeSet<String>,

    /// 回复给内部连接的可达目的标签
    #[serde(default)]
    pub internal_destinations: Vec<DestinationTag>,
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink 名称
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件输出
    File,
}

impl ReceiverBlueprint {
    /// Build the routing table from the `[[routing]]` entries
    ///
    /// Later duplicates win; the validator rejects duplicates before this runs.
    pub fn routing_table(&self) -> RoutingTable {
        self.routing
            .iter()
            .map(|entry| (entry.tag, entry.channel))
            .collect()
    }

    /// Whether the two-class (internal/external) variant is selected
    pub fn is_hierarchical(&self) -> bool {
        self.hierarchical.is_some()
    }

    /// Number of output channels
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }
}
