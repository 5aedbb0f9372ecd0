//! Receiver 指标收集模块
//!
//! 所有指标以 `dreceiver_` 为前缀。未安装 recorder 时调用为空操作。

use metrics::{counter, gauge, histogram};

/// 记录新接受的连接
pub fn record_connection_accepted(transport: &str) {
    counter!(
        "dreceiver_connections_accepted_total",
        "transport" => transport.to_string()
    )
    .increment(1);
}

/// 记录连接关闭及原因 (`end_of_stream` / `peer_closed` / `error` / `handshake_failed`)
pub fn record_connection_closed(reason: &'static str) {
    counter!("dreceiver_connections_closed_total", "reason" => reason).increment(1);
}

/// 记录当前打开的连接数
pub fn record_open_connections(open: usize) {
    gauge!("dreceiver_connections_open").set(open as f64);
}

/// 记录握手分类结果
pub fn record_handshake(class: &'static str) {
    counter!("dreceiver_handshakes_total", "class" => class).increment(1);
}

/// 记录一个 batch 头
pub fn record_batch(request_size: u32) {
    counter!("dreceiver_batches_total").increment(1);
    histogram!("dreceiver_batch_size").record(request_size as f64);
}

/// 记录转发到输出通道的 item
pub fn record_item_forwarded(channel: usize, payload_len: usize) {
    let channel = channel.to_string();
    counter!("dreceiver_items_forwarded_total", "channel" => channel.clone()).increment(1);
    counter!("dreceiver_payload_bytes_total", "channel" => channel).increment(payload_len as u64);
}

/// 记录收到的 end-of-stream 标记
pub fn record_end_of_stream(class: &'static str) {
    counter!("dreceiver_end_of_stream_total", "class" => class).increment(1);
}

/// 记录向下游发送的终止标记
pub fn record_termination_sent(channel: usize) {
    counter!(
        "dreceiver_termination_markers_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// 记录 sink 写入结果
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "dreceiver_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 统计摘要
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }

    /// 摘要
    pub fn summary(&self) -> StatsSummary {
        StatsSummary::from(self)
    }
}
