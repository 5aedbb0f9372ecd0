//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ContractError, ReceiverBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<ReceiverBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<ReceiverBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<ReceiverBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{SinkType, TransportKind};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[receiver]
input_channels = 2

[receiver.endpoint]
transport = "network"
address = "0.0.0.0:49000"

[[routing]]
tag = 0
channel = 0

[[outputs]]
name = "out0"
sink_type = "log"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.receiver.input_channels, 2);
        assert_eq!(bp.receiver.endpoint.transport, TransportKind::Network);
        assert_eq!(bp.routing.len(), 1);
        assert_eq!(bp.outputs[0].sink_type, SinkType::Log);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "receiver": {
                "endpoint": { "transport": "local", "address": "/tmp/dreceiver.sock" },
                "input_channels": 3
            },
            "routing": [{ "tag": 4, "channel": 1 }],
            "hierarchical": { "internal_groups": ["G1"], "internal_destinations": [9] },
            "outputs": [
                { "name": "a", "sink_type": "log" },
                { "name": "b", "sink_type": "file", "params": { "base_path": "/tmp/out" } }
            ]
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert!(bp.is_hierarchical());
        assert_eq!(bp.outputs[1].params["base_path"], "/tmp/out");
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_transport_is_parse_error() {
        let content = r#"
[receiver]
input_channels = 1
[receiver.endpoint]
transport = "carrier-pigeon"
address = "x"

[[outputs]]
name = "o"
sink_type = "log"
"#;
        assert!(matches!(
            parse_toml(content),
            Err(ContractError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
