//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `ReceiverBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("receiver.toml")).unwrap();
//! println!("Endpoint: {}", blueprint.receiver.endpoint);
//! ```

mod parser;
mod validator;

pub use contracts::ReceiverBlueprint;
pub use parser::ConfigFormat;
pub use self::validator::validate;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<ReceiverBlueprint, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ReceiverBlueprint, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Serialize ReceiverBlueprint to TOML string
    pub fn to_toml(blueprint: &ReceiverBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize ReceiverBlueprint to JSON string
    pub fn to_json(blueprint: &ReceiverBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ReceiverBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[receiver]
input_channels = 3

[receiver.endpoint]
transport = "network"
address = "127.0.0.1:49000"

[[routing]]
tag = 0
channel = 0

[[routing]]
tag = 1
channel = 1

[hierarchical]
internal_groups = ["G1"]
internal_destinations = [7]

[[outputs]]
name = "out0"
sink_type = "log"

[[outputs]]
name = "out1"
sink_type = "log"

[[outputs]]
name = "internal"
sink_type = "file"
params = { base_path = "/tmp/dreceiver" }
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.receiver.input_channels, 3);
        assert_eq!(bp.output_count(), 3);
        assert!(bp.is_hierarchical());
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.receiver.endpoint, bp2.receiver.endpoint);
        assert_eq!(bp.routing_table(), bp2.routing_table());
        assert_eq!(bp.outputs.len(), bp2.outputs.len());
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.receiver.endpoint, bp2.receiver.endpoint);
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receiver.toml");
        std::fs::write(&path, MINIMAL_TOML).unwrap();
        let bp = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(bp.routing.len(), 2);

        let bad = dir.path().join("receiver.yaml");
        std::fs::write(&bad, MINIMAL_TOML).unwrap();
        assert!(ConfigLoader::load_from_path(&bad).is_err());
    }

    #[test]
    fn test_validation_runs_after_parse() {
        // routing channel past the configured outputs
        let content = r#"
[receiver]
input_channels = 1

[receiver.endpoint]
transport = "local"
address = "/tmp/dreceiver.sock"

[[routing]]
tag = 3
channel = 4

[[outputs]]
name = "only"
sink_type = "log"
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("out of range"));
    }
}
