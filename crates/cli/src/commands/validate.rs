//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ReceiverBlueprint, SinkType, TransportKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    endpoint: String,
    mode: &'static str,
    input_channels: usize,
    route_count: usize,
    output_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    endpoint: blueprint.receiver.endpoint.to_string(),
                    mode: if blueprint.is_hierarchical() {
                        "hierarchical"
                    } else {
                        "flat"
                    },
                    input_channels: blueprint.receiver.input_channels,
                    route_count: blueprint.routing.len(),
                    output_count: blueprint.outputs.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ReceiverBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.routing.is_empty() {
        warnings.push(
            "No routing entries - senders get an empty destination list and every item \
             goes round-robin"
                .to_string(),
        );
    }

    if let Some(h) = &blueprint.hierarchical {
        let last = blueprint.outputs.len().saturating_sub(1);
        if blueprint.routing.iter().any(|r| r.channel == last) {
            warnings.push(format!(
                "Routing targets channel {last}, which is also the internal channel in \
                 hierarchical mode"
            ));
        }
        if h.internal_destinations.is_empty() {
            warnings.push("hierarchical.internal_destinations is empty".to_string());
        }
    }

    if blueprint.receiver.endpoint.transport == TransportKind::Network
        && blueprint.receiver.endpoint.address.ends_with(":0")
    {
        warnings.push("Port 0 picks an ephemeral port, senders cannot know it".to_string());
    }

    for sink in &blueprint.outputs {
        if sink.sink_type == SinkType::File && !sink.params.contains_key("base_path") {
            warnings.push(format!(
                "File output '{}' has no params.base_path, the default directory is used",
                sink.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Endpoint: {}", summary.endpoint);
            println!("  Mode: {}", summary.mode);
            println!("  Expected senders: {}", summary.input_channels);
            println!("  Routes: {}", summary.route_count);
            println!("  Outputs: {}", summary.output_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
