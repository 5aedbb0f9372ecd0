//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DestinationTag, ReceiverBlueprint};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    receiver: ReceiverInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    hierarchical: Option<HierarchicalInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    routing: Vec<RouteInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    outputs: Vec<OutputInfo>,
}

#[derive(Serialize)]
struct ReceiverInfo {
    endpoint: String,
    input_channels: usize,
    backlog: u32,
    event_queue_capacity: usize,
    max_token_bytes: u64,
    max_payload_bytes: u64,
}

#[derive(Serialize)]
struct HierarchicalInfo {
    internal_groups: BTreeSet<String>,
    internal_destinations: Vec<DestinationTag>,
    internal_channel: usize,
}

#[derive(Serialize)]
struct RouteInfo {
    tag: DestinationTag,
    channel: usize,
}

#[derive(Serialize)]
struct OutputInfo {
    channel: usize,
    name: String,
    sink_type: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &ReceiverBlueprint, args: &InfoArgs) -> ConfigInfo {
    let settings = &blueprint.receiver;

    let routing = if args.routing {
        blueprint
            .routing_table()
            .iter()
            .map(|(tag, channel)| RouteInfo { tag, channel })
            .collect()
    } else {
        Vec::new()
    };

    let outputs = if args.outputs {
        blueprint
            .outputs
            .iter()
            .enumerate()
            .map(|(channel, s)| OutputInfo {
                channel,
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        receiver: ReceiverInfo {
            endpoint: settings.endpoint.to_string(),
            input_channels: settings.input_channels,
            backlog: settings.backlog,
            event_queue_capacity: settings.event_queue_capacity,
            max_token_bytes: settings.max_token_bytes,
            max_payload_bytes: settings.max_payload_bytes,
        },
        hierarchical: blueprint.hierarchical.as_ref().map(|h| HierarchicalInfo {
            internal_groups: h.internal_groups.clone(),
            internal_destinations: h.internal_destinations.clone(),
            internal_channel: blueprint.output_count().saturating_sub(1),
        }),
        routing,
        outputs,
    }
}

fn print_config_info(blueprint: &ReceiverBlueprint, args: &InfoArgs) {
    let settings = &blueprint.receiver;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               dreceiver Configuration                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📍 Receiver");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Endpoint: {}", settings.endpoint);
    println!("   ├─ Expected senders: {}", settings.input_channels);
    println!("   ├─ Backlog: {}", settings.backlog);
    println!("   ├─ Event queue: {}", settings.event_queue_capacity);
    println!(
        "   └─ Frame limits: token {} B, payload {} B",
        settings.max_token_bytes, settings.max_payload_bytes
    );

    match &blueprint.hierarchical {
        Some(h) => {
            println!("\n🔀 Mode: hierarchical");
            println!("   ├─ Internal groups: {:?}", h.internal_groups);
            println!("   ├─ Internal destinations: {:?}", h.internal_destinations);
            println!(
                "   └─ Internal channel: {}",
                blueprint.output_count().saturating_sub(1)
            );
        }
        None => println!("\n🔀 Mode: flat"),
    }

    let table = blueprint.routing_table();
    if args.routing && !table.is_empty() {
        println!("\n🧭 Routing ({})", table.len());
        let last = table.len() - 1;
        for (i, (tag, channel)) in table.iter().enumerate() {
            let prefix = if i == last { "└─" } else { "├─" };
            println!("   {} tag {} -> channel {}", prefix, tag, channel);
        }
    } else {
        println!("\n🧭 Routing: {} entries", table.len());
    }

    println!("\n📤 Outputs ({})", blueprint.outputs.len());
    for (channel, sink) in blueprint.outputs.iter().enumerate() {
        let is_last = channel == blueprint.outputs.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        if args.outputs {
            println!(
                "   {} [{}] {} ({:?}, queue {}) {:?}",
                prefix, channel, sink.name, sink.sink_type, sink.queue_capacity, sink.params
            );
        } else {
            println!("   {} [{}] {}", prefix, channel, sink.name);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hides_sections_by_default() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[receiver]
input_channels = 3

[receiver.endpoint]
transport = "local"
address = "/tmp/dreceiver-info.sock"

[[routing]]
tag = 5
channel = 0

[hierarchical]
internal_groups = ["G1"]
internal_destinations = [9]

[[outputs]]
name = "ext"
sink_type = "log"

[[outputs]]
name = "int"
sink_type = "log"
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let mut args = InfoArgs {
            config: "unused.toml".into(),
            json: true,
            routing: false,
            outputs: false,
        };
        let info = build_config_info(&blueprint, &args);
        assert!(info.routing.is_empty());
        assert!(info.outputs.is_empty());
        assert_eq!(info.hierarchical.as_ref().unwrap().internal_channel, 1);

        args.routing = true;
        args.outputs = true;
        let info = build_config_info(&blueprint, &args);
        assert_eq!(info.routing.len(), 1);
        assert_eq!(info.outputs[1].name, "int");
        assert_eq!(info.receiver.endpoint, "unix:/tmp/dreceiver-info.sock");
    }
}
