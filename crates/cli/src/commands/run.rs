//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{ReceiverBlueprint, TransportKind};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_receiver(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);
    // Overrides bypass the loader, so check the result again.
    config_loader::validate(&blueprint).context("Invalid configuration after CLI overrides")?;

    info!(
        endpoint = %blueprint.receiver.endpoint,
        input_channels = blueprint.receiver.input_channels,
        hierarchical = blueprint.is_hierarchical(),
        outputs = blueprint.outputs.len(),
        routes = blueprint.routing.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    info!("Starting receiver...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Receiver execution failed")?;

    if stats.interrupted {
        warn!("Receiver interrupted");
    } else if let Some(report) = &stats.report {
        info!(
            items = report.items_forwarded(),
            end_of_stream = report.end_of_stream,
            duration_secs = stats.duration.as_secs_f64(),
            throughput = format!("{:.2}", report.throughput()),
            sink_failures = stats.sink_failures(),
            "Receiver completed successfully"
        );
    }
    stats.print_summary();

    info!("dreceiver finished");
    Ok(())
}

fn apply_overrides(blueprint: &mut ReceiverBlueprint, args: &RunArgs) {
    if let Some(ref bind) = args.bind {
        info!(bind = %bind, "Overriding endpoint address from CLI");
        blueprint.receiver.endpoint.address = bind.clone();
    }
    if let Some(n) = args.input_channels {
        info!(input_channels = n, "Overriding expected connections from CLI");
        blueprint.receiver.input_channels = n;
    }
}

/// Resolves on Ctrl+C or SIGTERM
///
/// If a handler cannot be installed that source never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &ReceiverBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Receiver:");
    println!("  Endpoint: {}", blueprint.receiver.endpoint);
    println!("  Expected senders: {}", blueprint.receiver.input_channels);
    println!("  Backlog: {}", blueprint.receiver.backlog);
    if blueprint.receiver.endpoint.transport == TransportKind::Local {
        println!("  A leftover socket file at the path is removed before bind");
    }

    match &blueprint.hierarchical {
        Some(h) => {
            println!("\nMode: hierarchical");
            println!("  Internal groups: {:?}", h.internal_groups);
            println!("  Internal destinations: {:?}", h.internal_destinations);
        }
        None => println!("\nMode: flat"),
    }

    println!("\nRouting ({}):", blueprint.routing.len());
    for entry in &blueprint.routing {
        println!("  - tag {} -> channel {}", entry.tag, entry.channel);
    }

    println!("\nOutputs ({}):", blueprint.outputs.len());
    for (channel, sink) in blueprint.outputs.iter().enumerate() {
        println!("  [{}] {} ({:?})", channel, sink.name, sink.sink_type);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const CONFIG: &str = r#"
[receiver]
input_channels = 2

[receiver.endpoint]
transport = "network"
address = "127.0.0.1:49000"

[[outputs]]
name = "out0"
sink_type = "log"
"#;

    #[test]
    fn test_overrides_replace_address_and_count() {
        let mut blueprint = config_loader::ConfigLoader::load_from_str(
            CONFIG,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();
        let cli = crate::cli::Cli::parse_from([
            "dreceiver",
            "run",
            "--bind",
            "127.0.0.1:50000",
            "--input-channels",
            "5",
        ]);
        let crate::cli::Commands::Run(args) = cli.command else {
            panic!("expected run");
        };

        apply_overrides(&mut blueprint, &args);
        assert_eq!(blueprint.receiver.endpoint.address, "127.0.0.1:50000");
        assert_eq!(blueprint.receiver.input_channels, 5);
        assert!(config_loader::validate(&blueprint).is_ok());
    }
}
