//! CLI entrypoint for toolguard
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

mod commands;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use commands::{Cli, Command};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use toolguard_application::{
    BatchExecutor, FallbackPort, HealthMonitor, Orchestrator, RemoteToolPort, ToolInvoker,
};
use toolguard_domain::ToolCall;
use toolguard_infrastructure::remote::describe_tool;
use toolguard_infrastructure::{ConfigLoader, FileConfig, ResilientClient, SqliteFallbackExecutor};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_ref());
        return Ok(());
    }

    let Some(command) = cli.command else {
        bail!("No command given. Run `toolguard --help` for usage.");
    };

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref())
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?
    };
    config.validate()?;

    info!(base_url = %config.remote.base_url, "Starting toolguard");

    // === Dependency Injection ===
    let client = Arc::new(ResilientClient::new(config.remote.to_settings())?);
    let orchestrator = build_orchestrator(&config, Arc::clone(&client))?;

    if !orchestrator.initialize().await {
        warn!("Neither the remote service nor a local fallback is available");
    }

    let outcome = run(command, &config, &orchestrator, &client).await;
    orchestrator.shutdown().await;
    outcome
}

/// Install the fmt subscriber, plus a non-blocking file writer when asked
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };

    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::new(level))
        .with(console);

    match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let appender =
                tracing_appender::rolling::never(directory.unwrap_or(Path::new(".")), file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_target(false).with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

fn build_orchestrator(config: &FileConfig, client: Arc<ResilientClient>) -> Result<Orchestrator> {
    let mut builder = Orchestrator::builder(client.clone() as Arc<dyn RemoteToolPort>)
        .with_strategy(config.recovery.to_strategy());

    if config.fallback.enabled {
        let fallback = SqliteFallbackExecutor::connect_lazy(config.fallback.to_settings())?;
        builder = builder.with_fallback(Arc::new(fallback) as Arc<dyn FallbackPort>);
    }

    if config.monitor.enabled {
        let monitor = Arc::new(HealthMonitor::new(config.monitor.to_params()));
        monitor.add_target(client);
        builder = builder.with_monitor(monitor);
    }

    Ok(builder.build())
}

async fn run(
    command: Command,
    config: &FileConfig,
    orchestrator: &Orchestrator,
    client: &ResilientClient,
) -> Result<()> {
    match command {
        Command::Call { tool, params } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw).context("--params must be a JSON object")?,
                None => Value::Null,
            };
            let result = orchestrator
                .execute_tool(&ToolCall::from_json(tool, params))
                .await;
            print_json(&result)
        }
        Command::Batch {
            file,
            sequential,
            stop_on_error,
        } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let calls: Vec<ToolCall> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a list of tool calls", file.display()))?;

            let invoker: Arc<dyn ToolInvoker> = Arc::new(orchestrator.clone());
            let executor = BatchExecutor::new(invoker, config.batch.to_params());
            let results = executor
                .execute_batch(&calls, !sequential, stop_on_error)
                .await;

            let stats = executor.statistics();
            info!(
                calls = stats.total_calls,
                failures = stats.total_failures,
                seconds = stats.total_time_secs,
                "Batch finished"
            );
            print_json(&results)
        }
        Command::Status => print_json(&orchestrator.get_status()),
        Command::Tools => {
            let tools: Vec<Value> = client.available_tools().iter().map(describe_tool).collect();
            print_json(&json!({
                "target": client.settings().name,
                "connection_state": client.connection_state(),
                "tools": tools,
            }))
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
