use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use relay_server::config;
use relay_telemetry::TelemetryConfig;

/// Event-relay harness for pointer and drawing end-to-end tests.
#[derive(Debug, Parser)]
#[command(name = "relay-harness", version)]
struct Cli {
    /// JSON config file merged over the defaults.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config).
    #[arg(long, short)]
    port: Option<u16>,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = relay_telemetry::parse_level(&cli.log_level)
        .with_context(|| format!("unknown log level: {}", cli.log_level))?;
    relay_telemetry::init_telemetry(&TelemetryConfig {
        log_level,
        json: cli.json_logs,
        ..Default::default()
    })?;

    let mut server_config =
        config::load_config(cli.config.as_deref()).context("failed to load config")?;
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    if let Some(port) = cli.port {
        server_config.port = port;
    }

    let handle = relay_server::start(server_config)
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port(), "Relay harness ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    handle.stop().await;
    tracing::info!("Shut down");
    Ok(())
}
