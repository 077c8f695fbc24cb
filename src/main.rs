//! # sigrelay
//!
//! Signaling relay binary: parses the CLI, sets up logging and metrics,
//! and runs the relay server until Ctrl+C.

#![deny(unsafe_code)]

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sigrelay_server::metrics::install_recorder;
use sigrelay_server::RelayConfig;
use sigrelay_telemetry::{init_telemetry, TelemetryConfig};
use tracing::Level;

/// WebRTC signaling relay.
#[derive(Parser, Debug)]
#[command(name = "sigrelay", about = "WebSocket signaling relay for host/client peers")]
struct Cli {
    /// JSON config file. Flags below override its values.
    #[arg(long, env = "SIGRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long, env = "SIGRELAY_HOST")]
    host: Option<IpAddr>,

    /// Port to bind (0 for auto-assign).
    #[arg(long, env = "SIGRELAY_PORT")]
    port: Option<u16>,

    /// Maximum concurrent WebSocket connections.
    #[arg(long, env = "SIGRELAY_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Directory of static files served alongside `/ws`.
    #[arg(long, env = "SIGRELAY_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Log registry counts every N seconds (0 disables).
    #[arg(long, env = "SIGRELAY_SNAPSHOT_INTERVAL")]
    snapshot_interval: Option<u64>,

    /// Default log level. `RUST_LOG` takes precedence when set.
    #[arg(long, env = "SIGRELAY_LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Emit JSON log lines.
    #[arg(long, env = "SIGRELAY_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    /// Config file (or defaults) with CLI overrides applied.
    fn relay_config(&self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => RelayConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max) = self.max_connections {
            config.max_connections = max;
        }
        if let Some(dir) = &self.static_dir {
            config.static_dir = Some(dir.clone());
        }
        if let Some(secs) = self.snapshot_interval {
            config.snapshot_interval_secs = secs;
        }
        Ok(config)
    }

    fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_level: self.log_level,
            json: self.log_json,
            ..TelemetryConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&cli.telemetry_config()).context("Failed to initialize logging")?;
    let config = cli.relay_config()?;
    tracing::debug!(config = %serde_json::to_string(&config)?, "effective configuration");

    let metrics = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics will be empty");
            None
        }
    };

    let server = sigrelay_server::start(&config, metrics)
        .await
        .with_context(|| format!("Failed to bind {}", config.socket_addr()))?;
    tracing::info!(addr = %server.local_addr(), "sigrelay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    server.shutdown(None).await;
    tracing::info!("sigrelay stopped");
    Ok(())
}
