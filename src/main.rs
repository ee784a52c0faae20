//! wokwi-serial-bridge — entry point.
//!
//! This binary relays a simulator's virtual serial port (a local TCP byte
//! stream, e.g. Wokwi's RFC 2217 server) to any number of WebSocket clients.
//!
//! # Why a bridge process?
//!
//! Web tooling (serial monitors, dashboards, test harnesses) can only speak
//! WebSocket, while the simulator exposes its serial port as a raw TCP socket.
//! The bridge forwards bytes verbatim in both directions so any number of
//! WebSocket clients can observe and drive the one serial stream.
//!
//! # Usage
//!
//! ```text
//! wokwi-serial-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>            Read ports from a wokwi.toml project file
//!   --tcp-port <PORT>          Simulator serial TCP port [default: 4000]
//!   --ws-port  <PORT>          WebSocket listen port [default: 9500]
//!   --probe-interval-ms <MS>   Readiness probe interval [default: 250]
//!   --probe-timeout-ms <MS>    Readiness probe budget [default: 10000]
//! ```
//!
//! Port precedence is CLI flag > config file > built-in default.  The CLI
//! flags can also be set through `WOKWI_TCP_PORT` / `WOKWI_WS_PORT`.
//!
//! # Startup sequence
//!
//! 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level.
//! 2. Ports are resolved from CLI args and the optional `wokwi.toml`.
//! 3. The simulator's serial endpoint is polled until reachable (or the
//!    probe budget runs out — a warning, not a fatal error).
//! 4. The bridge lifecycle starts the serial proxy and runs until Ctrl+C.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wokwi_serial_bridge::application::{retry, BridgeLifecycle};
use wokwi_serial_bridge::domain::config::{load_proxy_ports, BridgeConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// WebSocket bridge for a simulator's virtual serial port.
///
/// The `#[derive(Parser)]` macro from `clap` generates the argument parser
/// from the struct fields and their `#[arg(...)]` attributes.
#[derive(Debug, Parser)]
#[command(
    name = "wokwi-serial-bridge",
    about = "Relays a simulator's serial TCP endpoint to WebSocket clients",
    version
)]
struct Cli {
    /// Path to a wokwi.toml project file to read the two ports from.
    ///
    /// A file without the port keys is treated as "no proxy configured" and
    /// falls back to the other sources.
    #[arg(long)]
    config: Option<PathBuf>,

    /// TCP port of the simulator's virtual serial endpoint on 127.0.0.1.
    #[arg(long, env = "WOKWI_TCP_PORT")]
    tcp_port: Option<u16>,

    /// Port for the WebSocket server to listen on (ws://localhost:PORT).
    #[arg(long, env = "WOKWI_WS_PORT")]
    ws_port: Option<u16>,

    /// Interval in milliseconds between simulator readiness probes.
    #[arg(long, default_value_t = 250, env = "WOKWI_PROBE_INTERVAL_MS")]
    probe_interval_ms: u64,

    /// Total readiness budget in milliseconds before starting anyway.
    #[arg(long, default_value_t = 10_000, env = "WOKWI_PROBE_TIMEOUT_MS")]
    probe_timeout_ms: u64,
}

impl Cli {
    /// Resolves the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// Precedence per port: explicit CLI flag, then the config file, then the
    /// built-in default.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` points at a file that cannot be read or
    /// parsed.  A readable file without port keys is not an error.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let file_ports = match &self.config {
            Some(path) => load_proxy_ports(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => None,
        };

        let defaults = BridgeConfig::default();
        Ok(BridgeConfig {
            tcp_port: self
                .tcp_port
                .or(file_ports.map(|p| p.tcp_port))
                .unwrap_or(defaults.tcp_port),
            ws_port: self
                .ws_port
                .or(file_ports.map(|p| p.ws_port))
                .unwrap_or(defaults.ws_port),
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// `#[tokio::main]` sets up the Tokio multi-threaded runtime on which all
/// socket tasks run.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `EnvFilter::try_from_default_env()` reads the `RUST_LOG` environment
    // variable; absent or invalid values fall back to `info`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_bridge_config()?;

    info!(
        "wokwi-serial-bridge starting — serial=127.0.0.1:{}, ws=localhost:{}",
        config.tcp_port, config.ws_port
    );

    // Wait for the externally launched simulator to open its serial endpoint.
    // Timing out is a normal outcome: the proxy still starts, and the first
    // connect attempt surfaces any remaining problem as a diagnostic.
    let tcp_port = config.tcp_port;
    let ready = retry(
        || async move {
            match tokio::net::TcpStream::connect(("127.0.0.1", tcp_port)).await {
                Ok(_probe) => true,
                Err(_) => false,
            }
        },
        config.probe_interval,
        config.probe_timeout,
    )
    .await;

    if !ready {
        warn!(
            "simulator serial port {} not reachable after {:?}; starting proxy anyway",
            config.tcp_port, config.probe_timeout
        );
    }

    let lifecycle = BridgeLifecycle::default();
    lifecycle.start_serial_proxy(config.tcp_port, config.ws_port);

    // Run until the user interrupts; then tear everything down exactly once.
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C signal")?;
    info!("received Ctrl+C — shutting down serial proxy");
    lifecycle.teardown();

    info!("wokwi-serial-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_resolve_to_default_ports() {
        // Arrange: parse with no arguments (all defaults apply)
        let cli = Cli::parse_from(["wokwi-serial-bridge"]);

        // Act
        let config = cli.into_bridge_config().unwrap();

        // Assert
        assert_eq!(config.tcp_port, 4000);
        assert_eq!(config.ws_port, 9500);
    }

    #[test]
    fn test_cli_defaults_resolve_probe_budget() {
        let cli = Cli::parse_from(["wokwi-serial-bridge"]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.probe_interval, Duration::from_millis(250));
        assert_eq!(config.probe_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn test_cli_tcp_port_override() {
        let cli = Cli::parse_from(["wokwi-serial-bridge", "--tcp-port", "4123"]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.tcp_port, 4123);
        assert_eq!(config.ws_port, 9500);
    }

    #[test]
    fn test_cli_ws_port_override() {
        let cli = Cli::parse_from(["wokwi-serial-bridge", "--ws-port", "9999"]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.ws_port, 9999);
    }

    #[test]
    fn test_cli_probe_flags_override() {
        let cli = Cli::parse_from([
            "wokwi-serial-bridge",
            "--probe-interval-ms",
            "50",
            "--probe-timeout-ms",
            "2000",
        ]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(config.probe_interval, Duration::from_millis(50));
        assert_eq!(config.probe_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn test_config_file_supplies_ports() {
        // Arrange: a wokwi.toml with both ports
        let dir = std::env::temp_dir().join(format!("wokwi_cli_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wokwi.toml");
        std::fs::write(
            &path,
            "[wokwi]\nversion = 1\nrfc2217ServerPort = 4100\nwebSocketServerPort = 9600\n",
        )
        .unwrap();

        // Act
        let cli = Cli::parse_from([
            "wokwi-serial-bridge",
            "--config",
            path.to_str().unwrap(),
        ]);
        let config = cli.into_bridge_config().unwrap();

        // Assert
        assert_eq!(config.tcp_port, 4100);
        assert_eq!(config.ws_port, 9600);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_cli_flag_takes_precedence_over_config_file() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("wokwi_cli_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wokwi.toml");
        std::fs::write(
            &path,
            "[wokwi]\nversion = 1\nrfc2217ServerPort = 4100\nwebSocketServerPort = 9600\n",
        )
        .unwrap();

        // Act: --tcp-port overrides the file, --ws-port comes from the file
        let cli = Cli::parse_from([
            "wokwi-serial-bridge",
            "--config",
            path.to_str().unwrap(),
            "--tcp-port",
            "4999",
        ]);
        let config = cli.into_bridge_config().unwrap();

        // Assert
        assert_eq!(config.tcp_port, 4999);
        assert_eq!(config.ws_port, 9600);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_without_ports_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("wokwi_cli_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wokwi.toml");
        std::fs::write(&path, "[wokwi]\nversion = 1\nfirmware = \"a.hex\"\n").unwrap();

        let cli = Cli::parse_from([
            "wokwi-serial-bridge",
            "--config",
            path.to_str().unwrap(),
        ]);
        let config = cli.into_bridge_config().unwrap();

        assert_eq!(config.tcp_port, 4000);
        assert_eq!(config.ws_port, 9500);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_config_file_returns_error() {
        let cli = Cli::parse_from([
            "wokwi-serial-bridge",
            "--config",
            "/nonexistent/wokwi.toml",
        ]);
        let result = cli.into_bridge_config();
        assert!(result.is_err());
    }
}
