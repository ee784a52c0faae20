//! Bridge configuration and `wokwi.toml` port extraction.
//!
//! The simulator project's `wokwi.toml` declares the two ports the bridge
//! needs under the `[wokwi]` table:
//!
//! ```toml
//! [wokwi]
//! version = 1
//! firmware = "build/sketch.ino.hex"
//! elf = "build/sketch.ino.elf"
//! rfc2217ServerPort = 4000
//! webSocketServerPort = 9500
//! ```
//!
//! Both port keys are optional — a project without them simply has no serial
//! proxy.  The bridge treats the port numbers as opaque; it neither validates
//! their source nor rewrites the file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse wokwi.toml: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── wokwi.toml schema ─────────────────────────────────────────────────────────

/// Top-level shape of a `wokwi.toml` project file.
///
/// Only the fields the bridge cares about are modelled; unknown keys are
/// ignored so newer simulator config files still parse.
#[derive(Debug, Clone, Deserialize)]
pub struct WokwiToml {
    pub wokwi: WokwiSection,
}

/// The `[wokwi]` table.  Key names are camelCase in the file format.
#[derive(Debug, Clone, Deserialize)]
pub struct WokwiSection {
    pub version: u32,
    #[serde(default)]
    pub firmware: Option<String>,
    #[serde(default)]
    pub elf: Option<String>,
    /// TCP port of the simulator's RFC 2217 virtual serial server.
    #[serde(rename = "rfc2217ServerPort", default)]
    pub rfc2217_server_port: Option<u16>,
    /// Port the bridge's WebSocket server should listen on.
    #[serde(rename = "webSocketServerPort", default)]
    pub web_socket_server_port: Option<u16>,
}

/// The two port numbers that define a serial proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialProxyPorts {
    /// Simulator-side TCP port (the virtual serial endpoint).
    pub tcp_port: u16,
    /// Client-side WebSocket listen port.
    pub ws_port: u16,
}

/// Parses `wokwi.toml` content and extracts the serial proxy ports.
///
/// Returns `Ok(None)` when either port key is absent — the project simply has
/// no serial proxy configured, which is not an error.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn proxy_ports_from_toml(content: &str) -> Result<Option<SerialProxyPorts>, ConfigError> {
    let parsed: WokwiToml = toml::from_str(content)?;
    let section = parsed.wokwi;

    match (section.rfc2217_server_port, section.web_socket_server_port) {
        (Some(tcp_port), Some(ws_port)) => Ok(Some(SerialProxyPorts { tcp_port, ws_port })),
        _ => Ok(None),
    }
}

/// Reads a `wokwi.toml` file from disk and extracts the serial proxy ports.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if its content is malformed.
pub fn load_proxy_ports(path: &Path) -> Result<Option<SerialProxyPorts>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    proxy_ports_from_toml(&content)
}

// ── Runtime configuration ─────────────────────────────────────────────────────

/// All runtime configuration for the bridge process.
///
/// Built once at startup from CLI arguments and (optionally) a `wokwi.toml`
/// file; precedence is CLI flag > config file > built-in default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// TCP port of the simulator's virtual serial endpoint on `127.0.0.1`.
    pub tcp_port: u16,
    /// Port the WebSocket server listens on (`ws://localhost:<port>`).
    pub ws_port: u16,
    /// Interval between readiness probes of the serial endpoint.
    pub probe_interval: std::time::Duration,
    /// Total readiness budget before the bridge starts without waiting further.
    pub probe_timeout: std::time::Duration,
}

impl Default for BridgeConfig {
    /// Defaults matching a stock Wokwi project on the local machine.
    fn default() -> Self {
        Self {
            tcp_port: 4000,
            ws_port: 9500,
            probe_interval: std::time::Duration::from_millis(250),
            probe_timeout: std::time::Duration::from_secs(10),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
