//! Domain layer for wokwi-serial-bridge.
//!
//! The domain layer contains pure business-logic types with no dependencies on
//! I/O, networking, or external frameworks.  This makes them easy to test in
//! isolation and portable to any runtime.
//!
//! # What belongs in the domain layer?
//!
//! - The bridge configuration and the `wokwi.toml` port schema
//! - The event and state types emitted by the serial connection and the hub
//! - The `Notifier` seam through which user-facing notifications are raised
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - Task spawning or anything that could block on external state

pub mod config;
pub mod events;
pub mod notify;

// Re-export the most commonly needed types at the domain module boundary
// so callers can write `domain::BridgeConfig` instead of the longer path.
pub use config::{BridgeConfig, ConfigError, SerialProxyPorts};
pub use events::{ClientId, HubEvent, SerialEvent, SerialState};
pub use notify::{Notifier, TracingNotifier};
