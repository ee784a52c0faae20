//! Infrastructure layer for wokwi-serial-bridge.
//!
//! The infrastructure layer handles all I/O: the outbound TCP connection to
//! the simulator's virtual serial port and the inbound WebSocket server.
//!
//! # Responsibilities
//!
//! - Connecting to the simulator's serial TCP endpoint on demand
//! - Binding the WebSocket listener and upgrading client connections
//! - Spawning the per-socket Tokio tasks and surfacing their events
//!
//! # What does NOT belong here?
//!
//! - Component ownership and wiring (that is the application layer)
//! - Event and configuration types (that is the domain layer)

pub mod serial_conn;
pub mod ws_hub;

// Re-export the two component types so the application layer can name them
// concisely.
pub use serial_conn::SerialConnection;
pub use ws_hub::WebSocketHub;
