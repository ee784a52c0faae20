//! wokwi-serial-bridge library crate.
//!
//! A process-local relay that exposes a simulator's virtual serial port
//! (reachable only over a local TCP socket) to any number of WebSocket
//! clients, forwarding bytes bidirectionally with no framing or protocol of
//! its own.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! WebSocket clients  (raw text/byte frames)
//!         ↕
//! [wokwi-serial-bridge]
//!   ├── domain/           Pure types: config, events, Notifier seam
//!   ├── application/      BridgeLifecycle wiring + retry poller
//!   └── infrastructure/
//!         ├── ws_hub/      WebSocket server (tokio-tungstenite)
//!         └── serial_conn/ TCP client to the simulator serial port
//!         ↕
//! Simulator  (virtual serial port over TCP, e.g. Wokwi RFC 2217)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no sockets).
//! - `application` depends on `domain` and owns the component wiring.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tungstenite`.
//!
//! # Data flow
//!
//! Every byte sequence arriving from the simulator is delivered to every
//! currently connected WebSocket client, once, in arrival order; every frame
//! a client sends is written to the serial connection in that client's send
//! order.  The stream is an opaque byte pipe in both directions.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: lifecycle wiring and the retry poller.
pub mod application;

/// Infrastructure layer: serial TCP client and WebSocket server.
pub mod infrastructure;
