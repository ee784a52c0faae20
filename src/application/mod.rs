//! Application layer for wokwi-serial-bridge.
//!
//! The application layer orchestrates the business logic: it knows *what* to
//! do, but delegates *how* to do it to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - Owning and wiring the serial proxy components ([`BridgeLifecycle`])
//! - The bounded poll-until-ready primitive ([`retry`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod lifecycle;
pub mod retry;

pub use lifecycle::BridgeLifecycle;
pub use retry::{retry, retry_with_sleep};
