//! Event and state types for the serial connection and the WebSocket hub.
//!
//! Each socket resource is a source of a bounded event stream consumed by a
//! single subscriber (a pump task owned by the lifecycle).  Modelling the
//! callbacks as plain enums keeps the data flow explicit and lets unit tests
//! drive the consumers with fake event sources instead of real sockets.

use std::net::SocketAddr;

use uuid::Uuid;

/// Identifier assigned to each WebSocket client for the duration of its
/// connection.  Membership has no ordering significance.
pub type ClientId = Uuid;

/// Connection state of the serial TCP client.
///
/// ```text
/// NotConnected ──connect()──▶ Connecting ──peer accepts──▶ Connected
///       ▲                         │                            │
///       │◀──────── close ─────────┼──────────────◀─────────────┘
///       │                         ▼
///       └◀── forced destroy ── Failed  (socket fault)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialState {
    /// No socket exists; `connect` may create one.
    NotConnected,
    /// A TCP connect attempt is in flight.
    Connecting,
    /// The simulator accepted the connection; `write` is valid.
    Connected,
    /// The socket faulted; it is destroyed immediately after this state.
    Failed,
}

/// Events emitted by the serial TCP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    /// The TCP connection to the simulator was established.
    Connected { port: u16 },
    /// Bytes arrived from the simulator, forwarded verbatim (no framing).
    Data(Vec<u8>),
    /// The simulator closed the connection (EOF).  State has reset to
    /// `NotConnected`; the owner must clear its reference.
    Closed,
    /// The socket faulted and the state is `Failed`.  The owner must destroy
    /// the connection; the message is surfaced for diagnostic reporting only.
    Error(String),
}

/// Events emitted by the WebSocket hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// The server is bound and accepting clients.
    Listening(SocketAddr),
    /// A client joined the membership set.
    ClientConnected(ClientId),
    /// A client sent a frame; the payload is forwarded verbatim as bytes.
    ClientMessage(ClientId, Vec<u8>),
    /// A client left the membership set.
    ClientDisconnected(ClientId),
    /// The server failed (e.g. port already in use).  Terminal for this hub
    /// instance: a new hub must be constructed to resume service.
    ServerError(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
