//! Bridge lifecycle: owns the one serial connection and the one hub.
//!
//! `BridgeLifecycle` is an explicitly constructed value owned by the caller
//! (no module-level globals): it holds at most one [`SerialConnection`] and at
//! most one [`WebSocketHub`], wires their event streams together, and exposes
//! start/teardown to external callers.  Only this type constructs or destroys
//! the two components; each component's events are consumed by a single pump
//! task spawned alongside it.
//!
//! Wiring:
//!
//! ```text
//! WebSocket client frame ──HubEvent::ClientMessage──▶ SerialConnection::write
//! serial TCP bytes ──SerialEvent::Data──▶ WebSocketHub::broadcast
//! ```
//!
//! All failures stay contained at the component boundary: a serial fault or a
//! server error clears the owning reference (leaving the lifecycle consistent
//! for the next start call) and surfaces through the [`Notifier`]; nothing
//! propagates as an error across the lifecycle boundary.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::domain::events::{HubEvent, SerialEvent, SerialState};
use crate::domain::notify::{Notifier, TracingNotifier};
use crate::infrastructure::serial_conn::SerialConnection;
use crate::infrastructure::ws_hub::WebSocketHub;

/// Capacity of each component's event channel.  Bounded so a stalled pump
/// applies backpressure to the producing socket task instead of growing
/// without limit.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Owner of the serial proxy's two components and their wiring.
pub struct BridgeLifecycle {
    inner: Arc<Mutex<Inner>>,
    notifier: Arc<dyn Notifier>,
}

#[derive(Default)]
struct Inner {
    hub: Option<Arc<WebSocketHub>>,
    serial: Option<Arc<SerialConnection>>,
    /// One pump per live component; pumps of replaced components end when
    /// their event channel closes and are reaped on the next start call.
    pumps: JoinSet<()>,
    /// Scheduled tasks; finished ones are reaped on the next schedule call.
    deferred: JoinSet<()>,
}

impl Default for BridgeLifecycle {
    fn default() -> Self {
        Self::new(Arc::new(TracingNotifier))
    }
}

impl BridgeLifecycle {
    /// Creates an idle lifecycle; nothing runs until
    /// [`start_serial_proxy`](Self::start_serial_proxy).
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            notifier,
        }
    }

    /// Starts (or re-joins) the serial proxy.
    ///
    /// Lazily constructs the hub bound to `ws_port` and the serial connection,
    /// exactly once each, then unconditionally calls the idempotent
    /// `connect(tcp_port)`.  Repeated calls while running are safe: they never
    /// create a second connection or a second server.  After a component
    /// failure cleared its reference, the next call builds a fresh instance.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_serial_proxy(&self, tcp_port: u16, ws_port: u16) {
        let mut inner = self.inner.lock().unwrap();

        // Reap pumps whose component was replaced after a failure.
        while inner.pumps.try_join_next().is_some() {}

        if inner.hub.is_none() {
            let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let hub = Arc::new(WebSocketHub::start(ws_port, events_tx));
            // The pump identifies its own hub by a weak handle so a stale
            // event can never clear a replacement instance.
            let own_hub = Arc::downgrade(&hub);
            inner.hub = Some(hub);

            let pump_state = Arc::clone(&self.inner);
            let pump_notifier = Arc::clone(&self.notifier);
            inner.pumps.spawn(async move {
                pump_hub_events(events_rx, pump_state, pump_notifier, own_hub).await;
            });
        }

        if inner.serial.is_none() {
            let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let serial = Arc::new(SerialConnection::new(events_tx));
            let own_serial = Arc::downgrade(&serial);
            inner.serial = Some(serial);

            let pump_state = Arc::clone(&self.inner);
            let pump_notifier = Arc::clone(&self.notifier);
            inner.pumps.spawn(async move {
                pump_serial_events(events_rx, pump_state, pump_notifier, own_serial).await;
            });
        }

        if let Some(serial) = &inner.serial {
            serial.connect(tcp_port);
        }
    }

    /// Schedules a deferred task owned by this lifecycle.
    ///
    /// The task runs once after `delay` unless [`teardown`](Self::teardown)
    /// cancels it first.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        // Reap tasks that already ran before adding the new one.
        while inner.deferred.try_join_next().is_some() {}
        inner.deferred.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }

    /// Tears everything down: closes the hub, destroys the connection,
    /// cancels deferred tasks, and clears all references.
    ///
    /// Safe to call when nothing is running (no-op) and safe to call twice.
    pub fn teardown(&self) {
        let (hub, serial, mut pumps, mut deferred) = {
            let mut inner = self.inner.lock().unwrap();
            (
                inner.hub.take(),
                inner.serial.take(),
                std::mem::take(&mut inner.pumps),
                std::mem::take(&mut inner.deferred),
            )
        };

        if let Some(hub) = hub {
            hub.close();
        }
        if let Some(serial) = serial {
            serial.destroy();
        }
        deferred.abort_all();
        pumps.abort_all();
        debug!("serial proxy torn down");
    }

    /// Address the WebSocket server is listening on, once bound.
    pub fn ws_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lock()
            .unwrap()
            .hub
            .as_ref()
            .and_then(|hub| hub.local_addr())
    }

    /// Number of currently connected WebSocket clients (0 when not running).
    pub fn client_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .hub
            .as_ref()
            .map_or(0, |hub| hub.client_count())
    }

    /// State of the serial connection (`NotConnected` when absent).
    pub fn serial_state(&self) -> SerialState {
        self.inner
            .lock()
            .unwrap()
            .serial
            .as_ref()
            .map_or(SerialState::NotConnected, |serial| serial.state())
    }

    /// True while either component exists.
    pub fn is_running(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.hub.is_some() || inner.serial.is_some()
    }
}

/// Takes `state`'s hub reference only if it still points at `own`.
fn take_own_hub(state: &Mutex<Inner>, own: &std::sync::Weak<WebSocketHub>) -> Option<Arc<WebSocketHub>> {
    let mut guard = state.lock().unwrap();
    let current = guard.hub.as_ref()?;
    let own = own.upgrade()?;
    if Arc::ptr_eq(current, &own) {
        guard.hub.take()
    } else {
        None
    }
}

/// Takes `state`'s serial reference only if it still points at `own`.
fn take_own_serial(
    state: &Mutex<Inner>,
    own: &std::sync::Weak<SerialConnection>,
) -> Option<Arc<SerialConnection>> {
    let mut guard = state.lock().unwrap();
    let current = guard.serial.as_ref()?;
    let own = own.upgrade()?;
    if Arc::ptr_eq(current, &own) {
        guard.serial.take()
    } else {
        None
    }
}

/// Consumes one hub instance's events until its channel closes.
async fn pump_hub_events(
    mut events: mpsc::Receiver<HubEvent>,
    state: Arc<Mutex<Inner>>,
    notifier: Arc<dyn Notifier>,
    own_hub: std::sync::Weak<WebSocketHub>,
) {
    while let Some(event) = events.recv().await {
        match event {
            HubEvent::Listening(addr) => {
                notifier.info(&format!(
                    "Serial port is available on WebSocket: ws://localhost:{}",
                    addr.port()
                ));
            }
            HubEvent::ClientConnected(client_id) => {
                debug!("websocket client {client_id} connected");
                notifier.info("Client connected to WebSocket serial port");
            }
            HubEvent::ClientMessage(_, bytes) => {
                // Forward to whichever serial connection exists right now;
                // dropped silently when none is connected.
                let serial = state.lock().unwrap().serial.clone();
                if let Some(serial) = serial {
                    serial.write(bytes);
                }
            }
            HubEvent::ClientDisconnected(client_id) => {
                debug!("websocket client {client_id} disconnected");
                notifier.warn("Client disconnected from WebSocket serial port");
            }
            HubEvent::ServerError(message) => {
                notifier.error(&format!("WebSocket serial port error: {message}"));
                // Terminal for this hub instance: close it and clear the
                // reference so the next start builds a fresh one.
                if let Some(hub) = take_own_hub(&state, &own_hub) {
                    hub.close();
                }
            }
        }
    }
}

/// Consumes one serial connection's events until its channel closes.
async fn pump_serial_events(
    mut events: mpsc::Receiver<SerialEvent>,
    state: Arc<Mutex<Inner>>,
    notifier: Arc<dyn Notifier>,
    own_serial: std::sync::Weak<SerialConnection>,
) {
    while let Some(event) = events.recv().await {
        match event {
            SerialEvent::Connected { port } => {
                notifier.info(&format!("Connected to serial port {port}"));
            }
            SerialEvent::Data(bytes) => {
                let hub = state.lock().unwrap().hub.clone();
                if let Some(hub) = hub {
                    hub.broadcast(&bytes);
                }
            }
            SerialEvent::Closed => {
                notifier.warn("Serial port disconnected");
                // The connection already reset itself; clear our reference so
                // the next start builds a fresh one.
                take_own_serial(&state, &own_serial);
            }
            SerialEvent::Error(message) => {
                notifier.error(&format!("Serial port error: {message}"));
                if let Some(serial) = take_own_serial(&state, &own_serial) {
                    serial.destroy();
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
