//! Outbound TCP client for the simulator's virtual serial endpoint.
//!
//! The simulator exposes its virtual serial port as a plain TCP byte stream on
//! `127.0.0.1`.  This module owns that socket exclusively: it connects on
//! demand, forwards inbound bytes verbatim as [`SerialEvent::Data`] (no
//! framing or parsing — the stream is an opaque byte pipe), and reports
//! close/fault through the same event stream.
//!
//! # Cancellation
//!
//! There is no dedicated cancellation token.  Destroying the connection aborts
//! its I/O tasks and bumps a generation counter; any callback still in flight
//! for the destroyed incarnation sees the stale generation and becomes a
//! no-op.  This keeps the `connect`-after-failure path race-free.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::domain::events::{SerialEvent, SerialState};

/// TCP client connection to the simulator's serial endpoint.
///
/// At most one incarnation of the underlying socket exists at a time.  All
/// observable behaviour flows out through the [`SerialEvent`] channel supplied
/// at construction; the owner (the bridge lifecycle) is the single subscriber.
pub struct SerialConnection {
    inner: Arc<Mutex<Inner>>,
    events: mpsc::Sender<SerialEvent>,
}

struct Inner {
    state: SerialState,
    /// Bumped on every connect attempt and on destroy; tasks carry the value
    /// they were spawned with and bail out when it no longer matches.
    generation: u64,
    /// Present only while connected; queue into the writer task.
    writer: Option<mpsc::UnboundedSender<Vec<u8>>>,
    /// Connect/reader plus writer task of the current incarnation.  Finished
    /// tasks of earlier incarnations are reaped on each connect.
    tasks: JoinSet<()>,
}

impl SerialConnection {
    /// Creates a connection in the `NotConnected` state.
    ///
    /// `events` is the single-subscriber stream the owner consumes; nothing
    /// happens until [`connect`](Self::connect) is called.
    pub fn new(events: mpsc::Sender<SerialEvent>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SerialState::NotConnected,
                generation: 0,
                writer: None,
                tasks: JoinSet::new(),
            })),
            events,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SerialState {
        self.inner.lock().unwrap().state
    }

    /// Starts a TCP connect attempt to `127.0.0.1:<port>`.
    ///
    /// Idempotent: does nothing while a connect is already in flight or the
    /// connection is established.  The outcome arrives as a [`SerialEvent`]
    /// (`Connected` or `Error`), never as a return value.
    pub fn connect(&self, port: u16) {
        let shared = Arc::clone(&self.inner);
        let events = self.events.clone();

        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.state, SerialState::Connecting | SerialState::Connected) {
            trace!("serial connect({port}) ignored; already {:?}", inner.state);
            return;
        }

        inner.generation += 1;
        let generation = inner.generation;
        inner.state = SerialState::Connecting;

        // Reap tasks of earlier incarnations before spawning the new one.
        while inner.tasks.try_join_next().is_some() {}
        inner.tasks.spawn(async move {
            run_connect(shared, events, port, generation).await;
        });
    }

    /// Queues `bytes` for writing to the serial endpoint.
    ///
    /// Valid once connected; silently dropped otherwise (no queueing across
    /// connection attempts).
    pub fn write(&self, bytes: Vec<u8>) {
        let writer = {
            let inner = self.inner.lock().unwrap();
            if inner.state != SerialState::Connected {
                trace!("dropping {} byte(s); serial port not connected", bytes.len());
                return;
            }
            inner.writer.clone()
        };

        if let Some(writer) = writer {
            // The writer task drains this queue; if it already exited the
            // connection is going down and the bytes are dropped.
            let _ = writer.send(bytes);
        }
    }

    /// Forcibly destroys the socket and resets to `NotConnected`.
    ///
    /// Safe to call in any state, including repeatedly.  In-flight callbacks
    /// of the destroyed incarnation become no-ops.
    pub fn destroy(&self) {
        let mut tasks = {
            let mut inner = self.inner.lock().unwrap();
            inner.generation += 1;
            inner.state = SerialState::NotConnected;
            inner.writer = None;
            std::mem::take(&mut inner.tasks)
        };

        tasks.abort_all();
    }
}

/// Runs one connect attempt and, on success, the reader and writer loops.
async fn run_connect(
    inner: Arc<Mutex<Inner>>,
    events: mpsc::Sender<SerialEvent>,
    port: u16,
    generation: u64,
) {
    let stream = match TcpStream::connect(("127.0.0.1", port)).await {
        Ok(stream) => stream,
        Err(e) => {
            fault(&inner, &events, generation, format!("serial port {port} error: {e}")).await;
            return;
        }
    };

    let (mut read_half, mut write_half) = stream.into_split();
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

    {
        let mut guard = inner.lock().unwrap();
        if guard.generation != generation {
            // Destroyed while the handshake was in flight.
            return;
        }
        guard.state = SerialState::Connected;
        guard.writer = Some(writer_tx);
    }

    debug!("connected to serial port {port}");
    let _ = events.send(SerialEvent::Connected { port }).await;

    // Writer loop: drains the queue into the socket.  Ends when the queue
    // sender is dropped (disconnect/destroy) or a write faults.
    let writer_inner = Arc::clone(&inner);
    let writer_events = events.clone();
    inner.lock().unwrap().tasks.spawn(async move {
        while let Some(bytes) = writer_rx.recv().await {
            if let Err(e) = write_half.write_all(&bytes).await {
                fault(
                    &writer_inner,
                    &writer_events,
                    generation,
                    format!("serial port {port} error: {e}"),
                )
                .await;
                return;
            }
        }
    });

    // Reader loop: forwards inbound bytes verbatim, in arrival order.
    let mut buf = vec![0u8; 4096];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                // EOF — the simulator closed the connection.
                debug!("serial port {port} disconnected");
                let stale = {
                    let mut guard = inner.lock().unwrap();
                    if guard.generation != generation {
                        true
                    } else {
                        guard.state = SerialState::NotConnected;
                        guard.writer = None;
                        false
                    }
                };
                if !stale {
                    let _ = events.send(SerialEvent::Closed).await;
                }
                return;
            }
            Ok(n) => {
                if events.send(SerialEvent::Data(buf[..n].to_vec())).await.is_err() {
                    // Subscriber gone; the connection is being torn down.
                    return;
                }
            }
            Err(e) => {
                fault(&inner, &events, generation, format!("serial port {port} error: {e}")).await;
                return;
            }
        }
    }
}

/// Marks the current incarnation failed, destroys it, and surfaces the error.
///
/// No-op when `generation` is stale (the incarnation was already destroyed).
async fn fault(
    inner: &Arc<Mutex<Inner>>,
    events: &mpsc::Sender<SerialEvent>,
    generation: u64,
    message: String,
) {
    {
        let mut guard = inner.lock().unwrap();
        if guard.generation != generation {
            return;
        }
        // Failed blocks nothing: connect() accepts it as a starting state,
        // and the owner's destroy() resets it to NotConnected.
        guard.state = SerialState::Failed;
        guard.writer = None;
    }

    warn!("{message}");
    let _ = events.send(SerialEvent::Error(message)).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
