//! WebSocket hub: accept loop and client membership.
//!
//! The hub listens on `127.0.0.1:<port>`, upgrades each inbound TCP
//! connection to a WebSocket session, and keeps the set of connected clients.
//! Frames received from any client surface as [`HubEvent::ClientMessage`]
//! (payload verbatim, text or binary); [`WebSocketHub::broadcast`] delivers
//! serial bytes to every member as a text frame.
//!
//! # Delivery model
//!
//! Broadcast is fire-and-forget per client: each client has its own unbounded
//! outbound queue drained by its own session task, so a slow or dead client
//! never delays delivery to the others.  Per-client frame order is preserved
//! in both directions.
//!
//! # Failure model
//!
//! A bind failure (e.g. the port is already in use) is terminal for the hub
//! instance and surfaces as [`HubEvent::ServerError`]; the owner must build a
//! new hub to resume service.  Transient accept or handshake failures with a
//! single client are logged and do not kill the hub.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::events::{ClientId, HubEvent};

type ClientMap = HashMap<ClientId, mpsc::UnboundedSender<WsMessage>>;

/// WebSocket server plus its set of connected clients.
pub struct WebSocketHub {
    clients: Arc<Mutex<ClientMap>>,
    local_addr: Arc<OnceLock<SocketAddr>>,
    /// Accept loop plus one session task per live client.  Finished sessions
    /// are reaped on each accept so the set stays bounded by the live count.
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl WebSocketHub {
    /// Creates the hub and starts binding `127.0.0.1:<port>`.
    ///
    /// Binding happens asynchronously; the outcome arrives on `events` as
    /// either [`HubEvent::Listening`] or [`HubEvent::ServerError`].
    pub fn start(port: u16, events: mpsc::Sender<HubEvent>) -> Self {
        let clients: Arc<Mutex<ClientMap>> = Arc::new(Mutex::new(HashMap::new()));
        let local_addr = Arc::new(OnceLock::new());
        let tasks = Arc::new(Mutex::new(JoinSet::new()));

        let accept_clients = Arc::clone(&clients);
        let accept_addr = Arc::clone(&local_addr);
        let accept_tasks = Arc::clone(&tasks);
        tasks.lock().unwrap().spawn(async move {
            run_accept_loop(port, events, accept_clients, accept_addr, accept_tasks).await;
        });

        Self {
            clients,
            local_addr,
            tasks,
        }
    }

    /// Address the server is bound to, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Sends `bytes` to every connected client as a text frame.
    ///
    /// Fire-and-forget: bytes are queued per client and delivered by each
    /// client's own session task.  A client whose session already ended simply
    /// misses the frame; it is removed from the set when its task unwinds.
    pub fn broadcast(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes).into_owned();
        let clients = self.clients.lock().unwrap();
        for sender in clients.values() {
            let _ = sender.send(WsMessage::Text(text.clone()));
        }
    }

    /// Closes the server and disconnects all clients.
    ///
    /// Terminal for this instance; safe to call repeatedly.
    pub fn close(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        tasks.abort_all();
        self.clients.lock().unwrap().clear();
    }
}

/// Binds the listener and accepts clients until the hub is closed.
async fn run_accept_loop(
    port: u16,
    events: mpsc::Sender<HubEvent>,
    clients: Arc<Mutex<ClientMap>>,
    local_addr: Arc<OnceLock<SocketAddr>>,
    tasks: Arc<Mutex<JoinSet<()>>>,
) {
    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            let _ = events
                .send(HubEvent::ServerError(format!(
                    "failed to bind WebSocket server on port {port}: {e}"
                )))
                .await;
            return;
        }
    };

    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            let _ = events
                .send(HubEvent::ServerError(format!(
                    "failed to resolve WebSocket server address: {e}"
                )))
                .await;
            return;
        }
    };

    let _ = local_addr.set(addr);
    let _ = events.send(HubEvent::Listening(addr)).await;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("websocket client connecting from {peer}");
                let session_clients = Arc::clone(&clients);
                let session_events = events.clone();
                let mut tasks = tasks.lock().unwrap();
                // Reap sessions that already ended before adding the new one.
                while tasks.try_join_next().is_some() {}
                tasks.spawn(async move {
                    run_client_session(stream, peer, session_clients, session_events).await;
                });
            }
            Err(e) => {
                // Transient (e.g. out of file descriptors); keep serving.
                warn!("websocket accept error: {e}");
            }
        }
    }
}

/// Runs one client session: handshake, membership, and both frame directions.
async fn run_client_session(
    stream: TcpStream,
    peer: SocketAddr,
    clients: Arc<Mutex<ClientMap>>,
    events: mpsc::Sender<HubEvent>,
) {
    let mut ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake with {peer} failed: {e}");
            return;
        }
    };

    let client_id: ClientId = Uuid::new_v4();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
    clients.lock().unwrap().insert(client_id, outbound_tx);

    if events.send(HubEvent::ClientConnected(client_id)).await.is_err() {
        clients.lock().unwrap().remove(&client_id);
        return;
    }

    loop {
        tokio::select! {
            queued = outbound_rx.recv() => match queued {
                Some(message) => {
                    if ws_stream.send(message).await.is_err() {
                        debug!("client {client_id} send failed; closing session");
                        break;
                    }
                }
                // Sender dropped — the hub removed this client.
                None => break,
            },

            frame = ws_stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if events
                        .send(HubEvent::ClientMessage(client_id, text.into_bytes()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    if events
                        .send(HubEvent::ClientMessage(client_id, bytes))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                // tungstenite answers pings automatically on the next send.
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("client {client_id} closed the connection");
                    break;
                }
                Some(Ok(WsMessage::Frame(_))) => {}
                Some(Err(e)) => {
                    debug!("client {client_id} websocket error: {e}");
                    break;
                }
            },
        }
    }

    clients.lock().unwrap().remove(&client_id);
    let _ = events.send(HubEvent::ClientDisconnected(client_id)).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::connect_async;

    const WAIT: Duration = Duration::from_secs(5);

    async fn recv_event(rx: &mut mpsc::Receiver<HubEvent>) -> HubEvent {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for hub event")
            .expect("event channel closed")
    }

    /// Starts a hub on an ephemeral port and waits for it to listen.
    async fn start_hub() -> (WebSocketHub, mpsc::Receiver<HubEvent>, SocketAddr) {
        let (tx, mut rx) = mpsc::channel(64);
        let hub = WebSocketHub::start(0, tx);
        let addr = match recv_event(&mut rx).await {
            HubEvent::Listening(addr) => addr,
            other => panic!("expected Listening, got {other:?}"),
        };
        (hub, rx, addr)
    }

    #[tokio::test]
    async fn test_start_emits_listening_with_bound_address() {
        let (hub, _rx, addr) = start_hub().await;
        assert_ne!(addr.port(), 0);
        assert_eq!(hub.local_addr(), Some(addr));
        hub.close();
    }

    #[tokio::test]
    async fn test_client_connect_adds_membership_and_emits_event() {
        // Arrange
        let (hub, mut rx, addr) = start_hub().await;

        // Act
        let (_client, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        // Assert
        assert!(matches!(
            recv_event(&mut rx).await,
            HubEvent::ClientConnected(_)
        ));
        assert_eq!(hub.client_count(), 1);
        hub.close();
    }

    #[tokio::test]
    async fn test_client_text_frame_surfaces_as_client_message() {
        // Arrange
        let (hub, mut rx, addr) = start_hub().await;
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        assert!(matches!(
            recv_event(&mut rx).await,
            HubEvent::ClientConnected(_)
        ));

        // Act
        client
            .send(WsMessage::Text("AT+RST\n".to_string()))
            .await
            .unwrap();

        // Assert
        match recv_event(&mut rx).await {
            HubEvent::ClientMessage(_, bytes) => assert_eq!(bytes, b"AT+RST\n"),
            other => panic!("unexpected event: {other:?}"),
        }
        hub.close();
    }

    #[tokio::test]
    async fn test_client_binary_frame_surfaces_verbatim() {
        let (hub, mut rx, addr) = start_hub().await;
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        assert!(matches!(
            recv_event(&mut rx).await,
            HubEvent::ClientConnected(_)
        ));

        client
            .send(WsMessage::Binary(vec![0x00, 0xFF, 0x41]))
            .await
            .unwrap();

        match recv_event(&mut rx).await {
            HubEvent::ClientMessage(_, bytes) => assert_eq!(bytes, vec![0x00, 0xFF, 0x41]),
            other => panic!("unexpected event: {other:?}"),
        }
        hub.close();
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client_once_in_order() {
        // Arrange: two connected clients
        let (hub, mut rx, addr) = start_hub().await;
        let (mut client_a, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        assert!(matches!(
            recv_event(&mut rx).await,
            HubEvent::ClientConnected(_)
        ));
        let (mut client_b, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        assert!(matches!(
            recv_event(&mut rx).await,
            HubEvent::ClientConnected(_)
        ));

        // Act
        hub.broadcast(b"first");
        hub.broadcast(b"second");

        // Assert: each client receives exactly the sequence, in order
        for client in [&mut client_a, &mut client_b] {
            let one = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
            let two = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(one, WsMessage::Text("first".to_string()));
            assert_eq!(two, WsMessage::Text("second".to_string()));
        }
        hub.close();
    }

    #[tokio::test]
    async fn test_broadcast_with_no_clients_is_a_noop() {
        let (hub, _rx, _addr) = start_hub().await;
        hub.broadcast(b"nobody listening");
        assert_eq!(hub.client_count(), 0);
        hub.close();
    }

    #[tokio::test]
    async fn test_client_disconnect_removes_membership_and_emits_event() {
        // Arrange
        let (hub, mut rx, addr) = start_hub().await;
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        let connected_id = match recv_event(&mut rx).await {
            HubEvent::ClientConnected(id) => id,
            other => panic!("unexpected event: {other:?}"),
        };

        // Act
        client.close(None).await.unwrap();

        // Assert
        match recv_event(&mut rx).await {
            HubEvent::ClientDisconnected(id) => assert_eq!(id, connected_id),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(hub.client_count(), 0);
        hub.close();
    }

    #[tokio::test]
    async fn test_finished_session_tasks_are_reaped() {
        // Arrange
        let (hub, mut rx, addr) = start_hub().await;

        // Act: many clients connect and cleanly disconnect, one after another
        for _ in 0..20 {
            let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
            assert!(matches!(
                recv_event(&mut rx).await,
                HubEvent::ClientConnected(_)
            ));
            client.close(None).await.unwrap();
            assert!(matches!(
                recv_event(&mut rx).await,
                HubEvent::ClientDisconnected(_)
            ));
        }

        // Assert: ended sessions were reaped along the way, so the task set
        // stays bounded by the live client count instead of growing per
        // connection (accept loop + at most a few not-yet-reaped sessions).
        assert_eq!(hub.client_count(), 0);
        let retained = hub.tasks.lock().unwrap().len();
        assert!(
            retained <= 10,
            "hub retains {retained} task handles after all clients left"
        );
        hub.close();
    }

    #[tokio::test]
    async fn test_bind_conflict_surfaces_server_error() {
        // Arrange: occupy a port with a plain TCP listener
        let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();

        // Act
        let (tx, mut rx) = mpsc::channel(64);
        let hub = WebSocketHub::start(port, tx);

        // Assert: terminal server error, no Listening event
        match recv_event(&mut rx).await {
            HubEvent::ServerError(message) => assert!(message.contains(&port.to_string())),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(hub.local_addr(), None);
        hub.close();
    }

    #[tokio::test]
    async fn test_close_disconnects_clients_and_clears_state() {
        // Arrange
        let (hub, mut rx, addr) = start_hub().await;
        let (mut client, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        assert!(matches!(
            recv_event(&mut rx).await,
            HubEvent::ClientConnected(_)
        ));

        // Act
        hub.close();

        // Assert: the client's connection ends (Close frame, error, or EOF)
        let outcome = timeout(WAIT, client.next()).await.unwrap();
        assert!(
            !matches!(outcome, Some(Ok(WsMessage::Text(_) | WsMessage::Binary(_)))),
            "client must not receive data after close, got {outcome:?}"
        );
        assert_eq!(hub.client_count(), 0);

        // Close is idempotent.
        hub.close();
    }
}
