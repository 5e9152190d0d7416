//! WebSocket sync client for connecting to a drawing room.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect)
//! - Sending client events (deltas, commits, history, cursor)
//! - Server events surfaced on an mpsc channel

use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::oplog::UndoScope;
use crate::protocol::{ClientEvent, Point, ProtocolError, RoomId, Segment, ServerEvent};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// An event from the room
    Server(ServerEvent),
}

/// The sync client.
///
/// One client joins exactly one room for the lifetime of its connection.
pub struct SyncClient {
    room_id: RoomId,
    name: Option<String>,

    /// Connection state
    state: Arc<RwLock<ConnectionState>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<String>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SyncEvent>>,

    /// Event sender (held by the reader task)
    event_tx: mpsc::Sender<SyncEvent>,

    server_url: String,
}

impl SyncClient {
    pub fn new(room_id: RoomId, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            room_id,
            name: None,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Set the display name announced on connect.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// WebSocket URL for this client's room.
    pub fn endpoint(&self) -> String {
        let mut url = format!("{}/{}", self.server_url.trim_end_matches('/'), self.room_id);
        if let Some(name) = &self.name {
            let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
            url.push_str("?name=");
            url.push_str(&encoded);
        }
        url
    }

    /// Connect to the server.
    ///
    /// Spawns background tasks for reading/writing WebSocket messages. The
    /// first server event after [`SyncEvent::Connected`] is the room snapshot.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = self.endpoint();
        let (ws_stream, _) = match tokio_tungstenite::connect_async(&url).await {
            Ok(connected) => connected,
            Err(e) => {
                log::warn!("Failed to connect to {url}: {e}");
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::text(text)).await.is_err() {
                    return;
                }
            }
            // Sender dropped: we are disconnecting.
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;

        // Reader task: decode server events
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerEvent::decode(text.as_str()) {
                        Ok(event) => {
                            let _ = event_tx.send(SyncEvent::Server(event)).await;
                        }
                        Err(e) => log::warn!("Ignoring server frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        });

        Ok(())
    }

    /// Send one event to the room.
    ///
    /// Events are validated first; nothing is queued while disconnected.
    pub async fn send(&self, event: &ClientEvent) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Err(ProtocolError::ConnectionClosed);
        }
        event.validate()?;
        let encoded = event.encode()?;

        match &self.outgoing_tx {
            Some(tx) => tx.send(encoded).await.map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Stream an in-progress segment to the other members.
    pub async fn send_delta(&self, segment: Segment) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::Delta(segment)).await
    }

    pub async fn undo(&self, scope: UndoScope) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::Undo { scope }).await
    }

    pub async fn redo(&self) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::Redo).await
    }

    pub async fn clear(&self) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::Clear).await
    }

    pub async fn move_cursor(&self, position: Point) -> Result<(), ProtocolError> {
        self.send(&ClientEvent::Cursor(position)).await
    }

    /// Close the connection. A [`SyncEvent::Disconnected`] follows once the
    /// server acknowledges the close.
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CompositeMode;

    #[test]
    fn test_client_creation() {
        let client = SyncClient::new(RoomId::from("sketch"), "ws://localhost:9090").with_name("Alice");

        assert_eq!(client.room_id().as_str(), "sketch");
        assert_eq!(client.name(), Some("Alice"));
        assert_eq!(client.server_url(), "ws://localhost:9090");
    }

    #[test]
    fn test_endpoint() {
        let client = SyncClient::new(RoomId::default(), "ws://localhost:9090/");
        assert_eq!(client.endpoint(), "ws://localhost:9090/main");

        let client = client.with_name("Ada L");
        assert_eq!(client.endpoint(), "ws://localhost:9090/main?name=Ada+L");
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = SyncClient::new(RoomId::default(), "ws://localhost:9090");
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails() {
        let client = SyncClient::new(RoomId::default(), "ws://localhost:9090");

        assert_eq!(client.redo().await, Err(ProtocolError::ConnectionClosed));
        let segment = Segment {
            points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
            color: "#000".into(),
            size: 1.0,
            composite: CompositeMode::SourceOver,
        };
        assert_eq!(client.send_delta(segment).await, Err(ProtocolError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_connect_to_nothing_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = SyncClient::new(RoomId::default(), format!("ws://127.0.0.1:{port}"));
        assert_eq!(client.connect().await, Err(ProtocolError::ConnectionClosed));
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_take_event_rx() {
        let mut client = SyncClient::new(RoomId::default(), "ws://localhost:9090");

        // First take should succeed
        assert!(client.take_event_rx().is_some());
        // Second take should return None
        assert!(client.take_event_rx().is_none());
    }
}
