//! WebSocket sync server with room-based routing.
//!
//! Architecture:
//! ```text
//! ws://host/<room>?name=Alice
//!
//! Client A ──┐                              ┌──────────────┐
//!             ├── handle_connection ── SyncHub ── RoomState ── OperationLog
//! Client B ──┘        (select loop)        │        │
//!                                          │        └── RoomRegistry
//!                                          └── BroadcastGroup
//!                                                   │
//!                                        ┌──────────┼──────────┐
//!                                        ▼          ▼          ▼
//!                                     Client A   Client B   Client C
//! ```
//!
//! Each connection runs one task that pumps decoded client events into the
//! hub and the room's outbound frames back to the socket. All room state is
//! in memory and lost on restart.

use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;

use crate::hub::{HubLimits, SyncHub};
use crate::protocol::{ClientEvent, RoomId};

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Maximum peers per room
    pub max_peers_per_room: usize,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// Maximum number of rooms (None = unbounded)
    pub max_rooms: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_peers_per_room: 100,
            broadcast_capacity: 256,
            max_rooms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

impl ServerConfig {
    /// Build a configuration from process environment variables.
    ///
    /// `INKWELL_BIND_ADDR` wins over `PORT`; unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = lookup("PORT") {
            let port: u16 = parse_value("PORT", &port)?;
            config.bind_addr = format!("0.0.0.0:{port}");
        }
        if let Some(addr) = lookup("INKWELL_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(v) = lookup("INKWELL_MAX_PEERS") {
            config.max_peers_per_room = parse_value("INKWELL_MAX_PEERS", &v)?;
        }
        if let Some(v) = lookup("INKWELL_MAX_ROOMS") {
            config.max_rooms = Some(parse_value("INKWELL_MAX_ROOMS", &v)?);
        }
        if let Some(v) = lookup("INKWELL_BROADCAST_CAPACITY") {
            config.broadcast_capacity = parse_value("INKWELL_BROADCAST_CAPACITY", &v)?;
        }
        Ok(config)
    }

    pub fn hub_limits(&self) -> HubLimits {
        HubLimits {
            max_rooms: self.max_rooms,
            max_peers_per_room: self.max_peers_per_room,
            broadcast_capacity: self.broadcast_capacity,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub dropped_frames: u64,
    pub active_rooms: usize,
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    hub: Arc<SyncHub>,
    /// Server-wide statistics
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(SyncHub::new(config.hub_limits()));
        Self {
            config,
            hub,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Accept WebSocket connections on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Sync server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let hub = self.hub.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, hub, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        hub: Arc<SyncHub>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut path = String::new();
        let mut query = None;
        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            path = req.uri().path().to_string();
            query = req.uri().query().map(str::to_string);
            Ok(resp)
        })
        .await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (room_id, name) = parse_target(&path, query.as_deref());

        let mut session = match hub.connect(room_id.clone(), name).await {
            Ok(session) => session,
            Err(e) => {
                log::warn!("Rejecting {addr}: {e}");
                stats.write().await.rejected_connections += 1;
                ws_sender.send(Message::Close(None)).await?;
                return Ok(());
            }
        };
        log::info!(
            "WebSocket connection from {addr} is {} in room {room_id}",
            session.connection_id()
        );

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
            s.active_rooms = hub.room_count().await;
        }

        let result: Result<(), Box<dyn std::error::Error + Send + Sync>> = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                {
                                    let mut s = stats.write().await;
                                    s.total_messages += 1;
                                    s.total_bytes += text.len() as u64;
                                }
                                match ClientEvent::parse(text.as_str()) {
                                    Ok(event) => {
                                        log::trace!("{} sent {}", session.connection_id(), event.kind());
                                        hub.dispatch(&session, event).await;
                                    }
                                    Err(e) => {
                                        log::warn!("Dropping frame from {addr}: {e}");
                                        stats.write().await.dropped_frames += 1;
                                    }
                                }
                            }

                            Some(Ok(Message::Ping(data))) => {
                                ws_sender.send(Message::Pong(data)).await?;
                            }

                            Some(Ok(Message::Close(_))) | None => {
                                log::info!("Connection closed from {addr}");
                                break;
                            }

                            Some(Err(e)) => {
                                log::error!("WebSocket error from {addr}: {e}");
                                break;
                            }

                            // Binary and pong frames carry nothing for us.
                            _ => {}
                        }
                    }

                    out = session.next_outbound() => {
                        match out {
                            Some(out) => ws_sender.send(Message::text(out.frame.clone())).await?,
                            None => break,
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        hub.disconnect(session).await;
        {
            let mut s = stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
            s.active_rooms = hub.room_count().await;
        }

        result
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn hub(&self) -> &Arc<SyncHub> {
        &self.hub
    }
}

/// Split a request target into its room and display name.
///
/// `/` or an empty path selects the default room.
pub fn parse_target(path: &str, query: Option<&str>) -> (RoomId, Option<String>) {
    let room = path.trim_matches('/');
    let room_id = if room.is_empty() {
        RoomId::default()
    } else {
        RoomId::new(room)
    };

    let name = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "name")
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
    });

    (room_id, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.max_peers_per_room, 100);
        assert_eq!(config.broadcast_capacity, 256);
        assert!(config.max_rooms.is_none());
    }

    #[test]
    fn test_config_from_empty_env_is_default() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_config_port_binds_all_interfaces() {
        let config = ServerConfig::from_lookup(lookup(&[("PORT", "3000")])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_config_bind_addr_wins_over_port() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PORT", "3000"),
            ("INKWELL_BIND_ADDR", "127.0.0.1:4000"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:4000");
    }

    #[test]
    fn test_config_limits() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("INKWELL_MAX_PEERS", "8"),
            ("INKWELL_MAX_ROOMS", "3"),
            ("INKWELL_BROADCAST_CAPACITY", "64"),
        ]))
        .unwrap();
        let limits = config.hub_limits();
        assert_eq!(limits.max_peers_per_room, 8);
        assert_eq!(limits.max_rooms, Some(3));
        assert_eq!(limits.broadcast_capacity, 64);
    }

    #[test]
    fn test_config_invalid_value() {
        let err = ServerConfig::from_lookup(lookup(&[("INKWELL_MAX_PEERS", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "INKWELL_MAX_PEERS",
                value: "lots".to_string()
            }
        );
        assert!(ServerConfig::from_lookup(lookup(&[("PORT", "99999")])).is_err());
    }

    #[test]
    fn test_parse_target_default_room() {
        assert_eq!(parse_target("/", None), (RoomId::from("main"), None));
        assert_eq!(parse_target("", None), (RoomId::from("main"), None));
    }

    #[test]
    fn test_parse_target_room_and_name() {
        let (room, name) = parse_target("/sketch/", Some("name=Ada%20L&x=1"));
        assert_eq!(room, RoomId::from("sketch"));
        assert_eq!(name.as_deref(), Some("Ada L"));
    }

    #[test]
    fn test_parse_target_blank_name() {
        let (_, name) = parse_target("/main", Some("name=++"));
        assert!(name.is_none());
    }

    #[test]
    fn test_server_creation() {
        let server = SyncServer::with_defaults();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
        assert_eq!(server.hub().limits().max_peers_per_room, 100);
    }

    #[tokio::test]
    async fn test_server_stats_initial() {
        let server = SyncServer::with_defaults();
        let stats = server.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.dropped_frames, 0);
        assert_eq!(stats.active_rooms, 0);
    }
}
