//! Room manager and event routing.
//!
//! ```text
//! Session A ──┐                    ┌── RoomHandle "main"
//!             ├── SyncHub ─────────┤     Mutex<RoomState> ── BroadcastGroup ──► A, B
//! Session B ──┘    RwLock<HashMap> └── RoomHandle "lobby"
//! ```
//!
//! Each room is a mutex-guarded unit: an event is applied and its
//! dispatches are queued on the room's broadcast channel before the lock is
//! released, so every member sees changes in the order they happened.
//! Rooms share nothing and never lock each other.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::broadcast::{BroadcastGroup, BroadcastStats, Outbound};
use crate::protocol::{ClientEvent, ConnectionId, RoomId, Stroke, UserInfo};
use crate::room::RoomState;

/// Resource bounds of a hub.
#[derive(Debug, Clone)]
pub struct HubLimits {
    /// Maximum number of rooms (None = unbounded)
    pub max_rooms: Option<usize>,
    /// Maximum members per room
    pub max_peers_per_room: usize,
    /// Messages buffered per member before it lags
    pub broadcast_capacity: usize,
}

impl Default for HubLimits {
    fn default() -> Self {
        Self {
            max_rooms: None,
            max_peers_per_room: 100,
            broadcast_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("room limit of {limit} reached, cannot create room {room}")]
    RoomLimit { room: RoomId, limit: usize },
    #[error("room {room} is full ({limit} members)")]
    RoomFull { room: RoomId, limit: usize },
}

/// Point-in-time counters across all rooms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub rooms: usize,
    pub rooms_with_members: usize,
    pub connected_users: usize,
    pub messages_sent: u64,
}

/// One room: its state and its fan-out channel.
pub struct RoomHandle {
    state: Mutex<RoomState>,
    broadcast: BroadcastGroup,
}

impl RoomHandle {
    fn new(id: RoomId, broadcast_capacity: usize) -> Self {
        Self {
            state: Mutex::new(RoomState::new(id)),
            broadcast: BroadcastGroup::new(broadcast_capacity),
        }
    }

    /// Lock the room state for inspection.
    pub async fn state(&self) -> tokio::sync::MutexGuard<'_, RoomState> {
        self.state.lock().await
    }

    pub fn broadcast_stats(&self) -> BroadcastStats {
        self.broadcast.stats()
    }
}

/// A connection's membership in a room.
///
/// Obtained from [`SyncHub::connect`]; hand it back to
/// [`SyncHub::disconnect`] when the transport closes. Dropping a session
/// without disconnecting leaves its member registered in the room.
#[must_use = "a session must be passed to SyncHub::disconnect or its member stays registered"]
pub struct Session {
    connection_id: ConnectionId,
    user: UserInfo,
    room_id: RoomId,
    room: Arc<RoomHandle>,
    receiver: broadcast::Receiver<Arc<Outbound>>,
}

impl Session {
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Member info as registered on connect.
    pub fn user(&self) -> &UserInfo {
        &self.user
    }

    /// Next event addressed to this connection.
    ///
    /// Skips events for other audiences. Lagged messages are logged and
    /// skipped; returns `None` once the room channel is closed.
    pub async fn next_outbound(&mut self) -> Option<Arc<Outbound>> {
        loop {
            match self.receiver.recv().await {
                Ok(outbound) if outbound.is_for(self.connection_id) => return Some(outbound),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    log::warn!("{} lagged by {n} messages in room {}", self.connection_id, self.room_id);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Like [`next_outbound`](Self::next_outbound) but never waits.
    pub fn try_next_outbound(&mut self) -> Option<Arc<Outbound>> {
        use tokio::sync::broadcast::error::TryRecvError;
        loop {
            match self.receiver.try_recv() {
                Ok(outbound) if outbound.is_for(self.connection_id) => return Some(outbound),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(n)) => {
                    log::warn!("{} lagged by {n} messages in room {}", self.connection_id, self.room_id);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Maps room ids to rooms and routes client events into them.
pub struct SyncHub {
    rooms: RwLock<HashMap<RoomId, Arc<RoomHandle>>>,
    limits: HubLimits,
}

impl SyncHub {
    pub fn new(limits: HubLimits) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            limits,
        }
    }

    pub fn limits(&self) -> &HubLimits {
        &self.limits
    }

    /// Get a room, creating it if it does not exist yet.
    pub async fn create_or_get_room(&self, room_id: &RoomId) -> Result<Arc<RoomHandle>, HubError> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return Ok(room.clone());
            }
        }

        // Slow path: write lock to create
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return Ok(room.clone());
        }
        if let Some(limit) = self.limits.max_rooms {
            if rooms.len() >= limit {
                return Err(HubError::RoomLimit {
                    room: room_id.clone(),
                    limit,
                });
            }
        }

        let room = Arc::new(RoomHandle::new(room_id.clone(), self.limits.broadcast_capacity));
        rooms.insert(room_id.clone(), room.clone());
        log::info!("Created room {room_id} ({} rooms)", rooms.len());
        Ok(room)
    }

    /// Join a room as a new connection.
    ///
    /// The returned session first yields the room snapshot; existing members
    /// get the updated member list.
    pub async fn connect(&self, room_id: RoomId, name: Option<String>) -> Result<Session, HubError> {
        let room = self.create_or_get_room(&room_id).await?;
        let connection_id = ConnectionId::new();

        let mut state = room.state.lock().await;
        if state.user_count() >= self.limits.max_peers_per_room {
            return Err(HubError::RoomFull {
                room: room_id,
                limit: self.limits.max_peers_per_room,
            });
        }
        // Subscribe before joining so the snapshot is the first thing we see.
        let receiver = room.broadcast.subscribe();
        let (user, dispatches) = state.join(connection_id, name);
        room.broadcast.send_all(dispatches);
        drop(state);

        Ok(Session {
            connection_id,
            user,
            room_id,
            room,
            receiver,
        })
    }

    /// Apply a client event from `session` to its room.
    ///
    /// Returns the number of events dispatched (0 for a no-op).
    pub async fn dispatch(&self, session: &Session, event: ClientEvent) -> usize {
        let mut state = session.room.state.lock().await;
        let dispatches = state.apply(session.connection_id, event);
        let count = dispatches.len();
        session.room.broadcast.send_all(dispatches);
        count
    }

    /// Remove a connection from its room. The room's log is kept.
    pub async fn disconnect(&self, session: Session) {
        let Session {
            connection_id,
            room,
            receiver,
            ..
        } = session;
        drop(receiver);

        let mut state = room.state.lock().await;
        let dispatches = state.leave(connection_id);
        room.broadcast.send_all(dispatches);
    }

    /// Inspect a room's state without creating it.
    pub async fn with_room<R>(&self, room_id: &RoomId, f: impl FnOnce(&RoomState) -> R) -> Option<R> {
        let room = self.rooms.read().await.get(room_id).cloned()?;
        let state = room.state.lock().await;
        Some(f(&state))
    }

    /// Members of a room; empty for unknown rooms.
    pub async fn list_users(&self, room_id: &RoomId) -> Vec<UserInfo> {
        self.with_room(room_id, RoomState::list_users)
            .await
            .unwrap_or_default()
    }

    /// Active strokes of a room in compositing order; empty for unknown rooms.
    pub async fn active_strokes(&self, room_id: &RoomId) -> Vec<Stroke> {
        self.with_room(room_id, RoomState::active_strokes)
            .await
            .unwrap_or_default()
    }

    /// A member's info; `None` for unknown rooms or connections.
    pub async fn get_user(&self, room_id: &RoomId, connection_id: ConnectionId) -> Option<UserInfo> {
        self.with_room(room_id, |state| state.get_user(connection_id).cloned())
            .await
            .flatten()
    }

    /// Number of members in a room; 0 for unknown rooms.
    pub async fn user_count(&self, room_id: &RoomId) -> usize {
        self.with_room(room_id, RoomState::user_count)
            .await
            .unwrap_or(0)
    }

    /// Whether a room currently has a registry entry.
    pub async fn contains_room(&self, room_id: &RoomId) -> bool {
        self.with_room(room_id, RoomState::has_members)
            .await
            .unwrap_or(false)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of rooms that currently have a registry entry.
    pub async fn member_room_count(&self) -> usize {
        let rooms: Vec<Arc<RoomHandle>> = self.rooms.read().await.values().cloned().collect();
        let mut count = 0;
        for room in rooms {
            if room.state.lock().await.has_members() {
                count += 1;
            }
        }
        count
    }

    pub async fn stats(&self) -> HubStats {
        let rooms: Vec<Arc<RoomHandle>> = self.rooms.read().await.values().cloned().collect();
        let mut stats = HubStats {
            rooms: rooms.len(),
            ..HubStats::default()
        };
        for room in rooms {
            let users = room.state.lock().await.user_count();
            if users > 0 {
                stats.rooms_with_members += 1;
            }
            stats.connected_users += users;
            stats.messages_sent += room.broadcast.stats().messages_sent;
        }
        stats
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new(HubLimits::default())
    }
}
