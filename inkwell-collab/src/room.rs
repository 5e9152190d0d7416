//! Event protocol of a single room.
//!
//! `RoomState` turns one client event into state changes plus the list of
//! server events to deliver, each tagged with its audience:
//!
//! | Client event | State change            | Dispatches                        |
//! |--------------|-------------------------|-----------------------------------|
//! | join         | register member         | snapshot → joiner, members → rest |
//! | delta        | none                    | delta → rest                      |
//! | commit       | append op               | commit, snapshot → room           |
//! | undo / redo  | tombstone / restore     | snapshot → room (if changed)      |
//! | clear        | wipe log                | empty snapshot → room             |
//! | cursor       | none                    | cursor → rest                     |
//! | leave        | unregister member       | members, snapshot → room          |
//!
//! Callers must hand a room one event at a time; the room owns its log and
//! registry exclusively and nothing here suspends.

use crate::color::ColorAssigner;
use crate::oplog::OperationLog;
use crate::protocol::{ClientEvent, ConnectionId, RoomId, ServerEvent, Stroke, UserInfo};
use crate::registry::{Profile, RoomRegistry};

/// Who receives a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every member, sender included.
    Room,
    /// Every member except the given connection.
    RoomExcept(ConnectionId),
    /// Only the given connection.
    Direct(ConnectionId),
}

impl Audience {
    pub fn includes(&self, connection_id: ConnectionId) -> bool {
        match self {
            Audience::Room => true,
            Audience::RoomExcept(excluded) => *excluded != connection_id,
            Audience::Direct(target) => *target == connection_id,
        }
    }
}

/// A server event addressed to an audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Dispatch {
    pub fn new(audience: Audience, event: ServerEvent) -> Self {
        Self { audience, event }
    }
}

/// Operation log and membership of one room.
pub struct RoomState {
    id: RoomId,
    log: OperationLog,
    /// Created on first join, dropped when the last member leaves.
    registry: Option<RoomRegistry>,
    colors: ColorAssigner,
}

impl RoomState {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            log: OperationLog::new(),
            registry: None,
            colors: ColorAssigner::new(),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn active_strokes(&self) -> Vec<Stroke> {
        self.log.active_strokes()
    }

    pub fn list_users(&self) -> Vec<UserInfo> {
        self.registry
            .as_ref()
            .map(RoomRegistry::list_users)
            .unwrap_or_default()
    }

    pub fn get_user(&self, connection_id: ConnectionId) -> Option<&UserInfo> {
        self.registry.as_ref()?.get_user(connection_id)
    }

    pub fn user_count(&self) -> usize {
        self.registry.as_ref().map_or(0, RoomRegistry::count)
    }

    /// Whether the room currently has a registry entry.
    pub fn has_members(&self) -> bool {
        self.registry.is_some()
    }

    /// Full canonical state.
    pub fn snapshot(&self) -> ServerEvent {
        ServerEvent::Snapshot {
            strokes: self.log.active_strokes(),
            users: self.list_users(),
        }
    }

    /// Register a new connection with a freshly picked color.
    pub fn join(&mut self, connection_id: ConnectionId, name: Option<String>) -> (UserInfo, Vec<Dispatch>) {
        let profile = Profile {
            color: self.colors.pick(),
            name,
        };
        self.join_with(connection_id, profile)
    }

    /// Register a connection with an explicit profile.
    pub fn join_with(&mut self, connection_id: ConnectionId, profile: Profile) -> (UserInfo, Vec<Dispatch>) {
        let user = self
            .registry
            .get_or_insert_with(RoomRegistry::new)
            .add_user(connection_id, profile);
        log::info!(
            "{connection_id} joined room {} ({} members)",
            self.id,
            self.user_count()
        );

        let dispatches = vec![
            Dispatch::new(Audience::Direct(connection_id), self.snapshot()),
            Dispatch::new(
                Audience::RoomExcept(connection_id),
                ServerEvent::Members {
                    users: self.list_users(),
                },
            ),
        ];
        (user, dispatches)
    }

    /// Handle one event from a member.
    pub fn apply(&mut self, sender: ConnectionId, event: ClientEvent) -> Vec<Dispatch> {
        match event {
            ClientEvent::Delta(segment) => {
                log::trace!("Delta from {sender} in room {}", self.id);
                vec![Dispatch::new(
                    Audience::RoomExcept(sender),
                    ServerEvent::Delta {
                        connection_id: sender,
                        segment,
                    },
                )]
            }

            ClientEvent::Commit {
                stroke_id,
                points,
                color,
                size,
                composite,
            } => {
                let op = self.log.append(Stroke {
                    stroke_id,
                    owner_id: sender,
                    points,
                    color,
                    size,
                    composite,
                });
                log::debug!("Room {}: {sender} committed {}", self.id, op.op_id);
                vec![
                    Dispatch::new(Audience::Room, ServerEvent::Commit(op)),
                    Dispatch::new(Audience::Room, self.snapshot()),
                ]
            }

            ClientEvent::Undo { scope } => match self.log.undo(sender, scope) {
                Some(_) => vec![Dispatch::new(Audience::Room, self.snapshot())],
                None => Vec::new(),
            },

            ClientEvent::Redo => match self.log.redo(sender) {
                Some(_) => vec![Dispatch::new(Audience::Room, self.snapshot())],
                None => Vec::new(),
            },

            ClientEvent::Clear => {
                self.log.clear();
                log::info!("Room {} cleared by {sender}", self.id);
                vec![Dispatch::new(
                    Audience::Room,
                    ServerEvent::Snapshot {
                        strokes: Vec::new(),
                        users: self.list_users(),
                    },
                )]
            }

            ClientEvent::Cursor(position) => {
                let Some(user) = self.get_user(sender) else {
                    log::debug!("Cursor from unregistered {sender} in room {}", self.id);
                    return Vec::new();
                };
                log::trace!("Cursor from {sender} in room {}", self.id);
                vec![Dispatch::new(
                    Audience::RoomExcept(sender),
                    ServerEvent::Cursor {
                        connection_id: sender,
                        position,
                        color: user.color.clone(),
                    },
                )]
            }
        }
    }

    /// Unregister a connection. Its strokes stay in the log.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Vec<Dispatch> {
        let Some(registry) = self.registry.as_mut() else {
            return Vec::new();
        };
        if registry.remove_user(connection_id).is_none() {
            return Vec::new();
        }
        if registry.is_empty() {
            self.registry = None;
        }
        log::info!(
            "{connection_id} left room {} ({} members)",
            self.id,
            self.user_count()
        );

        vec![
            Dispatch::new(
                Audience::Room,
                ServerEvent::Members {
                    users: self.list_users(),
                },
            ),
            Dispatch::new(Audience::Room, self.snapshot()),
        ]
    }
}
