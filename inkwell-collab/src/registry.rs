//! Membership registry of a room.
//!
//! Members are kept in join order; re-adding an existing connection
//! replaces its info but keeps its place in the listing.

use crate::protocol::{ConnectionId, UserInfo};

/// Metadata supplied when a member joins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Profile {
    pub color: String,
    pub name: Option<String>,
}

/// Ordered user map of one room.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    users: Vec<UserInfo>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a member.
    pub fn add_user(&mut self, connection_id: ConnectionId, profile: Profile) -> UserInfo {
        let info = UserInfo {
            connection_id,
            color: profile.color,
            name: profile.name,
        };
        match self.position(connection_id) {
            Some(i) => self.users[i] = info.clone(),
            None => self.users.push(info.clone()),
        }
        info
    }

    pub fn remove_user(&mut self, connection_id: ConnectionId) -> Option<UserInfo> {
        let i = self.position(connection_id)?;
        Some(self.users.remove(i))
    }

    /// Members in join order.
    pub fn list_users(&self) -> Vec<UserInfo> {
        self.users.clone()
    }

    pub fn get_user(&self, connection_id: ConnectionId) -> Option<&UserInfo> {
        self.users.iter().find(|u| u.connection_id == connection_id)
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn position(&self, connection_id: ConnectionId) -> Option<usize> {
        self.users.iter().position(|u| u.connection_id == connection_id)
    }
}
