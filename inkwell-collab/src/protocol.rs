//! JSON wire protocol for drawing-room synchronization.
//!
//! Every frame is a WebSocket text frame holding one event, internally
//! tagged by `"type"`:
//! ```text
//! client → server   { "type": "commit", "stroke_id": "s_1", "points": [...], ... }
//! server → client   { "type": "snapshot", "strokes": [...], "users": [...] }
//! ```
//!
//! Client events form a closed set and are validated here, at the boundary,
//! before they reach the operation log or the registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::oplog::{Op, UndoScope};

/// Identity of one connected client, assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Name of a collaboration room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Room used when a client does not name one.
    pub const DEFAULT: &'static str = "main";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 2D position in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How a stroke is composited onto what is already painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeMode {
    /// Paint over existing pixels.
    #[default]
    SourceOver,
    /// Erase existing pixels (eraser tool).
    DestinationOut,
}

/// An in-progress piece of a stroke, used only for live preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub points: Vec<Point>,
    pub color: String,
    pub size: f64,
    #[serde(default)]
    pub composite: CompositeMode,
}

/// A finished, committed polyline.
///
/// `owner_id` is always the server-side identity of the connection that
/// committed it; clients cannot supply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub stroke_id: String,
    pub owner_id: ConnectionId,
    pub points: Vec<Point>,
    pub color: String,
    pub size: f64,
    #[serde(default)]
    pub composite: CompositeMode,
}

/// A room member as listed in snapshots and membership broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub connection_id: ConnectionId,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Live preview segment, relayed but never stored.
    Delta(Segment),
    /// Finished stroke to append to the room history.
    Commit {
        stroke_id: String,
        points: Vec<Point>,
        color: String,
        size: f64,
        #[serde(default)]
        composite: CompositeMode,
    },
    Undo {
        #[serde(default)]
        scope: UndoScope,
    },
    Redo,
    Clear,
    /// Pointer position, relayed but never stored.
    Cursor(Point),
}

impl ClientEvent {
    /// Minimum number of points in a committed stroke.
    pub const MIN_STROKE_POINTS: usize = 2;

    /// Reject payloads that would break log invariants.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            ClientEvent::Commit { points, .. } if points.len() < Self::MIN_STROKE_POINTS => {
                Err(ProtocolError::InvalidPayload(format!(
                    "commit needs at least {} points, got {}",
                    Self::MIN_STROKE_POINTS,
                    points.len()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Decode and validate a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let event = Self::decode(text)?;
        event.validate()?;
        Ok(event)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode_json(self)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_json(text)
    }

    /// Short event name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Delta(_) => "delta",
            ClientEvent::Commit { .. } => "commit",
            ClientEvent::Undo { .. } => "undo",
            ClientEvent::Redo => "redo",
            ClientEvent::Clear => "clear",
            ClientEvent::Cursor(_) => "cursor",
        }
    }
}

/// Events sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full canonical state. Stroke order is compositing order.
    Snapshot {
        strokes: Vec<Stroke>,
        users: Vec<UserInfo>,
    },
    /// A peer's preview segment.
    Delta {
        connection_id: ConnectionId,
        segment: Segment,
    },
    /// A newly appended op.
    Commit(Op),
    Members {
        users: Vec<UserInfo>,
    },
    Cursor {
        connection_id: ConnectionId,
        position: Point,
        color: String,
    },
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        encode_json(self)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_json(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Snapshot { .. } => "snapshot",
            ServerEvent::Delta { .. } => "delta",
            ServerEvent::Commit(_) => "commit",
            ServerEvent::Members { .. } => "members",
            ServerEvent::Cursor { .. } => "cursor",
        }
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

fn decode_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Connection closed")]
    ConnectionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_commit_from_browser_payload() {
        let text = json!({
            "type": "commit",
            "stroke_id": "s_k3j",
            "points": [{"x": 1.0, "y": 2.0}, {"x": 3.5, "y": 4.0}],
            "color": "#000000",
            "size": 4.0,
            "composite": "destination-out"
        })
        .to_string();

        let event = ClientEvent::parse(&text).unwrap();
        match event {
            ClientEvent::Commit { stroke_id, points, composite, .. } => {
                assert_eq!(stroke_id, "s_k3j");
                assert_eq!(points.len(), 2);
                assert_eq!(composite, CompositeMode::DestinationOut);
            }
            other => panic!("Expected commit, got {other:?}"),
        }
    }

    #[test]
    fn test_client_supplied_owner_is_ignored() {
        let text = json!({
            "type": "commit",
            "stroke_id": "s1",
            "owner_id": "00000000-0000-0000-0000-000000000000",
            "points": [{"x": 0.0, "y": 0.0}, {"x": 1.0, "y": 1.0}],
            "color": "#fff",
            "size": 2.0
        })
        .to_string();

        // Unknown fields are tolerated, and there is nowhere to put an owner.
        let event = ClientEvent::parse(&text).unwrap();
        assert_eq!(event.kind(), "commit");
    }

    #[test]
    fn test_commit_with_single_point_rejected() {
        let text = json!({
            "type": "commit",
            "stroke_id": "s1",
            "points": [{"x": 0.0, "y": 0.0}],
            "color": "#fff",
            "size": 2.0
        })
        .to_string();

        let err = ClientEvent::parse(&text).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload(_)));
    }

    #[test]
    fn test_undo_scope_defaults_to_self() {
        let event = ClientEvent::parse(r#"{"type":"undo"}"#).unwrap();
        assert_eq!(event, ClientEvent::Undo { scope: UndoScope::Own });

        let event = ClientEvent::parse(r#"{"type":"undo","scope":"global"}"#).unwrap();
        assert_eq!(event, ClientEvent::Undo { scope: UndoScope::Global });

        let event = ClientEvent::parse(r#"{"type":"undo","scope":"self"}"#).unwrap();
        assert_eq!(event, ClientEvent::Undo { scope: UndoScope::Own });
    }

    #[test]
    fn test_unit_events() {
        assert_eq!(ClientEvent::parse(r#"{"type":"redo"}"#).unwrap(), ClientEvent::Redo);
        assert_eq!(ClientEvent::parse(r#"{"type":"clear"}"#).unwrap(), ClientEvent::Clear);
    }

    #[test]
    fn test_cursor_and_delta_shapes() {
        let cursor = ClientEvent::parse(r#"{"type":"cursor","x":10.0,"y":20.5}"#).unwrap();
        assert_eq!(cursor, ClientEvent::Cursor(Point::new(10.0, 20.5)));

        let delta = ClientEvent::parse(
            r##"{"type":"delta","points":[{"x":0,"y":0},{"x":1,"y":1}],"color":"#123456","size":3}"##,
        )
        .unwrap();
        match delta {
            ClientEvent::Delta(segment) => {
                assert_eq!(segment.points.len(), 2);
                assert_eq!(segment.composite, CompositeMode::SourceOver);
            }
            other => panic!("Expected delta, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let err = ClientEvent::decode(r#"{"type":"teleport"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
        assert!(ClientEvent::decode("not json").is_err());
    }

    #[test]
    fn test_server_snapshot_wire_shape() {
        let owner = ConnectionId::new();
        let snapshot = ServerEvent::Snapshot {
            strokes: vec![Stroke {
                stroke_id: "s1".into(),
                owner_id: owner,
                points: vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
                color: "#e74c3c".into(),
                size: 4.0,
                composite: CompositeMode::SourceOver,
            }],
            users: vec![UserInfo {
                connection_id: owner,
                color: "#e74c3c".into(),
                name: None,
            }],
        };

        let value: serde_json::Value = serde_json::from_str(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert_eq!(value["strokes"][0]["composite"], "source-over");
        assert_eq!(value["strokes"][0]["owner_id"], owner.to_string());
        assert!(value["users"][0].get("name").is_none());
    }

    #[test]
    fn test_server_cursor_decodes() {
        let id = ConnectionId::new();
        let event = ServerEvent::Cursor {
            connection_id: id,
            position: Point::new(5.0, 6.0),
            color: "#3498db".into(),
        };
        let decoded = ServerEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.kind(), "cursor");
    }

    #[test]
    fn test_room_id_default() {
        assert_eq!(RoomId::default().as_str(), "main");
        assert_eq!(RoomId::from("lobby").to_string(), "lobby");
    }
}
