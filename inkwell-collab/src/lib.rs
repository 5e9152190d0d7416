//! # inkwell-collab: Real-time shared drawing rooms
//!
//! A WebSocket server that keeps one authoritative stroke history per room
//! and fans changes out to every member, plus the client pieces needed to
//! mirror a room locally.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ SyncClient  │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │     JSON events     │ (central)   │
//! └──────┬──────┘                     └──────┬──────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                     ┌─────────────┐
//! │CanvasReplica│                     │  SyncHub    │
//! │ (Surface)   │                     │ room map    │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                                    ┌───────┴───────┐
//!                                    │ RoomState     │
//!                                    │ OperationLog  │
//!                                    │ RoomRegistry  │
//!                                    │ BroadcastGroup│
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire events and shared value types
//! - [`oplog`]: Append-only stroke history with tombstone undo/redo
//! - [`registry`]: Per-room member listing
//! - [`color`]: Member color palette
//! - [`room`]: Event handling for a single room
//! - [`broadcast`]: Room fan-out with backpressure
//! - [`hub`]: Room manager and event routing
//! - [`server`]: WebSocket sync server
//! - [`client`]: WebSocket sync client
//! - [`replica`]: Client-side canvas mirror
//!
//! Nothing is persisted: room history lives as long as the process.

pub mod protocol;
pub mod oplog;
pub mod registry;
pub mod color;
pub mod room;
pub mod broadcast;
pub mod hub;
pub mod server;
pub mod client;
pub mod replica;

// Re-exports for convenience
pub use protocol::{
    ClientEvent, CompositeMode, ConnectionId, Point, ProtocolError, RoomId, Segment,
    ServerEvent, Stroke, UserInfo,
};
pub use oplog::{HistoryChange, Op, OpId, OpKind, OperationLog, UndoScope};
pub use registry::{Profile, RoomRegistry};
pub use color::{ColorAssigner, PALETTE};
pub use room::{Audience, Dispatch, RoomState};
pub use broadcast::{BroadcastGroup, BroadcastStats, Outbound};
pub use hub::{HubError, HubLimits, HubStats, Session, SyncHub};
pub use server::{ConfigError, ServerConfig, ServerStats, SyncServer};
pub use client::{ConnectionState, SyncClient, SyncEvent};
pub use replica::{CanvasReplica, Surface, PREVIEW_HEAL_DELAY};
