//! Room fan-out with backpressure.
//!
//! Uses a tokio broadcast channel per room for O(1) send to all members.
//! Each dispatch is encoded once; every receiver gets the same `Arc` and
//! filters on the audience itself. A receiver that falls more than
//! `capacity` messages behind loses the oldest ones (at-most-once delivery).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::protocol::{ConnectionId, ServerEvent};
use crate::room::{Audience, Dispatch};

/// An encoded server event on its way to a room's members.
#[derive(Debug)]
pub struct Outbound {
    pub audience: Audience,
    pub event: ServerEvent,
    /// JSON text frame
    pub frame: String,
}

impl Outbound {
    pub fn is_for(&self, connection_id: ConnectionId) -> bool {
        self.audience.includes(connection_id)
    }
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub encode_failures: u64,
    pub active_receivers: usize,
}

/// Lock-free counters on the send path.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    encode_failures: AtomicU64,
}

/// The broadcast channel of one room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<Outbound>>,
    capacity: usize,
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    /// `capacity` is how many messages each receiver can buffer before it
    /// starts lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            capacity,
            atomic_stats: AtomicBroadcastStats {
                messages_sent: AtomicU64::new(0),
                encode_failures: AtomicU64::new(0),
            },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Outbound>> {
        self.sender.subscribe()
    }

    /// Encode and send one dispatch.
    ///
    /// Returns the number of receivers it was queued for (before audience
    /// filtering). Events that fail to encode are logged and dropped.
    pub fn send(&self, dispatch: Dispatch) -> usize {
        let frame = match dispatch.event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Dropping {} event: {e}", dispatch.event.kind());
                self.atomic_stats.encode_failures.fetch_add(1, Ordering::Relaxed);
                return 0;
            }
        };
        let outbound = Arc::new(Outbound {
            audience: dispatch.audience,
            event: dispatch.event,
            frame,
        });

        let count = self.sender.send(outbound).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Send dispatches in order.
    pub fn send_all(&self, dispatches: impl IntoIterator<Item = Dispatch>) {
        for dispatch in dispatches {
            self.send(dispatch);
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            encode_failures: self.atomic_stats.encode_failures.load(Ordering::Relaxed),
            active_receivers: self.sender.receiver_count(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
