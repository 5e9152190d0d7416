//! Client-side mirror of a room's canvas.
//!
//! A [`CanvasReplica`] folds [`ServerEvent`]s into a local stroke list and
//! paints them onto a [`Surface`]. Snapshots are authoritative: the surface
//! is cleared and every stroke replayed in order. Commits are painted
//! incrementally. Preview deltas are painted on top and leave the surface
//! "drifted" until the next snapshot or [`CanvasReplica::heal`].

use std::time::{Duration, Instant};

use crate::protocol::{ConnectionId, Point, Segment, ServerEvent, Stroke, UserInfo};

/// Quiet period after the last preview delta before the canvas should be
/// repainted from the committed strokes.
pub const PREVIEW_HEAL_DELAY: Duration = Duration::from_millis(120);

/// Something strokes can be painted on.
pub trait Surface {
    fn clear_surface(&mut self);

    /// Paint a committed stroke, honoring its composite mode.
    fn paint_stroke(&mut self, stroke: &Stroke);

    /// Paint a peer's preview segment.
    fn paint_segment(&mut self, segment: &Segment);

    fn move_cursor(&mut self, _connection_id: ConnectionId, _position: Point, _color: &str) {}
}

pub struct CanvasReplica<S: Surface> {
    surface: S,
    strokes: Vec<Stroke>,
    users: Vec<UserInfo>,
    last_delta: Option<Instant>,
}

impl<S: Surface> CanvasReplica<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            strokes: Vec::new(),
            users: Vec::new(),
            last_delta: None,
        }
    }

    /// Fold one server event into the replica.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Snapshot { strokes, users } => {
                self.strokes = strokes.clone();
                self.users = users.clone();
                self.repaint();
            }
            ServerEvent::Commit(op) => {
                if !op.tombstoned {
                    self.push_stroke(op.stroke.clone());
                }
            }
            ServerEvent::Delta { segment, .. } => {
                self.surface.paint_segment(segment);
                self.last_delta = Some(Instant::now());
            }
            ServerEvent::Members { users } => {
                self.users = users.clone();
            }
            ServerEvent::Cursor {
                connection_id,
                position,
                color,
            } => {
                self.surface.move_cursor(*connection_id, *position, color);
            }
        }
    }

    /// Show a stroke the local user just finished, before the server echoes
    /// it back.
    pub fn commit_local(&mut self, stroke: Stroke) {
        self.push_stroke(stroke);
    }

    fn push_stroke(&mut self, stroke: Stroke) {
        if self.strokes.iter().any(|s| s.stroke_id == stroke.stroke_id) {
            return;
        }
        self.surface.paint_stroke(&stroke);
        self.strokes.push(stroke);
    }

    /// Clear the surface and replay every known stroke.
    pub fn repaint(&mut self) {
        self.surface.clear_surface();
        for stroke in &self.strokes {
            self.surface.paint_stroke(stroke);
        }
        self.last_delta = None;
    }

    /// Whether preview segments are painted that no committed stroke backs.
    pub fn is_drifted(&self) -> bool {
        self.last_delta.is_some()
    }

    /// Repaint if the last preview delta is at least
    /// [`PREVIEW_HEAL_DELAY`] older than `now`. Returns whether it did.
    pub fn heal(&mut self, now: Instant) -> bool {
        match self.last_delta {
            Some(at) if now.saturating_duration_since(at) >= PREVIEW_HEAL_DELAY => {
                self.repaint();
                true
            }
            _ => false,
        }
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn users(&self) -> &[UserInfo] {
        &self.users
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }
}
