//! Per-room operation log with tombstones and linear undo/redo.
//!
//! ```text
//!  ops:  [op1 A] [op2 B] [op3 C†] [op4 D]        († = tombstoned)
//!  redo: [op3]                                    (LIFO, room-wide)
//! ```
//!
//! Ops are only ever appended; undo flips `tombstoned` on, redo flips it
//! back off. Active strokes are read in append order, which is also the
//! order clients composite them in. Any append clears the redo stack, so a
//! stroke undone before an append stays tombstoned for good.
//!
//! The redo stack is shared by the whole room: a redo from any member pops
//! the most recent undo, whoever made it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::{ConnectionId, Stroke};

/// Identifier of an op, `op1`, `op2`, … within a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(String);

impl OpId {
    pub(crate) fn from_seq(seq: u64) -> Self {
        Self(format!("op{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    #[default]
    Stroke,
}

/// One entry in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub op_id: OpId,
    pub kind: OpKind,
    pub stroke: Stroke,
    pub tombstoned: bool,
    /// Unix time in milliseconds.
    pub created_at: u64,
}

/// Which op an undo targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UndoScope {
    /// Newest active op owned by the requester.
    #[default]
    #[serde(rename = "self")]
    Own,
    /// Newest active op of anyone.
    #[serde(rename = "global")]
    Global,
}

/// Result of a successful undo or redo.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryChange {
    pub op_id: OpId,
    pub stroke: Stroke,
    pub requested_by: ConnectionId,
}

/// Ordered, tombstonable log of one room's drawing operations.
#[derive(Debug, Clone)]
pub struct OperationLog {
    ops: Vec<Op>,
    /// op_id → position in `ops`
    index: HashMap<OpId, usize>,
    /// owner → positions of that owner's ops, ascending
    by_owner: HashMap<ConnectionId, Vec<usize>>,
    next_seq: u64,
    redo_stack: Vec<OpId>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            index: HashMap::new(),
            by_owner: HashMap::new(),
            next_seq: 1,
            redo_stack: Vec::new(),
        }
    }

    /// Append a stroke as a new active op. Clears the redo stack.
    pub fn append(&mut self, stroke: Stroke) -> Op {
        let op = Op {
            op_id: OpId::from_seq(self.next_seq),
            kind: OpKind::Stroke,
            stroke,
            tombstoned: false,
            created_at: unix_millis(),
        };
        self.next_seq += 1;

        let position = self.ops.len();
        self.index.insert(op.op_id.clone(), position);
        self.by_owner
            .entry(op.stroke.owner_id)
            .or_default()
            .push(position);
        self.ops.push(op.clone());

        if !self.redo_stack.is_empty() {
            log::debug!("Append of {} discards {} redo entries", op.op_id, self.redo_stack.len());
            self.redo_stack.clear();
        }
        op
    }

    /// Strokes of all non-tombstoned ops, in append order.
    pub fn active_strokes(&self) -> Vec<Stroke> {
        self.ops
            .iter()
            .filter(|op| !op.tombstoned)
            .map(|op| op.stroke.clone())
            .collect()
    }

    /// Tombstone the newest active op matching `scope`.
    ///
    /// Returns `None` when nothing matches.
    pub fn undo(&mut self, requested_by: ConnectionId, scope: UndoScope) -> Option<HistoryChange> {
        let position = self.undo_target(requested_by, scope)?;
        let op = &mut self.ops[position];
        op.tombstoned = true;
        self.redo_stack.push(op.op_id.clone());

        log::debug!("Undo ({scope:?}) by {requested_by} tombstoned {}", op.op_id);
        Some(HistoryChange {
            op_id: op.op_id.clone(),
            stroke: op.stroke.clone(),
            requested_by,
        })
    }

    /// Restore the most recently undone op, regardless of who undid it.
    pub fn redo(&mut self, requested_by: ConnectionId) -> Option<HistoryChange> {
        let op_id = self.redo_stack.pop()?;
        let position = *self.index.get(&op_id)?;
        let op = &mut self.ops[position];
        op.tombstoned = false;

        log::debug!("Redo by {requested_by} restored {op_id}");
        Some(HistoryChange {
            op_id,
            stroke: op.stroke.clone(),
            requested_by,
        })
    }

    /// Drop every op and reset the sequence. Not undoable.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.index.clear();
        self.by_owner.clear();
        self.redo_stack.clear();
        self.next_seq = 1;
    }

    pub fn can_undo(&self, requested_by: ConnectionId, scope: UndoScope) -> bool {
        self.undo_target(requested_by, scope).is_some()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// All ops, tombstoned ones included.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn get(&self, op_id: &OpId) -> Option<&Op> {
        self.index.get(op_id).map(|&position| &self.ops[position])
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    fn undo_target(&self, requested_by: ConnectionId, scope: UndoScope) -> Option<usize> {
        match scope {
            UndoScope::Own => self
                .by_owner
                .get(&requested_by)?
                .iter()
                .rev()
                .copied()
                .find(|&position| !self.ops[position].tombstoned),
            UndoScope::Global => self.ops.iter().rposition(|op| !op.tombstoned),
        }
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
