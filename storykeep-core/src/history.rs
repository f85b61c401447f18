//! Bounded linear undo/redo over invertible patches.
//!
//! Patches are kept newest first. `head` counts how many of the newest
//! patches have been undone; recording while `head > 0` discards them.

use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::error::CoreResult;
use crate::node::NodeId;
use crate::store::NodeStore;

/// Default number of patches kept.
pub const DEFAULT_HISTORY_SIZE: usize = 50;

/// Closure applying one direction of a patch. Returns the ids to notify.
pub type PatchFn = Box<dyn Fn(&mut NodeStore) -> CoreResult<Vec<NodeId>>>;

/// What kind of edit a patch inverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// Nodes inserted.
    Add,
    /// Nodes replaced in place.
    Modify,
    /// Sibling reorder.
    Move,
    /// Cross-parent move.
    Relocate,
    /// Subtree removed.
    Delete,
    /// Descendants removed.
    DeleteChildren,
    /// Caller-defined edit.
    Custom(&'static str),
}

/// An invertible description of one logical edit.
///
/// Both closures must own snapshots of whatever they restore; they are
/// replayed long after the store has moved on.
pub struct Patch {
    /// Kind of edit.
    pub kind: PatchKind,
    undo: PatchFn,
    redo: PatchFn,
}

impl Patch {
    /// Create a patch from its two directions.
    pub fn new(
        kind: PatchKind,
        undo: impl Fn(&mut NodeStore) -> CoreResult<Vec<NodeId>> + 'static,
        redo: impl Fn(&mut NodeStore) -> CoreResult<Vec<NodeId>> + 'static,
    ) -> Self {
        Self {
            kind,
            undo: Box::new(undo),
            redo: Box::new(redo),
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch").field("kind", &self.kind).finish()
    }
}

/// Undo/redo buffer.
#[derive(Debug)]
pub struct History {
    /// Patches, newest first.
    patches: VecDeque<Patch>,
    /// Number of newest patches currently undone.
    head: usize,
    /// Maximum patches kept (oldest dropped when exceeded).
    max_size: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// Create an empty history with the default size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_HISTORY_SIZE)
    }

    /// Create a history with a custom max size.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            patches: VecDeque::new(),
            head: 0,
            max_size,
        }
    }

    /// Record a patch for an edit that has already been applied.
    pub fn record(&mut self, patch: Patch) {
        if self.head > 0 {
            let discarded = self.patches.drain(..self.head).count();
            debug!(discarded, "Discarded redo branch");
            self.head = 0;
        }
        self.patches.push_front(patch);
        while self.patches.len() > self.max_size {
            self.patches.pop_back();
        }
    }

    /// Undo the patch at the head. Empty result at the oldest boundary.
    ///
    /// # Errors
    ///
    /// Propagates a failing patch; the head does not advance in that case.
    pub fn undo(&mut self, store: &mut NodeStore) -> CoreResult<Vec<NodeId>> {
        let Some(patch) = self.patches.get(self.head) else {
            return Ok(Vec::new());
        };
        let touched = (patch.undo)(store)?;
        debug!(kind = ?patch.kind, "Undo");
        self.head += 1;
        Ok(touched)
    }

    /// Redo the most recently undone patch. Empty result at the newest boundary.
    ///
    /// # Errors
    ///
    /// Propagates a failing patch; the head does not move in that case.
    pub fn redo(&mut self, store: &mut NodeStore) -> CoreResult<Vec<NodeId>> {
        if self.head == 0 {
            return Ok(Vec::new());
        }
        let Some(patch) = self.patches.get(self.head - 1) else {
            return Ok(Vec::new());
        };
        let touched = (patch.redo)(store)?;
        debug!(kind = ?patch.kind, "Redo");
        self.head -= 1;
        Ok(touched)
    }

    /// Whether there is a patch left to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.head < self.patches.len()
    }

    /// Whether there is an undone patch to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.head > 0
    }

    /// Number of recorded patches, undone ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Whether no patches are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Kind of the next patch `undo` would apply.
    #[must_use]
    pub fn peek_undo(&self) -> Option<PatchKind> {
        self.patches.get(self.head).map(|p| p.kind)
    }

    /// Forget all patches.
    pub fn clear(&mut self) {
        self.patches.clear();
        self.head = 0;
    }
}
