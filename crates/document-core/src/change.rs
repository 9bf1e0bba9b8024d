//! Reversible change records and the grouped undo/redo stack.
//!
//! Every mutation leaves behind a [`Change`] carrying exactly what is needed
//! to invert it and to re-apply it: an insert remembers the slice of the
//! append buffer it wrote (the append buffer never discards, so the slice
//! stays valid forever), a delete keeps the removed pieces themselves, and a
//! format keeps one inverse patch list per touched piece.
//!
//! Changes pushed outside a bracket become singleton groups; everything
//! pushed between `begin` and the matching `end` joins one group. Any new
//! push discards the redo stack.

use crate::diff::Diff;
use crate::meta::{MetaPatch, PieceMeta};
use crate::piece::{Piece, TypeFilter};

/// A recorded insertion. Offsets are internal (sentinel-biased).
#[derive(Debug, Clone)]
pub(crate) struct InsertChange {
    pub offset: usize,
    /// Slice of the append buffer holding the inserted text.
    pub buffer_start: usize,
    pub buffer_len: usize,
    pub meta: Option<PieceMeta>,
    pub diffs: Vec<Diff>,
}

impl InsertChange {
    /// Units the insertion occupies in the document: the text length, or one
    /// unit for a meta-only (non-text) insertion.
    pub fn occupied_len(&self) -> usize {
        if self.buffer_len == 0 { 1 } else { self.buffer_len }
    }
}

/// A recorded deletion: the removed pieces, in order.
#[derive(Debug, Clone)]
pub(crate) struct DeleteChange {
    pub offset: usize,
    pub length: usize,
    pub pieces: Vec<Piece>,
    pub diffs: Vec<Diff>,
}

/// Inverse patches for one formatted piece, addressed by its offset at
/// record time.
#[derive(Debug, Clone)]
pub(crate) struct PiecePatch {
    pub start_offset: usize,
    pub length: usize,
    pub inverse: Vec<MetaPatch>,
}

/// A recorded format pass.
#[derive(Debug, Clone)]
pub(crate) struct FormatChange {
    pub offset: usize,
    pub length: usize,
    pub meta: PieceMeta,
    pub filter: TypeFilter,
    pub patches: Vec<PiecePatch>,
    pub diffs: Vec<Diff>,
}

#[derive(Debug, Clone)]
pub(crate) enum Change {
    Insert(InsertChange),
    Delete(DeleteChange),
    Format(FormatChange),
}

impl Change {
    pub fn diffs(&self) -> &[Diff] {
        match self {
            Change::Insert(c) => &c.diffs,
            Change::Delete(c) => &c.diffs,
            Change::Format(c) => &c.diffs,
        }
    }
}

/// One undo/redo unit: a bracketed run of changes.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChangeGroup {
    pub changes: Vec<Change>,
}

#[derive(Debug, Default)]
pub(crate) struct ChangeStack {
    undo: Vec<ChangeGroup>,
    redo: Vec<ChangeGroup>,
    open: Option<ChangeGroup>,
    depth: usize,
}

impl ChangeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a bracket (nestable; only the outermost close seals the group).
    pub fn begin(&mut self) {
        self.depth += 1;
        if self.open.is_none() {
            self.open = Some(ChangeGroup::default());
        }
    }

    /// Close one bracket level. Sealing an empty group discards it.
    pub fn end(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        if self.depth == 0
            && let Some(group) = self.open.take()
            && !group.changes.is_empty()
        {
            self.undo.push(group);
        }
    }

    /// Close every open bracket level.
    pub fn close_all(&mut self) {
        while self.depth > 0 {
            self.end();
        }
    }

    /// Record a change: into the open group, or as a singleton group.
    /// Either way the redo stack is gone.
    pub fn push(&mut self, change: Change) {
        self.redo.clear();
        match self.open.as_mut() {
            Some(group) => group.changes.push(change),
            None => self.undo.push(ChangeGroup { changes: vec![change] }),
        }
    }

    pub fn pop_undo(&mut self) -> Option<ChangeGroup> {
        self.undo.pop()
    }

    pub fn push_redo(&mut self, group: ChangeGroup) {
        self.redo.push(group);
    }

    pub fn pop_redo(&mut self) -> Option<ChangeGroup> {
        self.redo.pop()
    }

    /// Return a redone group to the undo stack without touching redo.
    pub fn restore_undo(&mut self, group: ChangeGroup) {
        self.undo.push(group);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }
}
