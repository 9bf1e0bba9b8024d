//! Line-level change descriptions handed to external consumers.
//!
//! Every mutation reports which logical lines a view has to refresh, as a
//! small list of inserts, removals and replacements. Line numbers are
//! 1-based; `insert`/`replace` address the state after the operation,
//! `remove` addresses the state before it. Undo hands the recorded diffs
//! back with their directionality flipped.

use serde::{Deserialize, Serialize};

/// The kind of a line-level diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// A line appeared at `line_number`.
    Insert,
    /// The line at `line_number` disappeared.
    Remove,
    /// The line at `line_number` changed in place.
    Replace,
}

/// One line-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    /// What happened to the line.
    #[serde(rename = "type")]
    pub kind: DiffKind,
    /// 1-based logical line number.
    #[serde(rename = "lineNumber")]
    pub line_number: usize,
}

impl Diff {
    pub(crate) fn insert(line_number: usize) -> Self {
        Self { kind: DiffKind::Insert, line_number }
    }

    pub(crate) fn remove(line_number: usize) -> Self {
        Self { kind: DiffKind::Remove, line_number }
    }

    pub(crate) fn replace(line_number: usize) -> Self {
        Self { kind: DiffKind::Replace, line_number }
    }

    /// The same line with insert and remove swapped; replace is unchanged.
    pub fn flipped(self) -> Self {
        let kind = match self.kind {
            DiffKind::Insert => DiffKind::Remove,
            DiffKind::Remove => DiffKind::Insert,
            DiffKind::Replace => DiffKind::Replace,
        };
        Self { kind, line_number: self.line_number }
    }
}
