//! The document engine: piece-tree mutations, queries and history.
//!
//! A [`Document`] owns the buffer pool, the piece tree and the change stack.
//! Every external mutation resolves its position through the tree, rewrites
//! pieces, records a reversible change and reports line-level diffs.
//!
//! # Offsets
//!
//! External offsets are 0-based code-point positions in the document text.
//! Internally every tree offset is biased by +1: the tree always starts with
//! a permanent line-feed piece that anchors line 1, so that line numbering
//! works before anything is inserted. The anchor is invisible to every
//! public query and unreachable by every public mutation; the one position
//! "before line 1" is addressed by [`Document::format_before_first_line`].

use std::ops::Range;

use tracing::{debug, trace};

use crate::buffer::{APPEND_BUFFER, BufferPool};
use crate::change::{
    Change, ChangeStack, DeleteChange, FormatChange, InsertChange, PiecePatch,
};
use crate::diff::Diff;
use crate::error::DocumentError;
use crate::meta::{MetaPatch, PieceMeta, apply_patches, merge_meta};
use crate::piece::{Line, LinePiece, Piece, PieceType, TypeFilter};
use crate::tree::{NodeId, NodePosition, PieceTree, SENTINEL};

/// What `change(fn)` does with an error returned by the callback.
///
/// The group is closed and the document stays consistent either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangeErrorPolicy {
    /// Log and discard the error (source-compatible default).
    #[default]
    Swallow,
    /// Return the error to the caller.
    Propagate,
}

/// Engine configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentOptions {
    /// See [`ChangeErrorPolicy`].
    pub change_error_policy: ChangeErrorPolicy,
}

/// A rich-text document backed by a piece tree.
pub struct Document {
    pool: BufferPool,
    tree: PieceTree,
    changes: ChangeStack,
    options: DocumentOptions,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document (a single empty line 1).
    pub fn new() -> Self {
        Self::from_text("")
    }

    /// A document loaded from `text`. Each initial line lands in its own
    /// original buffer; the append buffer starts empty.
    pub fn from_text(text: &str) -> Self {
        Self::with_options(text, DocumentOptions::default())
    }

    /// A document loaded from `text` with explicit options.
    pub fn with_options(text: &str, options: DocumentOptions) -> Self {
        let mut pool = BufferPool::new();
        let mut tree = PieceTree::new();

        // The permanent line-1 anchor.
        let anchor_buffer = pool.push_original("\n");
        let mut node = tree.insert_after(Piece::line_feed(anchor_buffer, 0), SENTINEL);

        let lines: Vec<&str> = text.split('\n').collect();
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            let is_last = i == last;
            let mut content = (*line).to_string();
            if !is_last {
                content.push('\n');
            }
            if content.is_empty() {
                continue;
            }
            let buffer = pool.push_original(&content);
            let line_len = line.chars().count();
            if line_len > 0 {
                node = tree.insert_after(Piece::text(buffer, 0, line_len, None), node);
            }
            if !is_last {
                node = tree.insert_after(Piece::line_feed(buffer, line_len), node);
            }
        }

        Self { pool, tree, changes: ChangeStack::new(), options }
    }

    // -- measures ---------------------------------------------------------

    /// Document length in code points (non-text pieces count one unit).
    pub fn len(&self) -> usize {
        self.tree.total_size().saturating_sub(1)
    }

    /// `true` when nothing has been inserted (or everything was deleted).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of logical lines; at least 1.
    pub fn line_count(&self) -> usize {
        self.tree.total_line_feeds()
    }

    // -- mutations --------------------------------------------------------

    /// Insert `text` at `offset`, optionally carrying metadata.
    ///
    /// Empty text is only valid together with metadata and produces a
    /// single non-text piece occupying one unit. Offsets clamp to the
    /// document end.
    pub fn insert(
        &mut self,
        offset: usize,
        text: &str,
        meta: Option<PieceMeta>,
    ) -> Result<Vec<Diff>, DocumentError> {
        if text.is_empty() && meta.is_none() {
            return Err(DocumentError::EmptyInsert);
        }
        let offset = self.inner_offset(offset);
        let (change, diffs) = self.insert_inner(offset, text, meta);
        self.changes.push(Change::Insert(change));
        Ok(diffs)
    }

    /// Remove `length` code points starting at `offset`. Both clamp to the
    /// document bounds; a vacuous range is a no-op.
    pub fn delete(&mut self, offset: usize, length: usize) -> Vec<Diff> {
        let len = self.len();
        let offset = offset.min(len);
        let length = length.min(len - offset);
        if length == 0 {
            return Vec::new();
        }
        let (change, diffs) = self.delete_inner(offset + 1, length);
        self.changes.push(Change::Delete(change));
        diffs
    }

    /// Merge `meta` into every piece overlapping `[offset, offset+length)`.
    pub fn format(&mut self, offset: usize, length: usize, meta: &PieceMeta) -> Vec<Diff> {
        self.format_filtered(offset, length, meta, TypeFilter::All)
    }

    /// Like [`Document::format`], but only text pieces are touched. Skipped
    /// pieces still consume range.
    pub fn format_text(&mut self, offset: usize, length: usize, meta: &PieceMeta) -> Vec<Diff> {
        self.format_filtered(offset, length, meta, TypeFilter::Text)
    }

    /// Like [`Document::format`], but only non-text pieces are touched.
    pub fn format_non_text(&mut self, offset: usize, length: usize, meta: &PieceMeta) -> Vec<Diff> {
        self.format_filtered(offset, length, meta, TypeFilter::NonText)
    }

    /// Format the position before line 1, i.e. the permanent line anchor.
    /// This is how line 1 itself gets line metadata.
    pub fn format_before_first_line(&mut self, meta: &PieceMeta) -> Vec<Diff> {
        let (change, diffs) = self.format_inner(0, 1, meta, TypeFilter::All);
        self.changes.push(Change::Format(change));
        diffs
    }

    /// Split the governing structural container at `offset`: the container
    /// piece is cloned onto the split boundary, so everything after the
    /// boundary belongs to the clone in the container projection. A plain
    /// piece split happens first when the offset lands inside a piece.
    ///
    /// No-op when no structural piece precedes the offset. Container edits
    /// are not routed through the change stack.
    pub fn split_structural(&mut self, offset: usize) {
        let offset = self.inner_offset(offset);
        let pos = self.tree.find_by_offset(offset);
        let mut node = pos.node;
        if pos.remainder > 0 {
            if pos.remainder == self.tree.piece(node).length {
                node = self.tree.next(node);
            } else {
                let (_, right) = self.split(node, pos.remainder);
                node = right;
            }
        }
        if node == SENTINEL {
            return;
        }
        let mut container = self.tree.prev(node);
        while container != SENTINEL
            && self.tree.piece(container).piece_type() != PieceType::Structural
        {
            container = self.tree.prev(container);
        }
        if container == SENTINEL {
            return;
        }
        let clone = self.tree.piece(container).clone();
        self.tree.insert_before(clone, node);
    }

    // -- line-level helpers ----------------------------------------------

    /// Insert a line break at the end of line `line_number`, creating a new
    /// empty line after it. Out-of-range line numbers are a no-op.
    pub fn insert_line_break(&mut self, line_number: usize) -> Vec<Diff> {
        if line_number < 1 || line_number > self.line_count() {
            return Vec::new();
        }
        let (_, end) = self.line_span(line_number);
        self.insert(end, "\n", None).expect("line break text is never empty")
    }

    /// Insert `text` as a whole new line before line `line_number`.
    pub fn insert_line(
        &mut self,
        line_number: usize,
        text: &str,
        meta: Option<PieceMeta>,
    ) -> Vec<Diff> {
        if line_number < 1 || line_number > self.line_count() {
            return Vec::new();
        }
        let (start, _) = self.line_span(line_number);
        let mut content = text.to_string();
        content.push('\n');
        self.insert(start, &content, meta).expect("line content is never empty")
    }

    /// Delete line `line_number`: its content plus the separating line
    /// break. Deleting the only line clears its content.
    pub fn delete_line(&mut self, line_number: usize) -> Vec<Diff> {
        let line_count = self.line_count();
        if line_number < 1 || line_number > line_count {
            return Vec::new();
        }
        let (start, end) = self.line_span(line_number);
        if line_count == 1 {
            let len = self.len();
            return self.delete(0, len);
        }
        if line_number < line_count {
            self.delete(start, end - start + 1)
        } else {
            self.delete(start - 1, end - start + 1)
        }
    }

    /// Merge `meta` into the line's anchor piece; this is what
    /// [`Document::get_line_meta`] reads back.
    pub fn format_line(&mut self, line_number: usize, meta: &PieceMeta) -> Vec<Diff> {
        if line_number < 1 || line_number > self.line_count() {
            return Vec::new();
        }
        if line_number == 1 {
            return self.format_before_first_line(meta);
        }
        let (start, _) = self.line_span(line_number);
        self.format(start - 1, 1, meta)
    }

    /// Format a column range inside line `line_number`.
    pub fn format_in_line(
        &mut self,
        line_number: usize,
        range: Range<usize>,
        meta: &PieceMeta,
    ) -> Vec<Diff> {
        self.format_in_line_filtered(line_number, range, meta, TypeFilter::All)
    }

    /// [`Document::format_in_line`] restricted to text pieces.
    pub fn format_text_in_line(
        &mut self,
        line_number: usize,
        range: Range<usize>,
        meta: &PieceMeta,
    ) -> Vec<Diff> {
        self.format_in_line_filtered(line_number, range, meta, TypeFilter::Text)
    }

    /// [`Document::format_in_line`] restricted to non-text pieces.
    pub fn format_non_text_in_line(
        &mut self,
        line_number: usize,
        range: Range<usize>,
        meta: &PieceMeta,
    ) -> Vec<Diff> {
        self.format_in_line_filtered(line_number, range, meta, TypeFilter::NonText)
    }

    // -- queries ----------------------------------------------------------

    /// The whole document text.
    pub fn get_text(&self) -> String {
        let mut out = String::with_capacity(self.len());
        let mut node = self.tree.next(self.tree.first());
        while node != SENTINEL {
            let piece = self.tree.piece(node);
            out.push_str(&self.pool.text(piece.buffer_index, piece.start, piece.length));
            node = self.tree.next(node);
        }
        out
    }

    /// Text in the half-open range `[from, to)`, clamped to the document.
    pub fn get_text_in_range(&self, from: usize, to: usize) -> String {
        let len = self.len();
        let from = from.min(len);
        let to = to.clamp(from, len);
        if from == to {
            return String::new();
        }
        let pos = self.tree.find_by_offset(from + 1);
        let mut node = pos.node;
        let mut skip = pos.remainder;
        let mut remaining = to - from;
        let mut out = String::with_capacity(remaining);
        while node != SENTINEL && remaining > 0 {
            let piece = self.tree.piece(node);
            let available = piece.length - skip;
            if available == 0 {
                node = self.tree.next(node);
                skip = 0;
                continue;
            }
            let take = available.min(remaining);
            out.push_str(&self.pool.text(piece.buffer_index, piece.start + skip, take));
            remaining -= take;
            skip = 0;
            node = self.tree.next(node);
        }
        out
    }

    /// Line `line_number` (1-based). Numbers below 1 clamp to line 1;
    /// numbers past the last line return the empty-line form.
    pub fn get_line(&self, line_number: usize) -> Line {
        let line = line_number.max(1);
        if line > self.line_count() {
            return Line::empty();
        }
        let pos = self.tree.find_by_line(line);
        let meta = self.tree.piece(pos.node).meta.clone();
        let mut pieces = Vec::new();
        let mut node = self.tree.next(pos.node);
        while node != SENTINEL {
            let piece = self.tree.piece(node);
            if piece.line_feed_count > 0 {
                break;
            }
            pieces.push(LinePiece {
                text: self.piece_text(piece),
                length: piece.length,
                meta: piece.meta.clone(),
            });
            node = self.tree.next(node);
        }
        if pieces.is_empty() {
            pieces.push(LinePiece { text: String::new(), length: 0, meta: None });
        }
        Line { meta, pieces }
    }

    /// Every line, in order.
    pub fn get_lines(&self) -> Vec<Line> {
        (1..=self.line_count()).map(|line| self.get_line(line)).collect()
    }

    /// Metadata of the line's anchor piece, if any.
    pub fn get_line_meta(&self, line_number: usize) -> Option<PieceMeta> {
        if line_number < 1 || line_number > self.line_count() {
            return None;
        }
        self.tree.piece(self.tree.find_by_line(line_number).node).meta.clone()
    }

    /// Clones of every content piece, in order. The permanent line-1 anchor
    /// is an addressing artefact and is not included.
    pub fn get_pieces(&self) -> Vec<Piece> {
        let mut out = Vec::with_capacity(self.tree.node_count().saturating_sub(1));
        self.for_each_piece(|piece| out.push(piece.clone()));
        out
    }

    /// Clipped clones of the pieces overlapping `[from, to)`.
    pub fn get_pieces_in_range(&self, from: usize, to: usize) -> Vec<Piece> {
        let len = self.len();
        let from = from.min(len);
        let to = to.clamp(from, len);
        if from == to {
            return Vec::new();
        }
        let pos = self.tree.find_by_offset(from + 1);
        let mut node = pos.node;
        let mut skip = pos.remainder;
        let mut remaining = to - from;
        let mut out = Vec::new();
        while node != SENTINEL && remaining > 0 {
            let piece = self.tree.piece(node);
            let available = piece.length - skip;
            if available == 0 {
                node = self.tree.next(node);
                skip = 0;
                continue;
            }
            let take = available.min(remaining);
            let start = piece.start + skip;
            out.push(Piece {
                start,
                length: take,
                line_feed_count: self.pool.line_feeds_in(piece.buffer_index, start, take),
                ..piece.clone()
            });
            remaining -= take;
            skip = 0;
            node = self.tree.next(node);
        }
        out
    }

    /// Resolve a piece's text through the buffer pool (empty for non-text
    /// pieces).
    pub fn piece_text(&self, piece: &Piece) -> String {
        self.pool.text(piece.buffer_index, piece.start, piece.length)
    }

    /// Visit every content piece in order.
    pub fn for_each_piece<F: FnMut(&Piece)>(&self, mut f: F) {
        let mut node = self.tree.next(self.tree.first());
        while node != SENTINEL {
            f(self.tree.piece(node));
            node = self.tree.next(node);
        }
    }

    /// Visit every line in order with its 1-based number.
    pub fn for_each_line<F: FnMut(usize, &Line)>(&self, mut f: F) {
        for line_number in 1..=self.line_count() {
            let line = self.get_line(line_number);
            f(line_number, &line);
        }
    }

    // -- history ----------------------------------------------------------

    /// Open a change group: every mutation until the matching
    /// [`Document::end_change`] undoes as one unit. Brackets nest.
    pub fn start_change(&mut self) {
        self.changes.begin();
    }

    /// Close the innermost open change group.
    pub fn end_change(&mut self) {
        self.changes.end();
    }

    /// Run `f` inside a change group. The group is closed whether or not
    /// the callback fails; what happens to the error is governed by
    /// [`DocumentOptions::change_error_policy`].
    pub fn change<F>(&mut self, f: F) -> Result<(), DocumentError>
    where
        F: FnOnce(&mut Self) -> Result<(), DocumentError>,
    {
        self.changes.begin();
        let result = f(self);
        self.changes.end();
        match result {
            Ok(()) => Ok(()),
            Err(error) => match self.options.change_error_policy {
                ChangeErrorPolicy::Swallow => {
                    debug!(%error, "change callback failed; group closed anyway");
                    Ok(())
                }
                ChangeErrorPolicy::Propagate => Err(error),
            },
        }
    }

    /// Whether [`Document::undo`] would do anything.
    pub fn can_undo(&self) -> bool {
        self.changes.can_undo()
    }

    /// Whether [`Document::redo`] would do anything.
    pub fn can_redo(&self) -> bool {
        self.changes.can_redo()
    }

    /// Number of undoable groups.
    pub fn undo_depth(&self) -> usize {
        self.changes.undo_depth()
    }

    /// Number of redoable groups.
    pub fn redo_depth(&self) -> usize {
        self.changes.redo_depth()
    }

    /// Revert the most recent change group. Returns the recorded diffs with
    /// their directionality flipped, in reverse change order; empty when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> Vec<Diff> {
        self.changes.close_all();
        let Some(group) = self.changes.pop_undo() else {
            return Vec::new();
        };
        debug!(changes = group.changes.len(), "undo");
        let mut diffs = Vec::new();
        for change in group.changes.iter().rev() {
            self.apply_inverse(change);
            diffs.extend(change.diffs().iter().map(|diff| diff.flipped()));
        }
        self.changes.push_redo(group);
        diffs
    }

    /// Re-apply the most recently undone group, in original order.
    pub fn redo(&mut self) -> Vec<Diff> {
        let Some(group) = self.changes.pop_redo() else {
            return Vec::new();
        };
        debug!(changes = group.changes.len(), "redo");
        let mut diffs = Vec::new();
        for change in &group.changes {
            self.apply_forward(change);
            diffs.extend_from_slice(change.diffs());
        }
        self.changes.restore_undo(group);
        diffs
    }

    // -- integrity --------------------------------------------------------

    /// Panic if any structural invariant is violated: aggregate sums,
    /// red-black colour rules, black height, or the permanent line anchor.
    /// Meant for tests and debugging sweeps.
    pub fn integrity_check(&self) {
        let (size, line_feeds, _) = self.tree.validate();
        assert!(size >= 1 && line_feeds >= 1, "permanent line anchor missing");
        let first = self.tree.first();
        assert_eq!(
            self.tree.piece(first).line_feed_count,
            1,
            "first piece must be the line-1 anchor"
        );
    }

    // -- internals --------------------------------------------------------

    /// Bias an external offset into tree space (past the line-1 anchor).
    fn inner_offset(&self, offset: usize) -> usize {
        offset.min(self.len()) + 1
    }

    /// Line feeds within the first `upto` units of a node's piece.
    fn lf_prefix(&self, node: NodeId, upto: usize) -> usize {
        if node == SENTINEL || upto == 0 {
            return 0;
        }
        let piece = self.tree.piece(node);
        if piece.line_feed_count == 0 {
            return 0;
        }
        self.pool.line_feeds_in(piece.buffer_index, piece.start, upto.min(piece.length))
    }

    /// 1-based number of the line containing a resolved position.
    fn base_line(&self, pos: &NodePosition) -> usize {
        pos.start_lfs + self.lf_prefix(pos.node, pos.remainder)
    }

    /// External `[start, end)` of the line's content.
    fn line_span(&self, line_number: usize) -> (usize, usize) {
        let pos = self.tree.find_by_line(line_number);
        let start = pos.start_offset + pos.remainder;
        let end = if line_number < self.line_count() {
            self.tree.find_by_line(line_number + 1).start_offset
        } else {
            self.tree.total_size()
        };
        (start - 1, end - 1)
    }

    /// Split a node at `remainder`, mutating it into the right part and
    /// inserting the left part immediately before it. The left slice's
    /// line-feed count comes from rescanning its buffer window; metadata is
    /// deep-cloned onto the left part.
    fn split(&mut self, node: NodeId, remainder: usize) -> (NodeId, NodeId) {
        debug_assert!(remainder > 0 && remainder < self.tree.piece(node).length);
        let piece = self.tree.piece(node).clone();
        let left_lfs = self.pool.line_feeds_in(piece.buffer_index, piece.start, remainder);
        let left_piece = Piece { length: remainder, line_feed_count: left_lfs, ..piece };
        let target = self.tree.piece_mut(node);
        target.start += remainder;
        target.length -= remainder;
        target.line_feed_count -= left_lfs;
        self.tree.update_meta_upward(node);
        let left = self.tree.insert_before(left_piece, node);
        (left, node)
    }

    fn insert_inner(
        &mut self,
        offset: usize,
        text: &str,
        meta: Option<PieceMeta>,
    ) -> (InsertChange, Vec<Diff>) {
        trace!(offset, text_len = text.chars().count(), has_meta = meta.is_some(), "insert");
        let pos = self.tree.find_by_offset(offset);
        let base_line = self.base_line(&pos);
        let mut node = pos.node;
        if pos.remainder == 0 {
            node = self.tree.prev(node);
        } else if pos.remainder < self.tree.piece(node).length {
            let (left, _) = self.split(node, pos.remainder);
            node = left;
        }

        let buffer_start = self.pool.append_len();

        if text.is_empty() {
            // Meta-only insertion: a single non-text piece.
            let meta = meta.expect("validated by the caller");
            self.tree.insert_after(Piece::non_text(meta.clone()), node);
            let diffs = vec![Diff::replace(base_line)];
            let change = InsertChange {
                offset,
                buffer_start,
                buffer_len: 0,
                meta: Some(meta),
                diffs: diffs.clone(),
            };
            return (change, diffs);
        }

        // Typing straight after a piece that ends exactly at the append
        // buffer's end can grow that piece in place instead of fragmenting.
        let is_continuous = node != SENTINEL && {
            let piece = self.tree.piece(node);
            piece.buffer_index == APPEND_BUFFER
                && piece.start + piece.length == self.pool.append_len()
        };
        let is_not_line_break = node != SENTINEL && self.tree.piece(node).line_feed_count == 0;
        let coalescible = is_continuous && meta.is_none() && is_not_line_break;

        // A segment flushes when it has text or when metadata was given: an
        // empty run with metadata still materialises a (zero-length) piece
        // carrying the metadata for that line fragment.
        let mut run = String::new();
        let mut lines_inserted = 0usize;
        for ch in text.chars() {
            if ch != '\n' {
                run.push(ch);
                continue;
            }
            if !run.is_empty() || meta.is_some() {
                node = self.flush_run(node, &run, coalescible && lines_inserted == 0, &meta);
                run.clear();
            }
            let (start, _) = self.pool.append("\n");
            node = self.tree.insert_after(Piece::line_feed(APPEND_BUFFER, start), node);
            lines_inserted += 1;
        }
        if !run.is_empty() || meta.is_some() {
            node = self.flush_run(node, &run, coalescible && lines_inserted == 0, &meta);
        }
        let _ = node;

        let mut diffs = Vec::with_capacity(lines_inserted + 1);
        diffs.push(Diff::replace(base_line));
        for i in 1..=lines_inserted {
            diffs.push(Diff::insert(base_line + i));
        }

        let buffer_len = self.pool.append_len() - buffer_start;
        let change =
            InsertChange { offset, buffer_start, buffer_len, meta, diffs: diffs.clone() };
        (change, diffs)
    }

    /// Append a text run and either grow `node` in place or hang a new
    /// piece after it. Returns the node now ending at the flushed text.
    fn flush_run(
        &mut self,
        node: NodeId,
        run: &str,
        coalesce: bool,
        meta: &Option<PieceMeta>,
    ) -> NodeId {
        let (start, len) = self.pool.append(run);
        if coalesce {
            self.tree.piece_mut(node).length += len;
            self.tree.update_meta_upward(node);
            node
        } else {
            self.tree.insert_after(Piece::text(APPEND_BUFFER, start, len, meta.clone()), node)
        }
    }

    fn delete_inner(&mut self, offset: usize, length: usize) -> (DeleteChange, Vec<Diff>) {
        trace!(offset, length, "delete");
        let pos = self.tree.find_by_offset(offset);
        let base_line = self.base_line(&pos);
        let mut node = pos.node;
        if pos.remainder > 0 {
            if pos.remainder == self.tree.piece(node).length {
                node = self.tree.next(node);
            } else {
                let (_, right) = self.split(node, pos.remainder);
                node = right;
            }
        }

        let mut remaining = length;
        let mut captured = Vec::new();
        let mut removed_lfs = 0usize;
        while remaining > 0 && node != SENTINEL {
            let piece_len = self.tree.piece(node).length;
            if remaining >= piece_len {
                let next = self.tree.next(node);
                let piece = self.tree.delete(node);
                removed_lfs += piece.line_feed_count;
                remaining -= piece_len;
                captured.push(piece);
                node = next;
            } else {
                // Trim the head off the last overlapped piece and rescan
                // its window for the kept line-feed count.
                let piece = self.tree.piece(node).clone();
                let kept_start = piece.start + remaining;
                let kept_len = piece_len - remaining;
                let kept_lfs =
                    self.pool.line_feeds_in(piece.buffer_index, kept_start, kept_len);
                let removed = piece.line_feed_count - kept_lfs;
                removed_lfs += removed;
                captured.push(Piece { length: remaining, line_feed_count: removed, ..piece });
                let target = self.tree.piece_mut(node);
                target.start = kept_start;
                target.length = kept_len;
                target.line_feed_count = kept_lfs;
                self.tree.update_meta_upward(node);
                remaining = 0;
            }
        }

        let mut diffs = Vec::with_capacity(removed_lfs + 1);
        diffs.push(Diff::replace(base_line));
        for i in 1..=removed_lfs {
            diffs.push(Diff::remove(base_line + i));
        }
        let change = DeleteChange {
            offset,
            length: length - remaining,
            pieces: captured,
            diffs: diffs.clone(),
        };
        (change, diffs)
    }

    fn format_filtered(
        &mut self,
        offset: usize,
        length: usize,
        meta: &PieceMeta,
        filter: TypeFilter,
    ) -> Vec<Diff> {
        let len = self.len();
        let offset = offset.min(len);
        let length = length.min(len - offset);
        if length == 0 {
            return Vec::new();
        }
        let (change, diffs) = self.format_inner(offset + 1, length, meta, filter);
        self.changes.push(Change::Format(change));
        diffs
    }

    fn format_inner(
        &mut self,
        offset: usize,
        length: usize,
        meta: &PieceMeta,
        filter: TypeFilter,
    ) -> (FormatChange, Vec<Diff>) {
        trace!(offset, length, ?filter, "format");
        let pos = self.tree.find_by_offset(offset);
        let base_line = self.base_line(&pos);
        let mut node = pos.node;
        let mut cursor = pos.start_offset;
        if pos.remainder > 0 {
            if pos.remainder == self.tree.piece(node).length {
                cursor += pos.remainder;
                node = self.tree.next(node);
            } else {
                let (_, right) = self.split(node, pos.remainder);
                cursor += pos.remainder;
                node = right;
            }
        }

        let mut remaining = length;
        let mut patches = Vec::new();
        let mut lf_span = 0usize;
        while remaining > 0 && node != SENTINEL {
            let piece = self.tree.piece(node);
            let piece_len = piece.length;
            if !filter.matches(piece.piece_type()) {
                // The offset advances past filtered-out pieces even though
                // nothing is written to them.
                lf_span += self.lf_prefix(node, remaining.min(piece_len));
                remaining = remaining.saturating_sub(piece_len);
                cursor += piece_len;
                node = self.tree.next(node);
                continue;
            }
            if remaining >= piece_len {
                lf_span += piece.line_feed_count;
                if let Some(inverse) = self.merge_into_node(node, meta) {
                    patches.push(PiecePatch { start_offset: cursor, length: piece_len, inverse });
                }
                remaining -= piece_len;
                cursor += piece_len;
                node = self.tree.next(node);
            } else {
                let (left, _) = self.split(node, remaining);
                lf_span += self.tree.piece(left).line_feed_count;
                if let Some(inverse) = self.merge_into_node(left, meta) {
                    patches.push(PiecePatch { start_offset: cursor, length: remaining, inverse });
                }
                remaining = 0;
            }
        }

        let first = base_line.max(1);
        let diffs: Vec<Diff> = (first..=base_line + lf_span).map(Diff::replace).collect();
        let change = FormatChange {
            offset,
            length,
            meta: meta.clone(),
            filter,
            patches,
            diffs: diffs.clone(),
        };
        (change, diffs)
    }

    /// Merge `meta` into a node's metadata; returns the inverse patches, or
    /// `None` when the merge changed nothing.
    fn merge_into_node(&mut self, node: NodeId, meta: &PieceMeta) -> Option<Vec<MetaPatch>> {
        let current = self.tree.piece(node).meta.clone().unwrap_or_default();
        let merge = merge_meta(&current, meta)?;
        self.tree.piece_mut(node).meta = Some(merge.merged);
        Some(merge.inverse)
    }

    fn apply_inverse(&mut self, change: &Change) {
        match change {
            Change::Insert(c) => {
                let _ = self.delete_inner(c.offset, c.occupied_len());
            }
            Change::Delete(c) => self.restore_pieces(c.offset, &c.pieces),
            Change::Format(c) => {
                for patch in &c.patches {
                    self.unapply_piece_patch(patch);
                }
            }
        }
    }

    fn apply_forward(&mut self, change: &Change) {
        match change {
            Change::Insert(c) => {
                let text = self.pool.text(APPEND_BUFFER, c.buffer_start, c.buffer_len);
                let _ = self.insert_inner(c.offset, &text, c.meta.clone());
            }
            Change::Delete(c) => {
                let _ = self.delete_inner(c.offset, c.length);
            }
            Change::Format(c) => {
                let meta = c.meta.clone();
                let _ = self.format_inner(c.offset, c.length, &meta, c.filter);
            }
        }
    }

    /// Put captured pieces back at `offset`, in their original order. The
    /// position rule mirrors insertion: land after the predecessor of the
    /// node starting at the offset, or after the node the offset ends in.
    fn restore_pieces(&mut self, offset: usize, pieces: &[Piece]) {
        let Some((first, rest)) = pieces.split_first() else { return };
        let pos = self.tree.find_by_offset(offset);
        let mut node;
        if pos.remainder == 0 {
            let before = self.tree.prev(pos.node);
            if before == SENTINEL {
                node = self.tree.insert_before(first.clone(), pos.node);
            } else {
                node = self.tree.insert_after(first.clone(), before);
            }
        } else if pos.remainder == self.tree.piece(pos.node).length {
            node = self.tree.insert_after(first.clone(), pos.node);
        } else {
            let (left, _) = self.split(pos.node, pos.remainder);
            node = self.tree.insert_after(first.clone(), left);
        }
        for piece in rest {
            node = self.tree.insert_after(piece.clone(), node);
        }
    }

    /// Find the piece recorded by a format pass and apply its inverse
    /// patches. Undo order guarantees the piece boundaries at `start_offset`
    /// are back to what they were when the patch was recorded.
    fn unapply_piece_patch(&mut self, patch: &PiecePatch) {
        let pos = self.tree.find_by_offset(patch.start_offset);
        let mut node = pos.node;
        if pos.remainder > 0 {
            if pos.remainder == self.tree.piece(node).length {
                node = self.tree.next(node);
            } else {
                let (_, right) = self.split(node, pos.remainder);
                node = right;
            }
        }
        if node == SENTINEL {
            return;
        }
        let mut current = self.tree.piece_mut(node).meta.take().unwrap_or_default();
        apply_patches(&mut current, &patch.inverse);
        self.tree.piece_mut(node).meta =
            if current.is_empty() { None } else { Some(current) };
    }

    fn format_in_line_filtered(
        &mut self,
        line_number: usize,
        range: Range<usize>,
        meta: &PieceMeta,
        filter: TypeFilter,
    ) -> Vec<Diff> {
        if line_number < 1 || line_number > self.line_count() {
            return Vec::new();
        }
        let (start, end) = self.line_span(line_number);
        let width = end - start;
        let from = range.start.min(width);
        let to = range.end.clamp(from, width);
        if from == to {
            return Vec::new();
        }
        self.format_filtered(start + from, to - from, meta, filter)
    }
}
