//! Piece and line value types.
//!
//! A [`Piece`] describes a slice of one pool buffer plus optional metadata.
//! Pieces are plain values: the tree clones them freely, and only `start`,
//! `length`, `line_feed_count` and `meta` are ever mutated in place.

use serde::{Deserialize, Serialize};

use crate::buffer::NON_TEXT_BUFFER;
use crate::meta::PieceMeta;

/// Derived classification of a piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceType {
    /// Ordinary buffer-backed text.
    Text,
    /// A metadata-only piece (negative buffer index); occupies one unit.
    NonText,
    /// A piece holding exactly one `'\n'`; the boundary between lines.
    LineFeed,
    /// A container piece (e.g. a paragraph), tagged explicitly by the caller.
    Structural,
}

/// Which piece types a `format` call applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    /// Apply to every piece in range, including line feeds and containers.
    All,
    /// Apply only to [`PieceType::Text`] pieces.
    Text,
    /// Apply only to [`PieceType::NonText`] pieces.
    NonText,
}

impl TypeFilter {
    pub(crate) fn matches(self, kind: PieceType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Text => kind == PieceType::Text,
            TypeFilter::NonText => kind == PieceType::NonText,
        }
    }
}

/// A slice of one buffer plus associated metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    /// Selected buffer; negative for non-text pieces.
    pub buffer_index: i32,
    /// Start offset inside the buffer, in code points.
    pub start: usize,
    /// Length in code points. Non-text pieces occupy one unit.
    pub length: usize,
    /// Number of `'\n'` inside the addressed window.
    pub line_feed_count: usize,
    /// Optional metadata attributes.
    pub meta: Option<PieceMeta>,
    /// Explicit container tag; wins over the derived classification.
    pub structural: bool,
}

impl Piece {
    /// A text piece over `[start, start + length)` of a buffer.
    pub fn text(buffer_index: i32, start: usize, length: usize, meta: Option<PieceMeta>) -> Self {
        Self { buffer_index, start, length, line_feed_count: 0, meta, structural: false }
    }

    /// A piece holding the single `'\n'` at `start`.
    pub fn line_feed(buffer_index: i32, start: usize) -> Self {
        Self { buffer_index, start, length: 1, line_feed_count: 1, meta: None, structural: false }
    }

    /// A metadata-only piece. It addresses no buffer and occupies one unit.
    pub fn non_text(meta: PieceMeta) -> Self {
        Self {
            buffer_index: NON_TEXT_BUFFER,
            start: 0,
            length: 1,
            line_feed_count: 0,
            meta: Some(meta),
            structural: false,
        }
    }

    /// A container piece (e.g. a paragraph head).
    pub fn structural(meta: Option<PieceMeta>) -> Self {
        Self {
            buffer_index: NON_TEXT_BUFFER,
            start: 0,
            length: 1,
            line_feed_count: 0,
            meta,
            structural: true,
        }
    }

    /// Classify the piece. The explicit structural tag wins; otherwise a
    /// single line feed makes a [`PieceType::LineFeed`], a negative buffer a
    /// [`PieceType::NonText`], and anything else is text.
    pub fn piece_type(&self) -> PieceType {
        if self.structural {
            PieceType::Structural
        } else if self.line_feed_count == 1 {
            PieceType::LineFeed
        } else if self.buffer_index < 0 {
            PieceType::NonText
        } else {
            PieceType::Text
        }
    }
}

/// One piece of a line as returned by queries: resolved text plus the piece's
/// length and metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinePiece {
    /// Resolved text (empty for non-text pieces).
    pub text: String,
    /// Piece length in code points.
    pub length: usize,
    /// Piece metadata.
    pub meta: Option<PieceMeta>,
}

/// A logical line: the metadata of its anchor piece and its content pieces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    /// Metadata of the line-feed piece that starts the line.
    pub meta: Option<PieceMeta>,
    /// Content pieces, in order. An empty line has one empty piece.
    pub pieces: Vec<LinePiece>,
}

impl Line {
    pub(crate) fn empty() -> Self {
        Self { meta: None, pieces: vec![LinePiece { text: String::new(), length: 0, meta: None }] }
    }
}
