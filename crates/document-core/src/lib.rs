#![warn(missing_docs)]
//! Document Core - Headless Rich-Text Document Kernel
//!
//! # Overview
//!
//! `document-core` is the storage and history kernel of a rich-text editor.
//! It keeps the document as a **piece tree**: a self-balancing
//! order-statistic red-black tree whose leaves reference immutable string
//! buffers, augmented with per-piece metadata, line-oriented addressing,
//! non-text pieces and a grouped reversible change log. It does not render,
//! lay out or persist anything; the upper layer consumes line-level diffs
//! and draws.
//!
//! # Core Features
//!
//! - **Piece-tree storage**: O(log n) offset and line lookup via subtree
//!   aggregates (size, line-feed count, node count)
//! - **Append-buffer coalescing**: consecutive typing grows one piece
//!   instead of fragmenting
//! - **Piece metadata**: deep-merged attribute maps with JSON-patch-style
//!   forward and inverse patch lists
//! - **Line addressing**: every line is anchored by a line-feed piece, so
//!   line 1 exists before the first keystroke
//! - **Grouped undo/redo**: bracketed mutations revert as one unit, with
//!   diff directionality flipped on the way back
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Document (mutations, queries, history)     │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Change Stack (grouped reversible records)  │  ← History
//! ├─────────────────────────────────────────────┤
//! │  Meta Merge (forward / inverse patches)     │  ← Formatting
//! ├─────────────────────────────────────────────┤
//! │  Piece Tree (order-statistic red-black)     │  ← Addressing
//! ├─────────────────────────────────────────────┤
//! │  Buffer Pool (append + original buffers)    │  ← Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use document_core::Document;
//!
//! let mut doc = Document::new();
//! doc.insert(0, "Hello piece tree\nsecond line\n", None).unwrap();
//!
//! assert_eq!(doc.line_count(), 3);
//! assert_eq!(doc.get_line(1).pieces[0].text, "Hello piece tree");
//!
//! let diffs = doc.undo();
//! assert!(doc.get_text().is_empty());
//! assert!(!diffs.is_empty());
//! ```
//!
//! Formatting merges metadata into every piece a range overlaps:
//!
//! ```rust
//! use document_core::Document;
//! use serde_json::json;
//!
//! let mut doc = Document::from_text("bold me");
//! let meta = json!({"bold": true}).as_object().cloned().unwrap();
//! doc.format(0, 4, &meta);
//!
//! let pieces = doc.get_pieces();
//! assert_eq!(pieces[0].meta, Some(meta));
//! assert_eq!(doc.piece_text(&pieces[0]), "bold");
//! ```
//!
//! # Module Description
//!
//! - [`buffer`] - append and original character buffers
//! - [`piece`] - piece and line value types
//! - [`meta`] - metadata deep-merge and patch application
//! - [`diff`] - line-level diff wire types
//! - [`document`] - the engine: mutations, queries, undo/redo
//! - [`error`] - error type
//!
//! # Unicode
//!
//! Offsets, lengths and aggregates count Unicode scalar values (`char`).
//! `'\n'` is the only recognised line terminator. Grapheme clusters are the
//! concern of layers above this one.

pub mod buffer;
mod change;
pub mod diff;
pub mod document;
pub mod error;
pub mod meta;
pub mod piece;
mod tree;

pub use buffer::BufferPool;
pub use diff::{Diff, DiffKind};
pub use document::{ChangeErrorPolicy, Document, DocumentOptions};
pub use error::DocumentError;
pub use meta::{MetaMerge, MetaPatch, PieceMeta, apply_patches, merge_meta};
pub use piece::{Line, LinePiece, Piece, PieceType, TypeFilter};
