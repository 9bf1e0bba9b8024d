use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Errors produced by [`Document`](crate::Document) mutations.
///
/// Out-of-range offsets and line numbers are not errors: queries clamp to the
/// nearest valid position and line helpers return an empty diff list instead.
pub enum DocumentError {
    #[error("inserted text is empty and no metadata was given")]
    /// `insert` was called with empty text and no metadata. Empty text is
    /// only meaningful together with metadata (a non-text piece).
    EmptyInsert,
}
