//! Error types for the index.
//!
//! Misuse that the contract makes a silent no-op (writing through a read
//! cursor) is not an error, and capacity exhaustion (pager full, tree
//! too deep) is fatal rather than recoverable, so the enum only covers
//! cursor misuse a caller can act on.

use thiserror::Error;

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors the index can report
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// The cursor's recorded position is not a leaf page; its path state
    /// is stale or corrupt.
    #[error("cursor is not positioned on a leaf page")]
    NotLeaf,

    /// The cursor points past the last entry of its leaf.
    #[error("cursor is not positioned on a live entry")]
    NoEntry,
}
