//! Error types for OnyxDB.

use thiserror::Error;

/// Result type alias using OnyxError.
pub type Result<T> = std::result::Result<T, OnyxError>;

/// Errors that can occur in OnyxDB operations.
#[derive(Debug, Error)]
pub enum OnyxError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Buffer pool errors
    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Replacer errors
    #[error("Frame {frame_id} out of range (replacer size {limit})")]
    InvalidFrame { frame_id: usize, limit: usize },

    #[error("Frame {0} is not tracked by the replacer")]
    UnknownFrame(usize),

    #[error("Frame {0} is not evictable")]
    Unevictable(usize),
}
