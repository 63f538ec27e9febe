//! Batching Error Types

use thiserror::Error;

/// Errors while assembling rows or encoding batches
#[derive(Debug, Error)]
pub enum BatchError {
    /// Row width does not match the batch header
    #[error("Row has {actual} values but header has {expected} columns")]
    ArityMismatch { expected: usize, actual: usize },

    /// Body could not be encoded
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
