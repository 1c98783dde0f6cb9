//! Errors produced by an [`crate::OpStore`] implementation.

use thiserror::Error;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors an `OpStore` backend may raise. `AppendOp` and `UpsertState`
/// fail only on unrecoverable backend errors — transient errors
/// (timeouts, dropped connections) are the Ingestor/Tailer's
/// responsibility to retry, not something this trait surfaces as a
/// distinct variant.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A method other than `init` was called before `init` succeeded.
    #[error("store has not been initialized")]
    NotInitialized,

    /// An unrecoverable backend failure (connection refused permanently,
    /// disk full, index creation failed, etc).
    #[error("store backend error: {0}")]
    Backend(String),
}
