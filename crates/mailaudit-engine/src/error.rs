//! Orchestrator error types.

use mailaudit_core::CoreError;
use mailaudit_store::StoreError;
use thiserror::Error;

/// Errors raised while advancing a record.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Record store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Refused status change.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
