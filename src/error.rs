//! Storage error taxonomy
//!
//! Every variant is recoverable. The public store API converts them to
//! best-effort defaults; only the `try_*` variants surface them.

use thiserror::Error;

/// Errors raised while reading or writing the persisted slot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The host environment exposes no storage facility.
    #[error("storage facility is unavailable")]
    Unavailable,

    /// The backend threw while reading (e.g. `SecurityError`).
    #[error("failed to read stored state: {0}")]
    Read(String),

    /// The stored text is not a JSON object of the expected shape.
    #[error("stored state is malformed: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The caller's partial is not a JSON object.
    #[error("update is not a JSON object: {0}")]
    InvalidPatch(#[source] serde_json::Error),

    /// The merged state (or the caller's partial) could not be encoded.
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The backend rejected the write (quota exceeded, storage disabled).
    #[error("failed to write stored state: {0}")]
    Write(String),

    /// The in-memory backend ran out of room.
    #[error("storage quota exceeded: {needed} bytes needed, {quota} available")]
    QuotaExceeded { needed: usize, quota: usize },
}

impl StoreError {
    /// Whether this error came from the write half of a read-modify-write
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            StoreError::Serialize(_) | StoreError::Write(_) | StoreError::QuotaExceeded { .. }
        )
    }
}
