//! Error types for the storage vault.

use thiserror::Error;

/// Convenience result type using [`VaultError`].
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors a [`crate::StorageVault`] implementation may return.
///
/// Kept small and storage-agnostic: callers in `stratum-core` map these onto
/// the engine's own error kinds rather than matching on them directly.
#[derive(Error, Debug)]
pub enum VaultError {
    /// `create` was called with an ID that already exists.
    #[error("plan {0} already exists")]
    AlreadyExists(uuid::Uuid),

    /// `read`/`update_*` targeted a plan or node that isn't known to the vault.
    #[error("plan or node {0} not found")]
    NotFound(uuid::Uuid),

    /// The vault backend is unreachable or otherwise unable to service the call.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A concurrent write conflicted with this one (e.g. optimistic-concurrency failure).
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// The cancellation handle passed to the call tripped before it completed.
    #[error("cancelled")]
    Cancelled,

    /// Serialization of a node failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
