//! Error types for the offline layer

use backend_client::BackendError;
use storage::{CacheError, KvError};
use thiserror::Error;

/// Offline layer errors
#[derive(Debug, Error)]
pub enum OfflineError {
    /// A queued mutation was malformed
    #[error("Invalid change: {0}")]
    InvalidChange(String),

    /// Local storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] KvError),

    /// Response cache failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend rejected a request
    #[error("Remote error: {0}")]
    Remote(#[from] BackendError),

    /// Offline and nothing cached under the key
    #[error("No cached data for key: {0}")]
    NoCachedData(String),

    /// No ledger entry with the given id
    #[error("Change not found: {0}")]
    NotFound(String),
}

/// Result type for offline operations
pub type Result<T> = std::result::Result<T, OfflineError>;
