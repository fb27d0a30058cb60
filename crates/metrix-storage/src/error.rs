/// Errors raised while saving or restoring metric snapshots.
///
/// # Examples
///
/// ```rust
/// use metrix_storage::error::StorageError;
///
/// let err = StorageError::Corrupt {
///     id: "PollCount".to_string(),
///     reason: "counter row without delta".to_string(),
/// };
/// assert!(err.to_string().contains("PollCount"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage: I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot file could not be encoded or decoded.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row does not describe a valid metric.
    #[error("Storage: corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    /// Transient failures persisted through every retry.
    #[error("Storage: persistence failed after {attempts} attempts: {last}")]
    Persistence {
        attempts: u32,
        last: Box<StorageError>,
    },

    /// The blocking task running a storage call panicked or was cancelled.
    #[error("Storage: background task failed: {0}")]
    Task(String),
}

impl StorageError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
