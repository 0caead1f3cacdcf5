//! Error types for the storage layer.

/// Errors a storage backend can report.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conditional write or delete lost a race: the record changed
    /// between the caller's read and its write.
    #[error("version conflict: expected {expected}, got {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// The backend itself failed (I/O, connection, driver error).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Returns `true` if this is a lost compare-and-swap rather than a
    /// backend failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}
