//! Storage adapter for Lobbyforge.
//!
//! The registry keeps compute-server leases and job assignments in a
//! key/value store addressed by `(collection, key, owner)`. This crate
//! defines that contract ([`StorageBackend`]) and ships an in-memory
//! implementation ([`MemoryStore`]) used by tests, the demo and any
//! single-node deployment.
//!
//! # Versioned writes
//!
//! Every stored object carries a `version` that increments on each write.
//! Passing `expected_version` to [`StorageBackend::write`] or
//! [`StorageBackend::delete`] turns the call into a compare-and-swap: it
//! fails with [`StoreError::VersionConflict`] if someone else wrote the
//! record since it was read. `Some(0)` means "only if absent".

mod error;
mod memory;
mod object;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use object::StorageObject;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A collection-keyed object store.
///
/// Implementations must be safe to call from many lobby tasks at once and
/// must apply a conditional write or delete atomically with its version
/// check.
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads one object, or `None` if it doesn't exist.
    fn read(&self, collection: &str, key: &str, owner: &str) -> Result<Option<StorageObject>>;

    /// Creates or replaces an object and returns the stored record.
    ///
    /// # Errors
    /// [`StoreError::VersionConflict`] if `expected_version` is set and
    /// does not match the current version (0 for a missing object).
    fn write(
        &self,
        collection: &str,
        key: &str,
        owner: &str,
        value: serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<StorageObject>;

    /// Deletes an object. Returns `true` if something was removed.
    ///
    /// # Errors
    /// [`StoreError::VersionConflict`] if `expected_version` is set and the
    /// object exists with a different version.
    fn delete(
        &self,
        collection: &str,
        key: &str,
        owner: &str,
        expected_version: Option<u64>,
    ) -> Result<bool>;

    /// Lists every object an owner has in a collection, in key order.
    fn list(&self, owner: &str, collection: &str) -> Result<Vec<StorageObject>>;
}
