//! In-memory storage backend.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::{Result, StorageBackend, StorageObject, StoreError};

/// `(owner, collection, key)`
type ObjectKey = (String, String, String);

/// In-memory [`StorageBackend`] backed by a sharded concurrent map.
///
/// Conditional writes and deletes go through the map's entry API, so the
/// version check and the mutation happen under the same shard lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: DashMap<ObjectKey, StorageObject>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored objects across all owners and collections.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn object_key(collection: &str, key: &str, owner: &str) -> ObjectKey {
        (owner.to_string(), collection.to_string(), key.to_string())
    }
}

impl StorageBackend for MemoryStore {
    fn read(&self, collection: &str, key: &str, owner: &str) -> Result<Option<StorageObject>> {
        Ok(self
            .objects
            .get(&Self::object_key(collection, key, owner))
            .map(|r| r.value().clone()))
    }

    fn write(
        &self,
        collection: &str,
        key: &str,
        owner: &str,
        value: serde_json::Value,
        expected_version: Option<u64>,
    ) -> Result<StorageObject> {
        let now = Self::now_millis();

        match self.objects.entry(Self::object_key(collection, key, owner)) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().version;
                if let Some(expected) = expected_version {
                    if expected != current {
                        tracing::trace!(
                            collection,
                            key,
                            expected,
                            actual = current,
                            "conditional write rejected"
                        );
                        return Err(StoreError::VersionConflict {
                            expected,
                            actual: current,
                        });
                    }
                }
                let obj = StorageObject {
                    owner: owner.to_string(),
                    collection: collection.to_string(),
                    key: key.to_string(),
                    value,
                    version: current + 1,
                    created_at: entry.get().created_at,
                    updated_at: now,
                };
                entry.insert(obj.clone());
                Ok(obj)
            }
            Entry::Vacant(entry) => {
                if let Some(expected) = expected_version {
                    if expected != 0 {
                        return Err(StoreError::VersionConflict {
                            expected,
                            actual: 0,
                        });
                    }
                }
                let obj = StorageObject {
                    owner: owner.to_string(),
                    collection: collection.to_string(),
                    key: key.to_string(),
                    value,
                    version: 1,
                    created_at: now,
                    updated_at: now,
                };
                entry.insert(obj.clone());
                Ok(obj)
            }
        }
    }

    fn delete(
        &self,
        collection: &str,
        key: &str,
        owner: &str,
        expected_version: Option<u64>,
    ) -> Result<bool> {
        match self.objects.entry(Self::object_key(collection, key, owner)) {
            Entry::Occupied(entry) => {
                let current = entry.get().version;
                if let Some(expected) = expected_version {
                    if expected != current {
                        tracing::trace!(
                            collection,
                            key,
                            expected,
                            actual = current,
                            "conditional delete rejected"
                        );
                        return Err(StoreError::VersionConflict {
                            expected,
                            actual: current,
                        });
                    }
                }
                entry.remove();
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    fn list(&self, owner: &str, collection: &str) -> Result<Vec<StorageObject>> {
        let mut objects: Vec<StorageObject> = self
            .objects
            .iter()
            .filter(|r| r.key().0 == owner && r.key().1 == collection)
            .map(|r| r.value().clone())
            .collect();

        // Key order keeps scans deterministic.
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}
