//! Error types for the registry layer.

use lobbyforge_protocol::UserId;
use lobbyforge_store::StoreError;

/// Errors surfaced by [`ServerRegistry`](crate::ServerRegistry) operations.
///
/// "No server available" is not an error: `acquire` returns `Ok(None)`
/// and the caller tries again on a later tick.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The storage backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored record could not be parsed.
    #[error("corrupt record {collection}/{key}: {source}")]
    Decode {
        collection: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A record could not be serialized for storage.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Every conditional write attempt lost to a concurrent writer.
    #[error("lease for server {server_id} still contended after {attempts} attempts")]
    Contended { server_id: UserId, attempts: u32 },
}
