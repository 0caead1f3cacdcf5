//! # Lobbyforge
//!
//! Multiplayer lobby coordination: gather players into a lobby, wait for
//! everyone to be ready, lease a compute server to host the match, and
//! hand the server back when the lobby closes.
//!
//! ## Layers
//!
//! - `lobbyforge-protocol`: identities, op codes, lobby events
//! - `lobbyforge-store`: versioned key/value storage
//! - `lobbyforge-registry`: server leases, heartbeats and allocation
//! - `lobbyforge-lobby`: lobby state machine and actors
//! - this crate: the RPC surface and a unified error
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lobbyforge::prelude::*;
//!
//! # async fn run() -> Result<(), LobbyforgeError> {
//! lobbyforge::init_tracing();
//! let service = LobbyService::in_memory();
//!
//! // A compute server announces itself...
//! service.handle_rpc("register_server", &UserId::from("srv-1"), r#"{"ip":"10.0.0.5","port":7777}"#).await?;
//! // ...and a player opens a lobby.
//! let created = service.create_match().await;
//! # let _ = created;
//! # Ok(())
//! # }
//! ```

mod error;
mod service;

pub use error::LobbyforgeError;
pub use service::{
    CreateMatchResponse, FetchJobResponse, LobbyService, RegisterServerRequest,
    RegisterServerResponse, RpcId,
};

pub use lobbyforge_lobby as lobby;
pub use lobbyforge_protocol as protocol;
pub use lobbyforge_registry as registry;
pub use lobbyforge_store as store;

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Calling this
/// more than once is harmless; later calls leave the first subscriber in
/// place.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Everything needed to host lobbies.
pub mod prelude {
    pub use crate::{LobbyService, LobbyforgeError, RpcId};
    pub use lobbyforge_lobby::{
        Dispatcher, LobbyConfig, LobbyInfo, LobbyManager, LobbyMatch, MatchPhase, PlayerSender,
        Readiness,
    };
    pub use lobbyforge_protocol::{
        ClientMessage, ConnectionId, Envelope, LobbyEvent, MatchId, MatchMessage, OpCode,
        Presence, Recipient, ServerAddress, UserId,
    };
    pub use lobbyforge_registry::{
        JobAssignment, LeaseState, RegistryConfig, ServerLease, ServerRegistry,
    };
    pub use lobbyforge_store::{MemoryStore, StorageBackend};
}
