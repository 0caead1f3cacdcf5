//! RPC surface: match creation, server self-registration and job polling.
//!
//! Every entry point takes the caller's identity as resolved by the host
//! (authentication is the host's job). [`LobbyService::handle_rpc`] is the
//! string boundary: RPC id plus JSON payload in, JSON response out.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use lobbyforge_lobby::{LobbyConfig, LobbyManager};
use lobbyforge_protocol::{MatchId, ServerAddress, UserId};
use lobbyforge_registry::{JobAssignment, RegistryConfig, ServerRegistry};
use lobbyforge_store::{MemoryStore, StorageBackend};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::LobbyforgeError;

// ---------------------------------------------------------------------------
// RPC ids and payloads
// ---------------------------------------------------------------------------

/// The RPCs a [`LobbyService`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcId {
    RegisterServer,
    CreateMatch,
    FetchJob,
}

impl RpcId {
    pub const ALL: [RpcId; 3] = [Self::RegisterServer, Self::CreateMatch, Self::FetchJob];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegisterServer => "register_server",
            Self::CreateMatch => "create_match",
            Self::FetchJob => "fetch_job",
        }
    }
}

impl FromStr for RpcId {
    type Err = LobbyforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| LobbyforgeError::UnknownRpc(s.to_string()))
    }
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `register_server`: where players can reach the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterServerRequest {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterServerResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchResponse {
    pub match_id: MatchId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchJobResponse {
    pub job: Option<JobAssignment>,
}

// ---------------------------------------------------------------------------
// LobbyService
// ---------------------------------------------------------------------------

/// Entry points for players and compute servers.
pub struct LobbyService {
    registry: Arc<ServerRegistry>,
    lobbies: Mutex<LobbyManager>,
}

impl LobbyService {
    pub fn new(registry: Arc<ServerRegistry>, lobby_config: LobbyConfig) -> Self {
        let lobbies = LobbyManager::new(Arc::clone(&registry), lobby_config);
        Self {
            registry,
            lobbies: Mutex::new(lobbies),
        }
    }

    /// A service over a fresh store with default registry and lobby
    /// settings.
    pub fn with_store(store: Arc<dyn StorageBackend>) -> Self {
        let registry = Arc::new(ServerRegistry::new(store, RegistryConfig::default()));
        Self::new(registry, LobbyConfig::default())
    }

    /// A single-node service backed by [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// The lobby manager, for transport glue that routes joins, leaves
    /// and messages.
    pub fn lobbies(&self) -> &Mutex<LobbyManager> {
        &self.lobbies
    }

    /// Creates a lobby and returns its id.
    pub async fn create_match(&self) -> CreateMatchResponse {
        let match_id = self.lobbies.lock().await.create_match();
        CreateMatchResponse { match_id }
    }

    /// Heartbeat from a compute server.
    ///
    /// Never fails: a missing identity or a store error is logged and
    /// reported as `success: false` so the server simply tries again.
    pub fn register_server(
        &self,
        identity: &UserId,
        request: RegisterServerRequest,
    ) -> RegisterServerResponse {
        if identity.is_empty() {
            tracing::warn!("register_server called without an identity");
            return RegisterServerResponse { success: false };
        }

        let address = ServerAddress::new(request.ip, request.port);
        match self.registry.heartbeat(identity, address) {
            Ok(_) => RegisterServerResponse { success: true },
            Err(e) => {
                tracing::error!(server_id = %identity, error = %e, "server heartbeat failed");
                RegisterServerResponse { success: false }
            }
        }
    }

    /// Hands a compute server its pending job, at most once.
    pub fn fetch_job(&self, identity: &UserId) -> Result<FetchJobResponse, LobbyforgeError> {
        if identity.is_empty() {
            return Ok(FetchJobResponse { job: None });
        }
        let job = self.registry.poll_job(identity)?;
        Ok(FetchJobResponse { job })
    }

    /// Dispatches a raw RPC call.
    ///
    /// # Errors
    /// [`LobbyforgeError::UnknownRpc`] for an unregistered id; store
    /// failures from `fetch_job`. An unparsable `register_server` payload
    /// is answered with `success: false`, not an error.
    pub async fn handle_rpc(
        &self,
        rpc_id: &str,
        identity: &UserId,
        payload: &str,
    ) -> Result<String, LobbyforgeError> {
        let rpc: RpcId = rpc_id.parse()?;
        tracing::debug!(%rpc, caller = %identity, "rpc");

        let response = match rpc {
            RpcId::RegisterServer => {
                let response = match serde_json::from_str::<RegisterServerRequest>(payload) {
                    Ok(request) => self.register_server(identity, request),
                    Err(e) => {
                        tracing::warn!(server_id = %identity, error = %e, "unparsable register_server payload");
                        RegisterServerResponse { success: false }
                    }
                };
                serde_json::to_string(&response)?
            }
            RpcId::CreateMatch => serde_json::to_string(&self.create_match().await)?,
            RpcId::FetchJob => serde_json::to_string(&self.fetch_job(identity)?)?,
        };
        Ok(response)
    }
}
