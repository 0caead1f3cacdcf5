//! Lobby manager: creates lobbies, tracks who is in which, routes traffic.

use std::collections::HashMap;
use std::sync::Arc;

use lobbyforge_protocol::{MatchId, MatchMessage, Presence, UserId};
use lobbyforge_registry::ServerRegistry;

use crate::actor::spawn_lobby;
use crate::{LobbyConfig, LobbyError, LobbyHandle, LobbyInfo, PlayerSender, SessionFlow};

/// Default command channel size for lobby actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Manages all running lobbies and tracks which identity is in which.
///
/// An identity is in at most one lobby at a time.
pub struct LobbyManager {
    registry: Arc<ServerRegistry>,
    config: LobbyConfig,
    lobbies: HashMap<MatchId, LobbyHandle>,
    user_matches: HashMap<UserId, MatchId>,
    next_match_id: u64,
}

impl LobbyManager {
    /// Creates a manager whose lobbies lease servers from `registry` and
    /// start from `config`.
    pub fn new(registry: Arc<ServerRegistry>, config: LobbyConfig) -> Self {
        Self {
            registry,
            config,
            lobbies: HashMap::new(),
            user_matches: HashMap::new(),
            next_match_id: 1,
        }
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Spawns a lobby with the manager's default config.
    pub fn create_match(&mut self) -> MatchId {
        self.create_match_with(self.config.clone())
    }

    /// Spawns a lobby with a specific config.
    pub fn create_match_with(&mut self, config: LobbyConfig) -> MatchId {
        let match_id = MatchId(self.next_match_id);
        self.next_match_id += 1;

        let handle = spawn_lobby(match_id, config, Arc::clone(&self.registry), DEFAULT_CHANNEL_SIZE);
        self.lobbies.insert(match_id, handle);
        tracing::info!(%match_id, "match created");
        match_id
    }

    /// Adds a participant to a lobby.
    pub async fn join(
        &mut self,
        match_id: MatchId,
        presence: Presence,
        sender: PlayerSender,
    ) -> Result<(), LobbyError> {
        let user_id = presence.user_id.clone();
        if let Some(current) = self.user_matches.get(&user_id) {
            return Err(LobbyError::AlreadyInMatch(user_id, *current));
        }

        let handle = self.handle(match_id)?;
        handle.join(presence, sender).await?;
        self.user_matches.insert(user_id, match_id);
        Ok(())
    }

    /// Removes a participant from their lobby, dropping the lobby if that
    /// was the last player.
    pub async fn leave(&mut self, user_id: &UserId) -> Result<(), LobbyError> {
        let match_id = self
            .user_matches
            .get(user_id)
            .copied()
            .ok_or_else(|| LobbyError::NotInMatch(user_id.clone()))?;

        let flow = match self.lobbies.get(&match_id) {
            Some(handle) => match handle.leave(user_id.clone()).await {
                Ok(flow) => flow,
                // The actor is gone, so the lobby is too.
                Err(LobbyError::Unavailable(_)) => SessionFlow::Ended,
                Err(e) => return Err(e),
            },
            None => SessionFlow::Ended,
        };

        self.user_matches.remove(user_id);
        if flow == SessionFlow::Ended {
            self.forget(match_id);
            tracing::info!(%match_id, "match closed after last player left");
        }
        Ok(())
    }

    /// Routes an inbound frame to the sender's lobby.
    pub async fn route_message(&self, message: MatchMessage) -> Result<(), LobbyError> {
        let user_id = &message.sender.user_id;
        let match_id = self
            .user_matches
            .get(user_id)
            .copied()
            .ok_or_else(|| LobbyError::NotInMatch(user_id.clone()))?;
        self.handle(match_id)?.send_message(message).await
    }

    pub async fn signal(&self, match_id: MatchId, data: &str) -> Result<String, LobbyError> {
        self.handle(match_id)?.signal(data).await
    }

    pub async fn match_info(&self, match_id: MatchId) -> Result<LobbyInfo, LobbyError> {
        self.handle(match_id)?.get_info().await
    }

    /// Snapshots every lobby that still answers.
    pub async fn list_matches(&self) -> Vec<LobbyInfo> {
        let mut infos = Vec::with_capacity(self.lobbies.len());
        for handle in self.lobbies.values() {
            if let Ok(info) = handle.get_info().await {
                infos.push(info);
            }
        }
        infos.sort_by_key(|info| info.match_id);
        infos
    }

    /// Tears a lobby down and forgets everyone in it.
    pub async fn terminate(&mut self, match_id: MatchId, grace_seconds: u32) -> Result<(), LobbyError> {
        let handle = self
            .lobbies
            .get(&match_id)
            .cloned()
            .ok_or(LobbyError::NotFound(match_id))?;

        let result = handle.terminate(grace_seconds).await;
        self.forget(match_id);
        tracing::info!(%match_id, "match terminated");
        result
    }

    /// Terminates every lobby.
    pub async fn shutdown(&mut self, grace_seconds: u32) {
        let ids: Vec<MatchId> = self.lobbies.keys().copied().collect();
        for match_id in ids {
            if let Err(e) = self.terminate(match_id, grace_seconds).await {
                tracing::debug!(%match_id, error = %e, "lobby already gone during shutdown");
            }
        }
    }

    pub fn user_match(&self, user_id: &UserId) -> Option<MatchId> {
        self.user_matches.get(user_id).copied()
    }

    pub fn match_count(&self) -> usize {
        self.lobbies.len()
    }

    fn handle(&self, match_id: MatchId) -> Result<&LobbyHandle, LobbyError> {
        self.lobbies
            .get(&match_id)
            .ok_or(LobbyError::NotFound(match_id))
    }

    fn forget(&mut self, match_id: MatchId) {
        self.lobbies.remove(&match_id);
        self.user_matches.retain(|_, id| *id != match_id);
    }
}
