//! The lobby session state machine.
//!
//! A [`LobbyMatch`] is the in-memory state of one lobby: who is present,
//! who is ready, which compute server it holds, and which phase it is in.
//! The host drives it through lifecycle hooks, always from a single task:
//!
//! ```text
//! init → (join_attempt → join)* → tick* → leave* / terminate
//! ```
//!
//! On every tick the session first routes the buffered inbound messages,
//! then advances: once enough players are present and all of them are
//! ready it leases a server from the registry, and once that server joins
//! it starts the game.

use std::collections::BTreeMap;
use std::sync::Arc;

use lobbyforge_protocol::{
    LobbyEvent, MatchId, MatchMessage, Presence, PresenceSummary, Recipient, UserId,
};
use lobbyforge_registry::{ServerLease, ServerRegistry};

use crate::router::route_message;
use crate::{Dispatcher, LobbyConfig, MatchPhase, Readiness};

/// What the host needs to know after a lobby is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchInit {
    /// Effective tick rate in Hz.
    pub tick_rate: u32,
    pub label: String,
}

/// Outcome of a join attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinDecision {
    Accept,
    /// Refused, with the reason shown to the client.
    Reject(String),
}

impl JoinDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Whether the host should keep the lobby running after a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlow {
    Continue,
    Ended,
}

/// One tracked player.
#[derive(Debug, Clone)]
pub struct Participant {
    pub presence: Presence,
    pub readiness: Readiness,
}

/// In-memory state of one lobby.
pub struct LobbyMatch {
    match_id: MatchId,
    config: LobbyConfig,
    registry: Arc<ServerRegistry>,
    phase: MatchPhase,
    /// Players only; the compute server is tracked in `assigned_server`.
    presences: BTreeMap<UserId, Participant>,
    /// Set once the reserved server has joined.
    assigned_server: Option<Presence>,
    /// The leased server. Set at most once.
    reserved_server: Option<UserId>,
    lease_released: bool,
}

impl LobbyMatch {
    /// Creates a lobby in `WaitingForPlayers`.
    pub fn init(
        match_id: MatchId,
        config: LobbyConfig,
        registry: Arc<ServerRegistry>,
    ) -> (Self, MatchInit) {
        let init = MatchInit {
            tick_rate: config.effective_tick_rate(),
            label: config.label.clone(),
        };
        tracing::debug!(
            %match_id,
            min_players = config.effective_min_players(),
            max_players = config.effective_max_players(),
            tick_rate = init.tick_rate,
            "lobby initialised"
        );
        let session = Self {
            match_id,
            config,
            registry,
            phase: MatchPhase::WaitingForPlayers,
            presences: BTreeMap::new(),
            assigned_server: None,
            reserved_server: None,
            lease_released: false,
        };
        (session, init)
    }

    // -----------------------------------------------------------------------
    // Lifecycle hooks
    // -----------------------------------------------------------------------

    /// Decides whether `presence` may join.
    ///
    /// The reserved server is always admitted. Players are admitted only
    /// while waiting and while there is room.
    pub fn join_attempt(&self, presence: &Presence) -> JoinDecision {
        if self.is_reserved_server(&presence.user_id) {
            return JoinDecision::Accept;
        }
        if !self.phase.is_joinable() {
            return JoinDecision::Reject("Match already started".to_string());
        }
        if self.presences.len() >= self.config.effective_max_players() {
            return JoinDecision::Reject("Match is full".to_string());
        }
        JoinDecision::Accept
    }

    /// Commits accepted joins.
    ///
    /// The reserved server becomes the assigned server; anyone else is
    /// tracked as a player, not ready. A player commit that would exceed
    /// the player cap is dropped.
    pub fn join(&mut self, presences: Vec<Presence>) {
        for presence in presences {
            let user_id = presence.user_id.clone();

            if self.is_reserved_server(&user_id) {
                tracing::info!(match_id = %self.match_id, server_id = %user_id, "server joined");
                self.assigned_server = Some(presence);
                continue;
            }

            if !self.presences.contains_key(&user_id)
                && self.presences.len() >= self.config.effective_max_players()
            {
                tracing::warn!(
                    match_id = %self.match_id,
                    %user_id,
                    max_players = self.config.effective_max_players(),
                    "join commit over capacity, dropping"
                );
                continue;
            }

            self.presences.insert(
                user_id.clone(),
                Participant {
                    presence,
                    readiness: Readiness::NotReady,
                },
            );
            tracing::info!(
                match_id = %self.match_id,
                %user_id,
                players = self.presences.len(),
                "player joined"
            );
        }
    }

    /// Removes departing participants.
    ///
    /// Returns [`SessionFlow::Ended`] once no players are left, after
    /// releasing the held server.
    pub fn leave(&mut self, presences: &[Presence]) -> SessionFlow {
        for presence in presences {
            let user_id = &presence.user_id;

            if self
                .assigned_server
                .as_ref()
                .is_some_and(|server| &server.user_id == user_id)
            {
                self.assigned_server = None;
                tracing::info!(match_id = %self.match_id, server_id = %user_id, "server left");
                continue;
            }

            if self.presences.remove(user_id).is_some() {
                tracing::info!(
                    match_id = %self.match_id,
                    %user_id,
                    players = self.presences.len(),
                    "player left"
                );
            } else {
                tracing::debug!(match_id = %self.match_id, %user_id, "leave from non-member ignored");
            }
        }

        if self.presences.is_empty() {
            tracing::info!(match_id = %self.match_id, "last player left, closing lobby");
            self.close();
            return SessionFlow::Ended;
        }
        SessionFlow::Continue
    }

    /// Runs one tick: routes `messages` in order, then advances the state.
    pub fn tick(
        &mut self,
        tick: u64,
        messages: &[MatchMessage],
        dispatcher: &mut impl Dispatcher,
    ) -> SessionFlow {
        if self.phase.is_ended() {
            return SessionFlow::Ended;
        }

        for message in messages {
            route_message(self, message, dispatcher);
        }

        if self.phase == MatchPhase::WaitingForPlayers {
            self.advance(tick, dispatcher);
        }
        SessionFlow::Continue
    }

    /// Acknowledges an out-of-band signal.
    pub fn signal(&mut self, data: &str) -> String {
        tracing::debug!(match_id = %self.match_id, %data, "signal received");
        format!("Lobby match signal received: {data}")
    }

    /// Tears the lobby down from any phase.
    ///
    /// Releases the held server, then tells everyone the lobby is going
    /// away in `grace_seconds`.
    pub fn terminate(&mut self, grace_seconds: u32, dispatcher: &mut impl Dispatcher) {
        tracing::info!(match_id = %self.match_id, phase = %self.phase, grace_seconds, "lobby terminating");
        self.close();
        dispatcher.send(
            Recipient::All,
            LobbyEvent::ShuttingDown {
                grace_seconds,
                message: format!("Server shutting down in {grace_seconds} seconds."),
            },
        );
    }

    // -----------------------------------------------------------------------
    // State advance
    // -----------------------------------------------------------------------

    fn advance(&mut self, tick: u64, dispatcher: &mut impl Dispatcher) {
        if self.presences.is_empty()
            || self.presences.len() < self.config.effective_min_players()
            || !self.all_ready()
        {
            return;
        }

        if let Some(server) = &self.assigned_server {
            let server_id = server.user_id.clone();
            if !self.transition_to(MatchPhase::GameStarted) {
                return;
            }
            tracing::info!(match_id = %self.match_id, %server_id, tick, "game started");
            dispatcher.send(
                Recipient::All,
                LobbyEvent::GameStarted {
                    match_id: self.match_id,
                    server_id,
                },
            );
            return;
        }

        if self.reserved_server.is_some() {
            return;
        }

        match self.registry.acquire(self.match_id) {
            Ok(Some(server_id)) => {
                tracing::info!(match_id = %self.match_id, %server_id, tick, "server reserved");
                self.reserved_server = Some(server_id);
            }
            Ok(None) => {
                tracing::debug!(match_id = %self.match_id, tick, "no server yet, retrying next tick");
            }
            Err(e) => {
                tracing::warn!(match_id = %self.match_id, tick, error = %e, "server allocation failed");
            }
        }
    }

    /// Ends the lobby and releases the held server, at most once.
    fn close(&mut self) {
        self.transition_to(MatchPhase::GameEnded);

        if self.lease_released {
            return;
        }
        let Some(server_id) = &self.reserved_server else {
            return;
        };
        self.lease_released = true;
        if let Err(e) = self.registry.release(server_id) {
            tracing::warn!(match_id = %self.match_id, %server_id, error = %e, "failed to release server");
        }
    }

    /// Moves to `target` if it lies ahead of the current phase. Returns
    /// `false`, leaving the phase alone, otherwise.
    fn transition_to(&mut self, target: MatchPhase) -> bool {
        if !self.phase.can_transition_to(target) {
            tracing::debug!(match_id = %self.match_id, from = %self.phase, to = %target, "phase change ignored");
            return false;
        }
        tracing::debug!(match_id = %self.match_id, from = %self.phase, to = %target, "phase changed");
        self.phase = target;
        true
    }

    fn all_ready(&self) -> bool {
        self.presences.values().all(|p| p.readiness.is_ready())
    }

    fn is_reserved_server(&self, user_id: &UserId) -> bool {
        self.reserved_server.as_ref() == Some(user_id)
    }

    // -----------------------------------------------------------------------
    // Used by the message router
    // -----------------------------------------------------------------------

    /// Updates a tracked player's readiness. Returns `false` if `user_id`
    /// is not a tracked player.
    pub(crate) fn set_readiness(&mut self, user_id: &UserId, readiness: Readiness) -> bool {
        match self.presences.get_mut(user_id) {
            Some(participant) => {
                participant.readiness = readiness;
                true
            }
            None => false,
        }
    }

    pub(crate) fn presence_summaries(&self) -> Vec<PresenceSummary> {
        self.presences
            .values()
            .map(|p| PresenceSummary {
                user_id: p.presence.user_id.clone(),
                peer_id: p.presence.peer_id,
            })
            .collect()
    }

    /// Looks up the reserved server's lease.
    pub(crate) fn reserved_lease(&self) -> Option<ServerLease> {
        let server_id = self.reserved_server.as_ref()?;
        match self.registry.lease(server_id) {
            Ok(lease) => lease,
            Err(e) => {
                tracing::warn!(match_id = %self.match_id, %server_id, error = %e, "server lookup failed");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    /// Number of tracked players (the compute server is not counted).
    pub fn player_count(&self) -> usize {
        self.presences.len()
    }

    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.presences.get(user_id)
    }

    pub fn readiness(&self, user_id: &UserId) -> Option<Readiness> {
        self.presences.get(user_id).map(|p| p.readiness)
    }

    pub fn reserved_server(&self) -> Option<&UserId> {
        self.reserved_server.as_ref()
    }

    pub fn assigned_server(&self) -> Option<&Presence> {
        self.assigned_server.as_ref()
    }

    /// `true` if `user_id` is a tracked player or the joined server.
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.presences.contains_key(user_id)
            || self
                .assigned_server
                .as_ref()
                .is_some_and(|server| &server.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyforge_protocol::{ConnectionId, OpCode, ServerAddress};
    use lobbyforge_registry::{LeaseState, RegistryConfig};
    use lobbyforge_store::MemoryStore;

    type Sent = Vec<(Recipient, LobbyEvent)>;

    fn presence(id: &str) -> Presence {
        Presence::new(id, ConnectionId::new(1))
    }

    fn registry_with(servers: &[&str]) -> Arc<ServerRegistry> {
        let registry = ServerRegistry::new(Arc::new(MemoryStore::new()), RegistryConfig::default());
        for (i, server) in servers.iter().enumerate() {
            registry
                .heartbeat(&UserId::from(*server), ServerAddress::new("10.0.0.1", 7000 + i as u16))
                .unwrap();
        }
        Arc::new(registry)
    }

    fn lobby(registry: Arc<ServerRegistry>) -> LobbyMatch {
        LobbyMatch::init(MatchId(1), LobbyConfig::default(), registry).0
    }

    fn ready(id: &str) -> MatchMessage {
        MatchMessage::new(presence(id), OpCode::PlayerReady)
    }

    #[test]
    fn test_init_reports_defaults() {
        let (session, init) = LobbyMatch::init(MatchId(7), LobbyConfig::default(), registry_with(&[]));
        assert_eq!(init.tick_rate, 1);
        assert_eq!(init.label, "");
        assert_eq!(session.phase(), MatchPhase::WaitingForPlayers);
        assert_eq!(session.player_count(), 0);
    }

    #[test]
    fn test_join_attempt_rejects_when_full() {
        let mut session = lobby(registry_with(&[]));
        session.join((0..4).map(|i| presence(&format!("p{i}"))).collect());

        assert_eq!(
            session.join_attempt(&presence("late")),
            JoinDecision::Reject("Match is full".into())
        );
    }

    #[test]
    fn test_join_commit_never_exceeds_capacity() {
        let mut session = lobby(registry_with(&[]));
        session.join((0..6).map(|i| presence(&format!("p{i}"))).collect());
        assert_eq!(session.player_count(), 4);
    }

    #[test]
    fn test_join_tracks_player_not_ready() {
        let mut session = lobby(registry_with(&[]));
        session.join(vec![presence("alice")]);
        assert_eq!(session.readiness(&UserId::from("alice")), Some(Readiness::NotReady));
    }

    #[test]
    fn test_all_ready_reserves_server_once() {
        let registry = registry_with(&["srv-a", "srv-b"]);
        let mut session = lobby(registry.clone());
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);

        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);
        assert_eq!(session.reserved_server(), Some(&UserId::from("srv-a")));

        session.tick(2, &[], &mut sent);
        assert_eq!(session.reserved_server(), Some(&UserId::from("srv-a")));
        let srv_b = registry.lease(&UserId::from("srv-b")).unwrap().unwrap();
        assert_eq!(srv_b.state, LeaseState::Ready);
    }

    #[test]
    fn test_below_min_players_does_not_reserve() {
        let mut session = lobby(registry_with(&["srv-a"]));
        let mut sent = Sent::new();
        session.join(vec![presence("alice")]);

        session.tick(1, &[ready("alice")], &mut sent);
        assert_eq!(session.reserved_server(), None);
    }

    #[test]
    fn test_no_server_available_retries_next_tick() {
        let registry = registry_with(&[]);
        let mut session = lobby(registry.clone());
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);

        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);
        assert_eq!(session.reserved_server(), None);

        registry
            .heartbeat(&UserId::from("srv-late"), ServerAddress::new("10.0.0.9", 7000))
            .unwrap();
        session.tick(2, &[], &mut sent);
        assert_eq!(session.reserved_server(), Some(&UserId::from("srv-late")));
    }

    #[test]
    fn test_reserved_server_admitted_even_when_full() {
        let mut session = lobby(registry_with(&["srv-a"]));
        let mut sent = Sent::new();
        let players: Vec<_> = (0..4).map(|i| presence(&format!("p{i}"))).collect();
        let readies: Vec<_> = (0..4).map(|i| ready(&format!("p{i}"))).collect();
        session.join(players);
        session.tick(1, &readies, &mut sent);

        assert!(session.join_attempt(&presence("srv-a")).is_accepted());
        session.join(vec![presence("srv-a")]);
        assert_eq!(session.player_count(), 4);
        assert!(session.assigned_server().is_some());
    }

    #[test]
    fn test_game_starts_once_server_joins() {
        let mut session = lobby(registry_with(&["srv-a"]));
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);
        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);
        session.join(vec![presence("srv-a")]);

        session.tick(2, &[], &mut sent);
        session.tick(3, &[], &mut sent);

        assert_eq!(session.phase(), MatchPhase::GameStarted);
        let started = sent
            .iter()
            .filter(|(_, e)| matches!(e, LobbyEvent::GameStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[test]
    fn test_join_attempt_rejected_after_start() {
        let mut session = lobby(registry_with(&["srv-a"]));
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);
        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);
        session.join(vec![presence("srv-a")]);
        session.tick(2, &[], &mut sent);
        session.leave(&[presence("bob")]);

        assert_eq!(
            session.join_attempt(&presence("carol")),
            JoinDecision::Reject("Match already started".into())
        );
        assert!(session.join_attempt(&presence("srv-a")).is_accepted());
    }

    #[test]
    fn test_server_leave_clears_assignment_keeps_reservation() {
        let mut session = lobby(registry_with(&["srv-a"]));
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);
        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);
        session.join(vec![presence("srv-a")]);

        assert_eq!(session.leave(&[presence("srv-a")]), SessionFlow::Continue);
        assert!(session.assigned_server().is_none());
        assert_eq!(session.reserved_server(), Some(&UserId::from("srv-a")));
    }

    #[test]
    fn test_last_leave_ends_and_releases_lease() {
        let registry = registry_with(&["srv-a"]);
        let mut session = lobby(registry.clone());
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);
        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);

        assert_eq!(session.leave(&[presence("alice")]), SessionFlow::Continue);
        assert_eq!(session.leave(&[presence("bob")]), SessionFlow::Ended);

        let lease = registry.lease(&UserId::from("srv-a")).unwrap().unwrap();
        assert_eq!(lease.state, LeaseState::Ready);
        assert_eq!(session.tick(2, &[], &mut sent), SessionFlow::Ended);
    }

    #[test]
    fn test_terminate_broadcasts_grace_and_releases() {
        let registry = registry_with(&["srv-a"]);
        let mut session = lobby(registry.clone());
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);
        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);

        session.terminate(30, &mut sent);

        assert_eq!(session.phase(), MatchPhase::GameEnded);
        assert_eq!(
            sent.last(),
            Some(&(
                Recipient::All,
                LobbyEvent::ShuttingDown {
                    grace_seconds: 30,
                    message: "Server shutting down in 30 seconds.".into(),
                }
            ))
        );
        let lease = registry.lease(&UserId::from("srv-a")).unwrap().unwrap();
        assert_eq!(lease.state, LeaseState::Ready);
    }

    #[test]
    fn test_lease_released_at_most_once() {
        let registry = registry_with(&["srv-a"]);
        let mut session = lobby(registry.clone());
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);
        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);
        session.terminate(0, &mut sent);

        // Another lobby claims the server; a second close must not free it.
        assert_eq!(registry.acquire(MatchId(2)).unwrap(), Some(UserId::from("srv-a")));
        session.leave(&[presence("alice"), presence("bob")]);

        let lease = registry.lease(&UserId::from("srv-a")).unwrap().unwrap();
        assert_eq!(lease.state, LeaseState::InUse);
    }

    #[test]
    fn test_signal_echoes_payload() {
        let mut session = lobby(registry_with(&[]));
        assert_eq!(session.signal("ping"), "Lobby match signal received: ping");
    }

    #[test]
    fn test_empty_lobby_never_leases_with_zero_quorum() {
        let registry = registry_with(&["srv-a"]);
        let config = LobbyConfig {
            min_players: 0,
            ..LobbyConfig::default()
        };
        let mut session = LobbyMatch::init(MatchId(1), config, registry.clone()).0;
        let mut sent = Sent::new();

        session.tick(1, &[], &mut sent);
        session.tick(2, &[], &mut sent);

        assert_eq!(session.reserved_server(), None);
        let lease = registry.lease(&UserId::from("srv-a")).unwrap().unwrap();
        assert_eq!(lease.state, LeaseState::Ready);
    }

    #[test]
    fn test_quorum_above_cap_still_starts_when_full() {
        let config = LobbyConfig {
            min_players: 5,
            max_players: 2,
            ..LobbyConfig::default()
        };
        let mut session = LobbyMatch::init(MatchId(1), config, registry_with(&["srv-a"])).0;
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);
        assert!(!session.join_attempt(&presence("carol")).is_accepted());

        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);
        assert_eq!(session.reserved_server(), Some(&UserId::from("srv-a")));
        session.join(vec![presence("srv-a")]);
        session.tick(2, &[], &mut sent);
        assert_eq!(session.phase(), MatchPhase::GameStarted);
    }

    #[test]
    fn test_ended_lobby_never_moves_back() {
        let mut session = lobby(registry_with(&["srv-a"]));
        let mut sent = Sent::new();
        session.join(vec![presence("alice"), presence("bob")]);
        session.tick(1, &[ready("alice"), ready("bob")], &mut sent);
        session.terminate(0, &mut sent);

        // The reserved server turning up late must not restart the game.
        session.join(vec![presence("srv-a")]);
        session.advance(2, &mut sent);

        assert_eq!(session.phase(), MatchPhase::GameEnded);
        assert!(!sent.iter().any(|(_, e)| matches!(e, LobbyEvent::GameStarted { .. })));
    }
}
