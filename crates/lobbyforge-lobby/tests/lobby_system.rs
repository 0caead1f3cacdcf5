//! Integration tests for lobby actors driven through the manager.
//!
//! Time is paused; sleeping advances the clock so ticks fire on demand.

use std::sync::Arc;
use std::time::Duration;

use lobbyforge_lobby::{LobbyConfig, LobbyError, LobbyManager, MatchPhase, PlayerSender};
use lobbyforge_protocol::{
    ConnectionId, Envelope, LobbyEvent, MatchId, MatchMessage, OpCode, Presence, ServerAddress,
    UserId,
};
use lobbyforge_registry::{
    LeaseState, RegistryConfig, ServerLease, ServerRegistry, now_millis,
};
use lobbyforge_store::{MemoryStore, StorageBackend};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

fn uid(id: &str) -> UserId {
    UserId::from(id)
}

fn presence(id: &str) -> Presence {
    Presence::new(id, ConnectionId::new(1))
}

fn ready(id: &str) -> MatchMessage {
    MatchMessage::new(presence(id), OpCode::PlayerReady)
}

fn setup(servers: &[&str]) -> (Arc<MemoryStore>, Arc<ServerRegistry>, LobbyManager) {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ServerRegistry::new(store.clone(), RegistryConfig::default()));
    for (i, server) in servers.iter().enumerate() {
        registry
            .heartbeat(&uid(server), ServerAddress::new("10.0.0.1", 7000 + i as u16))
            .unwrap();
    }
    let manager = LobbyManager::new(registry.clone(), LobbyConfig::default());
    (store, registry, manager)
}

fn channel() -> (PlayerSender, mpsc::UnboundedReceiver<Envelope>) {
    mpsc::unbounded_channel()
}

/// Creates a dummy sender whose receiver is dropped immediately.
fn dummy_sender() -> PlayerSender {
    channel().0
}

/// Lets `n` one-second ticks elapse.
async fn ticks(n: u64) {
    tokio::time::sleep(Duration::from_millis(n * 1_000 + 100)).await;
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Vec<LobbyEvent> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope.event);
    }
    events
}

fn game_started_count(events: &[LobbyEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, LobbyEvent::GameStarted { .. }))
        .count()
}

// =========================================================================
// Match start
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_two_ready_players_and_server_start_game_once() {
    let (_, registry, mut manager) = setup(&["srv-a"]);
    let match_id = manager.create_match();
    let (alice_tx, mut alice_rx) = channel();
    let (bob_tx, mut bob_rx) = channel();

    manager.join(match_id, presence("alice"), alice_tx).await.unwrap();
    manager.join(match_id, presence("bob"), bob_tx).await.unwrap();
    manager.route_message(ready("alice")).await.unwrap();
    manager.route_message(ready("bob")).await.unwrap();
    ticks(1).await;

    // The server discovers its job and joins the lobby.
    let job = registry.poll_job(&uid("srv-a")).unwrap().unwrap();
    assert_eq!(job.match_id, match_id);
    let (srv_tx, mut srv_rx) = channel();
    manager.join(match_id, presence("srv-a"), srv_tx).await.unwrap();
    ticks(3).await;

    let info = manager.match_info(match_id).await.unwrap();
    assert_eq!(info.phase, MatchPhase::GameStarted);
    assert_eq!(info.player_count, 2);
    assert!(info.server_joined);

    assert_eq!(game_started_count(&drain(&mut alice_rx)), 1);
    assert_eq!(game_started_count(&drain(&mut bob_rx)), 1);
    assert_eq!(
        drain(&mut srv_rx),
        vec![LobbyEvent::GameStarted {
            match_id,
            server_id: uid("srv-a"),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_not_all_ready_waits_for_players() {
    let (_, registry, mut manager) = setup(&["srv-a"]);
    let match_id = manager.create_match();
    manager.join(match_id, presence("alice"), dummy_sender()).await.unwrap();
    manager.join(match_id, presence("bob"), dummy_sender()).await.unwrap();
    manager.route_message(ready("alice")).await.unwrap();
    ticks(3).await;

    let info = manager.match_info(match_id).await.unwrap();
    assert_eq!(info.reserved_server, None);
    let lease = registry.lease(&uid("srv-a")).unwrap().unwrap();
    assert_eq!(lease.state, LeaseState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_join_rejected_after_game_started() {
    let (_, registry, mut manager) = setup(&["srv-a"]);
    let match_id = manager.create_match();
    manager.join(match_id, presence("alice"), dummy_sender()).await.unwrap();
    manager.join(match_id, presence("bob"), dummy_sender()).await.unwrap();
    manager.route_message(ready("alice")).await.unwrap();
    manager.route_message(ready("bob")).await.unwrap();
    ticks(1).await;
    registry.poll_job(&uid("srv-a")).unwrap();
    manager.join(match_id, presence("srv-a"), dummy_sender()).await.unwrap();
    ticks(1).await;

    let err = manager
        .join(match_id, presence("carol"), dummy_sender())
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::Rejected(reason) if reason == "Match already started"));
    assert_eq!(manager.user_match(&uid("carol")), None);
}

// =========================================================================
// Admission
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_full_lobby_rejects_join() {
    let (_, _, mut manager) = setup(&[]);
    let match_id = manager.create_match();
    for i in 0..4 {
        manager
            .join(match_id, presence(&format!("p{i}")), dummy_sender())
            .await
            .unwrap();
    }

    let err = manager
        .join(match_id, presence("p4"), dummy_sender())
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::Rejected(reason) if reason == "Match is full"));
}

#[tokio::test(start_paused = true)]
async fn test_user_in_one_match_at_a_time() {
    let (_, _, mut manager) = setup(&[]);
    let first = manager.create_match();
    let second = manager.create_match();
    manager.join(first, presence("alice"), dummy_sender()).await.unwrap();

    let err = manager
        .join(second, presence("alice"), dummy_sender())
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::AlreadyInMatch(_, id) if id == first));
}

#[tokio::test(start_paused = true)]
async fn test_join_unknown_match_not_found() {
    let (_, _, mut manager) = setup(&[]);
    let err = manager
        .join(MatchId(999), presence("alice"), dummy_sender())
        .await
        .unwrap_err();
    assert!(matches!(err, LobbyError::NotFound(MatchId(999))));
}

#[tokio::test(start_paused = true)]
async fn test_message_from_non_member_not_routed() {
    let (_, _, manager) = setup(&[]);
    let err = manager.route_message(ready("ghost")).await.unwrap_err();
    assert!(matches!(err, LobbyError::NotInMatch(_)));
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_last_leave_destroys_match_and_frees_server() {
    let (store, registry, mut manager) = setup(&[]);
    let config = RegistryConfig::default();
    let old = now_millis() - 10_000;
    store
        .write(
            &config.servers_collection,
            "srv-a",
            &config.owner,
            serde_json::to_value(ServerLease::new(
                uid("srv-a"),
                ServerAddress::new("10.0.0.1", 7000),
                old,
            ))
            .unwrap(),
            None,
        )
        .unwrap();

    let match_id = manager.create_match_with(LobbyConfig {
        min_players: 1,
        ..LobbyConfig::default()
    });
    manager.join(match_id, presence("solo"), dummy_sender()).await.unwrap();
    manager.route_message(ready("solo")).await.unwrap();
    ticks(1).await;
    assert_eq!(
        registry.lease(&uid("srv-a")).unwrap().unwrap().state,
        LeaseState::InUse
    );

    manager.leave(&uid("solo")).await.unwrap();

    assert_eq!(manager.match_count(), 0);
    assert_eq!(manager.user_match(&uid("solo")), None);
    let lease = registry.lease(&uid("srv-a")).unwrap().unwrap();
    assert_eq!(lease.state, LeaseState::Ready);
    assert!(lease.heartbeat_at > old);
    assert_eq!(registry.poll_job(&uid("srv-a")).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_leave_keeps_match_while_players_remain() {
    let (_, _, mut manager) = setup(&[]);
    let match_id = manager.create_match();
    manager.join(match_id, presence("alice"), dummy_sender()).await.unwrap();
    manager.join(match_id, presence("bob"), dummy_sender()).await.unwrap();

    manager.leave(&uid("alice")).await.unwrap();

    assert_eq!(manager.match_count(), 1);
    assert_eq!(manager.match_info(match_id).await.unwrap().player_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_terminate_announces_grace_and_releases_server() {
    let (_, registry, mut manager) = setup(&["srv-a"]);
    let match_id = manager.create_match();
    let (alice_tx, mut alice_rx) = channel();
    manager.join(match_id, presence("alice"), alice_tx).await.unwrap();
    manager.join(match_id, presence("bob"), dummy_sender()).await.unwrap();
    manager.route_message(ready("alice")).await.unwrap();
    manager.route_message(ready("bob")).await.unwrap();
    ticks(1).await;

    manager.terminate(match_id, 15).await.unwrap();

    assert_eq!(
        drain(&mut alice_rx).last(),
        Some(&LobbyEvent::ShuttingDown {
            grace_seconds: 15,
            message: "Server shutting down in 15 seconds.".into(),
        })
    );
    let lease = registry.lease(&uid("srv-a")).unwrap().unwrap();
    assert_eq!(lease.state, LeaseState::Ready);
    assert_eq!(manager.match_count(), 0);
    assert_eq!(manager.user_match(&uid("alice")), None);
}

#[tokio::test(start_paused = true)]
async fn test_terminate_unknown_match_not_found() {
    let (_, _, mut manager) = setup(&[]);
    let err = manager.terminate(MatchId(42), 5).await.unwrap_err();
    assert!(matches!(err, LobbyError::NotFound(MatchId(42))));
}

// =========================================================================
// Misc
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_signal_echoes_data() {
    let (_, _, mut manager) = setup(&[]);
    let match_id = manager.create_match();
    let reply = manager.signal(match_id, "hello").await.unwrap();
    assert_eq!(reply, "Lobby match signal received: hello");
}

#[tokio::test(start_paused = true)]
async fn test_list_matches_in_id_order() {
    let (_, _, mut manager) = setup(&[]);
    let a = manager.create_match();
    let b = manager.create_match();

    let ids: Vec<MatchId> = manager
        .list_matches()
        .await
        .into_iter()
        .map(|info| info.match_id)
        .collect();
    assert_eq!(ids, vec![a, b]);
}

#[tokio::test(start_paused = true)]
async fn test_get_all_presences_reaches_everyone() {
    let (_, _, mut manager) = setup(&[]);
    let match_id = manager.create_match();
    let (alice_tx, mut alice_rx) = channel();
    let (bob_tx, mut bob_rx) = channel();
    manager.join(match_id, presence("alice"), alice_tx).await.unwrap();
    manager.join(match_id, presence("bob"), bob_tx).await.unwrap();

    manager
        .route_message(MatchMessage::new(presence("alice"), OpCode::GetAllPresences))
        .await
        .unwrap();
    ticks(1).await;

    for rx in [&mut alice_rx, &mut bob_rx] {
        let events = drain(rx);
        assert!(matches!(
            events.as_slice(),
            [LobbyEvent::Presences { presences }] if presences.len() == 2
        ));
    }
}
