//! Runs a whole lobby round in one process.
//!
//! Two simulated compute servers heartbeat and poll for jobs, two players
//! open a lobby and mark themselves ready, and the run ends once the game
//! starts. Set `RUST_LOG=debug` to watch the lobby tick.

use std::sync::Arc;
use std::time::Duration;

use lobbyforge::prelude::*;
use lobbyforge::protocol::{Codec, JsonCodec};
use lobbyforge::{CreateMatchResponse, FetchJobResponse, RegisterServerRequest};
use tokio::sync::mpsc;

const TICK_RATE: u32 = 4;
const SERVER_POLL: Duration = Duration::from_millis(500);

/// A compute server: heartbeats until it gets a job, then joins that
/// lobby and waits for the game to start.
async fn compute_server(service: Arc<LobbyService>, id: &'static str, port: u16) {
    let identity = UserId::from(id);
    let register = format!(r#"{{"ip":"127.0.0.1","port":{port}}}"#);
    let mut interval = tokio::time::interval(SERVER_POLL);

    let job = loop {
        interval.tick().await;
        if let Err(e) = service.handle_rpc("register_server", &identity, &register).await {
            tracing::warn!(server_id = id, error = %e, "heartbeat rpc failed");
            continue;
        }
        match service.fetch_job(&identity) {
            Ok(FetchJobResponse { job: Some(job) }) => break job,
            Ok(_) => {}
            Err(e) => tracing::warn!(server_id = id, error = %e, "job poll failed"),
        }
    };

    tracing::info!(server_id = id, match_id = %job.match_id, "picked up job");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let joined = service
        .lobbies()
        .lock()
        .await
        .join(job.match_id, Presence::new(id, ConnectionId::new(port as u64)), tx)
        .await;
    if let Err(e) = joined {
        tracing::warn!(server_id = id, error = %e, "could not join assigned lobby");
        return;
    }

    // Keep the lease alive while hosting.
    loop {
        tokio::select! {
            envelope = rx.recv() => match envelope {
                Some(envelope) if envelope.op_code == OpCode::GameStarted.code() => {
                    tracing::info!(server_id = id, "hosting match");
                }
                Some(_) => {}
                None => break,
            },
            _ = interval.tick() => {
                service.register_server(
                    &identity,
                    RegisterServerRequest { ip: "127.0.0.1".into(), port },
                );
            }
        }
    }
}

/// Prints everything a player receives until the game starts. Returns
/// `false` if the lobby went away first.
async fn wait_for_start(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Result<bool, LobbyforgeError> {
    let codec = JsonCodec;
    while let Some(envelope) = rx.recv().await {
        let bytes = codec.encode(&envelope)?;
        println!("alice <- {}", String::from_utf8_lossy(&bytes));
        if envelope.op_code == OpCode::GameStarted.code() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    lobbyforge::init_tracing();

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ServerRegistry::new(store, RegistryConfig::default()));
    let service = Arc::new(LobbyService::new(
        registry,
        LobbyConfig {
            tick_rate: TICK_RATE,
            ..LobbyConfig::default()
        },
    ));

    for (id, port) in [("srv-1", 7001), ("srv-2", 7002)] {
        tokio::spawn(compute_server(Arc::clone(&service), id, port));
    }

    let created = service.handle_rpc("create_match", &UserId::from("alice"), "").await?;
    let CreateMatchResponse { match_id } = serde_json::from_str(&created)?;

    let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
    {
        let mut lobbies = service.lobbies().lock().await;
        lobbies
            .join(match_id, Presence::new("alice", ConnectionId::new(1)), alice_tx)
            .await?;
        lobbies
            .join(match_id, Presence::new("bob", ConnectionId::new(2)), mpsc::unbounded_channel().0)
            .await?;
        for (player, conn) in [("alice", 1), ("bob", 2)] {
            let sender = Presence::new(player, ConnectionId::new(conn));
            lobbies
                .route_message(MatchMessage::new(sender, OpCode::PlayerReady))
                .await?;
        }
        lobbies
            .route_message(MatchMessage::new(
                Presence::new("alice", ConnectionId::new(1)),
                OpCode::GetAllPresences,
            ))
            .await?;
    }

    let started = tokio::time::timeout(Duration::from_secs(10), wait_for_start(&mut alice_rx)).await;

    match started {
        Ok(Ok(true)) => println!("game started in {match_id}"),
        Ok(Ok(false)) => println!("lobby {match_id} closed before the game started"),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => println!("timed out waiting for {match_id} to start"),
    }

    service.lobbies().lock().await.shutdown(0).await;
    for lease in service.registry().leases()? {
        println!("{} {:?} at {}", lease.server_id, lease.state, lease.address);
    }
    Ok(())
}
