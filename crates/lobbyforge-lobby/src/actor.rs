//! Lobby actor: an isolated Tokio task that owns one [`LobbyMatch`].
//!
//! All mutation of a lobby happens inside its task. The outside world
//! talks to it through a [`LobbyHandle`] (commands over an mpsc channel,
//! replies over oneshot channels), and the tick scheduler drives the
//! state machine at a fixed rate.

use std::collections::HashMap;
use std::sync::Arc;

use lobbyforge_protocol::{MatchId, MatchMessage, Presence, UserId};
use lobbyforge_registry::ServerRegistry;
use tokio::sync::{mpsc, oneshot};

use crate::dispatch::ChannelDispatcher;
use crate::tick::TickScheduler;
use crate::{JoinDecision, LobbyConfig, LobbyError, LobbyMatch, MatchPhase, PlayerSender, SessionFlow};

/// Commands sent to a lobby actor through its channel.
pub(crate) enum LobbyCommand {
    Join {
        presence: Presence,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },

    Leave {
        user_id: UserId,
        reply: oneshot::Sender<Result<SessionFlow, LobbyError>>,
    },

    /// Buffered until the next tick.
    Message { message: MatchMessage },

    Signal {
        data: String,
        reply: oneshot::Sender<String>,
    },

    GetInfo { reply: oneshot::Sender<LobbyInfo> },

    /// Tear down now. Replies once the held server has been released.
    Terminate {
        grace_seconds: u32,
        reply: oneshot::Sender<()>,
    },
}

/// A snapshot of lobby metadata.
#[derive(Debug, Clone)]
pub struct LobbyInfo {
    pub match_id: MatchId,
    pub phase: MatchPhase,
    /// Tracked players, not counting the compute server.
    pub player_count: usize,
    pub max_players: usize,
    pub label: String,
    pub reserved_server: Option<UserId>,
    pub server_joined: bool,
}

/// Handle to a running lobby actor. Cheap to clone.
#[derive(Clone)]
pub struct LobbyHandle {
    match_id: MatchId,
    sender: mpsc::Sender<LobbyCommand>,
}

impl LobbyHandle {
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Asks the lobby to admit `presence`; outbound events for it go to
    /// `sender`.
    pub async fn join(&self, presence: Presence, sender: PlayerSender) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LobbyCommand::Join {
            presence,
            sender,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    /// Removes a participant. Returns [`SessionFlow::Ended`] if that closed
    /// the lobby.
    pub async fn leave(&self, user_id: UserId) -> Result<SessionFlow, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LobbyCommand::Leave {
            user_id,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    /// Queues an inbound frame for the next tick (fire-and-forget).
    pub async fn send_message(&self, message: MatchMessage) -> Result<(), LobbyError> {
        self.send(LobbyCommand::Message { message }).await
    }

    pub async fn signal(&self, data: impl Into<String>) -> Result<String, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LobbyCommand::Signal {
            data: data.into(),
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    pub async fn get_info(&self) -> Result<LobbyInfo, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LobbyCommand::GetInfo { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    pub async fn terminate(&self, grace_seconds: u32) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(LobbyCommand::Terminate {
            grace_seconds,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    /// `true` once the actor task has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, cmd: LobbyCommand) -> Result<(), LobbyError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> LobbyError {
        LobbyError::Unavailable(self.match_id)
    }
}

/// The internal actor state. Runs inside a Tokio task.
struct LobbyActor {
    session: LobbyMatch,
    /// Outbound channels for every connected participant, server included.
    senders: HashMap<UserId, PlayerSender>,
    /// Frames received since the last tick.
    inbox: Vec<MatchMessage>,
    scheduler: TickScheduler,
    receiver: mpsc::Receiver<LobbyCommand>,
}

impl LobbyActor {
    async fn run(mut self) {
        let match_id = self.session.match_id();
        tracing::info!(%match_id, "lobby actor started");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else {
                        // Every handle is gone; nobody can reach this lobby again.
                        let grace = self.session.config().shutdown_grace_seconds;
                        self.session.terminate(grace, &mut ChannelDispatcher::new(&self.senders));
                        break;
                    };
                    if self.handle_command(cmd) == SessionFlow::Ended {
                        break;
                    }
                }
                tick = self.scheduler.wait_for_tick() => {
                    let messages = std::mem::take(&mut self.inbox);
                    let mut dispatcher = ChannelDispatcher::new(&self.senders);
                    if self.session.tick(tick, &messages, &mut dispatcher) == SessionFlow::Ended {
                        break;
                    }
                }
            }
        }

        tracing::info!(%match_id, "lobby actor stopped");
    }

    fn handle_command(&mut self, cmd: LobbyCommand) -> SessionFlow {
        match cmd {
            LobbyCommand::Join {
                presence,
                sender,
                reply,
            } => {
                let _ = reply.send(self.handle_join(presence, sender));
                SessionFlow::Continue
            }
            LobbyCommand::Leave { user_id, reply } => {
                let result = self.handle_leave(user_id);
                let flow = result.as_ref().map_or(SessionFlow::Continue, |flow| *flow);
                let _ = reply.send(result);
                flow
            }
            LobbyCommand::Message { message } => {
                self.inbox.push(message);
                SessionFlow::Continue
            }
            LobbyCommand::Signal { data, reply } => {
                let _ = reply.send(self.session.signal(&data));
                SessionFlow::Continue
            }
            LobbyCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
                SessionFlow::Continue
            }
            LobbyCommand::Terminate {
                grace_seconds,
                reply,
            } => {
                self.session
                    .terminate(grace_seconds, &mut ChannelDispatcher::new(&self.senders));
                let _ = reply.send(());
                SessionFlow::Ended
            }
        }
    }

    fn handle_join(&mut self, presence: Presence, sender: PlayerSender) -> Result<(), LobbyError> {
        let user_id = presence.user_id.clone();
        if self.senders.contains_key(&user_id) {
            return Err(LobbyError::AlreadyInMatch(user_id, self.session.match_id()));
        }
        if let JoinDecision::Reject(reason) = self.session.join_attempt(&presence) {
            tracing::debug!(match_id = %self.session.match_id(), %user_id, %reason, "join rejected");
            return Err(LobbyError::Rejected(reason));
        }

        self.session.join(vec![presence]);
        if !self.session.is_member(&user_id) {
            return Err(LobbyError::Rejected("Match is full".to_string()));
        }
        self.senders.insert(user_id, sender);
        Ok(())
    }

    fn handle_leave(&mut self, user_id: UserId) -> Result<SessionFlow, LobbyError> {
        if !self.session.is_member(&user_id) {
            return Err(LobbyError::NotInMatch(user_id));
        }
        let presence = self
            .session
            .participant(&user_id)
            .map(|p| p.presence.clone())
            .or_else(|| self.session.assigned_server().cloned())
            .ok_or_else(|| LobbyError::NotInMatch(user_id.clone()))?;

        self.senders.remove(&user_id);
        self.inbox.retain(|m| m.sender.user_id != user_id);
        Ok(self.session.leave(&[presence]))
    }

    fn info(&self) -> LobbyInfo {
        LobbyInfo {
            match_id: self.session.match_id(),
            phase: self.session.phase(),
            player_count: self.session.player_count(),
            max_players: self.session.config().effective_max_players(),
            label: self.session.config().label.clone(),
            reserved_server: self.session.reserved_server().cloned(),
            server_joined: self.session.assigned_server().is_some(),
        }
    }
}

/// Spawns a lobby actor task and returns a handle to it.
///
/// `channel_size` bounds the command channel; senders wait when it is
/// full.
pub(crate) fn spawn_lobby(
    match_id: MatchId,
    config: LobbyConfig,
    registry: Arc<ServerRegistry>,
    channel_size: usize,
) -> LobbyHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let jitter = config.tick_jitter;
    let (session, init) = LobbyMatch::init(match_id, config, registry);

    let actor = LobbyActor {
        session,
        senders: HashMap::new(),
        inbox: Vec::new(),
        scheduler: TickScheduler::new(init.tick_rate, jitter),
        receiver: rx,
    };

    tokio::spawn(actor.run());

    LobbyHandle {
        match_id,
        sender: tx,
    }
}
