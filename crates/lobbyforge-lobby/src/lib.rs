//! Lobby sessions for Lobbyforge.
//!
//! Each lobby runs as an isolated Tokio task (actor model) that owns one
//! [`LobbyMatch`] state machine and ticks it at a fixed rate.
//!
//! # Key types
//!
//! - [`LobbyMatch`]: presence, readiness and match-start state machine
//! - [`LobbyManager`]: creates lobbies, routes participants to them
//! - [`LobbyHandle`]: send commands to a running lobby actor
//! - [`Dispatcher`]: where a lobby's outbound events go
//! - [`LobbyConfig`] / [`MatchPhase`]: settings and lifecycle

mod actor;
mod config;
mod dispatch;
mod error;
mod manager;
mod router;
mod session;
mod tick;

pub use actor::{LobbyHandle, LobbyInfo};
pub use config::{LobbyConfig, MatchPhase, Readiness};
pub use dispatch::{Dispatcher, PlayerSender};
pub use error::LobbyError;
pub use manager::LobbyManager;
pub use session::{JoinDecision, LobbyMatch, MatchInit, Participant, SessionFlow};
pub use tick::TickScheduler;
