//! Lobby configuration, match phases and participant readiness.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LobbyConfig
// ---------------------------------------------------------------------------

/// Configuration for a lobby session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// Participants required before the lobby asks for a server. Raised
    /// to 1 and capped at the effective maximum.
    pub min_players: usize,

    /// Maximum participants admitted. The compute server is not counted.
    /// Raised to 1.
    pub max_players: usize,

    /// Tick rate in Hz. Clamped to `1..=MAX_TICK_RATE`.
    pub tick_rate: u32,

    /// Label reported to the host on init.
    pub label: String,

    /// Grace period announced to participants when the lobby is
    /// terminated.
    pub shutdown_grace_seconds: u32,

    /// Upper bound of the random delay before the first tick.
    pub tick_jitter: Duration,
}

impl LobbyConfig {
    pub const MAX_TICK_RATE: u32 = 60;

    /// The tick rate the scheduler actually runs at.
    pub fn effective_tick_rate(&self) -> u32 {
        self.tick_rate.clamp(1, Self::MAX_TICK_RATE)
    }

    /// The player cap the lobby enforces.
    pub fn effective_max_players(&self) -> usize {
        self.max_players.max(1)
    }

    /// The quorum the lobby waits for. Never zero, so an empty lobby never
    /// leases a server, and never above the cap, so a full lobby can start.
    pub fn effective_min_players(&self) -> usize {
        self.min_players.clamp(1, self.effective_max_players())
    }
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 4,
            tick_rate: 1,
            label: String::new(),
            shutdown_grace_seconds: 10,
            tick_jitter: Duration::from_millis(50),
        }
    }
}

// ---------------------------------------------------------------------------
// MatchPhase
// ---------------------------------------------------------------------------

/// Where a lobby is in its lifecycle.
///
/// Phases only move forward:
///
/// ```text
/// WaitingForPlayers → GameStarted → GameEnded
/// ```
///
/// A lobby can end from either earlier phase (last participant left, or
/// terminated by the host), so `GameEnded` is reachable from both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchPhase {
    WaitingForPlayers,
    GameStarted,
    GameEnded,
}

impl MatchPhase {
    /// Returns `true` while new players may be admitted.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::WaitingForPlayers)
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::GameEnded)
    }

    /// Returns `true` if `target` lies strictly ahead of this phase.
    pub fn can_transition_to(self, target: Self) -> bool {
        target > self
    }
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WaitingForPlayers => write!(f, "WaitingForPlayers"),
            Self::GameStarted => write!(f, "GameStarted"),
            Self::GameEnded => write!(f, "GameEnded"),
        }
    }
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

/// A participant's ready flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    #[default]
    NotReady,
    Ready,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}
