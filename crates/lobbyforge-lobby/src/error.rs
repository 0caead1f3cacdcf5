//! Error types for the lobby layer.

use lobbyforge_protocol::{MatchId, UserId};

/// Errors that can occur during lobby operations.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// The lobby does not exist (never created, or already torn down).
    #[error("match {0} not found")]
    NotFound(MatchId),

    /// The lobby refused a join. Carries the reason shown to the client,
    /// e.g. "Match is full".
    #[error("join rejected: {0}")]
    Rejected(String),

    /// The identity is already in a lobby.
    #[error("user {0} already in match {1}")]
    AlreadyInMatch(UserId, MatchId),

    /// The identity is not in any lobby, or not in the one addressed.
    #[error("user {0} not in a match")]
    NotInMatch(UserId),

    /// The lobby's command channel is closed.
    #[error("match {0} is unavailable")]
    Unavailable(MatchId),
}
