//! Unified error type for Lobbyforge.

use lobbyforge_lobby::LobbyError;
use lobbyforge_protocol::ProtocolError;
use lobbyforge_registry::RegistryError;
use lobbyforge_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LobbyforgeError {
    /// A storage backend error (conflict, backend failure).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A registry error (store failure, corrupt record, contention).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A protocol error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A lobby error (not found, rejected, unavailable).
    #[error(transparent)]
    Lobby(#[from] LobbyError),

    /// An RPC payload could not be parsed or its response serialized.
    #[error("invalid rpc payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// No RPC is registered under this id.
    #[error("unknown rpc: {0}")]
    UnknownRpc(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyforge_protocol::MatchId;

    #[test]
    fn test_from_store_error() {
        let err: LobbyforgeError = StoreError::Backend("down".into()).into();
        assert!(matches!(err, LobbyforgeError::Store(_)));
        assert!(err.to_string().contains("down"));
    }

    #[test]
    fn test_from_registry_error() {
        let err: LobbyforgeError = RegistryError::Store(StoreError::Backend("x".into())).into();
        assert!(matches!(err, LobbyforgeError::Registry(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let json_err = serde_json::from_str::<u32>("bad").unwrap_err();
        let err: LobbyforgeError = ProtocolError::Decode(json_err).into();
        assert!(matches!(err, LobbyforgeError::Protocol(_)));
    }

    #[test]
    fn test_from_lobby_error() {
        let err: LobbyforgeError = LobbyError::NotFound(MatchId(3)).into();
        assert!(matches!(err, LobbyforgeError::Lobby(_)));
        assert_eq!(err.to_string(), "match M-3 not found");
    }

    #[test]
    fn test_unknown_rpc_message() {
        let err = LobbyforgeError::UnknownRpc("nope".into());
        assert_eq!(err.to_string(), "unknown rpc: nope");
    }
}
