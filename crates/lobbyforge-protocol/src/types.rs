//! Core protocol types: identities, inbound frames and outbound events.
//!
//! Inbound traffic arrives from the transport as a raw [`MatchMessage`]
//! (an op code plus opaque bytes). It is decoded exactly once, at the
//! lobby boundary, into a [`ClientMessage`]. Outbound traffic is always a
//! typed [`LobbyEvent`], wrapped in an [`Envelope`] that carries the op
//! code clients switch on.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable external identity.
///
/// Players and compute servers share one identity space: a lobby admits
/// its reserved server by comparing the joining identity against the
/// server id it leased, and the registry uses the same string as the
/// store key for that server's lease.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Borrows the identity as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty identity, which the RPC surface treats
    /// as "caller not identified".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one lobby session (one pending or running match).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

/// Opaque identifier for a transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Host/port a compute server advertises when it registers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub ip: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// A participant's presence as reported by the transport.
///
/// This is the "connection handle" a lobby keeps per participant: who
/// they are, which connection they came in on, and the peer id the
/// transport assigned them (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    #[serde(default)]
    pub peer_id: Option<u32>,
}

impl Presence {
    pub fn new(user_id: impl Into<UserId>, connection_id: ConnectionId) -> Self {
        Self {
            user_id: user_id.into(),
            connection_id,
            peer_id: None,
        }
    }

    pub fn with_peer_id(mut self, peer_id: u32) -> Self {
        self.peer_id = Some(peer_id);
        self
    }
}

/// One row of the presence snapshot broadcast for `GetAllPresences`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSummary {
    pub user_id: UserId,
    pub peer_id: Option<u32>,
}

// ---------------------------------------------------------------------------
// Op codes
// ---------------------------------------------------------------------------

/// Operation codes carried by every frame in either direction.
///
/// Codes 0–3 are what clients send; 2 and 3 are echoed back as the op
/// code of the matching reply. Codes 4 and up are server notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum OpCode {
    PlayerReady = 0,
    PlayerNotReady = 1,
    GetAllPresences = 2,
    GetServerInfo = 3,
    GameStarted = 4,
    ShuttingDown = 5,
}

impl OpCode {
    /// The numeric value used on the wire.
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for OpCode {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PlayerReady),
            1 => Ok(Self::PlayerNotReady),
            2 => Ok(Self::GetAllPresences),
            3 => Ok(Self::GetServerInfo),
            4 => Ok(Self::GameStarted),
            5 => Ok(Self::ShuttingDown),
            other => Err(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A raw frame delivered by the transport to a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMessage {
    pub sender: Presence,
    pub op_code: i64,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl MatchMessage {
    pub fn new(sender: Presence, op_code: OpCode) -> Self {
        Self {
            sender,
            op_code: op_code.code(),
            data: Vec::new(),
        }
    }
}

/// What a participant can ask a lobby to do, decoded from a [`MatchMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    PlayerReady,
    PlayerNotReady,
    GetAllPresences,
    GetServerInfo,
}

impl ClientMessage {
    /// Decodes a frame by op code.
    ///
    /// Returns `None` for codes a client has no business sending (unknown
    /// codes and server-only notifications). Callers ignore those frames
    /// rather than failing, so older lobbies tolerate newer clients.
    pub fn decode(msg: &MatchMessage) -> Option<Self> {
        match OpCode::try_from(msg.op_code).ok()? {
            OpCode::PlayerReady => Some(Self::PlayerReady),
            OpCode::PlayerNotReady => Some(Self::PlayerNotReady),
            OpCode::GetAllPresences => Some(Self::GetAllPresences),
            OpCode::GetServerInfo => Some(Self::GetServerInfo),
            OpCode::GameStarted | OpCode::ShuttingDown => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Who should receive an outbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every participant currently connected to the lobby, the joined
    /// compute server included.
    All,
    /// One specific participant.
    Player(UserId),
}

/// Notifications a lobby sends to its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum LobbyEvent {
    /// Snapshot of every tracked player, in reply to `GetAllPresences`.
    Presences { presences: Vec<PresenceSummary> },

    /// The reserved compute server, in reply to `GetServerInfo`. Both
    /// fields are empty while no server has been reserved.
    ServerInfo {
        server_id: Option<UserId>,
        address: Option<ServerAddress>,
    },

    /// The reserved server joined and the match is on.
    GameStarted { match_id: MatchId, server_id: UserId },

    /// The lobby is being torn down.
    ShuttingDown { grace_seconds: u32, message: String },
}

impl LobbyEvent {
    /// The op code this event travels under.
    pub fn op_code(&self) -> OpCode {
        match self {
            Self::Presences { .. } => OpCode::GetAllPresences,
            Self::ServerInfo { .. } => OpCode::GetServerInfo,
            Self::GameStarted { .. } => OpCode::GameStarted,
            Self::ShuttingDown { .. } => OpCode::ShuttingDown,
        }
    }

    /// Wraps the event in its wire envelope.
    pub fn into_envelope(self) -> Envelope {
        Envelope {
            op_code: self.op_code().code(),
            event: self,
        }
    }
}

/// The top-level outbound frame: an op code plus the typed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub op_code: i64,
    pub event: LobbyEvent,
}

// =========================================================================
// Tests
// =========================================================================
