//! Wire vocabulary for Lobbyforge.
//!
//! This crate defines what lobby participants and compute servers say to
//! each other, independent of any transport:
//!
//! - **Identities** ([`UserId`], [`MatchId`], [`ConnectionId`]): who is
//!   talking and which lobby they are in.
//! - **Inbound messages** ([`MatchMessage`], [`ClientMessage`], [`OpCode`]):
//!   raw op-coded frames from the transport and the typed union they
//!   decode into.
//! - **Outbound events** ([`LobbyEvent`], [`Envelope`], [`Recipient`]):
//!   what a lobby broadcasts back.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes become bytes.
//!
//! ```text
//! Transport (op code + bytes) → Protocol (ClientMessage) → Lobby (state machine)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientMessage, ConnectionId, Envelope, LobbyEvent, MatchId, MatchMessage,
    OpCode, Presence, PresenceSummary, Recipient, ServerAddress, UserId,
};
