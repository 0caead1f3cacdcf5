//! Session message router: applies one inbound frame to a lobby.

use lobbyforge_protocol::{ClientMessage, LobbyEvent, MatchMessage, Recipient};

use crate::{Dispatcher, LobbyMatch, Readiness};

/// Decodes `message` and applies it to `session`.
///
/// Frames with an op code a client may not send are dropped. Readiness
/// from a sender the lobby does not track is a no-op.
pub(crate) fn route_message(
    session: &mut LobbyMatch,
    message: &MatchMessage,
    dispatcher: &mut impl Dispatcher,
) {
    let sender = &message.sender.user_id;
    let Some(decoded) = ClientMessage::decode(message) else {
        tracing::trace!(
            match_id = %session.match_id(),
            %sender,
            op_code = message.op_code,
            "ignoring unknown op code"
        );
        return;
    };

    match decoded {
        ClientMessage::PlayerReady | ClientMessage::PlayerNotReady => {
            let readiness = if decoded == ClientMessage::PlayerReady {
                Readiness::Ready
            } else {
                Readiness::NotReady
            };
            if session.set_readiness(sender, readiness) {
                tracing::debug!(match_id = %session.match_id(), %sender, ?readiness, "readiness changed");
            } else {
                tracing::debug!(
                    match_id = %session.match_id(),
                    %sender,
                    "readiness from untracked sender ignored"
                );
            }
        }
        ClientMessage::GetAllPresences => {
            dispatcher.send(
                Recipient::All,
                LobbyEvent::Presences {
                    presences: session.presence_summaries(),
                },
            );
        }
        ClientMessage::GetServerInfo => {
            let server_id = session.reserved_server().cloned();
            let address = session.reserved_lease().map(|lease| lease.address);
            dispatcher.send(
                Recipient::Player(sender.clone()),
                LobbyEvent::ServerInfo { server_id, address },
            );
        }
    }
}
