//! Outbound delivery seam between a lobby and whatever carries its events.

use std::collections::HashMap;

use lobbyforge_protocol::{Envelope, LobbyEvent, Recipient, UserId};
use tokio::sync::mpsc;

/// Channel sender delivering outbound envelopes to one participant.
pub type PlayerSender = mpsc::UnboundedSender<Envelope>;

/// Receives every event a lobby emits.
///
/// The actor hands the session a [`ChannelDispatcher`]; tests can pass a
/// plain `Vec<(Recipient, LobbyEvent)>` to capture what was sent.
pub trait Dispatcher {
    fn send(&mut self, recipient: Recipient, event: LobbyEvent);
}

impl Dispatcher for Vec<(Recipient, LobbyEvent)> {
    fn send(&mut self, recipient: Recipient, event: LobbyEvent) {
        self.push((recipient, event));
    }
}

/// Fans events out to the per-participant channels an actor holds.
pub(crate) struct ChannelDispatcher<'a> {
    senders: &'a HashMap<UserId, PlayerSender>,
}

impl<'a> ChannelDispatcher<'a> {
    pub(crate) fn new(senders: &'a HashMap<UserId, PlayerSender>) -> Self {
        Self { senders }
    }

    /// Silently drops if the receiver is gone (participant disconnected).
    fn send_to(&self, user_id: &UserId, envelope: Envelope) {
        if let Some(sender) = self.senders.get(user_id) {
            let _ = sender.send(envelope);
        }
    }
}

impl Dispatcher for ChannelDispatcher<'_> {
    fn send(&mut self, recipient: Recipient, event: LobbyEvent) {
        let envelope = event.into_envelope();
        match recipient {
            Recipient::All => {
                for user_id in self.senders.keys() {
                    self.send_to(user_id, envelope.clone());
                }
            }
            Recipient::Player(user_id) => self.send_to(&user_id, envelope),
        }
    }
}
