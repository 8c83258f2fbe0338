mod export;
mod player;
mod roles;
pub(crate) mod session;
mod task;
mod vote;
mod win;

pub use export::{SessionExport, EXPORT_SCHEMA_VERSION};
pub use player::BOT_NAMES;
pub use roles::assign_roles;
pub use session::generate_session_code;
pub use win::evaluate;

use crate::protocol::{Envelope, GameEvent, Message, Recipient};
use crate::types::*;
use tokio::sync::{broadcast, RwLock};

/// Per-endpoint session context.
///
/// Every participant holds one of these: the host's copy is canonical, a
/// client's copy is a mirror that only host-originated broadcasts may
/// overwrite. All mutation happens inside single message-handler
/// invocations, so handlers observe stable state between messages.
pub struct SessionState {
    pub(crate) session: RwLock<Session>,
    pub(crate) local: RwLock<LocalIdentity>,
    outbound: broadcast::Sender<Envelope>,
    events: broadcast::Sender<GameEvent>,
}

/// Endpoint-local identity; never replicated.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub player_id: PlayerId,
    pub player_name: String,
    pub is_host: bool,
}

impl SessionState {
    pub fn new(player_name: impl Into<String>) -> Self {
        let (outbound, _) = broadcast::channel(256);
        let (events, _) = broadcast::channel(256);
        Self {
            session: RwLock::new(Session::new(String::new())),
            local: RwLock::new(LocalIdentity {
                player_id: ulid::Ulid::new().to_string(),
                player_name: player_name.into(),
                is_host: false,
            }),
            outbound,
            events,
        }
    }

    /// Snapshot of the current session (canonical on the host, mirror on a
    /// client).
    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn local(&self) -> LocalIdentity {
        self.local.read().await.clone()
    }

    pub async fn is_host(&self) -> bool {
        self.local.read().await.is_host
    }

    pub async fn local_player_id(&self) -> PlayerId {
        self.local.read().await.player_id.clone()
    }

    /// Outbound envelopes for a transport loop to drain onto channels.
    pub fn subscribe_outbound(&self) -> broadcast::Receiver<Envelope> {
        self.outbound.subscribe()
    }

    /// State-change events for a presentation layer.
    pub fn subscribe_events(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub(crate) fn broadcast(&self, message: Message) {
        // No receivers connected is fine
        let _ = self.outbound.send(Envelope {
            to: Recipient::All,
            message,
        });
    }

    pub(crate) fn send_to(&self, peer: EndpointId, message: Message) {
        let _ = self.outbound.send(Envelope {
            to: Recipient::Peer(peer),
            message,
        });
    }

    pub(crate) fn send_to_host(&self, message: Message) {
        let _ = self.outbound.send(Envelope {
            to: Recipient::Host,
            message,
        });
    }

    pub(crate) fn emit(&self, event: GameEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_state_is_an_unhosted_lobby() {
        let state = SessionState::new("Alice");
        assert!(!state.is_host().await);

        let session = state.session().await;
        assert_eq!(session.phase, Phase::Lobby);
        assert!(session.players.is_empty());
        assert_eq!(session.tasks.len(), TASK_COUNT);
        assert_eq!(session.time_remaining, SESSION_DURATION_SECS);
        assert!(!session.timer_running);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let state = SessionState::new("Alice");
        let mut rx = state.subscribe_outbound();

        state.broadcast(Message::DeliberationStart);

        let env = rx.recv().await.unwrap();
        assert_eq!(env.to, Recipient::All);
        assert_eq!(env.message, Message::DeliberationStart);
    }
}
