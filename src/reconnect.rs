//! Disconnect handling, host failover, and resync.
//!
//! The endpoint that loses a channel decides what the loss means: the host
//! treats it as a departed player; a client treats the loss of its host
//! link as a trigger for failover (when other players remain) or for a
//! later reconnect-and-resync through the directory under the same session
//! code.

use crate::endpoint::Endpoint;
use crate::protocol::{GameEvent, Message};
use crate::transport::TransportError;
use crate::types::*;
use std::time::Duration;

/// How long a reconnecting client waits for the (possibly new) host
const RECONNECT_TIMEOUT: Duration = Duration::from_secs(20);

impl Endpoint {
    /// A channel closed. Runs on whichever endpoint observed the closure.
    pub(crate) async fn handle_disconnect(&self, peer: &EndpointId) {
        if self.state.is_host().await {
            // A client vanished: drop the player and tell everyone
            if let Some(player) = self.state.remove_player_by_connection(peer).await {
                tracing::info!(player = %player.name, "client disconnected");
            }
            return;
        }

        let session = self.state.session().await;
        if *peer != session.code {
            return;
        }

        // Our link to the host is gone. With other players still in the
        // session the first survivor to notice promotes itself; otherwise
        // we keep the mirror and wait for a reconnect.
        tracing::warn!("lost channel to host");
        if session.players.len() > 1 {
            self.promote_to_host().await;
        } else {
            self.state.emit(GameEvent::ConnectionError {
                detail: "Connection to host lost".to_string(),
            });
        }
    }

    /// Unilateral failover: drop the departed host from the roster, claim
    /// the `isHost` flag, and take over the session code with the
    /// directory so remaining clients can find us. No coordination; if two
    /// survivors promote concurrently, whoever rebinds the code second
    /// simply fails that rebind.
    async fn promote_to_host(&self) {
        let code = {
            let mut local = self.state.local.write().await;
            local.is_host = true;
            let local_id = local.player_id.clone();
            drop(local);

            let mut session = self.state.session.write().await;
            session.players.retain(|p| !p.is_host);
            if let Some(me) = session.player_mut(&local_id) {
                me.is_host = true;
                me.connection_id = None;
            }
            session.code.clone()
        };

        tracing::info!(%code, "promoted to host");
        match self.directory.bind(&code, self.events_tx.clone()).await {
            Ok(()) => {
                let mut identity = self.identity.write().await;
                let old = std::mem::replace(&mut *identity, code);
                drop(identity);
                self.directory.release(&old).await;
            }
            Err(TransportError::IdentityTaken(code)) => {
                // Another survivor beat us to the code; accepted risk of
                // the uncoordinated policy
                tracing::warn!(%code, "session code already reclaimed");
            }
            Err(e) => tracing::warn!(error = %e, "could not reclaim session code"),
        }
        self.state.emit(GameEvent::PromotedToHost);
    }

    /// Client-side recovery: reach the host again through the directory
    /// under the same session code and ask for a full resync. On timeout
    /// the session is abandoned back to a pre-game state rather than
    /// retried forever.
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        let code = self.state.session().await.code;
        if code.is_empty() {
            return Err(TransportError::Directory("no session to rejoin".to_string()));
        }
        let identity = self.identity.read().await.clone();

        let attempt =
            tokio::time::timeout(RECONNECT_TIMEOUT, self.directory.connect(&identity, &code))
                .await
                .map_err(|_| {
                    TransportError::Network("Reconnect timeout. Host may be gone.".to_string())
                })
                .and_then(|r| r);

        match attempt {
            Ok(channel) => {
                self.connections
                    .lock()
                    .await
                    .insert(code.clone(), channel);
                self.send_on(&code, &Message::RequestStateSync).await;
                tracing::info!(%code, "reconnected, resync requested");
                Ok(())
            }
            Err(e) => {
                self.state.emit(GameEvent::ConnectionError {
                    detail: e.to_string(),
                });
                self.state.reset().await;
                Err(e)
            }
        }
    }

    /// Ask the host for a full `stateSync` on the existing link; the reply
    /// overwrites the mirror wholesale, so it is safe to ask any time.
    pub async fn request_state_sync(&self) {
        self.state.send_to_host(Message::RequestStateSync);
    }
}
