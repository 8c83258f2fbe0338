//! Transport abstractions.
//!
//! The session core never talks to a concrete network. It requires only a
//! bidirectional, message-oriented `Channel` between two endpoints and a
//! `Directory` that resolves a short code to a reachable endpoint. Links are
//! ordered per channel but nothing is guaranteed across channels, which is
//! why every state transition applied from the wire is idempotent or
//! monotonic.

pub mod mem;

use crate::types::EndpointId;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Someone else already claimed this identity with the directory
    #[error("identity {0} is already claimed")]
    IdentityTaken(EndpointId),
    /// No endpoint is reachable under the given identity
    #[error("no endpoint reachable at {0}")]
    PeerUnreachable(EndpointId),
    #[error("network failure: {0}")]
    Network(String),
    #[error("directory failure: {0}")]
    Directory(String),
    /// The channel was closed by either side
    #[error("channel closed")]
    Closed,
}

/// Events surfaced by a transport into an endpoint's single event queue.
pub enum ChannelEvent {
    /// A remote endpoint opened a channel to us
    Incoming { channel: Arc<dyn Channel> },
    /// A message arrived on an open channel
    Data { peer: EndpointId, payload: Vec<u8> },
    /// The remote end closed the channel (or vanished)
    Closed { peer: EndpointId },
    /// A transport-level failure on the link; non-fatal
    Error {
        peer: EndpointId,
        error: TransportError,
    },
}

impl std::fmt::Debug for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelEvent::Incoming { channel } => {
                f.debug_struct("Incoming").field("peer", &channel.peer()).finish()
            }
            ChannelEvent::Data { peer, payload } => f
                .debug_struct("Data")
                .field("peer", peer)
                .field("len", &payload.len())
                .finish(),
            ChannelEvent::Closed { peer } => {
                f.debug_struct("Closed").field("peer", peer).finish()
            }
            ChannelEvent::Error { peer, error } => f
                .debug_struct("Error")
                .field("peer", peer)
                .field("error", error)
                .finish(),
        }
    }
}

/// One end of a bidirectional message link.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Identity of the remote endpoint this channel reaches
    fn peer(&self) -> &EndpointId;

    /// Fire-and-forget send; delivery is best-effort, ordering holds
    /// per channel only.
    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Close the link; the remote side observes a `Closed` event.
    async fn close(&self);
}

/// Connection brokering: claims identities and opens channels to them.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Claim `identity` and route inbound channels and their traffic into
    /// `events`. Fails with `IdentityTaken` on a live collision.
    async fn bind(
        &self,
        identity: &EndpointId,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), TransportError>;

    /// Open a channel from the bound `local` identity to whatever endpoint
    /// claimed `remote`.
    async fn connect(
        &self,
        local: &EndpointId,
        remote: &EndpointId,
    ) -> Result<Arc<dyn Channel>, TransportError>;

    /// Give up a claim (session teardown).
    async fn release(&self, identity: &EndpointId);
}
