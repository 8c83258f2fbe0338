//! In-memory transport: a loopback directory wiring endpoint event queues
//! together with paired channels. Exercises the core in tests and the demo
//! binary; not a production transport.

use super::{Channel, ChannelEvent, Directory, TransportError};
use crate::types::EndpointId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Default)]
pub struct MemDirectory {
    endpoints: Mutex<HashMap<EndpointId, mpsc::Sender<ChannelEvent>>>,
}

impl MemDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Directory for MemDirectory {
    async fn bind(
        &self,
        identity: &EndpointId,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Result<(), TransportError> {
        let mut endpoints = self.endpoints.lock().await;
        if let Some(existing) = endpoints.get(identity) {
            // A claim whose queue is gone is stale and may be replaced
            if !existing.is_closed() {
                return Err(TransportError::IdentityTaken(identity.clone()));
            }
        }
        endpoints.insert(identity.clone(), events);
        Ok(())
    }

    async fn connect(
        &self,
        local: &EndpointId,
        remote: &EndpointId,
    ) -> Result<Arc<dyn Channel>, TransportError> {
        let endpoints = self.endpoints.lock().await;
        let remote_events = endpoints
            .get(remote)
            .filter(|tx| !tx.is_closed())
            .cloned()
            .ok_or_else(|| TransportError::PeerUnreachable(remote.clone()))?;
        let local_events = endpoints
            .get(local)
            .cloned()
            .ok_or_else(|| TransportError::Directory(format!("{local} is not bound")))?;
        drop(endpoints);

        let closed = Arc::new(AtomicBool::new(false));
        let ours: Arc<dyn Channel> = Arc::new(MemChannel {
            peer: remote.clone(),
            local: local.clone(),
            remote_events: remote_events.clone(),
            closed: closed.clone(),
        });
        let theirs: Arc<dyn Channel> = Arc::new(MemChannel {
            peer: local.clone(),
            local: remote.clone(),
            remote_events: local_events,
            closed,
        });

        remote_events
            .send(ChannelEvent::Incoming { channel: theirs })
            .await
            .map_err(|_| TransportError::PeerUnreachable(remote.clone()))?;

        Ok(ours)
    }

    async fn release(&self, identity: &EndpointId) {
        self.endpoints.lock().await.remove(identity);
    }
}

struct MemChannel {
    peer: EndpointId,
    local: EndpointId,
    /// Event queue of the endpoint on the other end
    remote_events: mpsc::Sender<ChannelEvent>,
    /// Shared between both halves; either side closing kills the link
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Channel for MemChannel {
    fn peer(&self) -> &EndpointId {
        &self.peer
    }

    async fn send(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.remote_events
            .send(ChannelEvent::Data {
                peer: self.local.clone(),
                payload,
            })
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self
            .remote_events
            .send(ChannelEvent::Closed {
                peer: self.local.clone(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK_BUFFER: usize = 64;

    #[tokio::test]
    async fn bind_connect_and_exchange() {
        let dir = MemDirectory::new();
        let (host_tx, mut host_rx) = mpsc::channel(LINK_BUFFER);
        let (client_tx, mut client_rx) = mpsc::channel(LINK_BUFFER);

        dir.bind(&"HOST".to_string(), host_tx).await.unwrap();
        dir.bind(&"client-1".to_string(), client_tx).await.unwrap();

        let to_host = dir
            .connect(&"client-1".to_string(), &"HOST".to_string())
            .await
            .unwrap();

        // Host sees the incoming channel and can answer on it
        let to_client = match host_rx.recv().await.unwrap() {
            ChannelEvent::Incoming { channel } => channel,
            other => panic!("expected Incoming, got {other:?}"),
        };
        assert_eq!(to_client.peer(), "client-1");

        to_host.send(b"hello".to_vec()).await.unwrap();
        match host_rx.recv().await.unwrap() {
            ChannelEvent::Data { peer, payload } => {
                assert_eq!(peer, "client-1");
                assert_eq!(payload, b"hello");
            }
            other => panic!("expected Data, got {other:?}"),
        }

        to_client.send(b"welcome".to_vec()).await.unwrap();
        match client_rx.recv().await.unwrap() {
            ChannelEvent::Data { peer, payload } => {
                assert_eq!(peer, "HOST");
                assert_eq!(payload, b"welcome");
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn identity_collision_is_reported() {
        let dir = MemDirectory::new();
        let (tx1, _rx1) = mpsc::channel(LINK_BUFFER);
        let (tx2, _rx2) = mpsc::channel(LINK_BUFFER);

        dir.bind(&"ABCD".to_string(), tx1).await.unwrap();
        let err = dir.bind(&"ABCD".to_string(), tx2).await.unwrap_err();
        assert!(matches!(err, TransportError::IdentityTaken(_)));
    }

    #[tokio::test]
    async fn stale_claim_can_be_rebound() {
        let dir = MemDirectory::new();
        let (tx1, rx1) = mpsc::channel(LINK_BUFFER);
        dir.bind(&"ABCD".to_string(), tx1).await.unwrap();
        drop(rx1);

        let (tx2, _rx2) = mpsc::channel(LINK_BUFFER);
        dir.bind(&"ABCD".to_string(), tx2).await.unwrap();
    }

    #[tokio::test]
    async fn connect_to_unknown_code_fails() {
        let dir = MemDirectory::new();
        let (tx, _rx) = mpsc::channel(LINK_BUFFER);
        dir.bind(&"client-1".to_string(), tx).await.unwrap();

        let err = dir
            .connect(&"client-1".to_string(), &"WXYZ".to_string())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::PeerUnreachable(_)));
    }

    #[tokio::test]
    async fn close_notifies_the_other_side_and_kills_the_link() {
        let dir = MemDirectory::new();
        let (host_tx, mut host_rx) = mpsc::channel(LINK_BUFFER);
        let (client_tx, _client_rx) = mpsc::channel(LINK_BUFFER);
        dir.bind(&"HOST".to_string(), host_tx).await.unwrap();
        dir.bind(&"client-1".to_string(), client_tx).await.unwrap();

        let to_host = dir
            .connect(&"client-1".to_string(), &"HOST".to_string())
            .await
            .unwrap();
        let to_client = match host_rx.recv().await.unwrap() {
            ChannelEvent::Incoming { channel } => channel,
            other => panic!("expected Incoming, got {other:?}"),
        };

        to_host.close().await;
        match host_rx.recv().await.unwrap() {
            ChannelEvent::Closed { peer } => assert_eq!(peer, "client-1"),
            other => panic!("expected Closed, got {other:?}"),
        }

        // The surviving half observes the closure on its next send
        assert!(matches!(
            to_client.send(b"late".to_vec()).await,
            Err(TransportError::Closed)
        ));
    }
}
