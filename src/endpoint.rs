//! One participant's transport plumbing.
//!
//! An `Endpoint` owns the channels behind a `SessionState`: it drains the
//! state's outbound envelopes onto peer links, feeds inbound payloads
//! through the dispatcher, and reacts to channel closures (player removal,
//! host failover, resync). Game logic lives in `SessionState`; everything
//! here is routing.

use crate::protocol::{Envelope, GameEvent, Message, Recipient};
use crate::state::{session::generate_session_code, SessionState};
use crate::transport::{Channel, ChannelEvent, Directory, TransportError};
use crate::types::*;
use crate::{bots, dispatch, timer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Identity collisions are retried this many times with a fresh identity
const IDENTITY_RETRY_LIMIT: usize = 3;
/// How long a joining client waits for the host before giving up
const JOIN_TIMEOUT: Duration = Duration::from_secs(20);
/// Depth of the single inbound event queue
const EVENT_QUEUE_DEPTH: usize = 64;

pub struct Endpoint {
    pub state: Arc<SessionState>,
    pub(crate) directory: Arc<dyn Directory>,
    pub(crate) connections: Mutex<HashMap<EndpointId, Arc<dyn Channel>>>,
    /// Our identity with the directory: the session code when hosting, a
    /// generated id otherwise
    pub(crate) identity: RwLock<EndpointId>,
    pub(crate) events_tx: mpsc::Sender<ChannelEvent>,
}

impl Endpoint {
    /// Host a fresh session: claim a session code with the directory
    /// (retrying collisions with fresh codes) and start serving.
    pub async fn host(
        directory: Arc<dyn Directory>,
        player_name: impl Into<String>,
    ) -> Result<Arc<Self>, TransportError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let state = Arc::new(SessionState::new(player_name));

        let mut bound = None;
        for _ in 0..IDENTITY_RETRY_LIMIT {
            let code = generate_session_code();
            match directory.bind(&code, events_tx.clone()).await {
                Ok(()) => {
                    bound = Some(code);
                    break;
                }
                Err(TransportError::IdentityTaken(taken)) => {
                    tracing::warn!(code = %taken, "session code collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }
        let code = bound.ok_or_else(|| {
            TransportError::Directory("could not claim a session code".to_string())
        })?;

        state.host_session(code.clone()).await;
        let endpoint = Arc::new(Self {
            state,
            directory,
            connections: Mutex::new(HashMap::new()),
            identity: RwLock::new(code),
            events_tx,
        });
        spawn_loops(endpoint.clone(), events_rx);
        Ok(endpoint)
    }

    /// Join the session behind `code`: bind our own identity (retrying
    /// collisions), open a channel to the host, and send the join intent.
    pub async fn join(
        directory: Arc<dyn Directory>,
        code: &str,
        player_name: impl Into<String>,
    ) -> Result<Arc<Self>, TransportError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let state = Arc::new(SessionState::new(player_name));

        let mut identity = None;
        for attempt in 0..IDENTITY_RETRY_LIMIT {
            let candidate = ulid::Ulid::new().to_string();
            match directory.bind(&candidate, events_tx.clone()).await {
                Ok(()) => {
                    identity = Some(candidate);
                    break;
                }
                Err(TransportError::IdentityTaken(_)) => {
                    tracing::warn!(attempt, "endpoint identity collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }
        let identity = identity.ok_or_else(|| {
            TransportError::Directory("could not claim an endpoint identity".to_string())
        })?;

        let code = code.to_string();
        let channel = tokio::time::timeout(JOIN_TIMEOUT, directory.connect(&identity, &code))
            .await
            .map_err(|_| {
                TransportError::Network("Connection timeout. Host may not be available.".to_string())
            })??;

        state.join_session(code.clone()).await;
        let join = Message::Join {
            player_id: state.local_player_id().await,
            player_name: state.local().await.player_name,
        };
        channel.send(join.encode()).await?;

        let endpoint = Arc::new(Self {
            state,
            directory,
            connections: Mutex::new(HashMap::from([(code, channel)])),
            identity: RwLock::new(identity),
            events_tx,
        });
        spawn_loops(endpoint.clone(), events_rx);
        Ok(endpoint)
    }

    /// Host action: open a meeting and queue the bot ballots.
    pub async fn call_meeting(&self) -> Result<(), String> {
        self.state.call_deliberation().await?;
        bots::schedule_bot_votes(&self.state);
        Ok(())
    }

    /// Host action: count the ballots; a tie opens a fresh round, so the
    /// bots vote again.
    pub async fn tally_votes(&self) -> Result<crate::protocol::TallyResult, String> {
        let result = self.state.tally_votes().await?;
        if matches!(result, crate::protocol::TallyResult::Tied { .. }) {
            bots::schedule_bot_votes(&self.state);
        }
        Ok(result)
    }

    /// Voluntary exit. A host cancels the game for everyone; a client
    /// announces its departure to the host. Farewells go out directly on
    /// the channels so they are ordered ahead of the closes.
    pub async fn leave(&self) {
        let channels: Vec<Arc<dyn Channel>> = self
            .connections
            .lock()
            .await
            .drain()
            .map(|(_, channel)| channel)
            .collect();

        if self.state.is_host().await {
            for channel in &channels {
                let _ = channel.send(Message::GameCancelled.encode()).await;
            }
            self.state.emit(GameEvent::GameCancelled);
        } else {
            let local = self.state.local().await;
            let code = self.state.session().await.code;
            let farewell = Message::PlayerLeft {
                player_id: local.player_id,
                player_name: local.player_name,
            };
            for channel in &channels {
                if *channel.peer() == code {
                    let _ = channel.send(farewell.encode()).await;
                }
            }
        }
        self.state.reset().await;

        for channel in channels {
            channel.close().await;
        }
        self.directory.release(&*self.identity.read().await).await;
    }

    pub(crate) async fn send_on(&self, peer: &EndpointId, message: &Message) {
        let channel = self.connections.lock().await.get(peer).cloned();
        match channel {
            Some(channel) => {
                if let Err(e) = channel.send(message.encode()).await {
                    tracing::debug!(%peer, error = %e, "send failed");
                }
            }
            None => tracing::debug!(%peer, "no channel for recipient"),
        }
    }

    async fn route(&self, envelope: Envelope) {
        match envelope.to {
            Recipient::All => {
                let channels: Vec<Arc<dyn Channel>> =
                    self.connections.lock().await.values().cloned().collect();
                for channel in channels {
                    if let Err(e) = channel.send(envelope.message.encode()).await {
                        tracing::debug!(peer = %channel.peer(), error = %e, "broadcast send failed");
                    }
                }
            }
            Recipient::Peer(peer) => self.send_on(&peer, &envelope.message).await,
            Recipient::Host => {
                let code = self.state.session.read().await.code.clone();
                self.send_on(&code, &envelope.message).await;
            }
        }
    }

    async fn handle_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Incoming { channel } => {
                tracing::info!(peer = %channel.peer(), "incoming channel");
                self.connections
                    .lock()
                    .await
                    .insert(channel.peer().clone(), channel);
            }
            ChannelEvent::Data { peer, payload } => match Message::decode(&payload) {
                Ok(msg) => {
                    tracing::debug!(%peer, ?msg, "message received");
                    if let Some(reply) = dispatch::handle_message(&self.state, msg, &peer).await {
                        self.send_on(&peer, &reply).await;
                    }
                }
                Err(e) => {
                    // Unrecognized shapes are dropped, never bounced
                    tracing::warn!(%peer, error = %e, "ignoring undecodable message");
                }
            },
            ChannelEvent::Closed { peer } => {
                self.connections.lock().await.remove(&peer);
                self.handle_disconnect(&peer).await;
            }
            ChannelEvent::Error { peer, error } => {
                tracing::warn!(%peer, %error, "channel error");
                self.state.emit(GameEvent::ConnectionError {
                    detail: error.to_string(),
                });
            }
        }
    }
}

/// Wire the endpoint's run loop and the host-side clocks.
fn spawn_loops(endpoint: Arc<Endpoint>, events_rx: mpsc::Receiver<ChannelEvent>) {
    timer::spawn_timer(endpoint.state.clone());
    timer::spawn_timer_sync(endpoint.state.clone());
    tokio::spawn(run(endpoint, events_rx));
}

/// The single-threaded event loop: one inbound message or outbound envelope
/// at a time, in arrival order.
async fn run(endpoint: Arc<Endpoint>, mut events_rx: mpsc::Receiver<ChannelEvent>) {
    let mut outbound = endpoint.state.subscribe_outbound();
    loop {
        tokio::select! {
            envelope = outbound.recv() => match envelope {
                Ok(envelope) => endpoint.route(envelope).await,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "outbound queue lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            event = events_rx.recv() => match event {
                Some(event) => endpoint.handle_event(event).await,
                None => break,
            },
        }
    }
    tracing::debug!("endpoint loop ended");
}
