//! Wire protocol for the replicated session.
//!
//! A closed tagged union; every peer link carries JSON-encoded `Message`
//! values. Payloads that fail to decode are dropped by the receiver rather
//! than surfaced to the sender.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    /// client -> host: request to enter the lobby
    Join {
        player_id: PlayerId,
        player_name: String,
    },
    /// host -> client: full canonical session, applied as a wholesale
    /// mirror overwrite (sent on join and on demand)
    StateSync { state: Session },
    /// host -> all: roster grew
    PlayerJoined {
        player: Player,
        players: Vec<Player>,
    },
    /// client -> host: voluntary departure
    PlayerLeft {
        player_id: PlayerId,
        player_name: String,
    },
    /// host -> all: roster shrank (departure or disconnect)
    PlayerRemoved {
        player_id: PlayerId,
        player_name: String,
        players: Vec<Player>,
    },
    /// host -> all: roles dealt, the game is on
    GameStart {
        players: Vec<Player>,
        tasks: BTreeMap<TaskId, TaskStatus>,
        time_remaining: u32,
    },
    /// client -> host: task authority invocation
    TaskUpdate {
        task_id: TaskId,
        task_type: TaskKind,
        player_id: PlayerId,
    },
    /// host -> all: full task map after a resolution
    TaskStateSync {
        tasks: BTreeMap<TaskId, TaskStatus>,
    },
    /// host -> all: periodic countdown mirror update
    TimerSync {
        time_remaining: u32,
        timer_running: bool,
    },
    /// host -> all: enter deliberation, votes cleared, timer paused
    DeliberationStart,
    /// any -> all: a cast vote (the host records and echoes it)
    Vote {
        voter_id: PlayerId,
        target_id: PlayerId,
    },
    /// host -> all: tallied or manual elimination, role revealed
    PlayerEliminated {
        player_id: PlayerId,
        player_name: String,
        role: Option<Role>,
    },
    /// host -> all: out-of-band elimination record, role revealed
    PlayerMurdered {
        player_id: PlayerId,
        player_name: String,
        role: Option<Role>,
    },
    /// host -> all: no strict majority, fresh deliberation round
    VoteTied { tied_player_names: Vec<String> },
    /// host -> all: meeting called off, back to playing
    DeliberationCancelled,
    /// host -> all: terminal outcome with final state
    GameOver {
        winner: Winner,
        reason: String,
        players: Vec<Player>,
        tasks: BTreeMap<TaskId, TaskStatus>,
    },
    /// host -> all: session aborted
    GameCancelled,
    /// any -> host: triggers a `stateSync` reply to the requester
    RequestStateSync,
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        // The tagged union always serializes
        serde_json::to_vec(self).expect("message serialization cannot fail")
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// An outbound message with its addressing, drained by the endpoint loop
/// onto transport channels.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub to: Recipient,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected channel
    All,
    /// One specific peer (direct replies)
    Peer(EndpointId),
    /// The client's single channel to the host
    Host,
}

/// State-change notifications for an external presentation layer.
///
/// Rendering is out of scope here; subscribers re-render off these.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    PlayerJoined { name: String },
    PlayerLeft { name: String },
    RosterChanged,
    /// Local role reveal at game start; cyborgs also learn their fellows
    RoleRevealed {
        role: Role,
        fellow_cyborgs: Vec<String>,
    },
    TasksChanged,
    TimerChanged {
        time_remaining: u32,
        timer_running: bool,
    },
    DeliberationStarted,
    VoteRecorded {
        voter_id: PlayerId,
        votes_cast: usize,
        alive: usize,
    },
    VoteTied { tied_player_names: Vec<String> },
    DeliberationCancelled,
    PlayerEliminated {
        name: String,
        role: Option<Role>,
        murdered: bool,
    },
    GameEnded { winner: Winner, reason: String },
    GameCancelled,
    /// This endpoint took over as host after the previous host vanished
    PromotedToHost,
    /// Mirror overwritten from a `stateSync`
    Synced,
    /// Non-fatal transport trouble worth surfacing to the user
    ConnectionError { detail: String },
}

/// A vote tally's resolution
#[derive(Debug, Clone, PartialEq)]
pub enum TallyResult {
    Eliminated { player_id: PlayerId, name: String },
    Tied { tied_player_names: Vec<String> },
}
