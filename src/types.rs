use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Opaque ID types for type safety
pub type PlayerId = String;
pub type EndpointId = String;
pub type TaskId = u8;

/// Number of task slots in every session
pub const TASK_COUNT: usize = 5;
/// Session duration in seconds (10 minutes)
pub const SESSION_DURATION_SECS: u32 = 600;
/// Cadence of the host's timer rebroadcast
pub const TIMER_SYNC_INTERVAL_SECS: u64 = 5;
/// Minimum players required to start a game
pub const MIN_PLAYERS: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Lobby,
    Playing,
    Deliberation,
    GameOver,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    Cyborg,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Incomplete,
    Complete,
    Broken,
}

/// Which button a player pressed on a task station
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskKind {
    #[serde(rename = "GRN")]
    Green,
    #[serde(rename = "RED")]
    Red,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Agents,
    Cyborgs,
}

/// Result of the win evaluator: who won and the display reason
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    pub winner: Winner,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// `None` until roles are assigned at game start
    pub role: Option<Role>,
    pub eliminated: bool,
    /// Reset at the start of every deliberation round
    pub voted: bool,
    pub is_host: bool,
    #[serde(default)]
    pub is_bot: bool,
    /// Transport reference; `None` for the host's own player and for bots
    #[serde(default)]
    pub connection_id: Option<EndpointId>,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            role: None,
            eliminated: false,
            voted: false,
            is_host: false,
            is_bot: false,
            connection_id: None,
        }
    }
}

/// The canonical replicated session data.
///
/// Held authoritatively by the host and mirrored wholesale by clients; every
/// field here travels in a `stateSync`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub code: String,
    pub phase: Phase,
    pub players: Vec<Player>,
    pub tasks: BTreeMap<TaskId, TaskStatus>,
    /// voter player id -> target player id
    pub votes: HashMap<PlayerId, PlayerId>,
    pub num_cyborgs: usize,
    pub time_remaining: u32,
    pub timer_running: bool,
}

impl Session {
    pub fn new(code: String) -> Self {
        Self {
            code,
            phase: Phase::Lobby,
            players: Vec::new(),
            tasks: Self::fresh_tasks(),
            votes: HashMap::new(),
            num_cyborgs: 1,
            time_remaining: SESSION_DURATION_SECS,
            timer_running: false,
        }
    }

    /// All five task slots back to `incomplete`
    pub fn fresh_tasks() -> BTreeMap<TaskId, TaskStatus> {
        (1..=TASK_COUNT as TaskId)
            .map(|id| (id, TaskStatus::Incomplete))
            .collect()
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.eliminated)
    }

    pub fn alive_count(&self) -> usize {
        self.alive_players().count()
    }

    pub fn living_cyborg_count(&self) -> usize {
        self.alive_players()
            .filter(|p| p.role == Some(Role::Cyborg))
            .count()
    }

    pub fn task_count(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|s| **s == status).count()
    }

    /// The cyborg-count constraint for starting a game: at least one cyborg,
    /// strictly fewer than half the players.
    pub fn cyborg_count_valid(&self) -> bool {
        self.num_cyborgs >= 1 && 2 * self.num_cyborgs < self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tasks_has_five_incomplete_slots() {
        let tasks = Session::fresh_tasks();
        assert_eq!(tasks.len(), TASK_COUNT);
        for id in 1..=TASK_COUNT as TaskId {
            assert_eq!(tasks.get(&id), Some(&TaskStatus::Incomplete));
        }
    }

    #[test]
    fn cyborg_count_constraint() {
        let mut session = Session::new("TEST".to_string());
        for i in 0..3 {
            session
                .players
                .push(Player::new(format!("p{i}"), format!("Player {i}")));
        }

        session.num_cyborgs = 1;
        assert!(session.cyborg_count_valid());

        // Half or more is rejected
        session.num_cyborgs = 2;
        assert!(!session.cyborg_count_valid());

        session.num_cyborgs = 0;
        assert!(!session.cyborg_count_valid());

        // 2 of 5 is fine, 3 of 5 is not
        for i in 3..5 {
            session
                .players
                .push(Player::new(format!("p{i}"), format!("Player {i}")));
        }
        session.num_cyborgs = 2;
        assert!(session.cyborg_count_valid());
        session.num_cyborgs = 3;
        assert!(!session.cyborg_count_valid());
    }

    #[test]
    fn wire_format_matches_original_names() {
        let mut player = Player::new("p1".to_string(), "Alice".to_string());
        player.is_host = true;
        let json = serde_json::to_value(&player).unwrap();
        assert_eq!(json["isHost"], true);
        assert_eq!(json["role"], serde_json::Value::Null);

        let json = serde_json::to_value(Phase::GameOver).unwrap();
        assert_eq!(json, "gameOver");

        let json = serde_json::to_value(TaskKind::Green).unwrap();
        assert_eq!(json, "GRN");
    }
}
