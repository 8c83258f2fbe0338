use super::SessionState;
use crate::protocol::{GameEvent, Message};
use crate::types::*;
use rand::Rng;

/// Letters a session code may use (I and O excluded to avoid confusion)
const SESSION_CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const SESSION_CODE_LEN: usize = 4;

/// Generate a random 4-letter session code
pub fn generate_session_code() -> String {
    let mut rng = rand::rng();
    (0..SESSION_CODE_LEN)
        .map(|_| SESSION_CODE_CHARS[rng.random_range(0..SESSION_CODE_CHARS.len())] as char)
        .collect()
}

impl SessionState {
    /// Become the host of a fresh session under `code`.
    pub async fn host_session(&self, code: String) -> Session {
        let mut local = self.local.write().await;
        local.is_host = true;

        let mut player = Player::new(local.player_id.clone(), local.player_name.clone());
        player.is_host = true;

        let mut session = self.session.write().await;
        *session = Session::new(code);
        session.players.push(player);

        tracing::info!(code = %session.code, "hosting session");
        session.clone()
    }

    /// Point this endpoint at a host's session; the mirror fills in once the
    /// host answers our join with a `stateSync`.
    pub async fn join_session(&self, code: String) {
        self.local.write().await.is_host = false;
        let mut session = self.session.write().await;
        *session = Session::new(code);
    }

    /// Host lobby knob; the full constraint is enforced at game start.
    pub async fn set_num_cyborgs(&self, count: usize) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host can change the cyborg count".to_string());
        }
        let mut session = self.session.write().await;
        if session.phase != Phase::Lobby {
            return Err("Cyborg count can only change in the lobby".to_string());
        }
        if count < 1 {
            return Err("At least one cyborg is required".to_string());
        }
        session.num_cyborgs = count;
        Ok(())
    }

    /// Deal roles and move the session from `lobby` to `playing`.
    pub async fn start_game(&self) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host can start the game".to_string());
        }

        let (players, tasks, time_remaining) = {
            let mut session = self.session.write().await;
            if session.phase != Phase::Lobby {
                return Err("Game already started".to_string());
            }
            if session.players.len() < MIN_PLAYERS {
                return Err(format!("Need at least {MIN_PLAYERS} players to start"));
            }
            if !session.cyborg_count_valid() {
                return Err("Too many cyborgs! Must be less than half the players.".to_string());
            }

            let players = std::mem::take(&mut session.players);
            session.players = super::assign_roles(players, session.num_cyborgs);
            session.phase = Phase::Playing;
            session.tasks = Session::fresh_tasks();
            session.votes.clear();
            session.time_remaining = SESSION_DURATION_SECS;
            session.timer_running = true;

            tracing::info!(
                players = session.players.len(),
                cyborgs = session.num_cyborgs,
                "game started"
            );
            (
                session.players.clone(),
                session.tasks.clone(),
                session.time_remaining,
            )
        };

        self.broadcast(Message::GameStart {
            players,
            tasks,
            time_remaining,
        });
        self.emit_role_reveal().await;
        Ok(())
    }

    /// Tell the local presentation layer which role it drew; cyborgs also
    /// learn the names of their fellows.
    pub(crate) async fn emit_role_reveal(&self) {
        let local_id = self.local_player_id().await;
        let session = self.session.read().await;
        let Some(role) = session.player(&local_id).and_then(|p| p.role) else {
            return;
        };
        let fellow_cyborgs = if role == Role::Cyborg {
            session
                .players
                .iter()
                .filter(|p| p.role == Some(Role::Cyborg) && p.id != local_id)
                .map(|p| p.name.clone())
                .collect()
        } else {
            Vec::new()
        };
        drop(session);

        self.emit(GameEvent::RoleRevealed {
            role,
            fellow_cyborgs,
        });
    }

    /// Terminal transition; the outcome plus the full final state goes out
    /// to every channel.
    pub(crate) async fn end_game(&self, outcome: Outcome) {
        let (players, tasks) = {
            let mut session = self.session.write().await;
            if session.phase == Phase::GameOver {
                return;
            }
            session.phase = Phase::GameOver;
            session.timer_running = false;
            session.votes.clear();
            (session.players.clone(), session.tasks.clone())
        };

        tracing::info!(winner = ?outcome.winner, reason = %outcome.reason, "game over");
        self.broadcast(Message::GameOver {
            winner: outcome.winner,
            reason: outcome.reason.clone(),
            players,
            tasks,
        });
        self.emit(GameEvent::GameEnded {
            winner: outcome.winner,
            reason: outcome.reason,
        });
    }

    /// Host abort: everyone is told, then the session is reset.
    pub async fn cancel_game(&self) {
        if self.is_host().await {
            self.broadcast(Message::GameCancelled);
        }
        self.emit(GameEvent::GameCancelled);
        self.reset().await;
    }

    /// Back to a blank pre-game state; identity survives, the session
    /// does not.
    pub async fn reset(&self) {
        self.local.write().await.is_host = false;
        let mut session = self.session.write().await;
        *session = Session::new(String::new());
    }

    /// Wholesale mirror overwrite from a host `stateSync`. Idempotent:
    /// applying the same snapshot twice leaves the mirror unchanged.
    pub(crate) async fn apply_snapshot(&self, snapshot: Session) {
        {
            let mut session = self.session.write().await;
            *session = snapshot;
        }
        self.emit(GameEvent::Synced);
    }
}
