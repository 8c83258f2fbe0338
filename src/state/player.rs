use super::SessionState;
use crate::protocol::{GameEvent, Message};
use crate::types::*;

/// Display names for simulated players
pub const BOT_NAMES: [&str; 5] = ["Bot Alice", "Bot Bob", "Bot Carol", "Bot Dave", "Bot Eve"];

impl SessionState {
    /// Host-side join: add a player to the lobby roster and announce it.
    /// Duplicate joins (message replay) return the existing entry.
    pub(crate) async fn add_player(
        &self,
        player_id: PlayerId,
        player_name: String,
        connection_id: Option<EndpointId>,
    ) -> Result<Player, String> {
        if !self.is_host().await {
            return Err("Only the host can admit players".to_string());
        }

        let (player, players) = {
            let mut session = self.session.write().await;
            if session.phase != Phase::Lobby {
                return Err("Joins are only accepted in the lobby".to_string());
            }
            if let Some(existing) = session.player(&player_id) {
                return Ok(existing.clone());
            }

            let mut player = Player::new(player_id, player_name);
            player.connection_id = connection_id;
            session.players.push(player.clone());
            (player, session.players.clone())
        };

        tracing::info!(player = %player.name, "player joined");
        self.broadcast(Message::PlayerJoined {
            player: player.clone(),
            players,
        });
        self.emit(GameEvent::PlayerJoined {
            name: player.name.clone(),
        });
        Ok(player)
    }

    /// Host-side departure (voluntary leave or disconnect): drop the player
    /// and announce the shrunk roster.
    pub(crate) async fn remove_player(&self, player_id: &str) -> Option<Player> {
        if !self.is_host().await {
            return None;
        }

        let (player, players) = {
            let mut session = self.session.write().await;
            let idx = session.players.iter().position(|p| p.id == player_id)?;
            let player = session.players.remove(idx);
            session.votes.remove(player_id);
            (player, session.players.clone())
        };

        tracing::info!(player = %player.name, "player removed");
        self.broadcast(Message::PlayerRemoved {
            player_id: player.id.clone(),
            player_name: player.name.clone(),
            players,
        });
        self.emit(GameEvent::PlayerLeft {
            name: player.name.clone(),
        });
        Some(player)
    }

    /// Resolve a closed channel to the player it carried, then remove them.
    pub(crate) async fn remove_player_by_connection(
        &self,
        connection_id: &EndpointId,
    ) -> Option<Player> {
        let player_id = {
            let session = self.session.read().await;
            session
                .players
                .iter()
                .find(|p| p.connection_id.as_deref() == Some(connection_id.as_str()))
                .map(|p| p.id.clone())?
        };
        self.remove_player(&player_id).await
    }

    /// Host lobby toggle: admit the five named bots.
    pub async fn add_bots(&self) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host can add bots".to_string());
        }

        let players = {
            let mut session = self.session.write().await;
            if session.phase != Phase::Lobby {
                return Err("Bots can only be added in the lobby".to_string());
            }
            if session.players.iter().any(|p| p.is_bot) {
                return Err("Bots already added".to_string());
            }
            for name in BOT_NAMES {
                let mut bot = Player::new(
                    format!("bot-{}", ulid::Ulid::new()),
                    name.to_string(),
                );
                bot.is_bot = true;
                session.players.push(bot);
            }
            session.players.clone()
        };

        tracing::info!("added {} bots", BOT_NAMES.len());
        // Announced under a collective name, as with any other roster change
        self.broadcast(Message::PlayerJoined {
            player: Player::new(String::new(), "Bots".to_string()),
            players,
        });
        self.emit(GameEvent::RosterChanged);
        Ok(())
    }

    /// Host lobby toggle: drop every bot from the roster.
    pub async fn remove_bots(&self) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host can remove bots".to_string());
        }

        let players = {
            let mut session = self.session.write().await;
            if session.phase != Phase::Lobby {
                return Err("Bots can only be removed in the lobby".to_string());
            }
            if !session.players.iter().any(|p| p.is_bot) {
                return Ok(());
            }
            session.players.retain(|p| !p.is_bot);
            session.players.clone()
        };

        self.broadcast(Message::PlayerRemoved {
            player_id: String::new(),
            player_name: "Bots".to_string(),
            players,
        });
        self.emit(GameEvent::RosterChanged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Recipient;

    #[tokio::test]
    async fn join_is_lobby_only() {
        let state = SessionState::new("Alice");
        state.host_session("ABCD".to_string()).await;
        for name in ["Bob", "Carol"] {
            state
                .add_player(ulid::Ulid::new().to_string(), name.to_string(), None)
                .await
                .unwrap();
        }
        state.start_game().await.unwrap();

        let err = state
            .add_player("late".to_string(), "Dave".to_string(), None)
            .await
            .unwrap_err();
        assert!(err.contains("lobby"));
    }

    #[tokio::test]
    async fn duplicate_join_is_idempotent() {
        let state = SessionState::new("Alice");
        state.host_session("ABCD".to_string()).await;

        state
            .add_player("p2".to_string(), "Bob".to_string(), Some("conn-2".to_string()))
            .await
            .unwrap();
        state
            .add_player("p2".to_string(), "Bob".to_string(), Some("conn-2".to_string()))
            .await
            .unwrap();

        assert_eq!(state.session().await.players.len(), 2);
    }

    #[tokio::test]
    async fn join_broadcasts_the_roster() {
        let state = SessionState::new("Alice");
        state.host_session("ABCD".to_string()).await;
        let mut rx = state.subscribe_outbound();

        state
            .add_player("p2".to_string(), "Bob".to_string(), Some("conn-2".to_string()))
            .await
            .unwrap();

        let env = rx.recv().await.unwrap();
        assert_eq!(env.to, Recipient::All);
        match env.message {
            Message::PlayerJoined { player, players } => {
                assert_eq!(player.name, "Bob");
                assert_eq!(players.len(), 2);
            }
            other => panic!("expected PlayerJoined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_removal_resolves_the_connection() {
        let state = SessionState::new("Alice");
        state.host_session("ABCD".to_string()).await;
        state
            .add_player("p2".to_string(), "Bob".to_string(), Some("conn-2".to_string()))
            .await
            .unwrap();

        let removed = state
            .remove_player_by_connection(&"conn-2".to_string())
            .await
            .unwrap();
        assert_eq!(removed.id, "p2");
        assert_eq!(state.session().await.players.len(), 1);

        // Unknown connections are a no-op
        assert!(state
            .remove_player_by_connection(&"conn-9".to_string())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn bot_toggle_round_trips() {
        let state = SessionState::new("Alice");
        state.host_session("ABCD".to_string()).await;

        state.add_bots().await.unwrap();
        let session = state.session().await;
        assert_eq!(session.players.len(), 1 + BOT_NAMES.len());
        assert!(session.players.iter().filter(|p| p.is_bot).count() == BOT_NAMES.len());
        assert!(session
            .players
            .iter()
            .filter(|p| p.is_bot)
            .all(|p| p.id.starts_with("bot-")));

        // Second toggle-on is rejected, removal drops them all
        assert!(state.add_bots().await.is_err());
        state.remove_bots().await.unwrap();
        assert_eq!(state.session().await.players.len(), 1);
    }
}
