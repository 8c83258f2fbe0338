use super::SessionState;
use crate::protocol::{GameEvent, Message};
use crate::types::*;

impl SessionState {
    /// A local player pressed a task button. On the host this resolves
    /// directly; on a client it becomes a `taskUpdate` intent for the host
    /// to arbitrate. Client-side checks only save a round trip, the host
    /// re-validates everything.
    pub async fn attempt_task(&self, task_id: TaskId, kind: TaskKind) -> Result<(), String> {
        let local_id = self.local_player_id().await;

        {
            let session = self.session.read().await;
            if session.phase != Phase::Playing {
                return Err("Tasks can only be worked while playing".to_string());
            }
            let me = session
                .player(&local_id)
                .ok_or_else(|| "You are not in this game".to_string())?;
            if me.eliminated {
                return Err("You have been eliminated".to_string());
            }
            if kind == TaskKind::Red && me.role != Some(Role::Cyborg) {
                return Err("You cannot perform this action!".to_string());
            }
            if session.tasks.get(&task_id) != Some(&TaskStatus::Incomplete) {
                return Err("Task already completed!".to_string());
            }
        }

        if self.is_host().await {
            self.resolve_task(task_id, kind, &local_id).await?;
        } else {
            self.send_to_host(Message::TaskUpdate {
                task_id,
                task_type: kind,
                player_id: local_id,
            });
        }
        Ok(())
    }

    /// Host-only task authority. The sole place a task slot changes state:
    /// `incomplete -> complete` for GRN, `incomplete -> broken` for RED,
    /// never anything else and never back.
    pub(crate) async fn resolve_task(
        &self,
        task_id: TaskId,
        kind: TaskKind,
        player_id: &str,
    ) -> Result<TaskStatus, String> {
        if !self.is_host().await {
            return Err("Only the host resolves tasks".to_string());
        }

        let (status, tasks) = {
            let mut session = self.session.write().await;
            if session.phase != Phase::Playing {
                return Err("Tasks can only be resolved while playing".to_string());
            }
            let player = session
                .player(player_id)
                .ok_or_else(|| format!("Unknown player {player_id}"))?;
            if player.eliminated {
                return Err("Eliminated players cannot work tasks".to_string());
            }
            // GRN is open to everyone alive; cyborgs use it to blend in
            if kind == TaskKind::Red && player.role != Some(Role::Cyborg) {
                return Err("Only a cyborg can break a task".to_string());
            }
            match session.tasks.get(&task_id) {
                Some(TaskStatus::Incomplete) => {}
                Some(_) => return Err("Task already resolved".to_string()),
                None => return Err(format!("No such task {task_id}")),
            }

            let status = match kind {
                TaskKind::Green => TaskStatus::Complete,
                TaskKind::Red => TaskStatus::Broken,
            };
            session.tasks.insert(task_id, status);
            (status, session.tasks.clone())
        };

        tracing::info!(task_id, ?status, by = %player_id, "task resolved");
        self.broadcast(Message::TaskStateSync { tasks });
        self.emit(GameEvent::TasksChanged);
        self.check_win_conditions().await;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn playing_state() -> SessionState {
        let state = SessionState::new("Alice");
        state.host_session("ABCD".to_string()).await;
        for (id, name) in [("p2", "Bob"), ("p3", "Carol")] {
            state
                .add_player(id.to_string(), name.to_string(), None)
                .await
                .unwrap();
        }
        state.start_game().await.unwrap();
        state
    }

    async fn player_with_role(state: &SessionState, role: Role) -> PlayerId {
        state
            .session()
            .await
            .players
            .iter()
            .find(|p| p.role == Some(role))
            .map(|p| p.id.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn green_tasks_are_open_to_both_roles() {
        let state = playing_state().await;
        let agent = player_with_role(&state, Role::Agent).await;
        let cyborg = player_with_role(&state, Role::Cyborg).await;

        assert_eq!(
            state.resolve_task(1, TaskKind::Green, &agent).await.unwrap(),
            TaskStatus::Complete
        );
        assert_eq!(
            state.resolve_task(2, TaskKind::Green, &cyborg).await.unwrap(),
            TaskStatus::Complete
        );
    }

    #[tokio::test]
    async fn red_tasks_are_cyborg_only() {
        let state = playing_state().await;
        let agent = player_with_role(&state, Role::Agent).await;
        let cyborg = player_with_role(&state, Role::Cyborg).await;

        let err = state.resolve_task(1, TaskKind::Red, &agent).await.unwrap_err();
        assert!(err.contains("cyborg"));

        assert_eq!(
            state.resolve_task(1, TaskKind::Red, &cyborg).await.unwrap(),
            TaskStatus::Broken
        );
    }

    #[tokio::test]
    async fn task_status_is_monotonic() {
        let state = playing_state().await;
        let agent = player_with_role(&state, Role::Agent).await;
        let cyborg = player_with_role(&state, Role::Cyborg).await;

        state.resolve_task(1, TaskKind::Green, &agent).await.unwrap();

        // Neither a replayed GRN nor a competing RED moves the slot again
        assert!(state.resolve_task(1, TaskKind::Green, &agent).await.is_err());
        assert!(state.resolve_task(1, TaskKind::Red, &cyborg).await.is_err());
        assert_eq!(
            state.session().await.tasks.get(&1),
            Some(&TaskStatus::Complete)
        );
    }

    #[tokio::test]
    async fn rejects_unknown_players_and_tasks() {
        let state = playing_state().await;
        let agent = player_with_role(&state, Role::Agent).await;

        assert!(state
            .resolve_task(1, TaskKind::Green, "nobody")
            .await
            .is_err());
        assert!(state.resolve_task(9, TaskKind::Green, &agent).await.is_err());
    }

    #[tokio::test]
    async fn eliminated_players_cannot_work_tasks() {
        let state = playing_state().await;
        let agent = player_with_role(&state, Role::Agent).await;
        state
            .session
            .write()
            .await
            .player_mut(&agent)
            .unwrap()
            .eliminated = true;

        let err = state.resolve_task(1, TaskKind::Green, &agent).await.unwrap_err();
        assert!(err.contains("Eliminated"));
    }
}
