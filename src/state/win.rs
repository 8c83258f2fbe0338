use super::SessionState;
use crate::types::*;

/// Pure win evaluator, checked after every task resolution and every
/// elimination. The timeout outcome is the timer service's to raise, not
/// ours.
pub fn evaluate(session: &Session) -> Option<Outcome> {
    // Nothing to evaluate before roles are dealt
    if session.players.iter().all(|p| p.role.is_none()) {
        return None;
    }

    if session.task_count(TaskStatus::Complete) == TASK_COUNT {
        return Some(Outcome {
            winner: Winner::Agents,
            reason: "All tasks completed!".to_string(),
        });
    }
    if session.task_count(TaskStatus::Broken) == TASK_COUNT {
        return Some(Outcome {
            winner: Winner::Cyborgs,
            reason: "All tasks sabotaged!".to_string(),
        });
    }
    if session.living_cyborg_count() == 0 {
        return Some(Outcome {
            winner: Winner::Agents,
            reason: "All Cyborgs have been exposed!".to_string(),
        });
    }
    None
}

impl SessionState {
    /// Host-only: evaluate and, on a decided game, drive the terminal
    /// transition.
    pub(crate) async fn check_win_conditions(&self) {
        if !self.is_host().await {
            return;
        }
        let outcome = {
            let session = self.session.read().await;
            if session.phase == Phase::GameOver {
                return;
            }
            evaluate(&session)
        };
        if let Some(outcome) = outcome {
            self.end_game(outcome).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_roles() -> Session {
        let mut session = Session::new("TEST".to_string());
        for (i, role) in [Role::Cyborg, Role::Agent, Role::Agent].iter().enumerate() {
            let mut p = Player::new(format!("p{i}"), format!("Player {i}"));
            p.role = Some(*role);
            session.players.push(p);
        }
        session.phase = Phase::Playing;
        session
    }

    #[test]
    fn no_outcome_for_a_running_game() {
        let session = session_with_roles();
        assert_eq!(evaluate(&session), None);
    }

    #[test]
    fn all_complete_means_agents_win() {
        let mut session = session_with_roles();
        for id in 1..=TASK_COUNT as TaskId {
            session.tasks.insert(id, TaskStatus::Complete);
        }
        let outcome = evaluate(&session).unwrap();
        assert_eq!(outcome.winner, Winner::Agents);
        assert_eq!(outcome.reason, "All tasks completed!");
    }

    #[test]
    fn all_broken_means_cyborgs_win() {
        let mut session = session_with_roles();
        for id in 1..=TASK_COUNT as TaskId {
            session.tasks.insert(id, TaskStatus::Broken);
        }
        let outcome = evaluate(&session).unwrap();
        assert_eq!(outcome.winner, Winner::Cyborgs);
        assert_eq!(outcome.reason, "All tasks sabotaged!");
    }

    #[test]
    fn no_living_cyborgs_means_agents_win() {
        let mut session = session_with_roles();
        session.player_mut("p0").unwrap().eliminated = true;
        let outcome = evaluate(&session).unwrap();
        assert_eq!(outcome.winner, Winner::Agents);
        assert_eq!(outcome.reason, "All Cyborgs have been exposed!");
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut session = session_with_roles();
        session.tasks.insert(1, TaskStatus::Complete);
        session.player_mut("p1").unwrap().eliminated = true;
        assert_eq!(evaluate(&session), evaluate(&session));
    }

    #[test]
    fn unassigned_roster_never_decides() {
        let mut session = Session::new("TEST".to_string());
        session
            .players
            .push(Player::new("p0".to_string(), "Alice".to_string()));
        assert_eq!(evaluate(&session), None);
    }
}
