//! Message dispatch.
//!
//! Routes decoded wire messages to their handlers and enforces the
//! host/client authority split: state-mutating intents are processed only
//! on the endpoint currently marked host, replica broadcasts are applied
//! only by clients (a mirror overwrite arriving at the host would let an
//! untrusted peer rewrite canonical state). Anything that fails a gate is
//! logged and dropped; the dispatcher never errors back to the sender.

use crate::protocol::{GameEvent, Message};
use crate::state::SessionState;
use crate::types::*;

/// Process a mutation intent only on the host
macro_rules! host_only {
    ($state:expr, $what:expr) => {
        if !$state.is_host().await {
            tracing::warn!("ignoring {}: this endpoint is not the host", $what);
            return None;
        }
    };
}

/// Apply a replica broadcast only on a client mirror
macro_rules! mirror_only {
    ($state:expr, $what:expr) => {
        if $state.is_host().await {
            tracing::warn!("ignoring {}: the host mirrors nobody", $what);
            return None;
        }
    };
}

/// Handle one inbound message from `origin` and return the direct reply to
/// send back on that channel, if any.
pub async fn handle_message(
    state: &SessionState,
    msg: Message,
    origin: &EndpointId,
) -> Option<Message> {
    match msg {
        // ----- intents: the host arbitrates -----
        Message::Join {
            player_id,
            player_name,
        } => {
            host_only!(state, "join");
            match state
                .add_player(player_id, player_name, Some(origin.clone()))
                .await
            {
                Ok(_) => Some(Message::StateSync {
                    state: state.session().await,
                }),
                Err(reason) => {
                    tracing::warn!(%reason, "join rejected");
                    None
                }
            }
        }

        Message::PlayerLeft {
            player_id,
            player_name,
        } => {
            host_only!(state, "playerLeft");
            if state.remove_player(&player_id).await.is_none() {
                tracing::warn!(%player_id, %player_name, "departure for unknown player");
            }
            None
        }

        Message::TaskUpdate {
            task_id,
            task_type,
            player_id,
        } => {
            host_only!(state, "taskUpdate");
            if let Err(reason) = state.resolve_task(task_id, task_type, &player_id).await {
                tracing::warn!(task_id, %reason, "task attempt rejected");
            }
            None
        }

        Message::Vote {
            voter_id,
            target_id,
        } => {
            if state.is_host().await {
                if let Err(reason) = state.record_vote(&voter_id, &target_id).await {
                    tracing::warn!(%voter_id, %reason, "vote rejected");
                }
            } else {
                apply_vote_to_mirror(state, voter_id, target_id).await;
            }
            None
        }

        Message::RequestStateSync => {
            host_only!(state, "requestStateSync");
            Some(Message::StateSync {
                state: state.session().await,
            })
        }

        // ----- replicas: clients overwrite their mirror -----
        Message::StateSync { state: snapshot } => {
            mirror_only!(state, "stateSync");
            state.apply_snapshot(snapshot).await;
            None
        }

        Message::PlayerJoined { player, players } => {
            mirror_only!(state, "playerJoined");
            state.session.write().await.players = players;
            state.emit(GameEvent::PlayerJoined { name: player.name });
            None
        }

        Message::PlayerRemoved {
            player_name,
            players,
            ..
        } => {
            mirror_only!(state, "playerRemoved");
            state.session.write().await.players = players;
            state.emit(GameEvent::PlayerLeft { name: player_name });
            None
        }

        Message::GameStart {
            players,
            tasks,
            time_remaining,
        } => {
            mirror_only!(state, "gameStart");
            {
                let mut session = state.session.write().await;
                session.players = players;
                session.tasks = tasks;
                session.time_remaining = time_remaining;
                session.phase = Phase::Playing;
                session.timer_running = true;
                session.votes.clear();
            }
            state.emit_role_reveal().await;
            None
        }

        Message::TaskStateSync { tasks } => {
            mirror_only!(state, "taskStateSync");
            state.session.write().await.tasks = tasks;
            state.emit(GameEvent::TasksChanged);
            None
        }

        Message::TimerSync {
            time_remaining,
            timer_running,
        } => {
            mirror_only!(state, "timerSync");
            {
                let mut session = state.session.write().await;
                session.time_remaining = time_remaining;
                session.timer_running = timer_running;
            }
            state.emit(GameEvent::TimerChanged {
                time_remaining,
                timer_running,
            });
            None
        }

        Message::DeliberationStart => {
            mirror_only!(state, "deliberationStart");
            {
                let mut session = state.session.write().await;
                session.phase = Phase::Deliberation;
                session.votes.clear();
                session.timer_running = false;
                for p in &mut session.players {
                    p.voted = false;
                }
            }
            state.emit(GameEvent::DeliberationStarted);
            None
        }

        Message::PlayerEliminated {
            player_id,
            player_name,
            role,
        } => {
            mirror_only!(state, "playerEliminated");
            {
                let mut session = state.session.write().await;
                if let Some(player) = session.player_mut(&player_id) {
                    player.eliminated = true;
                    player.role = role;
                }
                session.phase = Phase::Playing;
                session.votes.clear();
                for p in &mut session.players {
                    p.voted = false;
                }
            }
            state.emit(GameEvent::PlayerEliminated {
                name: player_name,
                role,
                murdered: false,
            });
            None
        }

        Message::PlayerMurdered {
            player_id,
            player_name,
            role,
        } => {
            mirror_only!(state, "playerMurdered");
            if let Some(player) = state.session.write().await.player_mut(&player_id) {
                player.eliminated = true;
                player.role = role;
            }
            state.emit(GameEvent::PlayerEliminated {
                name: player_name,
                role,
                murdered: true,
            });
            None
        }

        Message::VoteTied { tied_player_names } => {
            mirror_only!(state, "voteTied");
            {
                let mut session = state.session.write().await;
                session.votes.clear();
                for p in &mut session.players {
                    p.voted = false;
                }
            }
            state.emit(GameEvent::VoteTied { tied_player_names });
            None
        }

        Message::DeliberationCancelled => {
            mirror_only!(state, "deliberationCancelled");
            {
                let mut session = state.session.write().await;
                session.phase = Phase::Playing;
                session.votes.clear();
                session.timer_running = true;
                for p in &mut session.players {
                    p.voted = false;
                }
            }
            state.emit(GameEvent::DeliberationCancelled);
            None
        }

        Message::GameOver {
            winner,
            reason,
            players,
            tasks,
        } => {
            mirror_only!(state, "gameOver");
            {
                let mut session = state.session.write().await;
                session.phase = Phase::GameOver;
                session.timer_running = false;
                session.players = players;
                session.tasks = tasks;
                session.votes.clear();
            }
            state.emit(GameEvent::GameEnded { winner, reason });
            None
        }

        Message::GameCancelled => {
            mirror_only!(state, "gameCancelled");
            state.emit(GameEvent::GameCancelled);
            state.reset().await;
            None
        }
    }
}

/// A vote echoed by the host lands in the client mirror as-is; stale or
/// duplicate echoes are harmless overwrites.
async fn apply_vote_to_mirror(state: &SessionState, voter_id: PlayerId, target_id: PlayerId) {
    let mut session = state.session.write().await;
    if session.phase != Phase::Deliberation {
        return;
    }
    session.votes.insert(voter_id.clone(), target_id);
    if let Some(voter) = session.player_mut(&voter_id) {
        voter.voted = true;
    }
}
