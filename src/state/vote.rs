use super::SessionState;
use crate::protocol::{GameEvent, Message, TallyResult};
use crate::types::*;
use std::collections::HashMap;

impl SessionState {
    /// Host calls a team meeting: timer pauses, votes clear, everyone gets
    /// a fresh ballot.
    pub async fn call_deliberation(&self) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host can call a meeting".to_string());
        }
        {
            let mut session = self.session.write().await;
            if session.phase != Phase::Playing {
                return Err("Meetings can only be called while playing".to_string());
            }
            session.phase = Phase::Deliberation;
            session.votes.clear();
            session.timer_running = false;
            for p in &mut session.players {
                p.voted = false;
            }
        }

        tracing::info!("deliberation started");
        self.broadcast(Message::DeliberationStart);
        self.emit(GameEvent::DeliberationStarted);
        Ok(())
    }

    /// The local player votes to eliminate `target_id`. On the host this is
    /// recorded directly; on a client it is recorded optimistically and sent
    /// to the host, whose echo re-applies it idempotently.
    pub async fn cast_vote(&self, target_id: &str) -> Result<(), String> {
        let local_id = self.local_player_id().await;
        if self.is_host().await {
            return self.record_vote(&local_id, target_id).await;
        }

        {
            let mut session = self.session.write().await;
            if session.phase != Phase::Deliberation {
                return Err("Voting is only open during deliberation".to_string());
            }
            match session.player(&local_id) {
                Some(me) if me.eliminated => {
                    return Err("You have been eliminated and cannot vote!".to_string())
                }
                Some(_) => {}
                None => return Err("You are not in this game".to_string()),
            }
            session.votes.insert(local_id.clone(), target_id.to_string());
            if let Some(me) = session.player_mut(&local_id) {
                me.voted = true;
            }
        }

        self.send_to_host(Message::Vote {
            voter_id: local_id,
            target_id: target_id.to_string(),
        });
        Ok(())
    }

    /// Host-side vote intake: validate, record, and echo to every channel
    /// so all mirrors watch the tally fill in. Re-votes overwrite.
    pub(crate) async fn record_vote(&self, voter_id: &str, target_id: &str) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host records votes".to_string());
        }

        let (votes_cast, alive) = {
            let mut session = self.session.write().await;
            if session.phase != Phase::Deliberation {
                return Err("Voting is only open during deliberation".to_string());
            }
            match session.player(voter_id) {
                Some(v) if v.eliminated => {
                    return Err(format!("{} is eliminated and cannot vote", v.name))
                }
                Some(_) => {}
                None => return Err(format!("Unknown voter {voter_id}")),
            }
            match session.player(target_id) {
                Some(t) if t.eliminated => {
                    return Err(format!("{} is already eliminated", t.name))
                }
                Some(_) => {}
                None => return Err(format!("Unknown vote target {target_id}")),
            }

            session.votes.insert(voter_id.to_string(), target_id.to_string());
            if let Some(voter) = session.player_mut(voter_id) {
                voter.voted = true;
            }
            (session.votes.len(), session.alive_count())
        };

        tracing::debug!(voter = %voter_id, target = %target_id, "vote recorded");
        self.broadcast(Message::Vote {
            voter_id: voter_id.to_string(),
            target_id: target_id.to_string(),
        });
        self.emit(GameEvent::VoteRecorded {
            voter_id: voter_id.to_string(),
            votes_cast,
            alive,
        });
        Ok(())
    }

    /// Host resolves the ballot. Requires every living player to have
    /// voted. A unique maximum eliminates that player; any tie eliminates
    /// nobody and opens a fresh round with cleared votes.
    pub async fn tally_votes(&self) -> Result<TallyResult, String> {
        if !self.is_host().await {
            return Err("Only the host counts votes".to_string());
        }

        let tally = {
            let session = self.session.read().await;
            if session.phase != Phase::Deliberation {
                return Err("No deliberation in progress".to_string());
            }
            if session.votes.len() < session.alive_count() {
                return Err("Not all players have voted yet!".to_string());
            }

            let mut counts: HashMap<&str, usize> = HashMap::new();
            for target in session.votes.values() {
                *counts.entry(target.as_str()).or_insert(0) += 1;
            }
            let max = counts.values().copied().max().unwrap_or(0);
            let mut leaders: Vec<&str> = counts
                .iter()
                .filter(|(_, n)| **n == max)
                .map(|(id, _)| *id)
                .collect();
            leaders.sort_unstable();

            if leaders.len() > 1 {
                let names = leaders
                    .iter()
                    .map(|id| {
                        session
                            .player(id)
                            .map(|p| p.name.clone())
                            .unwrap_or_else(|| "Unknown".to_string())
                    })
                    .collect::<Vec<_>>();
                TallyResult::Tied {
                    tied_player_names: names,
                }
            } else {
                let id = leaders[0].to_string();
                let name = session
                    .player(&id)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Unknown".to_string());
                TallyResult::Eliminated {
                    player_id: id,
                    name,
                }
            }
        };

        match &tally {
            TallyResult::Tied { tied_player_names } => {
                {
                    let mut session = self.session.write().await;
                    session.votes.clear();
                    for p in &mut session.players {
                        p.voted = false;
                    }
                }
                tracing::info!(?tied_player_names, "vote tied, new round");
                self.broadcast(Message::VoteTied {
                    tied_player_names: tied_player_names.clone(),
                });
                self.emit(GameEvent::VoteTied {
                    tied_player_names: tied_player_names.clone(),
                });
            }
            TallyResult::Eliminated { player_id, .. } => {
                self.finish_elimination(player_id).await?;
            }
        }
        Ok(tally)
    }

    /// Host adjudication without a tally: eliminate an explicitly selected
    /// living target (used when the host itself cannot vote, or to settle a
    /// real-world call). Same post-conditions as a tallied elimination.
    pub async fn manual_eliminate(&self, target_id: &str) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host can eliminate manually".to_string());
        }
        {
            let session = self.session.read().await;
            if session.phase != Phase::Deliberation {
                return Err("No deliberation in progress".to_string());
            }
            match session.player(target_id) {
                Some(t) if t.eliminated => return Err("Invalid player selection".to_string()),
                Some(_) => {}
                None => return Err("Invalid player selection".to_string()),
            }
        }
        self.finish_elimination(target_id).await
    }

    /// Shared elimination epilogue for tallied and manual resolutions:
    /// reveal the role, return to `playing` (timer stays paused until the
    /// host resumes it), clear the ballot, re-check win conditions.
    async fn finish_elimination(&self, player_id: &str) -> Result<(), String> {
        let (name, role) = {
            let mut session = self.session.write().await;
            let player = session
                .player_mut(player_id)
                .ok_or_else(|| format!("Unknown player {player_id}"))?;
            player.eliminated = true;
            let name = player.name.clone();
            let role = player.role;

            session.phase = Phase::Playing;
            session.votes.clear();
            for p in &mut session.players {
                p.voted = false;
            }
            (name, role)
        };

        tracing::info!(player = %name, ?role, "player eliminated");
        self.broadcast(Message::PlayerEliminated {
            player_id: player_id.to_string(),
            player_name: name.clone(),
            role,
        });
        self.emit(GameEvent::PlayerEliminated {
            name,
            role,
            murdered: false,
        });
        self.check_win_conditions().await;
        Ok(())
    }

    /// Record an out-of-band elimination (a real-world murder): the target
    /// is revealed and removed from play, but phase and ballot are left
    /// untouched.
    pub async fn record_murder(&self, target_id: &str) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host can record a murder".to_string());
        }

        let (name, role) = {
            let mut session = self.session.write().await;
            if session.phase != Phase::Playing {
                return Err("Murders are recorded from the live game".to_string());
            }
            let player = session
                .player_mut(target_id)
                .ok_or_else(|| format!("Unknown player {target_id}"))?;
            if player.eliminated {
                return Err(format!("{} is already eliminated", player.name));
            }
            player.eliminated = true;
            (player.name.clone(), player.role)
        };

        tracing::info!(player = %name, "murder recorded");
        self.broadcast(Message::PlayerMurdered {
            player_id: target_id.to_string(),
            player_name: name.clone(),
            role,
        });
        self.emit(GameEvent::PlayerEliminated {
            name,
            role,
            murdered: true,
        });
        self.check_win_conditions().await;
        Ok(())
    }

    /// Host calls the meeting off: back to `playing` with the timer
    /// running and the ballot discarded.
    pub async fn cancel_deliberation(&self) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host can cancel a meeting".to_string());
        }
        {
            let mut session = self.session.write().await;
            if session.phase != Phase::Deliberation {
                return Err("No deliberation in progress".to_string());
            }
            session.phase = Phase::Playing;
            session.votes.clear();
            session.timer_running = true;
            for p in &mut session.players {
                p.voted = false;
            }
        }

        tracing::info!("deliberation cancelled");
        self.broadcast(Message::DeliberationCancelled);
        self.emit(GameEvent::DeliberationCancelled);
        Ok(())
    }
}
