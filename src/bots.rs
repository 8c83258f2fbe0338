//! Simulated players.
//!
//! Bots exist only on the host and only do one thing: during deliberation
//! each living bot votes for a uniformly random living target (never
//! itself) after a short randomized delay. The delay is a suspension point,
//! so delivery re-checks that the world still looks like it did when the
//! vote was scheduled.

use crate::state::SessionState;
use crate::types::*;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Bot votes land between these bounds after deliberation starts
const BOT_VOTE_DELAY_MS: std::ops::Range<u64> = 500..2000;

/// Queue one delayed vote per living, unvoted bot. Call whenever a
/// deliberation round opens (including the fresh round after a tie).
pub fn schedule_bot_votes(state: &Arc<SessionState>) {
    let state = state.clone();
    tokio::spawn(async move {
        if !state.is_host().await {
            return;
        }
        let bots: Vec<PlayerId> = {
            let session = state.session.read().await;
            if session.phase != Phase::Deliberation {
                return;
            }
            session
                .alive_players()
                .filter(|p| p.is_bot)
                .map(|p| p.id.clone())
                .collect()
        };

        for bot_id in bots {
            let state = state.clone();
            let delay = {
                let mut rng = rand::rng();
                Duration::from_millis(rng.random_range(BOT_VOTE_DELAY_MS))
            };
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                cast_bot_vote(&state, &bot_id).await;
            });
        }
    });
}

/// Deliver one bot's vote, re-validating everything that may have changed
/// while the delay ran.
async fn cast_bot_vote(state: &SessionState, bot_id: &str) {
    let target = {
        let session = state.session.read().await;
        // Stale-checks: the meeting may be over, the bot may be dead or
        // may have voted in a round that started and finished meanwhile
        if session.phase != Phase::Deliberation {
            return;
        }
        match session.player(bot_id) {
            Some(bot) if !bot.eliminated && !session.votes.contains_key(bot_id) => {}
            _ => return,
        }

        let targets: Vec<PlayerId> = session
            .alive_players()
            .filter(|p| p.id != bot_id)
            .map(|p| p.id.clone())
            .collect();
        if targets.is_empty() {
            return;
        }
        let mut rng = rand::rng();
        targets[rng.random_range(0..targets.len())].clone()
    };

    if let Err(reason) = state.record_vote(bot_id, &target).await {
        tracing::debug!(%bot_id, %reason, "bot vote dropped");
    }
}
