//! Host-driven countdown.
//!
//! The host decrements once per real second while the timer runs and
//! rebroadcasts `(timeRemaining, timerRunning)` on a fixed cadence so client
//! mirrors stay within a tick of canonical truth even when individual
//! updates are lost. The tick itself is a plain method so tests advance the
//! clock without waiting.

use crate::protocol::{GameEvent, Message};
use crate::state::SessionState;
use crate::types::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

impl SessionState {
    /// Advance the logical clock by one second. A no-op off the host or
    /// while paused; reaching zero during play hands the win to the
    /// cyborgs.
    pub async fn timer_tick(&self) {
        if !self.is_host().await {
            return;
        }

        let (expired, time_remaining, timer_running) = {
            let mut session = self.session.write().await;
            if !session.timer_running || session.time_remaining == 0 {
                return;
            }
            session.time_remaining -= 1;
            let expired = session.time_remaining == 0 && session.phase == Phase::Playing;
            if expired {
                session.timer_running = false;
            }
            (expired, session.time_remaining, session.timer_running)
        };

        self.emit(GameEvent::TimerChanged {
            time_remaining,
            timer_running,
        });

        if expired {
            tracing::info!("session clock expired");
            self.end_game(Outcome {
                winner: Winner::Cyborgs,
                reason: "Time ran out!".to_string(),
            })
            .await;
        }
    }

    /// Explicit host pause, broadcast immediately.
    pub async fn pause_timer(&self) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host controls the timer".to_string());
        }
        self.set_timer_running(false).await;
        Ok(())
    }

    /// Explicit host resume (after an elimination reveal), broadcast
    /// immediately; also the moment to re-check win conditions.
    pub async fn resume_timer(&self) -> Result<(), String> {
        if !self.is_host().await {
            return Err("Only the host controls the timer".to_string());
        }
        self.set_timer_running(true).await;
        self.check_win_conditions().await;
        Ok(())
    }

    async fn set_timer_running(&self, running: bool) {
        let (time_remaining, timer_running) = {
            let mut session = self.session.write().await;
            if session.phase == Phase::GameOver {
                return;
            }
            session.timer_running = running;
            (session.time_remaining, session.timer_running)
        };
        self.broadcast_timer(time_remaining, timer_running);
    }

    pub(crate) fn broadcast_timer(&self, time_remaining: u32, timer_running: bool) {
        self.broadcast(Message::TimerSync {
            time_remaining,
            timer_running,
        });
        self.emit(GameEvent::TimerChanged {
            time_remaining,
            timer_running,
        });
    }
}

/// Drive the countdown off the wall clock, one tick per second.
pub fn spawn_timer(state: Arc<SessionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            state.timer_tick().await;
        }
    })
}

/// Periodic mirror refresh: every few seconds the host re-sends the clock
/// to every channel while a game is live.
pub fn spawn_timer_sync(state: Arc<SessionState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TIMER_SYNC_INTERVAL_SECS));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;

            if !state.is_host().await {
                continue;
            }
            let (phase, time_remaining, timer_running) = {
                let session = state.session.read().await;
                (session.phase, session.time_remaining, session.timer_running)
            };
            if phase != Phase::Playing {
                continue;
            }
            state.broadcast_timer(time_remaining, timer_running);
        }
    })
}
