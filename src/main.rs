//! Demo: a full game between three endpoints and five bots over the
//! in-memory transport. Useful for eyeballing the protocol flow with
//! `RUST_LOG=spybot=debug cargo run`.

use spybot::endpoint::Endpoint;
use spybot::protocol::{GameEvent, TallyResult};
use spybot::transport::mem::MemDirectory;
use spybot::types::{Phase, TaskKind, TASK_COUNT};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spybot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let directory = MemDirectory::new();

    let host = Endpoint::host(directory.clone(), "Ada").await.unwrap();
    let code = host.state.session().await.code.clone();
    tracing::info!(%code, "session open");

    // Narrate the host's view of the game
    let mut events = host.state.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                GameEvent::GameEnded { winner, reason } => {
                    tracing::info!(?winner, %reason, "GAME OVER")
                }
                other => tracing::info!(?other, "event"),
            }
        }
    });

    let bob = Endpoint::join(directory.clone(), &code, "Bob").await.unwrap();
    let carol = Endpoint::join(directory.clone(), &code, "Carol")
        .await
        .unwrap();
    settle().await;

    host.state.add_bots().await.unwrap();
    host.state.set_num_cyborgs(2).await.unwrap();
    host.state.start_game().await.unwrap();
    settle().await;

    // A little task work from the guests
    let _ = bob.state.attempt_task(1, TaskKind::Green).await;
    let _ = carol.state.attempt_task(2, TaskKind::Green).await;
    settle().await;

    // A meeting: the humans gang up on the first bot, the bots vote at
    // random, and ties simply rerun the round
    host.call_meeting().await.unwrap();
    settle().await;
    loop {
        let session = host.state.session().await;
        let scapegoat = session
            .alive_players()
            .find(|p| p.is_bot)
            .map(|p| p.id.clone())
            .expect("a bot to blame");

        host.state.cast_vote(&scapegoat).await.unwrap();
        let _ = bob.state.cast_vote(&scapegoat).await;
        let _ = carol.state.cast_vote(&scapegoat).await;

        // Give the bot ballots time to land
        tokio::time::sleep(Duration::from_millis(2500)).await;

        match host.tally_votes().await {
            Ok(TallyResult::Eliminated { name, .. }) => {
                tracing::info!(%name, "the group has spoken");
                break;
            }
            Ok(TallyResult::Tied { tied_player_names }) => {
                tracing::info!(?tied_player_names, "tie, voting again");
            }
            Err(reason) => {
                tracing::info!(%reason, "tally not ready, waiting");
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
    host.state.resume_timer().await.unwrap();

    // Finish the job: the first still-living participant greens out each
    // remaining task
    for task_id in 1..=TASK_COUNT as u8 {
        for endpoint in [&host, &bob, &carol] {
            if endpoint
                .state
                .attempt_task(task_id, TaskKind::Green)
                .await
                .is_ok()
            {
                break;
            }
        }
    }
    settle().await;

    let end_state = bob.state.session().await;
    assert_eq!(end_state.phase, Phase::GameOver);
    tracing::info!("demo complete, all mirrors converged");
}

/// Let in-flight broadcasts drain
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
