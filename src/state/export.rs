//! Session checkpointing for an external persistence layer.
//!
//! The save/load collaborator treats the payload as opaque bytes; the
//! envelope here carries enough structure to validate a snapshot before it
//! is allowed back in as canonical state.

use super::SessionState;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Bumped whenever the serialized session layout changes
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// A serializable snapshot of one endpoint's session.
///
/// Excludes runtime-only state: transport channels, broadcast receivers,
/// and spawned timers are all rebuilt on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (RFC3339)
    pub exported_at: String,
    pub session: Session,
    pub player_id: PlayerId,
    pub player_name: String,
    pub is_host: bool,
}

impl SessionExport {
    /// Structural sanity checks before an import is accepted.
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }
        if self.session.tasks.len() != TASK_COUNT {
            return Err(format!(
                "Expected {} task slots, found {}",
                TASK_COUNT,
                self.session.tasks.len()
            ));
        }
        let hosts = self.session.players.iter().filter(|p| p.is_host).count();
        if !self.session.players.is_empty() && hosts != 1 {
            return Err(format!("Expected exactly one host, found {hosts}"));
        }
        for voter in self.session.votes.keys() {
            match self.session.player(voter) {
                Some(p) if p.eliminated => {
                    return Err(format!("Vote from eliminated player {voter}"))
                }
                Some(_) => {}
                None => return Err(format!("Vote from unknown player {voter}")),
            }
        }
        Ok(())
    }
}

impl SessionState {
    /// Checkpoint the full session (plus local identity) as opaque bytes.
    pub async fn serialize_session(&self) -> Result<Vec<u8>, String> {
        let local = self.local().await;
        let export = SessionExport {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            session: self.session().await,
            player_id: local.player_id,
            player_name: local.player_name,
            is_host: local.is_host,
        };
        serde_json::to_vec(&export).map_err(|e| format!("Failed to serialize session: {e}"))
    }

    /// Reload a checkpoint produced by `serialize_session`, validating it
    /// before anything is overwritten. Returns the restored session.
    pub async fn restore_session(&self, bytes: &[u8]) -> Result<Session, String> {
        let export: SessionExport = serde_json::from_slice(bytes)
            .map_err(|e| format!("Failed to parse session export: {e}"))?;
        export.validate()?;

        {
            let mut local = self.local.write().await;
            local.player_id = export.player_id;
            local.player_name = export.player_name;
            local.is_host = export.is_host;
        }
        {
            let mut session = self.session.write().await;
            *session = export.session.clone();
        }
        tracing::info!(code = %export.session.code, "session restored from checkpoint");
        Ok(export.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    async fn hosted_state() -> SessionState {
        let state = SessionState::new("Alice");
        state.host_session("ABCD".to_string()).await;
        for (id, name) in [("p2", "Bob"), ("p3", "Carol")] {
            state
                .add_player(id.to_string(), name.to_string(), None)
                .await
                .unwrap();
        }
        state
    }

    #[tokio::test]
    async fn checkpoint_round_trips_through_a_file() {
        let state = hosted_state().await;
        state.start_game().await.unwrap();
        let before = state.session().await;

        let bytes = state.serialize_session().await.unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();

        let mut reloaded = Vec::new();
        std::fs::File::open(file.path())
            .unwrap()
            .read_to_end(&mut reloaded)
            .unwrap();

        let fresh = SessionState::new("placeholder");
        let restored = fresh.restore_session(&reloaded).await.unwrap();
        assert_eq!(restored, before);
        assert!(fresh.is_host().await);
        assert_eq!(fresh.local().await.player_name, "Alice");
    }

    #[tokio::test]
    async fn newer_schema_versions_are_refused() {
        let state = hosted_state().await;
        let bytes = state.serialize_session().await.unwrap();
        let mut export: SessionExport = serde_json::from_slice(&bytes).unwrap();
        export.schema_version = EXPORT_SCHEMA_VERSION + 1;

        let fresh = SessionState::new("placeholder");
        let err = fresh
            .restore_session(&serde_json::to_vec(&export).unwrap())
            .await
            .unwrap_err();
        assert!(err.contains("schema version"));
    }

    #[tokio::test]
    async fn corrupt_structure_is_refused() {
        let state = hosted_state().await;
        let bytes = state.serialize_session().await.unwrap();
        let mut export: SessionExport = serde_json::from_slice(&bytes).unwrap();
        export.session.tasks.remove(&5);

        let fresh = SessionState::new("placeholder");
        let err = fresh
            .restore_session(&serde_json::to_vec(&export).unwrap())
            .await
            .unwrap_err();
        assert!(err.contains("task slots"));

        assert!(fresh.restore_session(b"{not json").await.is_err());
    }

    #[tokio::test]
    async fn double_host_snapshots_are_refused() {
        let state = hosted_state().await;
        state.session.write().await.player_mut("p2").unwrap().is_host = true;

        let bytes = state.serialize_session().await.unwrap();
        let fresh = SessionState::new("placeholder");
        let err = fresh.restore_session(&bytes).await.unwrap_err();
        assert!(err.contains("exactly one host"));
    }
}
