use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ConversationRef, Poll};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// The single JSON file persisted to disk by C14 (§6 "Persisted state file").
/// A plain data struct — locking discipline (copy-under-lock, write outside
/// locks) is the caller's responsibility (§4.14).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub teams_conv_by_id: HashMap<String, ConversationRef>,
    #[serde(default)]
    pub teams_conv_by_user_id: HashMap<String, ConversationRef>,
    #[serde(default)]
    pub inbound_seen: HashMap<String, String>,
    #[serde(default)]
    pub teams_polls: HashMap<String, Poll>,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file: {0}")]
    Read(std::io::Error),
    #[error("state file contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("failed to write state file: {0}")]
    Write(std::io::Error),
}

/// Loads the state file at `path`. A missing file is tolerated (warn and
/// return the default state); invalid JSON is a load error.
pub fn load(path: &Path) -> Result<PersistedState, StateError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "state file not found, starting empty");
            return Ok(PersistedState::default());
        }
        Err(err) => return Err(StateError::Read(err)),
    };

    serde_json::from_str(&raw).map_err(StateError::InvalidJson)
}

/// Writes `state` to `path` atomically: parent directory mode 0700, file
/// mode 0600, 2-space indented JSON (§4.14).
pub fn save(path: &Path, state: &PersistedState) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(StateError::Write)?;
        #[cfg(unix)]
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
            .map_err(StateError::Write)?;
    }

    let json = serde_json::to_string_pretty(state).map_err(StateError::InvalidJson)?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json).map_err(StateError::Write)?;
    #[cfg(unix)]
    std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
        .map_err(StateError::Write)?;
    std::fs::rename(&tmp_path, path).map_err(StateError::Write)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConversationRef;

    #[test]
    fn missing_file_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let state = load(&path).expect("tolerant of missing file");
        assert!(state.teams_conv_by_id.is_empty());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(load(&path), Err(StateError::InvalidJson(_))));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = PersistedState::default();
        state.teams_conv_by_id.insert(
            "conv-1".into(),
            ConversationRef {
                service_url: "https://smba.trafficmanager.net/emea".into(),
                conversation_id: "conv-1".into(),
                user_id: "user-1".into(),
            },
        );
        state
            .inbound_seen
            .insert("slack:event:Ev1".into(), "2026-01-01T00:00:00Z".into());

        save(&path, &state).expect("save succeeds");
        let loaded = load(&path).expect("load succeeds");

        assert_eq!(loaded.teams_conv_by_id.len(), 1);
        assert_eq!(
            loaded.inbound_seen.get("slack:event:Ev1"),
            Some(&"2026-01-01T00:00:00Z".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn save_sets_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        save(&path, &PersistedState::default()).expect("save succeeds");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
    }
}
