//! Process-wide sync state and its on-disk persistence.
//!
//! Only `last_sync_timestamp` survives a restart. The lock and error fields
//! always come back at their defaults, so a crash in the middle of a mutation
//! can never leave the lock held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sync and mutation status, owned by the mutation coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    /// A remote fetch + reconcile is in flight
    pub is_syncing: bool,
    /// Any mutation (sync, create, update, delete) holds the lock
    pub is_mutating: bool,
    /// Message of the last failed sync
    pub sync_error: Option<String>,
    /// When a sync last actually fetched from the remote
    pub last_sync_timestamp: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Rebuilds state after a restart from what was persisted.
    pub fn rehydrate(persisted: PersistedSyncState) -> Self {
        Self {
            last_sync_timestamp: persisted.last_sync_timestamp,
            ..Self::default()
        }
    }

    pub fn persisted(&self) -> PersistedSyncState {
        PersistedSyncState {
            last_sync_timestamp: self.last_sync_timestamp,
        }
    }

    /// Whether a sync has ever completed a fetch.
    pub fn has_synced(&self) -> bool {
        self.last_sync_timestamp.is_some()
    }

    /// The sync error, when there is no previously synced data to fall back on.
    pub fn blocking_error(&self) -> Option<&str> {
        if self.has_synced() {
            None
        } else {
            self.sync_error.as_deref()
        }
    }
}

/// The persisted subset of [`SyncState`].
///
/// Unknown fields in the file are ignored, so stale lock flags written by
/// other versions are dropped on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSyncState {
    #[serde(default)]
    pub last_sync_timestamp: Option<DateTime<Utc>>,
}

/// JSON file holding [`PersistedSyncState`].
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted state. A missing file yields the default state.
    pub fn load(&self) -> Result<SyncState, StateError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SyncState::default())
            }
            Err(e) => return Err(StateError::Read(self.path.clone(), e)),
        };

        let persisted: PersistedSyncState = serde_json::from_str(&contents)
            .map_err(|e| StateError::Parse(self.path.clone(), e))?;
        Ok(SyncState::rehydrate(persisted))
    }

    /// Loads the persisted state, falling back to defaults on any error.
    pub fn load_or_default(&self) -> SyncState {
        match self.load() {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("{}; starting with empty sync state", e);
                SyncState::default()
            }
        }
    }

    /// Writes the persisted subset of `state`, replacing the file atomically.
    pub fn save(&self, state: &SyncState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateError::Write(self.path.clone(), e))?;
        }

        let json = serde_json::to_string_pretty(&state.persisted())
            .map_err(|e| StateError::Parse(self.path.clone(), e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| StateError::Write(tmp_path.clone(), e))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| StateError::Write(self.path.clone(), e))?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum StateError {
    Read(PathBuf, std::io::Error),
    Write(PathBuf, std::io::Error),
    Parse(PathBuf, serde_json::Error),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::Read(path, e) => {
                write!(f, "Failed to read sync state '{}': {}", path.display(), e)
            }
            StateError::Write(path, e) => {
                write!(f, "Failed to write sync state '{}': {}", path.display(), e)
            }
            StateError::Parse(path, e) => {
                write!(f, "Failed to parse sync state '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateError::Read(_, e) | StateError::Write(_, e) => Some(e),
            StateError::Parse(_, e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn test_file() -> (StateFile, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let file = StateFile::new(temp_dir.path().join("state").join("sync_state.json"));
        (file, temp_dir)
    }

    #[test]
    fn test_missing_file_is_default() {
        let (file, _temp) = test_file();
        assert_eq!(file.load().unwrap(), SyncState::default());
    }

    #[test]
    fn test_only_timestamp_survives_restart() {
        let (file, _temp) = test_file();
        let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let state = SyncState {
            is_syncing: true,
            is_mutating: true,
            sync_error: Some("boom".to_string()),
            last_sync_timestamp: Some(stamp),
        };
        file.save(&state).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(
            loaded,
            SyncState {
                last_sync_timestamp: Some(stamp),
                ..SyncState::default()
            }
        );
    }

    #[test]
    fn test_stale_lock_flags_in_file_are_ignored() {
        let (file, _temp) = test_file();
        std::fs::create_dir_all(file.path().parent().unwrap()).unwrap();
        std::fs::write(
            file.path(),
            r#"{"is_mutating":true,"is_syncing":true,"sync_error":"x","last_sync_timestamp":null}"#,
        )
        .unwrap();

        let loaded = file.load().unwrap();
        assert!(!loaded.is_mutating);
        assert!(!loaded.is_syncing);
        assert!(loaded.sync_error.is_none());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let (file, _temp) = test_file();
        std::fs::create_dir_all(file.path().parent().unwrap()).unwrap();
        std::fs::write(file.path(), "{not json").unwrap();

        assert!(matches!(file.load(), Err(StateError::Parse(_, _))));
        assert_eq!(file.load_or_default(), SyncState::default());
    }

    #[test]
    fn test_blocking_error_only_before_first_sync() {
        let mut state = SyncState {
            sync_error: Some("offline".to_string()),
            ..SyncState::default()
        };
        assert_eq!(state.blocking_error(), Some("offline"));

        state.last_sync_timestamp = Some(Utc::now());
        assert!(state.has_synced());
        assert_eq!(state.blocking_error(), None);
    }
}
