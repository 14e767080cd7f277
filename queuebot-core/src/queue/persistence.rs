//! src/queue/persistence.rs
//!
//! Channel-scoped JSON state files. Every write goes to a temp file in the
//! same directory and is renamed over the target, so a crash mid-write
//! leaves the previous file intact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::debug;

use queuebot_common::models::{normalize_channel, QueueEntry, QueueState, Username};
use crate::{Error, QueueError};

/// Which of the two per-channel files a state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// Rewritten after every mutation.
    Auto,
    /// Rewritten only by an explicit save command.
    Backup,
}

impl StateKind {
    fn file_prefix(&self) -> &'static str {
        match self {
            StateKind::Auto => "queue_state",
            StateKind::Backup => "queue_backup",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StateKind::Auto => "auto-save",
            StateKind::Backup => "backup",
        }
    }
}

/// Both on-disk layouts. The current layout carries full entries; the older
/// one only had an ordered list of names.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredState {
    Current(QueueState),
    Legacy(LegacyState),
}

#[derive(Deserialize)]
struct LegacyState {
    channel: String,
    queue: Vec<String>,
    #[serde(default)]
    last_updated: i64,
}

impl From<LegacyState> for QueueState {
    fn from(legacy: LegacyState) -> Self {
        let joined_at = DateTime::<Utc>::from_timestamp(legacy.last_updated, 0)
            .unwrap_or_else(Utc::now);
        let entries: Vec<QueueEntry> = legacy
            .queue
            .iter()
            .map(|name| QueueEntry {
                username: Username::new(name),
                joined_at,
                is_privileged_add: false,
            })
            .collect();

        QueueState {
            channel: legacy.channel,
            enabled: !entries.is_empty(),
            paused: false,
            entries,
            last_updated: legacy.last_updated,
            version: 0,
        }
    }
}

/// Reads and writes the state files of one channel.
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
    channel: String,
}

impl StateStore {
    pub fn new(data_dir: impl Into<PathBuf>, channel: &str) -> Self {
        Self {
            data_dir: data_dir.into(),
            channel: normalize_channel(channel),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn path_for(&self, kind: StateKind) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.json", kind.file_prefix(), self.channel))
    }

    /// Blocking write. Callers on the async runtime go through the save worker.
    pub fn write(&self, kind: StateKind, state: &QueueState) -> Result<(), Error> {
        fs::create_dir_all(&self.data_dir)?;
        let path = self.path_for(kind);

        let mut tmp = NamedTempFile::new_in(&self.data_dir)?;
        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        debug!(
            "Wrote {} state for #{} (version={}, entries={}) to {}",
            kind.label(),
            self.channel,
            state.version,
            state.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Blocking read. A missing file yields `Ok(None)`.
    pub fn read(&self, kind: StateKind) -> Result<Option<QueueState>, Error> {
        let path = self.path_for(kind);
        let raw = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: QueueState = match serde_json::from_str::<StoredState>(&raw) {
            Ok(StoredState::Current(s)) => s,
            Ok(StoredState::Legacy(l)) => l.into(),
            Err(_) => {
                // Re-parse as the current layout so the error names the real problem.
                serde_json::from_str::<QueueState>(&raw)?
            }
        };

        let found = normalize_channel(&state.channel);
        if found != self.channel {
            return Err(QueueError::ChannelMismatch {
                expected: self.channel.clone(),
                found,
            }
            .into());
        }

        Ok(Some(state))
    }

    pub async fn load(&self, kind: StateKind) -> Result<Option<QueueState>, Error> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read(kind))
            .await
            .map_err(|e| Error::Persistence(format!("state load task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(channel: &str, names: &[&str]) -> QueueState {
        QueueState {
            channel: channel.to_string(),
            enabled: true,
            paused: false,
            entries: names
                .iter()
                .map(|n| QueueEntry::new(Username::new(n), false))
                .collect(),
            last_updated: Utc::now().timestamp(),
            version: 3,
        }
    }

    #[test]
    fn file_names_are_channel_scoped() {
        let store = StateStore::new("/tmp/q", "#MyChannel");
        assert_eq!(
            store.path_for(StateKind::Auto),
            PathBuf::from("/tmp/q/queue_state_mychannel.json")
        );
        assert_eq!(
            store.path_for(StateKind::Backup),
            PathBuf::from("/tmp/q/queue_backup_mychannel.json")
        );
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "chan");
        assert!(store.read(StateKind::Backup).unwrap().is_none());
    }

    #[test]
    fn write_then_read_keeps_order_and_casing() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "chan");
        let state = sample_state("chan", &["Alice", "bob", "CAROL"]);

        store.write(StateKind::Auto, &state).unwrap();
        let loaded = store.read(StateKind::Auto).unwrap().unwrap();

        assert_eq!(loaded.usernames(), vec!["Alice", "bob", "CAROL"]);
        assert!(loaded.enabled);
        assert_eq!(loaded.version, 3);
        // no temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = StateStore::new(dir.path(), "other");
        let store = StateStore::new(dir.path(), "chan");

        // Drop a file for "other" under chan's name.
        let state = sample_state("other", &["x"]);
        let json = serde_json::to_string(&state).unwrap();
        fs::write(store.path_for(StateKind::Auto), json).unwrap();

        match store.read(StateKind::Auto) {
            Err(Error::Queue(QueueError::ChannelMismatch { expected, found })) => {
                assert_eq!(expected, "chan");
                assert_eq!(found, "other");
            }
            other_result => panic!("expected channel mismatch, got {other_result:?}"),
        }
        assert!(other.read(StateKind::Auto).unwrap().is_none());
    }

    #[test]
    fn channel_check_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "chan");
        store
            .write(StateKind::Backup, &sample_state("CHAN", &["a"]))
            .unwrap();
        assert!(store.read(StateKind::Backup).unwrap().is_some());
    }

    #[test]
    fn legacy_layout_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "chan");
        let legacy = r#"{"channel":"chan","queue":["Zed","amy"],"last_updated":1700000000}"#;
        fs::write(store.path_for(StateKind::Auto), legacy).unwrap();

        let loaded = store.read(StateKind::Auto).unwrap().unwrap();
        assert_eq!(loaded.usernames(), vec!["Zed", "amy"]);
        assert!(loaded.enabled);
        assert!(!loaded.paused);
        assert_eq!(loaded.entries[0].joined_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn corrupt_file_surfaces_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "chan");
        fs::write(store.path_for(StateKind::Auto), "{ not json").unwrap();
        assert!(matches!(store.read(StateKind::Auto), Err(Error::Json(_))));
    }
}
