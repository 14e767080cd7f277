//! src/queue/mod.rs
//!
//! The ordered per-channel waitlist. All state lives behind one `RwLock`;
//! every mutation stamps a new version and hands a snapshot to the save
//! worker before releasing the lock.

pub mod persistence;
pub mod save_worker;

use std::collections::HashSet;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use queuebot_common::models::{normalize_channel, QueueEntry, QueueState, Username};
use crate::{Error, QueueError};

pub use persistence::{StateKind, StateStore};
pub use save_worker::{spawn_save_worker, SaveHandle};

#[derive(Debug, Default)]
struct QueueInner {
    entries: Vec<QueueEntry>,
    enabled: bool,
    paused: bool,
    version: u64,
}

impl QueueInner {
    fn index_of(&self, username: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.username.matches(username))
    }

    fn ensure_enabled(&self) -> Result<(), QueueError> {
        if self.enabled {
            Ok(())
        } else {
            Err(QueueError::QueueDisabled)
        }
    }

    /// Shared guard for both add paths.
    fn check_addable(&self, name: &Username, privileged: bool) -> Result<(), QueueError> {
        self.ensure_enabled()?;
        if self.paused && !privileged {
            return Err(QueueError::QueuePaused);
        }
        if name.is_empty() {
            return Err(QueueError::InvalidArgument("Username cannot be empty.".into()));
        }
        if self.entries.iter().any(|e| e.username == *name) {
            return Err(QueueError::AlreadyInQueue(name.display().to_string()));
        }
        Ok(())
    }

    fn move_to(&mut self, username: &str, target: i64) -> Result<usize, QueueError> {
        self.ensure_enabled()?;
        let idx = self
            .index_of(username)
            .ok_or_else(|| QueueError::NotFound(username.trim_start_matches('@').to_string()))?;

        let len = self.entries.len() as i64;
        let target = target.clamp(1, len) as usize;
        if target - 1 == idx {
            return Ok(target);
        }

        // Target is an index into the sequence with the user already removed.
        let entry = self.entries.remove(idx);
        self.entries.insert(target - 1, entry);
        Ok(target)
    }
}

struct QueuePersistence {
    store: StateStore,
    saver: SaveHandle,
}

/// One channel's queue.
pub struct QueueEngine {
    channel: String,
    inner: RwLock<QueueInner>,
    persistence: Option<QueuePersistence>,
}

impl QueueEngine {
    /// In-memory queue with no state files.
    pub fn new(channel: &str) -> Self {
        Self {
            channel: normalize_channel(channel),
            inner: RwLock::new(QueueInner::default()),
            persistence: None,
        }
    }

    /// Queue backed by `store`, with an already running save worker.
    pub fn with_persistence(store: StateStore, saver: SaveHandle) -> Self {
        Self {
            channel: store.channel().to_string(),
            inner: RwLock::new(QueueInner::default()),
            persistence: Some(QueuePersistence { store, saver }),
        }
    }

    /// Spawns a save worker for `store` and returns the queue plus the worker task.
    pub fn spawn_persistent(store: StateStore) -> (Self, JoinHandle<()>) {
        let (saver, task) = spawn_save_worker(store.clone());
        (Self::with_persistence(store, saver), task)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn has_persistence(&self) -> bool {
        self.persistence.is_some()
    }

    fn state_of(&self, inner: &QueueInner) -> QueueState {
        QueueState {
            channel: self.channel.clone(),
            enabled: inner.enabled,
            paused: inner.paused,
            entries: inner.entries.clone(),
            last_updated: Utc::now().timestamp(),
            version: inner.version,
        }
    }

    /// Called with the write lock held after every successful mutation.
    fn commit(&self, inner: &mut QueueInner) {
        inner.version += 1;
        if let Some(p) = &self.persistence {
            p.saver.submit_auto(self.state_of(inner));
        }
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Resets to an empty, active, unpaused queue.
    pub fn enable(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.enabled = true;
        inner.paused = false;
        self.commit(&mut inner);
        info!("Queue for #{} enabled", self.channel);
    }

    /// Clears and deactivates. Always succeeds.
    pub fn disable(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.enabled = false;
        inner.paused = false;
        self.commit(&mut inner);
        info!("Queue for #{} disabled", self.channel);
    }

    pub fn pause(&self) -> Result<(), QueueError> {
        let mut inner = self.inner.write();
        inner.ensure_enabled()?;
        if inner.paused {
            return Err(QueueError::AlreadyPaused);
        }
        inner.paused = true;
        self.commit(&mut inner);
        info!("Queue for #{} paused", self.channel);
        Ok(())
    }

    pub fn unpause(&self) -> Result<(), QueueError> {
        let mut inner = self.inner.write();
        inner.ensure_enabled()?;
        if !inner.paused {
            return Err(QueueError::NotPaused);
        }
        inner.paused = false;
        self.commit(&mut inner);
        info!("Queue for #{} unpaused", self.channel);
        Ok(())
    }

    // ------------------------------------------------------------------
    // mutations
    // ------------------------------------------------------------------

    /// Appends `username`; returns its 1-based position.
    pub fn add(&self, username: &str, privileged: bool) -> Result<usize, QueueError> {
        let name = Username::new(username);
        let mut inner = self.inner.write();
        inner.check_addable(&name, privileged)?;

        debug!("#{}: adding {} (privileged={})", self.channel, name, privileged);
        inner.entries.push(QueueEntry::new(name, privileged));
        let position = inner.entries.len();
        self.commit(&mut inner);
        Ok(position)
    }

    /// Inserts `username` at `position`, clamped into `[1, len + 1]`.
    pub fn add_at_position(
        &self,
        username: &str,
        position: i64,
        privileged: bool,
    ) -> Result<usize, QueueError> {
        let name = Username::new(username);
        let mut inner = self.inner.write();
        inner.check_addable(&name, privileged)?;

        let max = inner.entries.len() as i64 + 1;
        let position = position.clamp(1, max) as usize;
        debug!("#{}: inserting {} at {}", self.channel, name, position);
        inner
            .entries
            .insert(position - 1, QueueEntry::new(name, privileged));
        self.commit(&mut inner);
        Ok(position)
    }

    /// Removes `username` if present. Absence is not an error.
    pub fn remove(&self, username: &str) -> Result<Option<QueueEntry>, QueueError> {
        let mut inner = self.inner.write();
        inner.ensure_enabled()?;
        let Some(idx) = inner.index_of(username) else {
            return Ok(None);
        };
        let entry = inner.entries.remove(idx);
        self.commit(&mut inner);
        Ok(Some(entry))
    }

    pub fn pop(&self) -> Result<QueueEntry, QueueError> {
        let mut inner = self.inner.write();
        inner.ensure_enabled()?;
        if inner.entries.is_empty() {
            return Err(QueueError::QueueEmpty);
        }
        let entry = inner.entries.remove(0);
        self.commit(&mut inner);
        Ok(entry)
    }

    /// Pops up to `count` users from the front.
    pub fn pop_n(&self, count: usize) -> Result<Vec<QueueEntry>, QueueError> {
        if count == 0 {
            return Err(QueueError::InvalidArgument(
                "Invalid number of users to pop. Please specify a positive number.".into(),
            ));
        }
        let mut inner = self.inner.write();
        inner.ensure_enabled()?;
        if inner.entries.is_empty() {
            return Err(QueueError::QueueEmpty);
        }
        let n = count.min(inner.entries.len());
        let popped: Vec<QueueEntry> = inner.entries.drain(..n).collect();
        self.commit(&mut inner);
        Ok(popped)
    }

    /// Moves `username` to `target`, clamped into `[1, len]`. Returns the
    /// resulting position.
    pub fn move_user(&self, username: &str, target: i64) -> Result<usize, QueueError> {
        let mut inner = self.inner.write();
        let old_idx = inner.index_of(username);
        let position = inner.move_to(username, target)?;
        if old_idx != Some(position - 1) {
            self.commit(&mut inner);
        }
        Ok(position)
    }

    pub fn move_to_end(&self, username: &str) -> Result<usize, QueueError> {
        let mut inner = self.inner.write();
        let old_idx = inner.index_of(username);
        let last = inner.entries.len() as i64;
        let position = inner.move_to(username, last)?;
        if old_idx != Some(position - 1) {
            self.commit(&mut inner);
        }
        Ok(position)
    }

    /// Empties the queue and returns how many users were removed.
    pub fn clear(&self) -> Result<usize, QueueError> {
        let mut inner = self.inner.write();
        inner.ensure_enabled()?;
        let removed = inner.entries.len();
        inner.entries.clear();
        self.commit(&mut inner);
        info!("#{}: queue cleared ({} removed)", self.channel, removed);
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    pub fn position(&self, username: &str) -> Result<Option<usize>, QueueError> {
        let inner = self.inner.read();
        inner.ensure_enabled()?;
        Ok(inner.index_of(username).map(|i| i + 1))
    }

    /// Independent copy of the current entries.
    pub fn list(&self) -> Vec<QueueEntry> {
        self.inner.read().entries.clone()
    }

    pub fn size(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.read().enabled
    }

    pub fn is_paused(&self) -> bool {
        self.inner.read().paused
    }

    /// Entry at a 1-based position.
    pub fn entry_at(&self, position: usize) -> Option<QueueEntry> {
        if position == 0 {
            return None;
        }
        self.inner.read().entries.get(position - 1).cloned()
    }

    pub fn snapshot(&self) -> QueueState {
        let inner = self.inner.read();
        self.state_of(&inner)
    }

    // ------------------------------------------------------------------
    // restore
    // ------------------------------------------------------------------

    /// Applies a full saved state (entries, enabled, paused) after
    /// normalizing it: duplicate names are dropped, a disabled state carries
    /// no entries and cannot be paused.
    pub fn restore_state(&self, state: QueueState) -> Result<usize, QueueError> {
        let found = normalize_channel(&state.channel);
        if found != self.channel {
            return Err(QueueError::ChannelMismatch {
                expected: self.channel.clone(),
                found,
            });
        }

        let mut inner = self.inner.write();
        inner.enabled = state.enabled;
        inner.paused = state.enabled && state.paused;
        inner.entries = if state.enabled {
            dedupe(state.entries)
        } else {
            Vec::new()
        };
        inner.version = inner.version.max(state.version);
        self.commit(&mut inner);

        info!(
            "#{}: restored state (enabled={}, paused={}, entries={})",
            self.channel,
            inner.enabled,
            inner.paused,
            inner.entries.len()
        );
        Ok(inner.entries.len())
    }

    /// Swaps in `entries`, keeping the enabled/paused flags.
    pub fn replace_entries(&self, entries: Vec<QueueEntry>) -> Result<usize, QueueError> {
        let mut inner = self.inner.write();
        inner.ensure_enabled()?;
        inner.entries = dedupe(entries);
        self.commit(&mut inner);
        Ok(inner.entries.len())
    }

    // ------------------------------------------------------------------
    // persistence
    // ------------------------------------------------------------------

    fn persistence(&self) -> Result<&QueuePersistence, Error> {
        self.persistence
            .as_ref()
            .ok_or_else(|| Error::Persistence(format!("no state files configured for #{}", self.channel)))
    }

    /// Writes the manual backup. Returns the number of saved entries.
    pub async fn save_backup(&self) -> Result<usize, Error> {
        let p = self.persistence()?;
        let state = self.snapshot();
        let count = state.entries.len();
        p.saver.write_backup(state).await?;
        info!("#{}: backup saved with {} user(s)", self.channel, count);
        Ok(count)
    }

    pub async fn load_state(&self, kind: StateKind) -> Result<Option<QueueState>, Error> {
        self.persistence()?.store.load(kind).await
    }

    /// Startup recovery: applies the full saved state. `Ok(None)` when no file exists.
    pub async fn recover(&self, kind: StateKind) -> Result<Option<usize>, Error> {
        match self.load_state(kind).await? {
            Some(state) => Ok(Some(self.restore_state(state)?)),
            None => Ok(None),
        }
    }

    /// Command-triggered restore: enables the queue if needed and replaces
    /// its entries, leaving the paused flag alone. `Ok(None)` when no file exists.
    pub async fn restore(&self, kind: StateKind) -> Result<Option<usize>, Error> {
        // A queued auto-save must not land on top of the restored entries.
        self.flush().await?;
        let Some(state) = self.load_state(kind).await? else {
            return Ok(None);
        };
        if !self.is_enabled() {
            self.enable();
        }
        let count = self.replace_entries(state.entries)?;
        info!(
            "#{}: restored {} with {} user(s)",
            self.channel,
            kind.label(),
            count
        );
        Ok(Some(count))
    }

    /// Waits for pending auto-saves to be written. No-op without persistence.
    pub async fn flush(&self) -> Result<(), Error> {
        match &self.persistence {
            Some(p) => p.saver.flush().await,
            None => Ok(()),
        }
    }
}

fn dedupe(entries: Vec<QueueEntry>) -> Vec<QueueEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| !e.username.is_empty() && seen.insert(e.username.key().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(q: &QueueEngine) -> Vec<String> {
        q.list()
            .into_iter()
            .map(|e| e.username.display().to_string())
            .collect()
    }

    fn enabled_with(users: &[&str]) -> QueueEngine {
        let q = QueueEngine::new("chan");
        q.enable();
        for u in users {
            q.add(u, false).unwrap();
        }
        q
    }

    #[test]
    fn disabled_queue_rejects_operations() {
        let q = QueueEngine::new("chan");
        assert_eq!(q.add("a", false), Err(QueueError::QueueDisabled));
        assert_eq!(q.pop().unwrap_err(), QueueError::QueueDisabled);
        assert_eq!(q.pause(), Err(QueueError::QueueDisabled));
        assert_eq!(q.position("a"), Err(QueueError::QueueDisabled));
        assert!(q.list().is_empty());
    }

    #[test]
    fn disable_is_idempotent_and_clears() {
        let q = enabled_with(&["a", "b"]);
        q.disable();
        q.disable();
        assert!(!q.is_enabled());
        assert_eq!(q.size(), 0);

        q.enable();
        assert!(q.is_enabled());
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn duplicate_membership_is_case_insensitive() {
        let q = enabled_with(&["Bob"]);
        assert_eq!(
            q.add("bob", false),
            Err(QueueError::AlreadyInQueue("bob".into()))
        );
        assert_eq!(
            q.add_at_position("BOB", 1, true),
            Err(QueueError::AlreadyInQueue("BOB".into()))
        );
        assert_eq!(names(&q), vec!["Bob"]);
    }

    #[test]
    fn positions_are_one_based_and_monotonic() {
        let q = QueueEngine::new("chan");
        q.enable();
        assert_eq!(q.add("a", false), Ok(1));
        assert_eq!(q.add("b", false), Ok(2));
        assert_eq!(q.add("c", false), Ok(3));
        assert_eq!(q.position("B"), Ok(Some(2)));
        assert_eq!(q.position("nobody"), Ok(None));
    }

    #[test]
    fn paused_queue_only_accepts_privileged_adds() {
        let q = enabled_with(&["a"]);
        q.pause().unwrap();
        assert_eq!(q.pause(), Err(QueueError::AlreadyPaused));
        assert_eq!(q.add("b", false), Err(QueueError::QueuePaused));
        assert_eq!(q.add("b", true), Ok(2));
        assert!(q.list()[1].is_privileged_add);

        q.unpause().unwrap();
        assert_eq!(q.unpause(), Err(QueueError::NotPaused));
        assert_eq!(q.add("c", false), Ok(3));
    }

    #[test]
    fn add_at_position_clamps() {
        let q = enabled_with(&["a", "b"]);
        assert_eq!(q.add_at_position("x", 999, true), Ok(3));
        assert_eq!(q.add_at_position("y", -4, true), Ok(1));
        assert_eq!(q.add_at_position("z", 2, true), Ok(2));
        assert_eq!(names(&q), vec!["y", "z", "a", "b", "x"]);
    }

    #[test]
    fn remove_is_case_insensitive_and_tolerates_absence() {
        let q = enabled_with(&["Alice", "bob"]);
        let removed = q.remove("ALICE").unwrap().unwrap();
        assert_eq!(removed.username.display(), "Alice");
        assert_eq!(q.remove("ghost"), Ok(None));
        assert_eq!(names(&q), vec!["bob"]);
    }

    #[test]
    fn pop_from_empty_fails() {
        let q = enabled_with(&[]);
        assert_eq!(q.pop(), Err(QueueError::QueueEmpty));
        assert_eq!(q.pop_n(3), Err(QueueError::QueueEmpty));
    }

    #[test]
    fn pop_n_clamps_to_size() {
        let q = enabled_with(&["a", "b", "c"]);
        let popped = q.pop_n(10).unwrap();
        assert_eq!(popped.len(), 3);
        assert_eq!(q.size(), 0);
        assert!(q.pop_n(0).is_err());
    }

    #[test]
    fn move_to_same_position_is_noop() {
        let q = enabled_with(&["a", "b", "c"]);
        let version = q.snapshot().version;
        assert_eq!(q.move_user("b", 2), Ok(2));
        assert_eq!(names(&q), vec!["a", "b", "c"]);
        assert_eq!(q.snapshot().version, version);
    }

    #[test]
    fn move_forward_interprets_target_after_removal() {
        let q = enabled_with(&["a", "b", "c", "d"]);
        assert_eq!(q.move_user("a", 3), Ok(3));
        assert_eq!(names(&q), vec!["b", "c", "a", "d"]);
        assert_eq!(q.position("a"), Ok(Some(3)));
    }

    #[test]
    fn move_backward_and_clamp() {
        let q = enabled_with(&["a", "b", "c"]);
        assert_eq!(q.move_user("c", 0), Ok(1));
        assert_eq!(names(&q), vec!["c", "a", "b"]);
        assert_eq!(q.move_user("C", 50), Ok(3));
        assert_eq!(names(&q), vec!["a", "b", "c"]);
        assert_eq!(
            q.move_user("zed", 1),
            Err(QueueError::NotFound("zed".into()))
        );
    }

    #[test]
    fn move_to_end() {
        let q = enabled_with(&["a", "b", "c"]);
        assert_eq!(q.move_to_end("a"), Ok(3));
        assert_eq!(names(&q), vec!["b", "c", "a"]);
        assert_eq!(q.move_to_end("a"), Ok(3));
    }

    #[test]
    fn clear_reports_count() {
        let q = enabled_with(&["a", "b"]);
        assert_eq!(q.clear(), Ok(2));
        assert_eq!(q.size(), 0);
        assert!(q.is_enabled());
    }

    #[test]
    fn list_returns_independent_copy() {
        let q = enabled_with(&["a"]);
        let mut copy = q.list();
        copy.clear();
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn entry_at_is_one_based() {
        let q = enabled_with(&["a", "b"]);
        assert!(q.entry_at(0).is_none());
        assert_eq!(q.entry_at(2).unwrap().username.display(), "b");
        assert!(q.entry_at(3).is_none());
    }

    #[test]
    fn every_mutation_bumps_version() {
        let q = QueueEngine::new("chan");
        let v0 = q.snapshot().version;
        q.enable();
        q.add("a", false).unwrap();
        q.add("b", false).unwrap();
        q.move_user("b", 1).unwrap();
        assert_eq!(q.snapshot().version, v0 + 4);
    }

    #[test]
    fn restore_state_normalizes() {
        let q = QueueEngine::new("chan");
        let mut state = enabled_with(&["a", "b"]).snapshot();
        state
            .entries
            .push(QueueEntry::new(Username::new("A"), false));
        state.paused = true;

        assert_eq!(q.restore_state(state.clone()), Ok(2));
        assert!(q.is_enabled());
        assert!(q.is_paused());

        state.enabled = false;
        assert_eq!(q.restore_state(state), Ok(0));
        assert!(!q.is_paused());
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn restore_state_rejects_other_channel() {
        let q = QueueEngine::new("chan");
        let mut state = q.snapshot();
        state.channel = "elsewhere".into();
        assert!(matches!(
            q.restore_state(state),
            Err(QueueError::ChannelMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "chan");

        let (q, _task) = QueueEngine::spawn_persistent(store.clone());
        q.enable();
        q.add("Alice", false).unwrap();
        q.add("bob", false).unwrap();
        q.add_at_position("Carol", 1, true).unwrap();
        q.flush().await.unwrap();

        let (fresh, _task2) = QueueEngine::spawn_persistent(store);
        assert_eq!(fresh.recover(StateKind::Auto).await.unwrap(), Some(3));
        assert!(fresh.is_enabled());
        assert_eq!(names(&fresh), vec!["Carol", "Alice", "bob"]);
    }

    #[tokio::test]
    async fn backup_restore_replaces_entries_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path(), "chan");
        let (q, _task) = QueueEngine::spawn_persistent(store);

        assert_eq!(q.restore(StateKind::Backup).await.unwrap(), None);

        q.enable();
        q.add("a", false).unwrap();
        q.add("b", false).unwrap();
        assert_eq!(q.save_backup().await.unwrap(), 2);

        q.clear().unwrap();
        q.pause().unwrap();
        assert_eq!(q.restore(StateKind::Backup).await.unwrap(), Some(2));
        assert_eq!(names(&q), vec!["a", "b"]);
        assert!(q.is_paused());

        q.disable();
        assert_eq!(q.restore(StateKind::Backup).await.unwrap(), Some(2));
        assert!(q.is_enabled());
    }

    #[tokio::test]
    async fn save_without_persistence_fails() {
        let q = enabled_with(&["a"]);
        assert!(matches!(q.save_backup().await, Err(Error::Persistence(_))));
        assert!(q.flush().await.is_ok());
    }
}
