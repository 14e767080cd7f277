use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat username: compared case-insensitively, displayed exactly as it was typed.
///
/// A leading `@` (common when people mention each other in chat) is stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Username {
    display: String,
    key: String,
}

impl Username {
    pub fn new(raw: &str) -> Self {
        let display = raw.trim().trim_start_matches('@').to_string();
        let key = display.to_lowercase();
        Self { display, key }
    }

    /// Original casing, used for every user-facing string.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Case-folded form used for equality and lookups.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    /// True when `raw` names the same user, ignoring case and a leading `@`.
    pub fn matches(&self, raw: &str) -> bool {
        self.key == raw.trim().trim_start_matches('@').to_lowercase()
    }
}

impl PartialEq for Username {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Username {}

impl Hash for Username {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<String> for Username {
    fn from(s: String) -> Self {
        Username::new(&s)
    }
}

impl From<&str> for Username {
    fn from(s: &str) -> Self {
        Username::new(s)
    }
}

impl From<Username> for String {
    fn from(u: Username) -> Self {
        u.display
    }
}

/// One user's slot in a channel queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub username: Username,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub is_privileged_add: bool,
}

impl QueueEntry {
    pub fn new(username: Username, is_privileged_add: bool) -> Self {
        Self {
            username,
            joined_at: Utc::now(),
            is_privileged_add,
        }
    }
}

/// Serializable state of one channel queue, as written to the auto-save
/// and manual backup files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueState {
    pub channel: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub paused: bool,
    pub entries: Vec<QueueEntry>,
    /// Unix seconds.
    #[serde(default)]
    pub last_updated: i64,
    /// Monotonic per-queue mutation counter.
    #[serde(default)]
    pub version: u64,
}

impl QueueState {
    pub fn usernames(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.username.display().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn username_equality_ignores_case_but_keeps_display() {
        let a = Username::new("Bob");
        let b = Username::new("BOB");
        assert_eq!(a, b);
        assert_eq!(a.display(), "Bob");
        assert_eq!(b.display(), "BOB");
        assert_eq!(a.key(), "bob");

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn username_strips_mention_prefix() {
        let u = Username::new("  @Alice ");
        assert_eq!(u.display(), "Alice");
        assert!(u.matches("alice"));
        assert!(u.matches("@ALICE"));
        assert!(!u.matches("alicia"));
    }

    #[test]
    fn username_serializes_as_display_string() {
        let entry = QueueEntry::new(Username::new("MixedCase"), true);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["username"], "MixedCase");
        assert_eq!(json["is_privileged_add"], true);

        let back: QueueEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back.username.display(), "MixedCase");
    }
}
