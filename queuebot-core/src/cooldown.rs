//! src/cooldown.rs
//!
//! Per-command, per-user cooldowns with tiered durations.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use queuebot_common::models::{CooldownConfig, UserTier};

/// Past this many tracked (command, user) pairs, expired ones are pruned on write.
const PRUNE_THRESHOLD: usize = 1000;

/// Result of an atomic cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    /// Usage has been recorded; go ahead.
    Ready,
    /// Still cooling down. `notify` is true when a "please wait" reply is
    /// due; that notice has already been recorded.
    Blocked { remaining: Duration, notify: bool },
}

type Key = (String, String);

fn key(command: &str, user: &str) -> Key {
    (command.to_lowercase(), user.to_lowercase())
}

#[derive(Debug, Default)]
struct CooldownState {
    configs: HashMap<String, CooldownConfig>,
    last_used: HashMap<Key, Instant>,
    last_notice: HashMap<Key, Instant>,
}

impl CooldownState {
    fn window(&self, command: &str, tier: UserTier) -> Duration {
        self.configs
            .get(&command.to_lowercase())
            .map(|c| c.for_tier(tier))
            .unwrap_or_default()
    }

    fn remaining(&self, k: &Key, tier: UserTier, now: Instant) -> Duration {
        let window = self.window(&k.0, tier);
        if window.is_zero() {
            return Duration::ZERO;
        }
        match self.last_used.get(k) {
            Some(&at) => window.saturating_sub(now.saturating_duration_since(at)),
            None => Duration::ZERO,
        }
    }

    fn notice_due(&self, k: &Key, tier: UserTier, now: Instant) -> bool {
        let window = self.window(&k.0, tier);
        match self.last_notice.get(k) {
            Some(&at) => now.saturating_duration_since(at) >= window,
            None => true,
        }
    }

    fn prune(&mut self, now: Instant) {
        let configs = &self.configs;
        let longest = |cmd: &str| {
            configs
                .get(cmd)
                .map(|c| c.longest())
                .unwrap_or_default()
        };
        self.last_used
            .retain(|(cmd, _), at| now.saturating_duration_since(*at) < longest(cmd));
        self.last_notice
            .retain(|(cmd, _), at| now.saturating_duration_since(*at) < longest(cmd));
    }

    fn maybe_prune(&mut self, now: Instant) {
        if self.last_used.len() + self.last_notice.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }
    }
}

/// Tracks when each user last ran each command, and when they were last
/// told to wait.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    state: Mutex<CooldownState>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or replaces) the durations for `command`.
    pub fn set_cooldown(&self, command: &str, config: CooldownConfig) {
        self.state
            .lock()
            .configs
            .insert(command.to_lowercase(), config);
    }

    pub fn cooldown_for(&self, command: &str) -> Option<CooldownConfig> {
        self.state.lock().configs.get(&command.to_lowercase()).copied()
    }

    /// Time left before `user` may run `command` again. Zero when ready.
    pub fn check_cooldown(&self, command: &str, user: &str, tier: UserTier) -> Duration {
        self.check_cooldown_at(command, user, tier, Instant::now())
    }

    pub fn check_cooldown_at(&self, command: &str, user: &str, tier: UserTier, now: Instant) -> Duration {
        self.state.lock().remaining(&key(command, user), tier, now)
    }

    pub fn should_show_notice(&self, command: &str, user: &str, tier: UserTier) -> bool {
        self.should_show_notice_at(command, user, tier, Instant::now())
    }

    pub fn should_show_notice_at(&self, command: &str, user: &str, tier: UserTier, now: Instant) -> bool {
        self.state.lock().notice_due(&key(command, user), tier, now)
    }

    pub fn record_usage(&self, command: &str, user: &str) {
        self.record_usage_at(command, user, Instant::now());
    }

    pub fn record_usage_at(&self, command: &str, user: &str, now: Instant) {
        let mut state = self.state.lock();
        state.last_used.insert(key(command, user), now);
        state.maybe_prune(now);
    }

    pub fn record_notice(&self, command: &str, user: &str) {
        self.record_notice_at(command, user, Instant::now());
    }

    pub fn record_notice_at(&self, command: &str, user: &str, now: Instant) {
        let mut state = self.state.lock();
        state.last_notice.insert(key(command, user), now);
        state.maybe_prune(now);
    }

    /// Check and record in one critical section, so two concurrent
    /// invocations by the same user cannot both pass.
    pub fn try_acquire(&self, command: &str, user: &str, tier: UserTier) -> CooldownDecision {
        self.try_acquire_at(command, user, tier, Instant::now())
    }

    pub fn try_acquire_at(&self, command: &str, user: &str, tier: UserTier, now: Instant) -> CooldownDecision {
        let k = key(command, user);
        let mut state = self.state.lock();

        let remaining = state.remaining(&k, tier, now);
        if remaining.is_zero() {
            state.last_used.insert(k, now);
            state.maybe_prune(now);
            return CooldownDecision::Ready;
        }

        let notify = state.notice_due(&k, tier, now);
        if notify {
            state.last_notice.insert(k, now);
        }
        trace!(
            "cooldown: {} for {} blocked ({:?} left, notify={})",
            command, user, remaining, notify
        );
        CooldownDecision::Blocked { remaining, notify }
    }

    /// Drops every record whose longest window has passed.
    pub fn prune_expired(&self) {
        self.state.lock().prune(Instant::now());
    }

    pub fn tracked_len(&self) -> usize {
        let state = self.state.lock();
        state.last_used.len() + state.last_notice.len()
    }
}

/// Human-readable remaining time: `750ms`, `12.5s`, `1.5m`.
pub fn format_cooldown(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else if d < Duration::from_secs(60) {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{:.1}m", d.as_secs_f64() / 60.0)
    }
}
