use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::chat::UserTier;

/// Who may invoke a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionTier {
    #[default]
    Any,
    /// VIPs, moderators and the broadcaster.
    Privileged,
    /// Moderators and the broadcaster.
    ModeratorOnly,
}

impl PermissionTier {
    pub fn allows(&self, tier: UserTier) -> bool {
        match self {
            PermissionTier::Any => true,
            PermissionTier::Privileged => tier.is_privileged(),
            PermissionTier::ModeratorOnly => tier.is_moderator(),
        }
    }

    pub fn denial_message(&self) -> &'static str {
        match self {
            PermissionTier::ModeratorOnly => "This command can only be used by moderators.",
            _ => "This command can only be used by moderators and VIPs.",
        }
    }

    /// Suffix shown in help listings.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            PermissionTier::Any => None,
            PermissionTier::Privileged => Some("[Mod/VIP]"),
            PermissionTier::ModeratorOnly => Some("[Mod Only]"),
        }
    }
}

/// Per-tier cooldown durations. A zero duration disables the cooldown for that tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CooldownConfig {
    pub regular: Duration,
    pub vip: Duration,
    pub moderator: Duration,
    pub broadcaster: Duration,
}

impl CooldownConfig {
    /// 30s regular, 15s VIP, 5s moderator, none for the broadcaster.
    pub fn standard() -> Self {
        Self::from_secs(30, 15, 5, 0)
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_secs(regular: u64, vip: u64, moderator: u64, broadcaster: u64) -> Self {
        Self {
            regular: Duration::from_secs(regular),
            vip: Duration::from_secs(vip),
            moderator: Duration::from_secs(moderator),
            broadcaster: Duration::from_secs(broadcaster),
        }
    }

    pub fn for_tier(&self, tier: UserTier) -> Duration {
        match tier {
            UserTier::Broadcaster => self.broadcaster,
            UserTier::Moderator => self.moderator,
            UserTier::Vip => self.vip,
            UserTier::Regular => self.regular,
        }
    }

    pub fn longest(&self) -> Duration {
        self.regular
            .max(self.vip)
            .max(self.moderator)
            .max(self.broadcaster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_tiers() {
        assert!(PermissionTier::Any.allows(UserTier::Regular));
        assert!(!PermissionTier::Privileged.allows(UserTier::Regular));
        assert!(PermissionTier::Privileged.allows(UserTier::Vip));
        assert!(!PermissionTier::ModeratorOnly.allows(UserTier::Vip));
        assert!(PermissionTier::ModeratorOnly.allows(UserTier::Broadcaster));
    }

    #[test]
    fn cooldown_for_tier() {
        let cfg = CooldownConfig::standard();
        assert_eq!(cfg.for_tier(UserTier::Regular), Duration::from_secs(30));
        assert_eq!(cfg.for_tier(UserTier::Vip), Duration::from_secs(15));
        assert_eq!(cfg.for_tier(UserTier::Moderator), Duration::from_secs(5));
        assert!(cfg.for_tier(UserTier::Broadcaster).is_zero());
        assert_eq!(cfg.longest(), Duration::from_secs(30));
    }
}
