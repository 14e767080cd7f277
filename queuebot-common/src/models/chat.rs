use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role flags carried on an inbound chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoles {
    pub broadcaster: bool,
    pub moderator: bool,
    pub vip: bool,
}

impl UserRoles {
    /// Parse a Twitch `badges` tag value such as `broadcaster/1,subscriber/12`.
    pub fn from_badges(badges: &str) -> Self {
        let mut roles = UserRoles::default();
        for badge in badges.split(',') {
            let mut parts = badge.splitn(2, '/');
            let name = parts.next().unwrap_or("");
            let level = parts.next().unwrap_or("1");
            if level == "0" {
                continue;
            }
            match name {
                "broadcaster" => roles.broadcaster = true,
                "moderator" => roles.moderator = true,
                "vip" => roles.vip = true,
                _ => {}
            }
        }
        roles
    }
}

/// A user's permission/priority class. Ordering follows precedence:
/// `Regular < Vip < Moderator < Broadcaster`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UserTier {
    Regular,
    Vip,
    Moderator,
    Broadcaster,
}

impl UserTier {
    pub fn from_roles(roles: &UserRoles) -> Self {
        if roles.broadcaster {
            UserTier::Broadcaster
        } else if roles.moderator {
            UserTier::Moderator
        } else if roles.vip {
            UserTier::Vip
        } else {
            UserTier::Regular
        }
    }

    /// VIP, moderator or broadcaster.
    pub fn is_privileged(&self) -> bool {
        *self >= UserTier::Vip
    }

    /// Moderator or broadcaster.
    pub fn is_moderator(&self) -> bool {
        *self >= UserTier::Moderator
    }
}

/// Channel names arrive as `#Name` from IRC and as `name` from config; both
/// map to the same lowercase key.
pub fn normalize_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}

/// An inbound chat line, as delivered by a chat transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    pub user_name: String,
    pub user_id: String,
    pub text: String,
    pub roles: UserRoles,
    pub received_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(channel: &str, user_name: &str, text: &str) -> Self {
        Self {
            channel: normalize_channel(channel),
            user_name: user_name.to_string(),
            user_id: String::new(),
            text: text.to_string(),
            roles: UserRoles::default(),
            received_at: Utc::now(),
        }
    }

    pub fn with_roles(mut self, roles: UserRoles) -> Self {
        self.roles = roles;
        self
    }

    pub fn tier(&self) -> UserTier {
        UserTier::from_roles(&self.roles)
    }
}
