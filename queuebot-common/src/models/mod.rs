pub mod chat;
pub mod command;
pub mod queue;

pub use chat::{normalize_channel, ChatMessage, UserRoles, UserTier};
pub use command::{CooldownConfig, PermissionTier};
pub use queue::{QueueEntry, QueueState, Username};
