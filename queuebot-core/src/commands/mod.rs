//! src/commands/mod.rs
//!
//! Command definitions, the registry they live in, and the dispatcher that
//! turns chat lines into handler calls.

pub mod builtin;
pub mod dispatcher;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use queuebot_common::models::{ChatMessage, CooldownConfig, PermissionTier, UserTier};
use crate::bot::ChannelState;
use crate::Error;

pub use dispatcher::{CommandDispatcher, DispatchOutcome};
pub use registry::CommandRegistry;

/// Context passed to command handlers.
pub struct CommandContext<'a> {
    pub message: &'a ChatMessage,
    pub tier: UserTier,
    pub channel: &'a ChannelState,
    pub registry: &'a CommandRegistry,
    pub prefix: &'a str,
}

impl CommandContext<'_> {
    /// Display name of the caller.
    pub fn user(&self) -> &str {
        &self.message.user_name
    }

    pub fn is_privileged(&self) -> bool {
        self.tier.is_privileged()
    }
}

/// Something that can answer a command. Returning an empty string sends no reply.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext<'_>, args: &[String]) -> Result<String, Error>;
}

/// A registered command.
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub permission: PermissionTier,
    /// `None` falls back to the dispatcher's configured default.
    pub cooldown: Option<CooldownConfig>,
    pub handler: Arc<dyn CommandHandler>,
}

impl Command {
    pub fn new(name: &str, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.to_lowercase(),
            aliases: Vec::new(),
            description: String::new(),
            permission: PermissionTier::Any,
            cooldown: None,
            handler,
        }
    }

    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_lowercase()).collect();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn permission(mut self, permission: PermissionTier) -> Self {
        self.permission = permission;
        self
    }

    pub fn cooldown(mut self, cooldown: CooldownConfig) -> Self {
        self.cooldown = Some(cooldown);
        self
    }

    /// Name followed by every alias.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(|a| a.as_str()))
    }

    /// One help line: `!name (!a, !b): description [Mod Only]`.
    pub fn help_line(&self, prefix: &str) -> String {
        let mut line = format!("{prefix}{}", self.name);
        if !self.aliases.is_empty() {
            let aliases: Vec<String> = self
                .aliases
                .iter()
                .map(|a| format!("{prefix}{a}"))
                .collect();
            line.push_str(&format!(" ({})", aliases.join(", ")));
        }
        if !self.description.is_empty() {
            line.push_str(&format!(": {}", self.description));
        }
        if let Some(label) = self.permission.label() {
            line.push(' ');
            line.push_str(label);
        }
        line
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("permission", &self.permission)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}
