//! src/commands/dispatcher.rs
//!
//! Turns one inbound chat line into at most one reply.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use queuebot_common::models::{ChatMessage, CooldownConfig};
use crate::bot::ChannelState;
use crate::commands::{Command, CommandContext, CommandRegistry};
use crate::cooldown::{format_cooldown, CooldownDecision, CooldownTracker};
use crate::Error;

/// What became of a chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Ordinary chat: no prefix, or a bare prefix.
    NotCommand,
    /// Looked like a command. `command` is the resolved name (None when
    /// unknown); `reply` is what to send back, if anything.
    Attempted {
        command: Option<String>,
        reply: Option<String>,
    },
}

impl DispatchOutcome {
    pub fn reply(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Attempted { reply: Some(r), .. } => Some(r),
            _ => None,
        }
    }

    fn attempted(command: &Command, reply: Option<String>) -> Self {
        DispatchOutcome::Attempted {
            command: Some(command.name.clone()),
            reply,
        }
    }
}

pub struct CommandDispatcher {
    prefix: String,
    registry: Arc<CommandRegistry>,
    cooldowns: Arc<CooldownTracker>,
    default_cooldown: CooldownConfig,
    overrides: HashMap<String, CooldownConfig>,
}

impl CommandDispatcher {
    pub fn new(prefix: &str, default_cooldown: CooldownConfig) -> Self {
        Self {
            prefix: prefix.to_string(),
            registry: Arc::new(CommandRegistry::new()),
            cooldowns: Arc::new(CooldownTracker::new()),
            default_cooldown,
            overrides: HashMap::new(),
        }
    }

    /// Per-command cooldowns that win over whatever the command registers with.
    /// Must be set before commands are registered.
    pub fn with_overrides(mut self, overrides: HashMap<String, CooldownConfig>) -> Self {
        self.overrides = overrides
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    pub fn cooldowns(&self) -> &Arc<CooldownTracker> {
        &self.cooldowns
    }

    /// Registers `command` and sets its effective cooldown: a configured
    /// override, else the command's own, else the dispatcher default.
    pub fn register(&self, command: Command) -> Result<(), Error> {
        let cooldown = self
            .overrides
            .get(&command.name)
            .copied()
            .or(command.cooldown)
            .unwrap_or(self.default_cooldown);

        let registered = self.registry.register(command)?;
        self.cooldowns.set_cooldown(&registered.name, cooldown);
        Ok(())
    }

    pub async fn dispatch(&self, channel: &ChannelState, message: &ChatMessage) -> DispatchOutcome {
        // 1) prefix + command token
        let text = message.text.trim();
        let Some(rest) = text.strip_prefix(self.prefix.as_str()) else {
            return DispatchOutcome::NotCommand;
        };
        let mut parts = rest.split_whitespace();
        let Some(cmd_name) = parts.next() else {
            return DispatchOutcome::NotCommand;
        };
        let args: Vec<String> = parts.map(|s| s.to_string()).collect();

        // 2) lookup
        let Some(command) = self.registry.resolve(cmd_name) else {
            debug!("#{}: unknown command '{}' from {}", message.channel, cmd_name, message.user_name);
            return DispatchOutcome::Attempted { command: None, reply: None };
        };

        // 3) permission
        let tier = message.tier();
        if !command.permission.allows(tier) {
            info!(
                "#{}: {} ({:?}) denied '{}'",
                message.channel, message.user_name, tier, command.name
            );
            return DispatchOutcome::attempted(
                &command,
                Some(command.permission.denial_message().to_string()),
            );
        }

        // 4) cooldown
        match self.cooldowns.try_acquire(&command.name, &message.user_name, tier) {
            CooldownDecision::Ready => {}
            CooldownDecision::Blocked { remaining, notify } => {
                debug!(
                    "#{}: '{}' on cooldown for {} ({:?} left)",
                    message.channel, command.name, message.user_name, remaining
                );
                let reply = notify.then(|| {
                    format!(
                        "@{}, this command is on cooldown. Please wait {}.",
                        message.user_name,
                        format_cooldown(remaining)
                    )
                });
                return DispatchOutcome::attempted(&command, reply);
            }
        }

        // 5) execute
        let ctx = CommandContext {
            message,
            tier,
            channel,
            registry: &self.registry,
            prefix: &self.prefix,
        };
        debug!("#{}: {} ran '{}' {:?}", message.channel, message.user_name, command.name, args);

        let reply = match command.handler.handle(&ctx, &args).await {
            Ok(text) => text,
            Err(Error::Queue(e)) => e.to_string(),
            Err(e) => {
                error!(
                    "#{}: command '{}' failed for {}: {:?}",
                    message.channel, command.name, message.user_name, e
                );
                format!("Something went wrong running {}{}.", self.prefix, command.name)
            }
        };

        let reply = if reply.trim().is_empty() { None } else { Some(reply) };
        DispatchOutcome::attempted(&command, reply)
    }
}
