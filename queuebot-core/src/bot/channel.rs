//! src/bot/channel.rs
//!
//! Everything that belongs to one channel: its queue, its command set and
//! the settings handlers read.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use queuebot_common::models::{normalize_channel, ChatMessage, CooldownConfig};
use crate::auth::TokenSource;
use crate::bot::ShutdownHandle;
use crate::commands::builtin::register_builtin_commands;
use crate::commands::{CommandDispatcher, DispatchOutcome};
use crate::config::{ResolvedChannel, DEFAULT_PREFIX, DEFAULT_TIMEZONE};
use crate::queue::{QueueEngine, StateKind, StateStore};
use crate::Error;

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub prefix: String,
    pub default_pop_count: usize,
    pub timezone: Tz,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            default_pop_count: 1,
            timezone: DEFAULT_TIMEZONE,
        }
    }
}

/// Shared, read-mostly state that handlers see through `CommandContext`.
pub struct ChannelState {
    pub channel: String,
    pub queue: Arc<QueueEngine>,
    pub settings: ChannelSettings,
    pub started_at: DateTime<Utc>,
    pub tokens: Option<Arc<dyn TokenSource>>,
    pub shutdown: ShutdownHandle,
}

pub struct ChannelBot {
    state: Arc<ChannelState>,
    dispatcher: Arc<CommandDispatcher>,
    save_task: Option<JoinHandle<()>>,
}

impl ChannelBot {
    /// Builds a channel from its resolved config: starts the save worker,
    /// optionally recovers the auto-save, registers the builtin commands.
    pub async fn start(
        config: &ResolvedChannel,
        tokens: Option<Arc<dyn TokenSource>>,
        shutdown: ShutdownHandle,
    ) -> Result<Self, Error> {
        let store = StateStore::new(&config.data_path, &config.name);
        let (queue, save_task) = QueueEngine::spawn_persistent(store);

        if config.restore_on_startup {
            match queue.recover(StateKind::Auto).await {
                Ok(Some(n)) => info!("#{}: recovered auto-save with {} user(s)", config.name, n),
                Ok(None) => info!("#{}: no auto-save found; starting fresh", config.name),
                // A bad state file should not keep the channel offline.
                Err(e) => warn!("#{}: could not recover auto-save: {:?}", config.name, e),
            }
        }

        let dispatcher = CommandDispatcher::new(&config.prefix, config.cooldowns.default_config())
            .with_overrides(config.cooldowns.override_configs());
        register_builtin_commands(&dispatcher)?;

        let settings = ChannelSettings {
            prefix: config.prefix.clone(),
            default_pop_count: config.default_pop_count,
            timezone: config.timezone,
        };

        info!(
            "#{}: channel bot ready (prefix='{}', data={})",
            config.name,
            config.prefix,
            config.data_path.display()
        );
        Ok(Self::assemble(
            &config.name,
            Arc::new(queue),
            settings,
            dispatcher,
            tokens,
            shutdown,
            Some(save_task),
        ))
    }

    /// A channel with no state files. Used by tests and dry runs.
    pub fn in_memory(
        channel: &str,
        settings: ChannelSettings,
        cooldown: CooldownConfig,
        shutdown: ShutdownHandle,
    ) -> Result<Self, Error> {
        let dispatcher = CommandDispatcher::new(&settings.prefix, cooldown);
        register_builtin_commands(&dispatcher)?;
        Ok(Self::assemble(
            channel,
            Arc::new(QueueEngine::new(channel)),
            settings,
            dispatcher,
            None,
            shutdown,
            None,
        ))
    }

    /// Like `in_memory`, but over an existing queue (e.g. one with persistence).
    pub fn with_queue(
        queue: Arc<QueueEngine>,
        settings: ChannelSettings,
        cooldown: CooldownConfig,
        tokens: Option<Arc<dyn TokenSource>>,
        shutdown: ShutdownHandle,
    ) -> Result<Self, Error> {
        let dispatcher = CommandDispatcher::new(&settings.prefix, cooldown);
        register_builtin_commands(&dispatcher)?;
        let channel = queue.channel().to_string();
        Ok(Self::assemble(&channel, queue, settings, dispatcher, tokens, shutdown, None))
    }

    fn assemble(
        channel: &str,
        queue: Arc<QueueEngine>,
        settings: ChannelSettings,
        dispatcher: CommandDispatcher,
        tokens: Option<Arc<dyn TokenSource>>,
        shutdown: ShutdownHandle,
        save_task: Option<JoinHandle<()>>,
    ) -> Self {
        let state = ChannelState {
            channel: normalize_channel(channel),
            queue,
            settings,
            started_at: Utc::now(),
            tokens,
            shutdown,
        };
        Self {
            state: Arc::new(state),
            dispatcher: Arc::new(dispatcher),
            save_task,
        }
    }

    pub fn channel(&self) -> &str {
        &self.state.channel
    }

    pub fn state(&self) -> &Arc<ChannelState> {
        &self.state
    }

    pub fn queue(&self) -> &Arc<QueueEngine> {
        &self.state.queue
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub async fn handle_message(&self, message: &ChatMessage) -> DispatchOutcome {
        self.dispatcher.dispatch(&self.state, message).await
    }

    /// Waits for pending auto-saves.
    pub async fn flush(&self) {
        if let Err(e) = self.state.queue.flush().await {
            error!("#{}: flushing queue state failed: {:?}", self.state.channel, e);
        }
    }

    /// Flushes, then lets the save worker finish once the last queue handle is gone.
    pub async fn shutdown(mut self) {
        self.flush().await;
        let task = self.save_task.take();
        drop(self);
        if let Some(task) = task {
            // Other holders of the queue keep the worker alive; don't wait on them forever.
            if tokio::time::timeout(std::time::Duration::from_secs(5), task).await.is_err() {
                warn!("Save worker still running at shutdown; pending writes were flushed.");
            }
        }
    }
}
