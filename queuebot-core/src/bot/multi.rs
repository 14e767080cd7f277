//! src/bot/multi.rs
//!
//! Routes inbound chat to the right channel and sends replies back out.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use queuebot_common::models::{normalize_channel, ChatMessage};
use crate::bot::{ChannelBot, ShutdownHandle};
use crate::platforms::ChatTransport;
use crate::Error;

pub struct MultiChannelBot {
    channels: DashMap<String, Arc<ChannelBot>>,
    transport: Arc<dyn ChatTransport>,
    shutdown: ShutdownHandle,
}

impl MultiChannelBot {
    pub fn new(transport: Arc<dyn ChatTransport>, shutdown: ShutdownHandle) -> Self {
        Self {
            channels: DashMap::new(),
            transport,
            shutdown,
        }
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown
    }

    /// Registers `bot` and joins its channel.
    pub async fn add_channel(&self, bot: ChannelBot) -> Result<(), Error> {
        let name = bot.channel().to_string();
        if self.channels.contains_key(&name) {
            return Err(Error::Config(format!("channel #{name} is already running")));
        }
        self.channels.insert(name.clone(), Arc::new(bot));
        self.transport.join_channel(&name).await?;
        info!("Joined #{}", name);
        Ok(())
    }

    /// Leaves `channel`, flushing its queue first. Returns false if it was not running.
    pub async fn remove_channel(&self, channel: &str) -> Result<bool, Error> {
        let name = normalize_channel(channel);
        let Some((_, bot)) = self.channels.remove(&name) else {
            return Ok(false);
        };
        bot.flush().await;
        self.transport.leave_channel(&name).await?;
        info!("Left #{}", name);
        Ok(true)
    }

    pub fn channel(&self, channel: &str) -> Option<Arc<ChannelBot>> {
        self.channels
            .get(&normalize_channel(channel))
            .map(|b| b.value().clone())
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Handles one message end to end. Returns the reply that was sent, if any.
    pub async fn handle_message(&self, message: ChatMessage) -> Option<String> {
        let Some(bot) = self.channel(&message.channel) else {
            debug!("Message for unknown channel #{}; ignoring.", message.channel);
            return None;
        };

        let outcome = bot.handle_message(&message).await;
        let reply = outcome.reply()?.to_string();

        if let Err(e) = self.transport.send_message(&message.channel, &reply).await {
            error!("#{}: failed to send reply: {:?}", message.channel, e);
        }
        Some(reply)
    }

    /// Consumes `incoming` until it closes or shutdown is triggered. Each
    /// message runs on its own task; in-flight messages finish before the
    /// queues are flushed and this returns.
    pub async fn run(self: Arc<Self>, mut incoming: mpsc::Receiver<ChatMessage>) -> Result<(), Error> {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut tasks: JoinSet<()> = JoinSet::new();
        info!("Bot running for {:?}", self.channel_names());

        loop {
            tokio::select! {
                maybe_msg = incoming.recv() => match maybe_msg {
                    Some(msg) => {
                        let this = self.clone();
                        tasks.spawn(async move {
                            this.handle_message(msg).await;
                        });
                    }
                    None => {
                        info!("Inbound chat closed => stopping.");
                        break;
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received => stopping.");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Message task failed: {:?}", e);
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Message task failed: {:?}", e);
            }
        }

        let bots: Vec<Arc<ChannelBot>> = self.channels.iter().map(|e| e.value().clone()).collect();
        for bot in bots {
            bot.flush().await;
        }
        info!("All channels flushed.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::ChannelSettings;
    use crate::platforms::MockChatTransport;
    use mockall::predicate::eq;
    use queuebot_common::models::{CooldownConfig, UserRoles};

    fn channel(name: &str, shutdown: &ShutdownHandle) -> ChannelBot {
        ChannelBot::in_memory(name, ChannelSettings::default(), CooldownConfig::none(), shutdown.clone()).unwrap()
    }

    #[tokio::test]
    async fn replies_go_back_to_the_originating_channel() {
        let mut transport = MockChatTransport::new();
        transport.expect_join_channel().times(2).returning(|_| Ok(()));
        transport
            .expect_send_message()
            .with(eq("beta"), eq("Pong! 🏓"))
            .times(1)
            .returning(|_, _| Ok(()));

        let shutdown = ShutdownHandle::new();
        let bot = MultiChannelBot::new(Arc::new(transport), shutdown.clone());
        bot.add_channel(channel("alpha", &shutdown)).await.unwrap();
        bot.add_channel(channel("Beta", &shutdown)).await.unwrap();
        assert_eq!(bot.channel_names(), vec!["alpha", "beta"]);

        let reply = bot.handle_message(ChatMessage::new("#beta", "viewer", "!ping")).await;
        assert_eq!(reply.as_deref(), Some("Pong! 🏓"));
    }

    #[tokio::test]
    async fn plain_chat_and_unknown_channels_send_nothing() {
        let mut transport = MockChatTransport::new();
        transport.expect_join_channel().returning(|_| Ok(()));
        transport.expect_send_message().never();

        let shutdown = ShutdownHandle::new();
        let bot = MultiChannelBot::new(Arc::new(transport), shutdown.clone());
        bot.add_channel(channel("alpha", &shutdown)).await.unwrap();

        assert!(bot.handle_message(ChatMessage::new("alpha", "v", "hello")).await.is_none());
        assert!(bot.handle_message(ChatMessage::new("nowhere", "v", "!ping")).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_channel_is_rejected() {
        let mut transport = MockChatTransport::new();
        transport.expect_join_channel().times(1).returning(|_| Ok(()));

        let shutdown = ShutdownHandle::new();
        let bot = MultiChannelBot::new(Arc::new(transport), shutdown.clone());
        bot.add_channel(channel("alpha", &shutdown)).await.unwrap();
        assert!(bot.add_channel(channel("ALPHA", &shutdown)).await.is_err());
    }

    #[tokio::test]
    async fn kill_command_stops_the_run_loop() {
        let mut transport = MockChatTransport::new();
        transport.expect_join_channel().returning(|_| Ok(()));
        transport.expect_send_message().returning(|_, _| Ok(()));

        let shutdown = ShutdownHandle::new();
        let bot = Arc::new(MultiChannelBot::new(Arc::new(transport), shutdown.clone()));
        bot.add_channel(channel("alpha", &shutdown)).await.unwrap();

        let (tx, rx) = mpsc::channel(8);
        let runner = tokio::spawn(bot.clone().run(rx));

        let modmsg = ChatMessage::new("alpha", "Mod", "!kill").with_roles(UserRoles {
            moderator: true,
            ..Default::default()
        });
        tx.send(modmsg).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(2), runner)
            .await
            .expect("run loop should stop after !kill")
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn remove_channel_leaves() {
        let mut transport = MockChatTransport::new();
        transport.expect_join_channel().returning(|_| Ok(()));
        transport
            .expect_leave_channel()
            .with(eq("alpha"))
            .times(1)
            .returning(|_| Ok(()));

        let shutdown = ShutdownHandle::new();
        let bot = MultiChannelBot::new(Arc::new(transport), shutdown.clone());
        bot.add_channel(channel("alpha", &shutdown)).await.unwrap();
        assert!(bot.remove_channel("#Alpha").await.unwrap());
        assert!(!bot.remove_channel("alpha").await.unwrap());
    }
}
