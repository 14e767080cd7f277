// File: src/platforms/mod.rs

use async_trait::async_trait;
use crate::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Reconnecting,
    Error(String),
}

/// Outbound side of a chat connection. Inbound messages arrive separately
/// on an `mpsc::Receiver<ChatMessage>` handed out when the transport starts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, channel: &str, message: &str) -> Result<(), Error>;
    async fn join_channel(&self, channel: &str) -> Result<(), Error>;
    async fn leave_channel(&self, channel: &str) -> Result<(), Error>;
    async fn connection_status(&self) -> ConnectionStatus;
}

pub mod twitch_irc;
