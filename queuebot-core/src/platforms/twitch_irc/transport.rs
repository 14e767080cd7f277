//! src/platforms/twitch_irc/transport.rs
//!
//! Keeps one IRC connection alive for all channels: reconnects with a fresh
//! token when the socket drops, rejoins every channel, and forwards PRIVMSGs
//! as `ChatMessage`s.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use queuebot_common::models::{normalize_channel, ChatMessage};
use crate::auth::TokenSource;
use crate::platforms::{ChatTransport, ConnectionStatus};
use crate::Error;

use super::client::{IrcIncomingEvent, TwitchIrcClient};

pub const TWITCH_MAX_MSG_LENGTH: usize = 450;
const RECONNECT_DELAY: Duration = Duration::from_secs(30);
const INBOUND_BUFFER: usize = 1024;

#[derive(Debug)]
enum Outbound {
    Privmsg { channel: String, text: String },
    Join(String),
    Part(String),
}

pub struct TwitchIrcTransport {
    outgoing: mpsc::UnboundedSender<Outbound>,
    status: Arc<RwLock<ConnectionStatus>>,
    channels: Arc<RwLock<BTreeSet<String>>>,
}

struct Supervisor {
    bot_name: String,
    tokens: Arc<dyn TokenSource>,
    commands: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::Sender<ChatMessage>,
    status: Arc<RwLock<ConnectionStatus>>,
    channels: Arc<RwLock<BTreeSet<String>>>,
    shutdown_rx: watch::Receiver<bool>,
}

enum SessionEnd {
    Dropped,
    Shutdown,
}

impl TwitchIrcTransport {
    /// Starts the connection supervisor. Returns the transport, the stream
    /// of inbound chat messages, and the supervisor task.
    pub fn spawn(
        bot_name: &str,
        tokens: Arc<dyn TokenSource>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, mpsc::Receiver<ChatMessage>, JoinHandle<()>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_BUFFER);
        let status = Arc::new(RwLock::new(ConnectionStatus::Disconnected));
        let channels = Arc::new(RwLock::new(BTreeSet::new()));

        let supervisor = Supervisor {
            bot_name: bot_name.to_string(),
            tokens,
            commands: out_rx,
            inbound: in_tx,
            status: status.clone(),
            channels: channels.clone(),
            shutdown_rx,
        };
        let handle = tokio::spawn(supervisor.run());

        let transport = Self {
            outgoing: out_tx,
            status,
            channels,
        };
        (transport, in_rx, handle)
    }

    pub fn joined_channels(&self) -> Vec<String> {
        self.channels.read().iter().cloned().collect()
    }

    fn enqueue(&self, cmd: Outbound) -> Result<(), Error> {
        self.outgoing
            .send(cmd)
            .map_err(|_| Error::Platform("IRC connection task is not running".into()))
    }
}

#[async_trait]
impl ChatTransport for TwitchIrcTransport {
    async fn send_message(&self, channel: &str, message: &str) -> Result<(), Error> {
        self.enqueue(Outbound::Privmsg {
            channel: normalize_channel(channel),
            text: message.to_string(),
        })
    }

    async fn join_channel(&self, channel: &str) -> Result<(), Error> {
        let channel = normalize_channel(channel);
        self.channels.write().insert(channel.clone());
        self.enqueue(Outbound::Join(channel))
    }

    async fn leave_channel(&self, channel: &str) -> Result<(), Error> {
        let channel = normalize_channel(channel);
        self.channels.write().remove(&channel);
        self.enqueue(Outbound::Part(channel))
    }

    async fn connection_status(&self) -> ConnectionStatus {
        self.status.read().clone()
    }
}

impl Supervisor {
    fn set_status(&self, status: ConnectionStatus) {
        *self.status.write() = status;
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    async fn run(mut self) {
        info!("(TwitchIrcTransport) supervisor started for {}", self.bot_name);

        while !self.shutting_down() {
            match self.connect().await {
                Ok(client) => {
                    self.set_status(ConnectionStatus::Connected);
                    match self.drive(client).await {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Dropped => {
                            warn!("(TwitchIrcTransport) connection dropped; reconnecting in {:?}", RECONNECT_DELAY);
                            self.set_status(ConnectionStatus::Reconnecting);
                        }
                    }
                }
                Err(e) => {
                    error!("(TwitchIrcTransport) connect failed: {:?}", e);
                    self.set_status(ConnectionStatus::Error(e.to_string()));
                }
            }

            tokio::select! {
                _ = sleep(RECONNECT_DELAY) => {}
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.set_status(ConnectionStatus::Disconnected);
        info!("(TwitchIrcTransport) supervisor stopped.");
    }

    async fn connect(&self) -> Result<TwitchIrcClient, Error> {
        // Always ask for the token here so a reconnect picks up a refreshed one.
        let token = self.tokens.access_token().await?;
        let client = TwitchIrcClient::connect(&self.bot_name, &token).await?;

        let channels: Vec<String> = self.channels.read().iter().cloned().collect();
        for ch in &channels {
            client.join_channel(ch);
        }
        info!("(TwitchIrcTransport) connected as {}; joined {:?}", self.bot_name, channels);
        Ok(client)
    }

    async fn drive(&mut self, mut client: TwitchIrcClient) -> SessionEnd {
        let Some(mut incoming) = client.incoming.take() else {
            client.shutdown();
            return SessionEnd::Dropped;
        };

        let end = loop {
            tokio::select! {
                evt = incoming.recv() => match evt {
                    Some(IrcIncomingEvent::Chat(msg)) => {
                        if self.inbound.send(msg).await.is_err() {
                            info!("(TwitchIrcTransport) inbound receiver dropped; stopping.");
                            break SessionEnd::Shutdown;
                        }
                    }
                    Some(IrcIncomingEvent::Reconnect(reason)) => {
                        warn!("(TwitchIrcTransport) reconnect requested: {}", reason);
                        break SessionEnd::Dropped;
                    }
                    None => break SessionEnd::Dropped,
                },
                cmd = self.commands.recv() => match cmd {
                    Some(Outbound::Privmsg { channel, text }) => {
                        for chunk in split_into_chunks(&sanitize(&text), TWITCH_MAX_MSG_LENGTH) {
                            client.send_privmsg(&channel, &chunk);
                        }
                    }
                    Some(Outbound::Join(channel)) => client.join_channel(&channel),
                    Some(Outbound::Part(channel)) => client.part_channel(&channel),
                    None => {
                        debug!("(TwitchIrcTransport) all transport handles dropped.");
                        break SessionEnd::Shutdown;
                    }
                },
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break SessionEnd::Shutdown;
                    }
                }
            }
        };

        // Let queued lines (e.g. a final goodbye) reach the socket.
        if matches!(end, SessionEnd::Shutdown) {
            while let Ok(Outbound::Privmsg { channel, text }) = self.commands.try_recv() {
                for chunk in split_into_chunks(&sanitize(&text), TWITCH_MAX_MSG_LENGTH) {
                    client.send_privmsg(&channel, &chunk);
                }
            }
            sleep(Duration::from_millis(250)).await;
        }

        client.shutdown();
        end
    }
}

/// IRC lines end at CR/LF; multi-line replies become one line.
pub fn sanitize(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits on whitespace into chunks of at most `max_len` bytes. A single
/// word longer than `max_len` is cut at a char boundary.
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        while word.len() > max_len {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut cut = max_len;
            while !word.is_char_boundary(cut) {
                cut -= 1;
            }
            chunks.push(word[..cut].to_string());
            word = &word[cut..];
        }

        // +1 for the joining space
        let added_len = if current.is_empty() { word.len() } else { word.len() + 1 };
        if current.len() + added_len > max_len && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
