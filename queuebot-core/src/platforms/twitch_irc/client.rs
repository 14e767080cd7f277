//! src/platforms/twitch_irc/client.rs

use std::io;

use chrono::Utc;
use tokio::io::{split, AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_native_tls::native_tls;
use tokio_native_tls::TlsConnector;
use tracing::{debug, error, info};

use queuebot_common::models::{normalize_channel, ChatMessage, UserRoles};

pub const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv";
pub const TWITCH_IRC_TLS_PORT: u16 = 6697;

/// Minimal representation of a parsed IRC message from Twitch.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTwitchMsg {
    pub tags: Option<String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl ParsedTwitchMsg {
    pub fn parse_irc_line(line: &str) -> Self {
        let mut rest = line.trim();
        let mut tags = None;
        let mut prefix = None;
        let mut params = Vec::new();
        let mut trailing = None;

        // 1) tags
        if rest.starts_with('@') {
            match rest.split_once(' ') {
                Some((t, r)) => {
                    tags = Some(t.to_string());
                    rest = r;
                }
                None => {
                    return Self {
                        tags: Some(rest.to_string()),
                        prefix: None,
                        command: String::new(),
                        params,
                        trailing,
                    };
                }
            }
        }

        // 2) prefix
        if rest.starts_with(':') {
            match rest.split_once(' ') {
                Some((p, r)) => {
                    prefix = Some(p.trim_start_matches(':').to_string());
                    rest = r;
                }
                None => {
                    return Self {
                        tags,
                        prefix: Some(rest.trim_start_matches(':').to_string()),
                        command: String::new(),
                        params,
                        trailing,
                    };
                }
            }
        }

        // 3) command
        let (command, rest) = rest.split_once(' ').unwrap_or((rest, ""));

        // 4) params and trailing
        if let Some(stripped) = rest.strip_prefix(':') {
            trailing = Some(stripped.to_string());
        } else if let Some(idx) = rest.find(" :") {
            trailing = Some(rest[idx + 2..].to_string());
            params.extend(rest[..idx].split_whitespace().map(|s| s.to_string()));
        } else {
            params.extend(rest.split_whitespace().map(|s| s.to_string()));
        }

        Self {
            tags,
            prefix,
            command: command.to_string(),
            params,
            trailing,
        }
    }

    /// Login name from a `nick!user@host` prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        prefix.split_once('!').map(|(nick, _)| nick)
    }

    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags.as_deref().and_then(|t| extract_tag_value(t, key))
    }

    /// Converts a PRIVMSG into a `ChatMessage`. Anything else yields `None`.
    pub fn to_chat_message(&self) -> Option<ChatMessage> {
        if !self.command.eq_ignore_ascii_case("PRIVMSG") {
            return None;
        }
        let channel = self.params.first()?;
        let text = self.trailing.as_deref()?;

        let user_name = self
            .tag("display-name")
            .filter(|n| !n.is_empty())
            .or_else(|| self.nick().map(|n| n.to_string()))?;

        let mut roles = self
            .tag("badges")
            .map(|b| UserRoles::from_badges(&b))
            .unwrap_or_default();
        if self.tag("mod").as_deref() == Some("1") {
            roles.moderator = true;
        }
        if let Some(nick) = self.nick() {
            if nick.eq_ignore_ascii_case(&normalize_channel(channel)) {
                roles.broadcaster = true;
            }
        }

        Some(ChatMessage {
            channel: normalize_channel(channel),
            user_name,
            user_id: self.tag("user-id").unwrap_or_default(),
            text: text.to_string(),
            roles,
            received_at: Utc::now(),
        })
    }
}

/// Higher-level event from the IRC read loop.
#[derive(Debug, Clone)]
pub enum IrcIncomingEvent {
    Chat(ChatMessage),
    /// Twitch asked us to reconnect (RECONNECT) or refused our login.
    Reconnect(String),
}

/// Low-level IRC client that connects to Twitch via TLS.
pub struct TwitchIrcClient {
    raw_outgoing: mpsc::UnboundedSender<String>,

    /// Taken once by whoever drives the connection.
    pub incoming: Option<mpsc::UnboundedReceiver<IrcIncomingEvent>>,

    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
}

impl TwitchIrcClient {
    /// Connects to `irc.chat.twitch.tv:6697` with TLS, does PASS/NICK/CAP,
    /// spawns read/write tasks.
    pub async fn connect(username: &str, oauth_token: &str) -> io::Result<Self> {
        // 1) raw TCP connect
        let tcp = TcpStream::connect((TWITCH_IRC_HOST, TWITCH_IRC_TLS_PORT))
            .await
            .map_err(|e| io::Error::other(format!("TCP connect error: {e}")))?;

        // 2) TLS handshake
        let native_connector = native_tls::TlsConnector::new()
            .map_err(|e| io::Error::other(format!("TLSConnector::new() => {e}")))?;
        let connector = TlsConnector::from(native_connector);
        let tls_stream = connector
            .connect(TWITCH_IRC_HOST, tcp)
            .await
            .map_err(|e| io::Error::other(format!("TLS connect() => {e}")))?;

        let (read_half, write_half) = split(tls_stream);

        // 3) channels
        let (tx_outgoing, rx_outgoing) = mpsc::unbounded_channel::<String>();
        let (tx_incoming, rx_incoming) = mpsc::unbounded_channel::<IrcIncomingEvent>();

        // 4) writer, then login lines
        let write_task = tokio::spawn(Self::writer_loop(write_half, rx_outgoing));

        let pass = if oauth_token.starts_with("oauth:") {
            oauth_token.to_string()
        } else {
            format!("oauth:{oauth_token}")
        };
        tx_outgoing.send(format!("PASS {pass}")).ok();
        tx_outgoing.send(format!("NICK {}", username.to_lowercase())).ok();
        tx_outgoing
            .send("CAP REQ :twitch.tv/commands twitch.tv/tags".to_string())
            .ok();

        // 5) reader
        let read_task = tokio::spawn(Self::reader_loop(read_half, tx_incoming, tx_outgoing.clone()));

        Ok(Self {
            raw_outgoing: tx_outgoing,
            incoming: Some(rx_incoming),
            read_task,
            write_task,
        })
    }

    async fn reader_loop<R>(
        read_half: R,
        tx_incoming: mpsc::UnboundedSender<IrcIncomingEvent>,
        tx_outgoing: mpsc::UnboundedSender<String>,
    ) where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(read_half);
        let mut line_buffer = String::new();

        loop {
            line_buffer.clear();
            match reader.read_line(&mut line_buffer).await {
                Ok(0) => {
                    info!("(TwitchIrcClient) read_loop => EOF");
                    break;
                }
                Ok(_) => {
                    let line = line_buffer.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    debug!("<< {}", line);

                    let parsed = ParsedTwitchMsg::parse_irc_line(line);
                    match parsed.command.to_uppercase().as_str() {
                        "PING" => {
                            let payload = parsed.trailing.as_deref().unwrap_or(TWITCH_IRC_HOST);
                            tx_outgoing.send(format!("PONG :{payload}")).ok();
                            debug!("Auto PONG -> {}", payload);
                        }
                        "PRIVMSG" => {
                            if let Some(msg) = parsed.to_chat_message() {
                                let _ = tx_incoming.send(IrcIncomingEvent::Chat(msg));
                            }
                        }
                        "RECONNECT" => {
                            let _ = tx_incoming.send(IrcIncomingEvent::Reconnect("server requested reconnect".into()));
                        }
                        "NOTICE" => {
                            let text = parsed.trailing.unwrap_or_default();
                            if text.contains("Login authentication failed") || text.contains("Improperly formatted auth") {
                                error!("(TwitchIrcClient) login refused: {}", text);
                                let _ = tx_incoming.send(IrcIncomingEvent::Reconnect(text));
                            } else {
                                info!("(TwitchIrcClient) NOTICE: {}", text);
                            }
                        }
                        _ => {}
                    }
                }
                Err(e) => {
                    error!("(TwitchIrcClient) read error => {:?}", e);
                    break;
                }
            }
        }

        info!("(TwitchIrcClient) reader_loop ended.");
    }

    async fn writer_loop<W>(mut write_half: W, mut rx_outgoing: mpsc::UnboundedReceiver<String>)
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        let mut writer = BufWriter::new(&mut write_half);

        while let Some(line) = rx_outgoing.recv().await {
            if line.starts_with("PASS ") {
                debug!(">> PASS oauth:***");
            } else {
                debug!(">> {}", line);
            }
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                error!("writer error => {:?}", e);
                break;
            }
            if let Err(e) = writer.write_all(b"\r\n").await {
                error!("writer error => {:?}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                error!("writer flush error => {:?}", e);
                break;
            }
        }

        info!("(TwitchIrcClient) writer_loop ended.");
    }

    pub fn send_raw_line(&self, line: &str) {
        let _ = self.raw_outgoing.send(line.to_string());
    }

    pub fn join_channel(&self, channel: &str) {
        self.send_raw_line(&format!("JOIN #{}", normalize_channel(channel)));
    }

    pub fn part_channel(&self, channel: &str) {
        self.send_raw_line(&format!("PART #{}", normalize_channel(channel)));
    }

    pub fn send_privmsg(&self, channel: &str, message: &str) {
        self.send_raw_line(&format!("PRIVMSG #{} :{}", normalize_channel(channel), message));
    }

    /// Aborts the read/write tasks.
    pub fn shutdown(self) {
        self.read_task.abort();
        self.write_task.abort();
    }
}

/// Helper to extract `key=value` from a tag string like `@badge-info=;user-id=1234;...`
pub fn extract_tag_value(tag_str: &str, key: &str) -> Option<String> {
    tag_str
        .trim_start_matches('@')
        .split(';')
        .filter_map(|kv| kv.split_once('=').or(Some((kv, ""))))
        .find(|(left, _)| *left == key)
        .map(|(_, right)| unescape_tag_value(right))
}

/// IRCv3 tag escapes: `\s` space, `\:` semicolon, `\\` backslash.
fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some(':') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
