//! src/config.rs
//!
//! Bot configuration: a TOML file, then environment overrides, then
//! whatever the command line sets.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{info, warn};

use queuebot_common::models::{normalize_channel, CooldownConfig};
use crate::auth::{StaticToken, TokenSource, TwitchTokenManager};
use crate::Error;

pub const DEFAULT_PREFIX: &str = "!";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_regular() -> u64 {
    30
}
fn default_vip() -> u64 {
    15
}
fn default_moderator() -> u64 {
    5
}

/// Twitch app credentials and tokens. Usually supplied through the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwitchCredentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    /// A ready-made access token (`oauth:...`).
    #[serde(default)]
    pub oauth: String,
}

/// Cooldown durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CooldownSecs {
    #[serde(default = "default_regular")]
    pub regular: u64,
    #[serde(default = "default_vip")]
    pub vip: u64,
    #[serde(default = "default_moderator")]
    pub moderator: u64,
    #[serde(default)]
    pub broadcaster: u64,
}

impl Default for CooldownSecs {
    fn default() -> Self {
        Self {
            regular: default_regular(),
            vip: default_vip(),
            moderator: default_moderator(),
            broadcaster: 0,
        }
    }
}

impl From<CooldownSecs> for CooldownConfig {
    fn from(s: CooldownSecs) -> Self {
        CooldownConfig::from_secs(s.regular, s.vip, s.moderator, s.broadcaster)
    }
}

/// Default cooldowns plus per-command overrides.
///
/// ```toml
/// [cooldowns]
/// regular = 30
/// vip = 15
///
/// [cooldowns.overrides.join]
/// regular = 60
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CooldownSettings {
    #[serde(flatten)]
    pub defaults: CooldownSecs,
    #[serde(default)]
    pub overrides: BTreeMap<String, CooldownSecs>,
}

impl CooldownSettings {
    pub fn default_config(&self) -> CooldownConfig {
        self.defaults.into()
    }

    pub fn override_configs(&self) -> std::collections::HashMap<String, CooldownConfig> {
        self.overrides
            .iter()
            .map(|(name, secs)| (name.to_lowercase(), CooldownConfig::from(*secs)))
            .collect()
    }
}

/// Per-channel settings. Unset fields fall back to the bot-wide values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    pub data_path: Option<PathBuf>,
    pub prefix: Option<String>,
    pub restore_on_startup: Option<bool>,
    pub default_pop_count: Option<usize>,
    pub timezone: Option<String>,
    pub cooldowns: Option<CooldownSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot_name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub twitch: TwitchCredentials,
    #[serde(default)]
    pub cooldowns: CooldownSettings,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_name: String::new(),
            data_dir: default_data_dir(),
            prefix: None,
            timezone: None,
            twitch: TwitchCredentials::default(),
            cooldowns: CooldownSettings::default(),
            channels: BTreeMap::new(),
        }
    }
}

/// Everything one channel needs, with defaults applied.
#[derive(Debug, Clone)]
pub struct ResolvedChannel {
    pub name: String,
    pub data_path: PathBuf,
    pub prefix: String,
    pub restore_on_startup: bool,
    pub default_pop_count: usize,
    pub timezone: Tz,
    pub cooldowns: CooldownSettings,
}

/// Parses an IANA zone name, falling back to America/New_York.
pub fn parse_timezone(name: Option<&str>) -> Tz {
    match name {
        None => DEFAULT_TIMEZONE,
        Some(n) => n.parse::<Tz>().unwrap_or_else(|e| {
            warn!("Unknown timezone '{}' ({}); falling back to {}", n, e, DEFAULT_TIMEZONE);
            DEFAULT_TIMEZONE
        }),
    }
}

impl BotConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let mut config: BotConfig = toml::from_str(content)?;
        config.channels = std::mem::take(&mut config.channels)
            .into_iter()
            .map(|(name, cfg)| (normalize_channel(&name), cfg))
            .collect();
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        match Self::load(path.as_ref()) {
            Ok(cfg) => Ok(cfg),
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                info!("No config file at {}; using defaults.", path.as_ref().display());
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Applies `BOT_NAME`, `TWITCH_CLIENT_ID`, `TWITCH_CLIENT_SECRET`,
    /// `TWITCH_REFRESH_TOKEN` and `TWITCH_OAUTH_TOKEN` when set.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("BOT_NAME") {
            self.bot_name = v;
        }
        if let Some(v) = get("TWITCH_CLIENT_ID") {
            self.twitch.client_id = v;
        }
        if let Some(v) = get("TWITCH_CLIENT_SECRET") {
            self.twitch.client_secret = v;
        }
        if let Some(v) = get("TWITCH_REFRESH_TOKEN") {
            self.twitch.refresh_token = v;
        }
        if let Some(v) = get("TWITCH_OAUTH_TOKEN") {
            self.twitch.oauth = v;
        }
    }

    /// Adds `names` as channels with default settings (existing entries are kept).
    pub fn add_channels<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = normalize_channel(name.as_ref());
            if !name.is_empty() {
                self.channels.entry(name).or_default();
            }
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.bot_name.trim().is_empty() {
            return Err(Error::Config("bot_name is required".into()));
        }
        if self.channels.is_empty() {
            return Err(Error::Config("at least one channel is required".into()));
        }
        for (name, ch) in &self.channels {
            if name.is_empty() {
                return Err(Error::Config("channel names cannot be empty".into()));
            }
            if let Some(p) = &ch.prefix {
                if p.is_empty() || p.chars().any(char::is_whitespace) {
                    return Err(Error::Config(format!("invalid prefix '{p}' for channel {name}")));
                }
            }
            if ch.default_pop_count == Some(0) {
                return Err(Error::Config(format!("default_pop_count must be positive for channel {name}")));
            }
        }
        let t = &self.twitch;
        let can_refresh = !t.client_id.is_empty() && !t.client_secret.is_empty() && !t.refresh_token.is_empty();
        if !can_refresh && t.oauth.is_empty() {
            return Err(Error::Config(
                "Twitch credentials missing: set client_id, client_secret and refresh_token, or an oauth token".into(),
            ));
        }
        Ok(())
    }

    pub fn resolved_channels(&self) -> Vec<ResolvedChannel> {
        let base_prefix = self.prefix.clone().unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        self.channels
            .iter()
            .map(|(name, ch)| ResolvedChannel {
                name: name.clone(),
                data_path: ch
                    .data_path
                    .clone()
                    .unwrap_or_else(|| self.data_dir.join(name)),
                prefix: ch.prefix.clone().unwrap_or_else(|| base_prefix.clone()),
                restore_on_startup: ch.restore_on_startup.unwrap_or(true),
                default_pop_count: ch.default_pop_count.unwrap_or(1),
                timezone: parse_timezone(ch.timezone.as_deref().or(self.timezone.as_deref())),
                cooldowns: ch.cooldowns.clone().unwrap_or_else(|| self.cooldowns.clone()),
            })
            .collect()
    }

    /// A refreshing token manager when refresh credentials exist, else the static token.
    pub fn token_source(&self) -> Result<Arc<dyn TokenSource>, Error> {
        let t = &self.twitch;
        if !t.client_id.is_empty() && !t.client_secret.is_empty() && !t.refresh_token.is_empty() {
            let mut mgr = TwitchTokenManager::new(&t.client_id, &t.client_secret, &t.refresh_token);
            if !t.oauth.is_empty() {
                // Expiry unknown, so the first check refreshes it.
                mgr = mgr.with_access_token(&t.oauth, None);
            }
            return Ok(Arc::new(mgr));
        }
        if !t.oauth.is_empty() {
            return Ok(Arc::new(StaticToken::new(&t.oauth)));
        }
        Err(Error::Config("no Twitch credentials configured".into()))
    }
}
