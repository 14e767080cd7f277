//! src/auth/twitch_token.rs
//!
//! Refresh-token flow against the Twitch OAuth endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::TokenSource;
use crate::Error;

pub const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Tokens with less than this left are treated as expired.
const MIN_VALIDITY: Duration = Duration::minutes(1);
/// Refresh once this little is left.
pub const REFRESH_WINDOW: Duration = Duration::minutes(5);

/// Matches Twitch's JSON from the token endpoint
#[derive(Debug, Deserialize)]
struct TwitchTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    scope: Option<Vec<String>>,
}

#[derive(Debug, Default, Clone)]
struct TokenState {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
    last_refresh: Option<DateTime<Utc>>,
}

pub struct TwitchTokenManager {
    http: ReqwestClient,
    token_url: String,
    client_id: String,
    client_secret: String,
    state: RwLock<TokenState>,
    /// Serializes refreshes so the rotated refresh token is used exactly once.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl TwitchTokenManager {
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            http: ReqwestClient::new(),
            token_url: TWITCH_TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            state: RwLock::new(TokenState {
                refresh_token: refresh_token.to_string(),
                ..Default::default()
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Points the manager at a different token endpoint.
    pub fn with_token_url(mut self, url: &str) -> Self {
        self.token_url = url.to_string();
        self
    }

    /// Seeds a token obtained elsewhere.
    pub fn with_access_token(self, access_token: &str, expires_at: Option<DateTime<Utc>>) -> Self {
        {
            let mut state = self.state.write();
            state.access_token = access_token.trim_start_matches("oauth:").to_string();
            state.expires_at = expires_at;
        }
        self
    }

    /// True when more than a minute of validity remains.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read();
        match state.expires_at {
            Some(exp) => !state.access_token.is_empty() && exp - now > MIN_VALIDITY,
            None => false,
        }
    }

    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.read();
        match state.expires_at {
            Some(exp) => state.access_token.is_empty() || exp - now <= REFRESH_WINDOW,
            None => true,
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TwitchTokenResponse, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("HTTP error refreshing token: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token refresh failed with status {status}: {body}"
            )));
        }

        resp.json::<TwitchTokenResponse>()
            .await
            .map_err(|e| Error::Auth(format!("Parse error on token JSON: {e}")))
    }
}

#[async_trait]
impl TokenSource for TwitchTokenManager {
    async fn access_token(&self) -> Result<String, Error> {
        if !self.is_valid_at(Utc::now()) {
            info!("[Auth] Access token expired or missing; refreshing.");
            self.refresh().await?;
        }
        let token = self.state.read().access_token.clone();
        if token.is_empty() {
            return Err(Error::Auth("no access token available".into()));
        }
        Ok(token)
    }

    async fn refresh(&self) -> Result<(), Error> {
        let _guard = self.refresh_lock.lock().await;

        // Someone else may have refreshed while we waited.
        if !self.needs_refresh_at(Utc::now()) {
            debug!("[Auth] Token already fresh; skipping refresh.");
            return Ok(());
        }

        let refresh_token = self.state.read().refresh_token.clone();
        if refresh_token.is_empty() {
            return Err(Error::Auth("no refresh token configured".into()));
        }

        let resp = self.request_refresh(&refresh_token).await?;
        let now = Utc::now();
        let expires_at = now + Duration::seconds(resp.expires_in);

        let mut state = self.state.write();
        state.access_token = resp.access_token;
        match resp.refresh_token {
            Some(rt) if !rt.is_empty() => state.refresh_token = rt,
            _ => warn!("[Auth] Token endpoint returned no refresh token; keeping the old one."),
        }
        state.expires_at = Some(expires_at);
        state.last_refresh = Some(now);

        info!(
            "[Auth] Token refreshed; expires at {} (scopes: {:?})",
            expires_at,
            resp.scope.unwrap_or_default()
        );
        Ok(())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().expires_at
    }

    fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_refresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_requires_more_than_a_minute() {
        let now = Utc::now();
        let mgr = TwitchTokenManager::new("id", "secret", "rt")
            .with_access_token("oauth:tok", Some(now + Duration::seconds(61)));
        assert!(mgr.is_valid_at(now));
        assert!(!mgr.is_valid_at(now + Duration::seconds(1)));
    }

    #[test]
    fn refresh_due_inside_five_minutes() {
        let now = Utc::now();
        let mgr = TwitchTokenManager::new("id", "secret", "rt")
            .with_access_token("tok", Some(now + Duration::minutes(20)));
        assert!(!mgr.needs_refresh_at(now));
        assert!(mgr.needs_refresh_at(now + Duration::minutes(15)));

        let unknown = TwitchTokenManager::new("id", "secret", "rt");
        assert!(unknown.needs_refresh_at(now));
        assert!(!unknown.is_valid_at(now));
    }

    #[tokio::test]
    async fn fresh_token_is_returned_without_network() {
        let mgr = TwitchTokenManager::new("id", "secret", "rt")
            .with_token_url("http://127.0.0.1:9/unreachable")
            .with_access_token("oauth:tok", Some(Utc::now() + Duration::hours(2)));
        assert_eq!(mgr.access_token().await.unwrap(), "tok");
        // Not due, so no request goes out.
        assert!(mgr.refresh().await.is_ok());
    }

    #[tokio::test]
    async fn missing_refresh_token_is_an_auth_error() {
        let mgr = TwitchTokenManager::new("id", "secret", "");
        assert!(matches!(mgr.refresh().await, Err(Error::Auth(_))));
    }
}
