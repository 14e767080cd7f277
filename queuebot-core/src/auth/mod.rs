//! src/auth/mod.rs
//!
//! Where the chat transport gets its OAuth token from.

pub mod twitch_token;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Error;

pub use twitch_token::TwitchTokenManager;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid access token, refreshing first if needed.
    async fn access_token(&self) -> Result<String, Error>;

    /// Forces a refresh when one is due. Sources that cannot refresh return `Ok(())`.
    async fn refresh(&self) -> Result<(), Error>;

    fn expires_at(&self) -> Option<DateTime<Utc>>;

    fn last_refresh(&self) -> Option<DateTime<Utc>>;
}

/// A fixed token (e.g. `oauth:...` from config) with unknown expiry.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self { token: token.to_string() }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, Error> {
        if self.token.is_empty() {
            return Err(Error::Auth("no access token configured".into()));
        }
        Ok(self.token.clone())
    }

    async fn refresh(&self) -> Result<(), Error> {
        Ok(())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn last_refresh(&self) -> Option<DateTime<Utc>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token() {
        let t = StaticToken::new("oauth:abc");
        assert_eq!(t.access_token().await.unwrap(), "oauth:abc");
        assert!(t.refresh().await.is_ok());
        assert!(t.expires_at().is_none());

        let empty = StaticToken::new("");
        assert!(matches!(empty.access_token().await, Err(Error::Auth(_))));
    }
}
