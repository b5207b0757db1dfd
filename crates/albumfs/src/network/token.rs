//! Access token supply.
//!
//! Acquiring and renewing OAuth tokens happens outside this crate; the
//! transport only asks a [`TokenProvider`] for the current token and, after
//! a 401, for a fresh one.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token.
    async fn token(&self) -> Result<String>;

    /// Called once after the service rejected [`token`](Self::token).
    /// Returns the token to retry with.
    async fn refresh(&self) -> Result<String>;
}

/// A fixed token, e.g. from the command line or `ALBUMFS_TOKEN`.
///
/// `refresh` hands back the same token, so a rejected token fails the
/// request after one retry.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToken")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    async fn refresh(&self) -> Result<String> {
        tracing::warn!("static token rejected; no way to renew it");
        Ok(self.token.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let token = StaticToken::new("abc");
        assert_eq!(token.token().await.unwrap(), "abc");
        assert_eq!(token.refresh().await.unwrap(), "abc");
    }

    #[test]
    fn test_debug_hides_token() {
        let token = StaticToken::new("secret-value");
        assert!(!format!("{:?}", token).contains("secret-value"));
    }
}
