//! Access-token acquisition. Clients are constructed and injected, never
//! reached through a process-wide singleton, so every consumer can be tested
//! against a fake provider.

use crate::core::{AccessToken, QcError, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Mutex;

/// Supplies a bearer token that is valid right now. Implementations refresh
/// behind the scenes; callers must not cache the result across suspension
/// points that matter.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token believed valid, refreshing first when the cached one
    /// looks expired. Fails with [`QcError::AuthRequired`] when the session
    /// cannot be re-established without user interaction.
    async fn ensure_valid(&self) -> Result<AccessToken>;

    /// Whether a user session exists at all. The display-retry path only
    /// re-asserts permissions for authenticated sessions.
    fn is_authenticated(&self) -> bool;
}

/// Fixed token, never expires. Test double and CLI escape hatch for service
/// accounts whose token is minted externally.
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(value, Utc::now() + Duration::days(3650)),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn ensure_valid(&self) -> Result<AccessToken> {
        Ok(self.token.clone())
    }

    fn is_authenticated(&self) -> bool {
        true
    }
}

/// Holds a refreshable token. The refresh closure is the only mutator; all
/// other subsystems read through `ensure_valid`.
pub struct RefreshingTokenProvider<F> {
    current: Mutex<Option<AccessToken>>,
    refresh: F,
}

impl<F, Fut> RefreshingTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<AccessToken>> + Send,
{
    pub fn new(refresh: F) -> Self {
        Self {
            current: Mutex::new(None),
            refresh,
        }
    }
}

#[async_trait]
impl<F, Fut> TokenProvider for RefreshingTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<AccessToken>> + Send,
{
    async fn ensure_valid(&self) -> Result<AccessToken> {
        let cached = self.current.lock()?.clone();
        if let Some(token) = cached
            && !token.looks_expired()
        {
            return Ok(token);
        }
        let fresh = (self.refresh)().await.map_err(|e| match e {
            QcError::AuthRequired(msg) => QcError::AuthRequired(msg),
            other => QcError::AuthRequired(format!("token refresh failed: {other}")),
        })?;
        *self.current.lock()? = Some(fresh.clone());
        Ok(fresh)
    }

    fn is_authenticated(&self) -> bool {
        self.current
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}
