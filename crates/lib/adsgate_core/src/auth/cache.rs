//! Access-token cache shared by the credential strategies.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use super::AuthError;
use crate::config::TokenCachePolicy;

/// Lifetime assumed when the token endpoint omits `expires_in` (Google default).
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

fn default_lifetime() -> TimeDelta {
    TimeDelta::seconds(DEFAULT_TOKEN_LIFETIME.as_secs() as i64)
}

/// A token with its absolute expiry.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Build from an `expires_in` seconds value.
    ///
    /// Missing, non-positive or unrepresentable lifetimes fall back to
    /// [`DEFAULT_TOKEN_LIFETIME`].
    pub fn new(value: String, expires_in: Option<i64>) -> Self {
        let now = Utc::now();
        let expires_at = expires_in
            .filter(|secs| *secs > 0)
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or_else(|| now + default_lifetime());
        Self { value, expires_at }
    }

    /// True while the token is valid for at least `margin` more.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        TimeDelta::from_std(margin)
            .ok()
            .and_then(|margin| Utc::now().checked_add_signed(margin))
            .is_some_and(|deadline| deadline < self.expires_at)
    }
}

/// Single-slot token cache.
///
/// The slot stays locked during a refresh, so concurrent callers wait for
/// one exchange instead of each starting their own.
#[derive(Debug)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    policy: TokenCachePolicy,
}

impl TokenCache {
    pub fn new(policy: TokenCachePolicy) -> Self {
        Self {
            slot: Mutex::new(None),
            policy,
        }
    }

    /// Return the cached token if still fresh, else run `fetch` and store its result.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedToken, AuthError>>,
    {
        if !self.policy.enabled {
            return fetch().await.map(|t| t.value);
        }

        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref()
            && token.is_fresh(self.policy.refresh_margin)
        {
            return Ok(token.value.clone());
        }

        debug!(expired = slot.is_some(), "refreshing access token");
        let token = fetch().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }
}
