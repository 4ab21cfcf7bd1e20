//! Authentication against Google's token endpoint.
//!
//! Route handlers depend only on [`TokenRefresher`], which hands out bearer
//! tokens from whichever [`AuthClient`] the resolved credentials produce.

pub mod cache;
pub mod credentials;
pub mod oauth2;
pub mod service_account;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::AuthConfig;
use cache::TokenCache;
use credentials::CredentialConfig;
use oauth2::OAuth2Client;
use service_account::ServiceAccountClient;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("No access token received: {0}")]
    EmptyToken(String),
}

/// Capability to produce a bearer token for the Ads API.
///
/// Implementations refresh internally when their token is missing or expired.
/// `Ok(None)` means the strategy completed without yielding a token.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn access_token(&self) -> Result<Option<String>, AuthError>;

    /// Strategy name for logs.
    fn strategy(&self) -> &'static str;
}

/// Build the auth client for the resolved credentials.
pub fn build_auth_client(
    config: &AuthConfig,
    http: reqwest::Client,
) -> Result<Arc<dyn AuthClient>, AuthError> {
    let cache = TokenCache::new(config.cache);
    let client: Arc<dyn AuthClient> = match &config.credentials {
        CredentialConfig::ServiceAccount(key) => Arc::new(
            ServiceAccountClient::new(key.clone(), &config.token_url, http, cache)?
                .with_timeout(config.timeout),
        ),
        CredentialConfig::OAuth2(creds) => Arc::new(
            OAuth2Client::new(creds.clone(), &config.token_url, http, cache)
                .with_timeout(config.timeout),
        ),
    };
    Ok(client)
}

/// Hands out access tokens, building the auth client on first use.
pub struct TokenRefresher {
    /// Inputs for the lazy build; `None` when the client was injected.
    pending: Option<(AuthConfig, reqwest::Client)>,
    client: OnceCell<Arc<dyn AuthClient>>,
}

impl TokenRefresher {
    /// Refresher that builds its client lazily from `config`.
    pub fn new(config: AuthConfig, http: reqwest::Client) -> Self {
        Self {
            pending: Some((config, http)),
            client: OnceCell::new(),
        }
    }

    /// Refresher around an already-built client.
    pub fn with_client(client: Arc<dyn AuthClient>) -> Self {
        Self {
            pending: None,
            client: OnceCell::new_with(Some(client)),
        }
    }

    /// Whether the auth client has been constructed yet.
    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }

    async fn client(&self) -> Result<&Arc<dyn AuthClient>, AuthError> {
        self.client
            .get_or_try_init(|| async {
                let (config, http) = self.pending.as_ref().ok_or_else(|| {
                    AuthError::Credential("no credential configuration available".into())
                })?;
                let client = build_auth_client(config, http.clone())?;
                info!(strategy = client.strategy(), "auth client initialized");
                Ok::<_, AuthError>(client)
            })
            .await
    }

    /// Return a non-empty bearer token, refreshing through the auth client if needed.
    pub async fn get_access_token(&self) -> Result<String, AuthError> {
        let client = self.client().await?;
        match client.access_token().await? {
            Some(token) if !token.is_empty() => {
                debug!(strategy = client.strategy(), "access token resolved");
                Ok(token)
            }
            _ => Err(AuthError::EmptyToken(format!(
                "{} strategy returned an empty token",
                client.strategy()
            ))),
        }
    }
}
