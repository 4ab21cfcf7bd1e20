//! Credential resolution.
//!
//! Picks exactly one credential strategy at startup, in priority order:
//! service-account JSON first, then the OAuth2 refresh-token triple.

use serde::Deserialize;
use tracing::info;

use crate::config::ConfigError;

/// OAuth scope for the Google Ads API.
pub const ADS_SCOPE: &str = "https://www.googleapis.com/auth/adwords";

/// Fields used from a Google service-account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

/// OAuth2 installed-app credentials with a long-lived refresh token.
#[derive(Clone)]
pub struct OAuth2Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub redirect_uri: Option<String>,
}

impl std::fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Credentials")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

/// The active credential strategy.
#[derive(Clone, Debug)]
pub enum CredentialConfig {
    ServiceAccount(ServiceAccountKey),
    OAuth2(OAuth2Credentials),
}

impl CredentialConfig {
    /// Short strategy name for logs.
    pub fn strategy(&self) -> &'static str {
        match self {
            Self::ServiceAccount(_) => "service_account",
            Self::OAuth2(_) => "oauth2",
        }
    }
}

/// Client id, secret and redirect URI for the authorization-code exchange.
#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Resolve the authorization-code client settings, if fully present.
///
/// Independent of the active strategy: a deployment running on a service
/// account can still mint refresh tokens through the callback route.
pub fn resolve_oauth_client(get: &impl Fn(&str) -> Option<String>) -> Option<OAuthClientConfig> {
    Some(OAuthClientConfig {
        client_id: get("GOOGLE_CLIENT_ID")?,
        client_secret: get("GOOGLE_CLIENT_SECRET")?,
        redirect_uri: get("GOOGLE_OAUTH_REDIRECT_URI")?,
    })
}

/// Select a credential strategy from environment values.
///
/// `get` must return `None` for unset or blank variables.
pub fn resolve_credentials(
    get: &impl Fn(&str) -> Option<String>,
) -> Result<CredentialConfig, ConfigError> {
    if let Some(blob) = get("SERVICE_ACCOUNT_JSON") {
        let key = parse_service_account(&blob)?;
        info!(
            strategy = "service_account",
            client_email = %key.client_email,
            "using service account credentials"
        );
        return Ok(CredentialConfig::ServiceAccount(key));
    }

    if let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
        get("GOOGLE_CLIENT_ID"),
        get("GOOGLE_CLIENT_SECRET"),
        get("GOOGLE_REFRESH_TOKEN"),
    ) {
        info!(strategy = "oauth2", "using OAuth2 refresh token credentials");
        return Ok(CredentialConfig::OAuth2(OAuth2Credentials {
            client_id,
            client_secret,
            refresh_token,
            redirect_uri: get("GOOGLE_OAUTH_REDIRECT_URI"),
        }));
    }

    Err(ConfigError::NoCredentials)
}

/// Parse a service-account key blob.
pub fn parse_service_account(blob: &str) -> Result<ServiceAccountKey, ConfigError> {
    let key: ServiceAccountKey = serde_json::from_str(blob)
        .map_err(|e| ConfigError::MalformedServiceAccount(e.to_string()))?;
    if key.client_email.trim().is_empty() {
        return Err(ConfigError::MalformedServiceAccount(
            "client_email is empty".into(),
        ));
    }
    if key.private_key.trim().is_empty() {
        return Err(ConfigError::MalformedServiceAccount(
            "private_key is empty".into(),
        ));
    }
    Ok(key)
}
