//! OAuth2 refresh-token strategy and the authorization-code exchange.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::cache::{CachedToken, TokenCache};
use super::credentials::{OAuth2Credentials, OAuthClientConfig};
use super::{AuthClient, AuthError};
use crate::config::DEFAULT_TOKEN_TIMEOUT;

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
pub struct GoogleTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl GoogleTokenResponse {
    /// Convert into a cache entry, rejecting responses without an access token.
    pub fn into_cached(self) -> Result<CachedToken, AuthError> {
        match self.access_token {
            Some(token) if !token.is_empty() => Ok(CachedToken::new(token, self.expires_in)),
            _ => Err(AuthError::EmptyToken(
                "token endpoint response has no access_token".into(),
            )),
        }
    }
}

/// POST a form to a token endpoint and parse the JSON response.
pub(crate) async fn post_token_form(
    http: &reqwest::Client,
    token_url: &str,
    timeout: Duration,
    params: &[(&str, &str)],
) -> Result<GoogleTokenResponse, AuthError> {
    let resp = http
        .post(token_url)
        .timeout(timeout)
        .form(params)
        .send()
        .await
        .map_err(|e| AuthError::Exchange(format!("token request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "token endpoint rejected request");
        return Err(AuthError::Exchange(format!("token endpoint HTTP {status}: {body}")));
    }

    resp.json::<GoogleTokenResponse>()
        .await
        .map_err(|e| AuthError::Exchange(format!("token response parse error: {e}")))
}

/// Auth client that trades a stored refresh token for access tokens.
pub struct OAuth2Client {
    creds: OAuth2Credentials,
    token_url: String,
    http: reqwest::Client,
    cache: TokenCache,
    timeout: Duration,
}

impl OAuth2Client {
    pub fn new(
        creds: OAuth2Credentials,
        token_url: &str,
        http: reqwest::Client,
        cache: TokenCache,
    ) -> Self {
        Self {
            creds,
            token_url: token_url.to_string(),
            http,
            cache,
            timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }

    /// Bound each refresh call to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn refresh(&self) -> Result<CachedToken, AuthError> {
        debug!(token_url = %self.token_url, "refreshing OAuth2 access token");
        post_token_form(
            &self.http,
            &self.token_url,
            self.timeout,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", self.creds.client_id.as_str()),
                ("client_secret", self.creds.client_secret.as_str()),
                ("refresh_token", self.creds.refresh_token.as_str()),
            ],
        )
        .await?
        .into_cached()
    }
}

#[async_trait]
impl AuthClient for OAuth2Client {
    async fn access_token(&self) -> Result<Option<String>, AuthError> {
        self.cache.get_or_refresh(|| self.refresh()).await.map(Some)
    }

    fn strategy(&self) -> &'static str {
        "oauth2"
    }
}

/// Exchange an authorization code from the consent screen for tokens.
pub async fn exchange_authorization_code(
    http: &reqwest::Client,
    token_url: &str,
    timeout: Duration,
    client: &OAuthClientConfig,
    code: &str,
) -> Result<GoogleTokenResponse, AuthError> {
    post_token_form(
        http,
        token_url,
        timeout,
        &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.as_str()),
            ("redirect_uri", client.redirect_uri.as_str()),
        ],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenCachePolicy;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, cache_enabled: bool) -> OAuth2Client {
        OAuth2Client::new(
            OAuth2Credentials {
                client_id: "client-id".into(),
                client_secret: "client-secret".into(),
                refresh_token: "refresh-1".into(),
                redirect_uri: None,
            },
            &format!("{}/token", server.uri()),
            reqwest::Client::new(),
            TokenCache::new(TokenCachePolicy {
                enabled: cache_enabled,
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn refresh_grant_is_sent_once_while_token_is_valid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.first",
                "expires_in": 3599,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oauth = client(&server, true);
        assert_eq!(oauth.access_token().await.unwrap().as_deref(), Some("ya29.first"));
        assert_eq!(oauth.access_token().await.unwrap().as_deref(), Some("ya29.first"));
    }

    #[tokio::test]
    async fn disabled_cache_refreshes_every_time() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.again",
                "expires_in": 3599
            })))
            .expect(2)
            .mount(&server)
            .await;

        let oauth = client(&server, false);
        oauth.access_token().await.unwrap();
        oauth.access_token().await.unwrap();
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let err = client(&server, true).access_token().await.unwrap_err();
        match err {
            AuthError::Exchange(msg) => {
                assert!(msg.contains("400"), "{msg}");
                assert!(msg.contains("invalid_grant"), "{msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn response_without_access_token_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let err = client(&server, true).access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::EmptyToken(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn stalled_token_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "late"}))
                    .set_delay(std::time::Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let oauth = client(&server, true).with_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = oauth.access_token().await.unwrap_err();
        assert!(matches!(err, AuthError::Exchange(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn authorization_code_exchange_posts_redirect_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=4%2Fabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.new",
                "refresh_token": "1//refresh",
                "expires_in": 3599,
                "scope": "https://www.googleapis.com/auth/adwords"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let oauth_client = OAuthClientConfig {
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
            redirect_uri: "http://localhost:3001/api/oauth/callback".into(),
        };
        let tokens = exchange_authorization_code(
            &reqwest::Client::new(),
            &format!("{}/token", server.uri()),
            DEFAULT_TOKEN_TIMEOUT,
            &oauth_client,
            "4/abc",
        )
        .await
        .unwrap();
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(tokens.expires_in, Some(3599));
    }
}
