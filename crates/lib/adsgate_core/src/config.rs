//! Gateway configuration read from environment variables.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::ads::normalize_customer_id;
use crate::auth::credentials::{
    CredentialConfig, OAuthClientConfig, resolve_credentials, resolve_oauth_client,
};

/// Default Google Ads API host.
pub const DEFAULT_ADS_API_BASE_URL: &str = "https://googleads.googleapis.com";

/// Default Google Ads API version path segment.
pub const DEFAULT_ADS_API_VERSION: &str = "v17";

/// Default Google OAuth token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Default CORS origin (the dashboard dev server).
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

/// Default timeout for token endpoint calls.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3001;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error(
        "No Google Ads credentials configured: set SERVICE_ACCOUNT_JSON or \
         GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REFRESH_TOKEN"
    )]
    NoCredentials,

    #[error("Malformed SERVICE_ACCOUNT_JSON: {0}")]
    MalformedServiceAccount(String),
}

/// Upstream Google Ads API settings used by the forwarder.
#[derive(Clone, Debug)]
pub struct AdsApiConfig {
    /// Base URL without trailing slash (e.g. `https://googleads.googleapis.com`).
    pub base_url: String,
    /// API version path segment (e.g. `v17`).
    pub api_version: String,
    /// Developer token sent on every call.
    pub developer_token: String,
    /// Login customer id, digits only.
    pub login_customer_id: String,
    /// Optional per-request timeout. `None` keeps the HTTP client default.
    pub timeout: Option<Duration>,
    /// Retry policy for rate-limited and transient failures.
    pub retry: RetryPolicy,
}

/// Retry behaviour for upstream calls. The default performs no retries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::from_millis(500),
        }
    }
}

/// How access tokens are cached inside the auth client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenCachePolicy {
    /// When false, every token request performs a credential exchange.
    pub enabled: bool,
    /// A cached token is refreshed once it is this close to expiry.
    pub refresh_margin: Duration,
}

impl Default for TokenCachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_margin: Duration::from_secs(300),
        }
    }
}

/// Settings for the token endpoint and caching.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub credentials: CredentialConfig,
    /// Token endpoint used by the OAuth2 strategy and the code exchange.
    /// The service-account strategy prefers the key's own `token_uri`.
    pub token_url: String,
    pub cache: TokenCachePolicy,
    /// Timeout for each token endpoint call. Refreshes hold the cache lock,
    /// so this bounds how long concurrent requests can wait on one exchange.
    pub timeout: Duration,
    /// Settings for the authorization-code exchange on the callback route.
    pub oauth_client: Option<OAuthClientConfig>,
}

/// Fixed-window rate limit applied per client IP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Configuration for the whole gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub ads: AdsApiConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    /// Single allowed CORS origin.
    pub frontend_url: String,
    pub port: u16,
    /// Environment label reported by the health endpoint.
    pub environment: String,
    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl GatewayConfig {
    /// Reads configuration from the process environment.
    ///
    /// | Variable                    | Default                                |
    /// |-----------------------------|----------------------------------------|
    /// | `GADS_DEVELOPER_TOKEN`      | required                               |
    /// | `LOGIN_CUSTOMER_ID`         | required                               |
    /// | `SERVICE_ACCOUNT_JSON`      | credential strategy A                  |
    /// | `GOOGLE_CLIENT_ID` etc.     | credential strategy B                  |
    /// | `FRONTEND_URL`              | `http://localhost:3000`                |
    /// | `PORT`                      | `3001`                                 |
    /// | `NODE_ENV`                  | `development`                          |
    /// | `GADS_API_BASE_URL`         | `https://googleads.googleapis.com`     |
    /// | `GADS_API_VERSION`          | `v17`                                  |
    /// | `GOOGLE_TOKEN_URL`          | `https://oauth2.googleapis.com/token`  |
    /// | `RATE_LIMIT_MAX_REQUESTS`   | `100`                                  |
    /// | `RATE_LIMIT_WINDOW_SECS`    | `900`                                  |
    /// | `MAX_BODY_BYTES`            | `10485760`                             |
    /// | `UPSTREAM_TIMEOUT_SECS`     | unset                                  |
    /// | `UPSTREAM_MAX_RETRIES`      | `0`                                    |
    /// | `UPSTREAM_RETRY_BACKOFF_MS` | `500`                                  |
    /// | `TOKEN_CACHE`               | `true`                                 |
    /// | `TOKEN_REFRESH_MARGIN_SECS` | `300`                                  |
    /// | `TOKEN_TIMEOUT_SECS`        | `UPSTREAM_TIMEOUT_SECS`, else `30`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let developer_token =
            get("GADS_DEVELOPER_TOKEN").ok_or(ConfigError::Missing("GADS_DEVELOPER_TOKEN"))?;
        let raw_login = get("LOGIN_CUSTOMER_ID").ok_or(ConfigError::Missing("LOGIN_CUSTOMER_ID"))?;
        let login_customer_id = normalize_customer_id(&raw_login);
        if login_customer_id.is_empty() {
            return Err(ConfigError::Invalid {
                var: "LOGIN_CUSTOMER_ID",
                reason: "must contain digits".into(),
            });
        }

        let credentials = resolve_credentials(&get)?;

        let base_url = get("GADS_API_BASE_URL").unwrap_or_else(|| DEFAULT_ADS_API_BASE_URL.into());
        url::Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            var: "GADS_API_BASE_URL",
            reason: e.to_string(),
        })?;

        let token_url = get("GOOGLE_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into());
        url::Url::parse(&token_url).map_err(|e| ConfigError::Invalid {
            var: "GOOGLE_TOKEN_URL",
            reason: e.to_string(),
        })?;

        let timeout = parse_opt::<u64>(&get, "UPSTREAM_TIMEOUT_SECS")?.map(Duration::from_secs);
        let retry = RetryPolicy {
            max_retries: parse_opt(&get, "UPSTREAM_MAX_RETRIES")?.unwrap_or(0),
            base_backoff: Duration::from_millis(
                parse_opt(&get, "UPSTREAM_RETRY_BACKOFF_MS")?.unwrap_or(500),
            ),
        };
        let token_timeout = parse_opt::<u64>(&get, "TOKEN_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .or(timeout)
            .unwrap_or(DEFAULT_TOKEN_TIMEOUT);
        let cache = TokenCachePolicy {
            enabled: parse_opt(&get, "TOKEN_CACHE")?.unwrap_or(true),
            refresh_margin: Duration::from_secs(
                parse_opt(&get, "TOKEN_REFRESH_MARGIN_SECS")?.unwrap_or(300),
            ),
        };

        let max_requests: u32 = parse_opt(&get, "RATE_LIMIT_MAX_REQUESTS")?.unwrap_or(100);
        if max_requests == 0 {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_MAX_REQUESTS",
                reason: "must be greater than zero".into(),
            });
        }
        let window_secs: u64 = parse_opt(&get, "RATE_LIMIT_WINDOW_SECS")?.unwrap_or(900);
        if window_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "RATE_LIMIT_WINDOW_SECS",
                reason: "must be greater than zero".into(),
            });
        }

        let frontend_url = get("FRONTEND_URL").unwrap_or_else(|| {
            warn!("FRONTEND_URL not set, allowing {DEFAULT_FRONTEND_URL}");
            DEFAULT_FRONTEND_URL.into()
        });
        url::Url::parse(&frontend_url).map_err(|e| ConfigError::Invalid {
            var: "FRONTEND_URL",
            reason: e.to_string(),
        })?;

        Ok(Self {
            ads: AdsApiConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_version: get("GADS_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_ADS_API_VERSION.into()),
                developer_token,
                login_customer_id,
                timeout,
                retry,
            },
            auth: AuthConfig {
                credentials,
                token_url,
                cache,
                timeout: token_timeout,
                oauth_client: resolve_oauth_client(&get),
            },
            rate_limit: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
            port: parse_opt(&get, "PORT")?.unwrap_or(DEFAULT_PORT),
            environment: get("NODE_ENV").unwrap_or_else(|| "development".into()),
            max_body_bytes: parse_opt(&get, "MAX_BODY_BYTES")?.unwrap_or(10 * 1024 * 1024),
        })
    }
}

/// Parse an optional variable, failing on values that do not parse.
fn parse_opt<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get(var)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                var,
                reason: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const OAUTH_ENV: &[(&str, &str)] = &[
        ("GADS_DEVELOPER_TOKEN", "dev-token"),
        ("LOGIN_CUSTOMER_ID", "123-456-7890"),
        ("GOOGLE_CLIENT_ID", "client"),
        ("GOOGLE_CLIENT_SECRET", "secret"),
        ("GOOGLE_REFRESH_TOKEN", "refresh"),
    ];

    #[test]
    fn defaults_apply() {
        let cfg = GatewayConfig::from_lookup(lookup(OAUTH_ENV)).unwrap();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.frontend_url, DEFAULT_FRONTEND_URL);
        assert_eq!(cfg.environment, "development");
        assert_eq!(cfg.ads.login_customer_id, "1234567890");
        assert_eq!(cfg.ads.base_url, DEFAULT_ADS_API_BASE_URL);
        assert_eq!(cfg.ads.retry, RetryPolicy::default());
        assert_eq!(cfg.ads.timeout, None);
        assert_eq!(cfg.auth.cache, TokenCachePolicy::default());
        assert_eq!(cfg.auth.timeout, DEFAULT_TOKEN_TIMEOUT);
        assert_eq!(cfg.rate_limit, RateLimitConfig::default());
        assert_eq!(cfg.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn missing_developer_token_is_fatal() {
        let env: Vec<_> = OAUTH_ENV
            .iter()
            .copied()
            .filter(|(k, _)| *k != "GADS_DEVELOPER_TOKEN")
            .collect();
        let err = GatewayConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GADS_DEVELOPER_TOKEN")));
    }

    #[test]
    fn blank_login_customer_id_counts_as_missing() {
        let mut env: Vec<_> = OAUTH_ENV.to_vec();
        env.retain(|(k, _)| *k != "LOGIN_CUSTOMER_ID");
        env.push(("LOGIN_CUSTOMER_ID", "   "));
        let err = GatewayConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LOGIN_CUSTOMER_ID")));
    }

    #[test]
    fn no_credentials_is_fatal() {
        let env = [
            ("GADS_DEVELOPER_TOKEN", "dev-token"),
            ("LOGIN_CUSTOMER_ID", "1234567890"),
            ("GOOGLE_CLIENT_ID", "client"),
        ];
        let err = GatewayConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut env = OAUTH_ENV.to_vec();
        env.push(("PORT", "not-a-port"));
        let err = GatewayConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let mut env = OAUTH_ENV.to_vec();
        env.push(("RATE_LIMIT_MAX_REQUESTS", "0"));
        let err = GatewayConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "RATE_LIMIT_MAX_REQUESTS",
                ..
            }
        ));
    }

    #[test]
    fn overrides_are_read() {
        let mut env = OAUTH_ENV.to_vec();
        env.extend([
            ("GADS_API_BASE_URL", "http://127.0.0.1:9999/"),
            ("UPSTREAM_MAX_RETRIES", "2"),
            ("UPSTREAM_TIMEOUT_SECS", "15"),
            ("TOKEN_CACHE", "false"),
            ("FRONTEND_URL", "https://dash.example.com/"),
            ("NODE_ENV", "production"),
        ]);
        let cfg = GatewayConfig::from_lookup(lookup(&env)).unwrap();
        assert_eq!(cfg.ads.base_url, "http://127.0.0.1:9999");
        assert_eq!(cfg.ads.retry.max_retries, 2);
        assert_eq!(cfg.ads.timeout, Some(Duration::from_secs(15)));
        assert_eq!(cfg.auth.timeout, Duration::from_secs(15));
        assert!(!cfg.auth.cache.enabled);
        assert_eq!(cfg.frontend_url, "https://dash.example.com");
        assert_eq!(cfg.environment, "production");
    }

    #[test]
    fn token_timeout_has_its_own_override() {
        let mut env = OAUTH_ENV.to_vec();
        env.extend([("UPSTREAM_TIMEOUT_SECS", "15"), ("TOKEN_TIMEOUT_SECS", "5")]);
        let cfg = GatewayConfig::from_lookup(lookup(&env)).unwrap();
        assert_eq!(cfg.auth.timeout, Duration::from_secs(5));
    }
}
