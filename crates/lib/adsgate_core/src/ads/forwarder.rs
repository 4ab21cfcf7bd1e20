//! Builds authenticated Ads API requests and executes them.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use super::{AdsCall, ForwardError, UpstreamResponse, normalize_customer_id};
use crate::config::AdsApiConfig;

const DEVELOPER_TOKEN: HeaderName = HeaderName::from_static("developer-token");
const LOGIN_CUSTOMER_ID: HeaderName = HeaderName::from_static("login-customer-id");

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    query: &'a str,
    page_size: u32,
}

/// Forwards calls to the Google Ads REST API.
pub struct AdsForwarder {
    http: reqwest::Client,
    config: AdsApiConfig,
}

impl AdsForwarder {
    pub fn new(config: AdsApiConfig, http: reqwest::Client) -> Self {
        Self { http, config }
    }

    /// Digits-only login customer id.
    pub fn login_customer_id(&self) -> &str {
        &self.config.login_customer_id
    }

    /// Upstream URL and method for a call.
    pub fn endpoint(&self, call: &AdsCall) -> (Method, String) {
        let base = format!("{}/{}", self.config.base_url, self.config.api_version);
        match call {
            AdsCall::Search { customer_id, .. } => (
                Method::POST,
                format!("{base}/customers/{customer_id}/googleAds:search"),
            ),
            AdsCall::ListAccessibleCustomers => {
                (Method::GET, format!("{base}/customers:listAccessibleCustomers"))
            }
        }
    }

    /// Headers for a call. `login-customer-id` is only sent when acting on
    /// a customer other than the login account itself.
    pub fn headers(&self, call: &AdsCall, token: &str) -> Result<HeaderMap, ForwardError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        headers.insert(DEVELOPER_TOKEN, header_value(&self.config.developer_token)?);

        if let Some(target) = call.target_customer()
            && normalize_customer_id(target) != self.config.login_customer_id
        {
            headers.insert(LOGIN_CUSTOMER_ID, header_value(&self.config.login_customer_id)?);
        }

        if matches!(call, AdsCall::Search { .. }) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        Ok(headers)
    }

    fn body(call: &AdsCall) -> Result<Option<Vec<u8>>, ForwardError> {
        match call {
            AdsCall::Search {
                query, page_size, ..
            } => serde_json::to_vec(&SearchBody {
                query,
                page_size: *page_size,
            })
            .map(Some)
            .map_err(|e| ForwardError::Body(e.to_string())),
            AdsCall::ListAccessibleCustomers => Ok(None),
        }
    }

    /// Execute a call and return the upstream status, content-type and raw body.
    ///
    /// Any received response is returned as-is, whatever its status. With a
    /// retry policy configured, 429/5xx answers and network errors are retried
    /// with exponential backoff first.
    pub async fn forward(
        &self,
        call: &AdsCall,
        token: &str,
    ) -> Result<UpstreamResponse, ForwardError> {
        let (method, url) = self.endpoint(call);
        let headers = self.headers(call, token)?;
        let body = Self::body(call)?;
        let retry = self.config.retry;

        let mut attempt = 0;
        loop {
            info!(call = call.name(), %method, %url, attempt, "forwarding Ads API request");

            let mut request = self
                .http
                .request(method.clone(), &url)
                .headers(headers.clone());
            if let Some(body) = &body {
                request = request.body(body.clone());
            }
            if let Some(timeout) = self.config.timeout {
                request = request.timeout(timeout);
            }

            let outcome = request.send().await;
            let retryable = match &outcome {
                Ok(resp) => is_retryable(resp.status()),
                Err(_) => true,
            };
            if retryable && attempt < retry.max_retries {
                let backoff = retry.base_backoff * 2u32.saturating_pow(attempt);
                match &outcome {
                    Ok(resp) => warn!(
                        status = resp.status().as_u16(),
                        ?backoff,
                        "Ads API call failed, retrying"
                    ),
                    Err(e) => warn!(error = %e, ?backoff, "Ads API call failed, retrying"),
                }
                attempt += 1;
                sleep(backoff).await;
                continue;
            }

            let resp = outcome.map_err(|e| ForwardError::Network(e.to_string()))?;
            let status = resp.status().as_u16();
            let content_type = resp
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp
                .bytes()
                .await
                .map_err(|e| ForwardError::Body(e.to_string()))?
                .to_vec();

            info!(call = call.name(), status, bytes = body.len(), "Ads API responded");
            return Ok(UpstreamResponse {
                status,
                content_type,
                body,
            });
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn header_value(value: &str) -> Result<HeaderValue, ForwardError> {
    HeaderValue::from_str(value).map_err(|e| ForwardError::InvalidHeader(e.to_string()))
}
