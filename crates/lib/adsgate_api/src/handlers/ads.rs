//! Google Ads proxy handlers.
//!
//! Each request resolves a fresh access token, forwards to the Ads API and
//! relays the upstream status, content-type and body unchanged.

use adsgate_core::ads::{AdsCall, DEFAULT_PAGE_SIZE, UpstreamResponse, normalize_customer_id};
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::http::{HeaderValue, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::{AppError, AppResult, timestamp};

const SEARCH_FAILED: &str = "Failed to execute Google Ads query";
const CUSTOMERS_FAILED: &str = "Failed to list accessible customers";

/// Customer ids arrive as strings from the dashboard but plain numbers are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CustomerIdParam {
    Text(String),
    Number(u64),
}

impl CustomerIdParam {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// `POST /api/ads/search` body.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub gaql: Option<String>,
    #[serde(default)]
    pub customer_id: Option<CustomerIdParam>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl SearchRequest {
    /// Parse a request body; an empty body counts as `{}`.
    pub fn parse(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::validation("Invalid request body", e.to_string()))
    }

    /// Validate and build the upstream call.
    pub fn into_call(self, login_customer_id: &str) -> AppResult<AdsCall> {
        let query = self
            .gaql
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| {
                AppError::validation(
                    "Missing required parameter: gaql",
                    "Request body must include a non-empty 'gaql' query string",
                )
            })?;

        let customer_id = match self.customer_id.map(CustomerIdParam::into_string) {
            Some(raw) if !raw.trim().is_empty() => normalize_customer_id(&raw),
            _ => login_customer_id.to_string(),
        };
        if customer_id.is_empty() {
            return Err(AppError::validation(
                "Missing required parameter: customerId",
                "Provide a numeric 'customerId' or configure LOGIN_CUSTOMER_ID",
            ));
        }

        Ok(AdsCall::Search {
            customer_id,
            query,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }
}

/// Turn an upstream answer into a response with the same status, type and body bytes.
///
/// `Content-Type` is only set when upstream sent one.
fn relay(upstream: UpstreamResponse) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok());

    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

/// Resolve a token and forward `call`.
async fn proxy(state: &AppState, call: AdsCall, failure: &'static str) -> AppResult<Response> {
    let token = state.tokens.get_access_token().await.map_err(|e| {
        error!(call = call.name(), error = %e, "access token resolution failed");
        AppError::from_auth(failure, e)
    })?;

    let upstream = state.forwarder.forward(&call, &token).await.map_err(|e| {
        error!(call = call.name(), error = %e, "Ads API call failed");
        AppError::from_forward(failure, e)
    })?;

    if upstream.status >= 400 {
        warn!(call = call.name(), status = upstream.status, "Ads API returned an error");
    }
    Ok(relay(upstream))
}

/// `POST /api/ads/search`: run a GAQL query for a customer.
pub async fn search_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> AppResult<Response> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(rejection.body_text())
        } else {
            AppError::validation("Invalid request body", rejection.body_text())
        }
    })?;

    let call = SearchRequest::parse(&body)?.into_call(state.forwarder.login_customer_id())?;
    if let AdsCall::Search {
        customer_id,
        page_size,
        ..
    } = &call
    {
        info!(%customer_id, page_size, "search request");
    }
    proxy(&state, call, SEARCH_FAILED).await
}

/// `GET /api/ads/customers`: list customers reachable with the current credentials.
pub async fn customers_handler(State(state): State<AppState>) -> AppResult<Response> {
    proxy(&state, AdsCall::ListAccessibleCustomers, CUSTOMERS_FAILED).await
}

/// Auth smoke-test payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAuthResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_received: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

/// `GET /api/ads/test-auth`: resolve a token without calling the Ads API.
pub async fn test_auth_handler(State(state): State<AppState>) -> Response {
    match state.tokens.get_access_token().await {
        Ok(_) => {
            info!("auth test succeeded");
            Json(TestAuthResponse {
                authenticated: true,
                token_received: Some(true),
                error: None,
                timestamp: timestamp(),
            })
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "auth test failed");
            (
                StatusCode::UNAUTHORIZED,
                Json(TestAuthResponse {
                    authenticated: false,
                    token_received: None,
                    error: Some(e.to_string()),
                    timestamp: timestamp(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = "1112223333";

    #[test]
    fn empty_body_means_missing_gaql() {
        let err = SearchRequest::parse(b"  ")
            .unwrap()
            .into_call(LOGIN)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn blank_gaql_is_rejected() {
        let req = SearchRequest::parse(br#"{"gaql":"   ","customerId":"1"}"#).unwrap();
        assert!(matches!(req.into_call(LOGIN), Err(AppError::Validation { .. })));
    }

    #[test]
    fn customer_id_defaults_to_login() {
        let call = SearchRequest::parse(br#"{"gaql":"SELECT campaign.id FROM campaign"}"#)
            .unwrap()
            .into_call(LOGIN)
            .unwrap();
        assert_eq!(call.target_customer(), Some(LOGIN));
    }

    #[test]
    fn customer_id_is_normalized_and_numbers_accepted() {
        let call = SearchRequest::parse(
            br#"{"gaql":"SELECT campaign.id FROM campaign","customerId":"123-456-7890","pageSize":50}"#,
        )
        .unwrap()
        .into_call(LOGIN)
        .unwrap();
        assert_eq!(
            call,
            AdsCall::Search {
                customer_id: "1234567890".into(),
                query: "SELECT campaign.id FROM campaign".into(),
                page_size: 50,
            }
        );

        let call = SearchRequest::parse(br#"{"gaql":"SELECT x FROM y","customerId":42}"#)
            .unwrap()
            .into_call(LOGIN)
            .unwrap();
        assert_eq!(call.target_customer(), Some("42"));
    }

    #[test]
    fn non_numeric_customer_id_is_rejected() {
        let req = SearchRequest::parse(br#"{"gaql":"SELECT x FROM y","customerId":"abc"}"#)
            .unwrap();
        match req.into_call(LOGIN) {
            Err(AppError::Validation { error, .. }) => assert!(error.contains("customerId")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        assert!(matches!(
            SearchRequest::parse(b"{nope"),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn relay_keeps_status_type_and_body() {
        let resp = relay(UpstreamResponse {
            status: 429,
            content_type: Some("application/json; charset=UTF-8".into()),
            body: r#"{"error":{"code":"RATE_LIMIT_EXCEEDED"}}"#.into(),
        });
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json; charset=UTF-8");
    }

    #[tokio::test]
    async fn relay_passes_raw_bytes_and_missing_type() {
        let raw = b"caf\xE9 \xff\xfe".to_vec();
        let resp = relay(UpstreamResponse {
            status: 200,
            content_type: None,
            body: raw.clone(),
        });
        assert!(resp.headers().get(CONTENT_TYPE).is_none());
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], &raw[..]);
    }
}
