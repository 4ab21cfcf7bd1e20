//! OAuth consent-screen callback.
//!
//! When an OAuth client and redirect URI are configured the authorization code
//! is exchanged for tokens so the refresh token can be copied into
//! `GOOGLE_REFRESH_TOKEN`. Otherwise receipt is only acknowledged.

use adsgate_core::auth::oauth2::exchange_authorization_code;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;
use crate::error::timestamp;

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Callback result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCallbackResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub timestamp: String,
}

impl OAuthCallbackResponse {
    fn ok(message: &str, state: Option<String>) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            error: None,
            refresh_token: None,
            expires_in: None,
            scope: None,
            state,
            timestamp: timestamp(),
        }
    }

    fn failed(error: String, state: Option<String>) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(Self {
                success: false,
                message: None,
                error: Some(error),
                refresh_token: None,
                expires_in: None,
                scope: None,
                state,
                timestamp: timestamp(),
            }),
        )
            .into_response()
    }
}

/// `GET /api/oauth/callback`
pub async fn oauth_callback_handler(
    State(app): State<AppState>,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        warn!(%error, "OAuth consent was not granted");
        let error = match params.error_description {
            Some(desc) => format!("{error}: {desc}"),
            None => error,
        };
        return OAuthCallbackResponse::failed(error, params.state);
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return OAuthCallbackResponse::failed(
            "Missing authorization code".to_string(),
            params.state,
        );
    };

    let Some(client) = app.config.auth.oauth_client.as_ref() else {
        info!("OAuth callback received without exchange configuration");
        return Json(OAuthCallbackResponse::ok(
            "Authorization code received",
            params.state,
        ))
        .into_response();
    };

    let auth = &app.config.auth;
    match exchange_authorization_code(&app.http, &auth.token_url, auth.timeout, client, &code).await
    {
        Ok(tokens) => {
            info!(
                refresh_token_received = tokens.refresh_token.is_some(),
                "authorization code exchanged"
            );
            let mut body = OAuthCallbackResponse::ok(
                "Authorization successful. Store the refresh token as GOOGLE_REFRESH_TOKEN.",
                params.state,
            );
            body.refresh_token = tokens.refresh_token;
            body.expires_in = tokens.expires_in;
            body.scope = tokens.scope;
            Json(body).into_response()
        }
        Err(e) => {
            warn!(error = %e, "authorization code exchange failed");
            OAuthCallbackResponse::failed(e.to_string(), params.state)
        }
    }
}
