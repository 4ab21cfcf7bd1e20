//! Request handlers.

pub mod ads;
pub mod health;
pub mod oauth;

use axum::http::{Method, Uri};

use crate::error::AppError;

/// Fallback for unmatched routes and methods.
pub async fn not_found(method: Method, uri: Uri) -> AppError {
    AppError::NotFound(format!("Route {method} {uri} not found"))
}
