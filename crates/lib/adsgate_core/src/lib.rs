//! # adsgate_core
//!
//! Credential resolution, token refresh and request forwarding for the
//! Google Ads API gateway.

pub mod ads;
pub mod auth;
pub mod config;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
