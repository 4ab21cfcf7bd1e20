//! Google Ads API request forwarding.
//!
//! The gateway never interprets upstream payloads: whatever the Ads API
//! answers (including error statuses) is handed back as raw text.

pub mod forwarder;

pub use forwarder::AdsForwarder;

use thiserror::Error;

/// Page size used when a search request does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Failures that happen before an upstream response is available.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Invalid request header: {0}")]
    InvalidHeader(String),

    #[error("Upstream request failed: {0}")]
    Network(String),

    #[error("Failed to read upstream response: {0}")]
    Body(String),
}

/// A call the gateway knows how to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdsCall {
    /// `googleAds:search` for one customer.
    Search {
        customer_id: String,
        query: String,
        page_size: u32,
    },
    /// `customers:listAccessibleCustomers`.
    ListAccessibleCustomers,
}

impl AdsCall {
    /// The customer the call targets, if any.
    pub fn target_customer(&self) -> Option<&str> {
        match self {
            Self::Search { customer_id, .. } => Some(customer_id),
            Self::ListAccessibleCustomers => None,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::ListAccessibleCustomers => "list_accessible_customers",
        }
    }
}

/// Upstream answer, relayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Strip everything but ASCII digits (`123-456-7890` → `1234567890`).
pub fn normalize_customer_id(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_dashes_and_spaces() {
        assert_eq!(normalize_customer_id("123-456-7890"), "1234567890");
        assert_eq!(normalize_customer_id(" 12 34 "), "1234");
        assert_eq!(normalize_customer_id("abc"), "");
    }

    #[test]
    fn only_search_has_a_target() {
        let search = AdsCall::Search {
            customer_id: "1".into(),
            query: "SELECT campaign.id FROM campaign".into(),
            page_size: DEFAULT_PAGE_SIZE,
        };
        assert_eq!(search.target_customer(), Some("1"));
        assert_eq!(AdsCall::ListAccessibleCustomers.target_customer(), None);
    }
}
