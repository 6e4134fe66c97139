//! Status Service Client
//!
//! HTTP abstraction over the remote service's public account endpoints:
//! - account page (`/user/{id}/about.json`) for state and scores
//! - the account's own submission and comment listings
//! - direct lookup of a single submission by its reference
//!
//! The trait exists so the poller and shadow probe can be exercised with
//! scripted responses.

use crate::core::tracker::types::TransportError;
use serde_json::Value;
use std::collections::HashMap;

#[cfg(feature = "live-http")]
use crate::core::tracker::http::{classify_isahc_error, collect_headers};
#[cfg(feature = "live-http")]
use crate::core::tracker::types::{TrackerError, TransportErrorKind};
#[cfg(feature = "live-http")]
use isahc::config::{Configurable, RedirectPolicy};
#[cfg(feature = "live-http")]
use isahc::{AsyncReadResponseExt, HttpClient, Request};
#[cfg(feature = "live-http")]
use std::time::Duration;

/// Raw account page response
#[derive(Debug, Clone, Default)]
pub struct PageResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
    /// Lowercased header names
    pub headers: HashMap<String, String>,
}

impl PageResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }
}

/// Which of the account's own listings to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingKind {
    Submitted,
    Comments,
}

impl ListingKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            ListingKind::Submitted => "submitted",
            ListingKind::Comments => "comments",
        }
    }
}

/// One entry of an account listing
#[derive(Debug, Clone, PartialEq)]
pub struct ListingItem {
    pub id: String,
    pub created_utc: f64,
}

/// Scores and creation time from a 200 account page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountMetrics {
    pub total_score: i64,
    pub comment_score: i64,
    pub link_score: i64,
    pub created_at: f64,
}

#[async_trait::async_trait]
pub trait StatusClient: Send + Sync {
    /// Fetch the public account page
    async fn get_account_page(&self, account_id: &str) -> Result<PageResponse, TransportError>;

    /// Fetch the account's own listing, newest first
    async fn get_listing(
        &self,
        account_id: &str,
        kind: ListingKind,
    ) -> Result<Vec<ListingItem>, TransportError>;

    /// Direct lookup of one submission; returns the effective HTTP status
    async fn get_submission_by_ref(&self, reference: &str) -> Result<u16, TransportError>;
}

/// Parse the `data` object of an account page; missing numbers read as 0
pub fn parse_account_page(body: &[u8]) -> AccountMetrics {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return AccountMetrics::default(),
    };
    let data = value.get("data").unwrap_or(&Value::Null);

    let int = |key: &str| -> i64 {
        data.get(key)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(0)
    };

    AccountMetrics {
        total_score: int("total_karma"),
        comment_score: int("comment_karma"),
        link_score: int("link_karma"),
        created_at: data.get("created_utc").and_then(Value::as_f64).unwrap_or(0.0),
    }
}

/// Parse a listing document: `{"data": {"children": [{"data": {...}}]}}`
pub fn parse_listing(body: &[u8]) -> Vec<ListingItem> {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };

    value
        .pointer("/data/children")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| {
                    let data = child.get("data")?;
                    let id = data.get("id")?.as_str()?.to_string();
                    let created_utc = data.get("created_utc").and_then(Value::as_f64).unwrap_or(0.0);
                    Some(ListingItem { id, created_utc })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Production status client using isahc
#[cfg(feature = "live-http")]
pub struct IsahcStatusClient {
    client: HttpClient,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

#[cfg(feature = "live-http")]
impl IsahcStatusClient {
    pub fn new(base_url: &str, user_agent: &str, timeout_ms: u64) -> Result<Self, TrackerError> {
        let client = HttpClient::builder()
            .redirect_policy(RedirectPolicy::None)
            .build()
            .map_err(|e| TrackerError::HttpError(format!("Failed to create status client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            timeout: Duration::from_millis(timeout_ms),
        })
    }

    async fn get(&self, url: String) -> Result<PageResponse, TransportError> {
        let request = Request::get(&url)
            .timeout(self.timeout)
            .header("User-Agent", self.user_agent.as_str())
            .header("Accept", "application/json")
            .body(Vec::new())
            .map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Other,
                    format!("Request creation failed: {}", e),
                )
            })?;

        let mut response = self
            .client
            .send_async(request)
            .await
            .map_err(|e| classify_isahc_error(&e))?;

        let status_code = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(|e| {
            TransportError::new(
                TransportErrorKind::Connect,
                format!("Failed to read response body: {}", e),
            )
        })?;

        Ok(PageResponse {
            status_code,
            body,
            headers,
        })
    }
}

#[cfg(feature = "live-http")]
#[async_trait::async_trait]
impl StatusClient for IsahcStatusClient {
    async fn get_account_page(&self, account_id: &str) -> Result<PageResponse, TransportError> {
        self.get(format!("{}/user/{}/about.json", self.base_url, account_id))
            .await
    }

    async fn get_listing(
        &self,
        account_id: &str,
        kind: ListingKind,
    ) -> Result<Vec<ListingItem>, TransportError> {
        let response = self
            .get(format!(
                "{}/user/{}/{}.json?limit=25&sort=new",
                self.base_url,
                account_id,
                kind.path_segment()
            ))
            .await?;
        if response.status_code != 200 {
            return Err(TransportError::new(
                TransportErrorKind::Other,
                format!("Listing returned HTTP {}", response.status_code),
            ));
        }
        Ok(parse_listing(&response.body))
    }

    async fn get_submission_by_ref(&self, reference: &str) -> Result<u16, TransportError> {
        let fullname = if reference.starts_with("t3_") {
            reference.to_string()
        } else {
            format!("t3_{}", reference)
        };
        let response = self
            .get(format!("{}/api/info.json?id={}", self.base_url, fullname))
            .await?;

        // info.json answers 200 with no children for content hidden from the public
        if response.status_code == 200 && parse_listing(&response.body).is_empty() {
            return Ok(404);
        }
        Ok(response.status_code)
    }
}
