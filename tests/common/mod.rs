//! Common test utilities: scripted clients, fixtures and env isolation

use acctwatch::core::tracker::proxy_config::ProxyConfig;
use acctwatch::core::tracker::proxy_health::ProxyProbeClient;
use acctwatch::core::tracker::status_client::{ListingItem, ListingKind, PageResponse, StatusClient};
use acctwatch::core::tracker::types::{Profile, TransportError, TransportErrorKind};
use std::collections::{HashMap, VecDeque};
use std::env;
use std::sync::Mutex;
use tempfile::TempDir;

/// Test helper to create a temporary directory for test files
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

const ISOLATED_VARS: &[&str] = &[
    "ACCTWATCH_DEBUG",
    "ACCTWATCH_DEBUG_LOG",
    "ACCTWATCH_STATE_PATH",
    "ACCTWATCH_PROFILES_PATH",
    "ACCTWATCH_WEBHOOK_URL",
];

/// Clears the tracker's env vars and restores them on drop
pub struct IsolatedEnv {
    original: Vec<(&'static str, Option<String>)>,
}

impl IsolatedEnv {
    pub fn new() -> Self {
        let original = ISOLATED_VARS
            .iter()
            .map(|name| (*name, env::var(name).ok()))
            .collect();
        for name in ISOLATED_VARS {
            env::remove_var(name);
        }
        Self { original }
    }

    pub fn set(&self, name: &str, value: &str) {
        env::set_var(name, value);
    }
}

impl Drop for IsolatedEnv {
    fn drop(&mut self) {
        for (name, value) in &self.original {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
    }
}

pub fn profile(id: &str, name: &str, proxy: &str) -> Profile {
    Profile {
        id: id.to_string(),
        display_name: name.to_string(),
        owner_label: "owner-a".to_string(),
        free_text_notes: String::new(),
        proxy_connection_string: proxy.to_string(),
        created_at: "2026-01-01".to_string(),
        updated_at: "2026-01-02".to_string(),
    }
}

pub fn page(status_code: u16) -> PageResponse {
    PageResponse {
        status_code,
        ..Default::default()
    }
}

pub fn active_page(total: i64, created_utc: f64) -> PageResponse {
    let body = format!(
        r#"{{"data":{{"total_karma":{},"comment_karma":{},"link_karma":{},"created_utc":{}}}}}"#,
        total,
        total - 10,
        10,
        created_utc
    );
    PageResponse {
        status_code: 200,
        body: body.into_bytes(),
        headers: HashMap::new(),
    }
}

pub fn rate_limited_page(retry_after: Option<&str>) -> PageResponse {
    let mut headers = HashMap::new();
    if let Some(value) = retry_after {
        headers.insert("retry-after".to_string(), value.to_string());
    }
    PageResponse {
        status_code: 429,
        body: Vec::new(),
        headers,
    }
}

pub fn timeout_error() -> TransportError {
    TransportError::new(TransportErrorKind::Timeout, "operation timed out")
}

pub fn listing_item(id: &str, created_utc: f64) -> ListingItem {
    ListingItem {
        id: id.to_string(),
        created_utc,
    }
}

/// Status client answering from per-account scripts
///
/// Page responses are consumed in order; the last one repeats.
#[derive(Default)]
pub struct ScriptedStatusClient {
    pages: Mutex<HashMap<String, VecDeque<Result<PageResponse, TransportError>>>>,
    page_calls: Mutex<HashMap<String, u32>>,
    listings: HashMap<(String, ListingKind), Result<Vec<ListingItem>, TransportError>>,
    lookups: HashMap<String, Result<u16, TransportError>>,
    lookup_calls: Mutex<u32>,
}

impl ScriptedStatusClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, account: &str, response: Result<PageResponse, TransportError>) {
        self.pages
            .lock()
            .unwrap()
            .entry(account.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn set_listing(
        &mut self,
        account: &str,
        kind: ListingKind,
        items: Result<Vec<ListingItem>, TransportError>,
    ) {
        self.listings.insert((account.to_string(), kind), items);
    }

    pub fn set_lookup(&mut self, reference: &str, result: Result<u16, TransportError>) {
        self.lookups.insert(reference.to_string(), result);
    }

    pub fn page_calls(&self, account: &str) -> u32 {
        self.page_calls
            .lock()
            .unwrap()
            .get(account)
            .copied()
            .unwrap_or(0)
    }

    pub fn lookup_calls(&self) -> u32 {
        *self.lookup_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl StatusClient for ScriptedStatusClient {
    async fn get_account_page(&self, account_id: &str) -> Result<PageResponse, TransportError> {
        *self
            .page_calls
            .lock()
            .unwrap()
            .entry(account_id.to_string())
            .or_default() += 1;

        let mut pages = self.pages.lock().unwrap();
        let Some(script) = pages.get_mut(account_id) else {
            return Err(TransportError::new(TransportErrorKind::Other, "account not scripted"));
        };
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::new(TransportErrorKind::Other, "empty script")))
        }
    }

    async fn get_listing(
        &self,
        account_id: &str,
        kind: ListingKind,
    ) -> Result<Vec<ListingItem>, TransportError> {
        self.listings
            .get(&(account_id.to_string(), kind))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn get_submission_by_ref(&self, reference: &str) -> Result<u16, TransportError> {
        *self.lookup_calls.lock().unwrap() += 1;
        self.lookups
            .get(reference)
            .cloned()
            .unwrap_or(Ok(200))
    }
}

/// Proxy probe client answering per proxy host, with a call counter
#[derive(Default)]
pub struct ScriptedProxyClient {
    responses: HashMap<String, VecDeque<Result<u16, TransportError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProxyClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses for a host, consumed in order; the last one repeats
    pub fn script(&mut self, host: &str, responses: Vec<Result<u16, TransportError>>) {
        self.responses.insert(host.to_string(), responses.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProxyProbeClient for ScriptedProxyClient {
    async fn get_via_proxy(
        &self,
        proxy: &ProxyConfig,
        _url: &str,
        _timeout_ms: u64,
    ) -> Result<u16, TransportError> {
        let mut calls = self.calls.lock().unwrap();
        let attempt = calls.iter().filter(|h| **h == proxy.host).count();
        calls.push(proxy.host.clone());

        match self.responses.get(&proxy.host) {
            Some(script) => script
                .get(attempt)
                .or_else(|| script.back())
                .cloned()
                .unwrap_or(Ok(200)),
            None => Ok(200),
        }
    }
}
