//! Proxy Connection-String Resolution
//!
//! Turns the free-form proxy strings stored on browser profiles into a
//! canonical [`ProxyConfig`]:
//! - Provider detection from an ordered table of host patterns
//! - Session classification (rotating / sticky) from port and username tokens
//! - Geo targeting extracted from provider-specific username parameters
//! - Idempotent credential encoding when the URL is rebuilt

pub mod encoding;
pub mod providers;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub use encoding::{build_proxy_url, encode_credential, split_connection_string, ConnectionParts};
pub use providers::{match_provider, ProviderRule, PROVIDER_TABLE};

/// Known proxy providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProvider {
    Decodo,
    BrightData,
    DataImpulse,
    Unknown,
}

impl ProxyProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProvider::Decodo => "decodo",
            ProxyProvider::BrightData => "brightdata",
            ProxyProvider::DataImpulse => "dataimpulse",
            ProxyProvider::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProxyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Rotating,
    Sticky,
    Unknown,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Rotating => "rotating",
            SessionType::Sticky => "sticky",
            SessionType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoTarget {
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
}

impl GeoTarget {
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.state.is_none() && self.city.is_none() && self.zip.is_none()
    }
}

/// Canonical proxy model
///
/// `session_id` is only ever set for sticky sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub provider: ProxyProvider,
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Decoded username
    pub username: Option<String>,
    /// Decoded password
    pub password: Option<String>,
    pub session_type: SessionType,
    pub session_id: Option<String>,
    pub geo: GeoTarget,
    /// Connection string as received
    pub original: String,
}

impl ProxyConfig {
    /// Normalized URL with individually percent-encoded credentials
    pub fn url(&self) -> String {
        build_proxy_url(&ConnectionParts {
            scheme: self.scheme.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            host: self.host.clone(),
            port: self.port,
        })
    }

    /// Snapshot key without secrets: `provider:host:port[:session][:cred-hash]`
    pub fn key(&self) -> String {
        let mut key = format!(
            "{}:{}:{}",
            self.provider,
            self.host,
            self.port.map(|p| p.to_string()).unwrap_or_default()
        );
        if let Some(session) = &self.session_id {
            key.push(':');
            key.push_str(session);
        }
        if let Some(username) = &self.username {
            let digest = Sha256::digest(username.as_bytes());
            let short: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
            key.push(':');
            key.push_str(&short);
        }
        key
    }

    /// Identity of a sticky session within its provider and host
    pub fn session_key(&self) -> Option<String> {
        match (&self.session_type, &self.session_id) {
            (SessionType::Sticky, Some(session)) => {
                Some(format!("{}_{}_{}", self.provider, self.host, session))
            }
            _ => None,
        }
    }
}

/// Whether a profile's proxy field actually names a proxy
pub fn is_configured(raw: &str) -> bool {
    let raw = raw.trim();
    !raw.is_empty() && !raw.eq_ignore_ascii_case("none")
}

/// Resolve a raw connection string. Never fails.
///
/// Unrecognized hosts keep host/port/credentials and report
/// `ProxyProvider::Unknown` with no session or geo extraction.
pub fn resolve(raw_url: &str) -> ProxyConfig {
    let parts = split_connection_string(raw_url);

    let mut config = ProxyConfig {
        provider: ProxyProvider::Unknown,
        scheme: parts.scheme,
        host: parts.host,
        port: parts.port,
        username: parts.username,
        password: parts.password,
        session_type: SessionType::Unknown,
        session_id: None,
        geo: GeoTarget::default(),
        original: raw_url.to_string(),
    };

    if let Some(rule) = match_provider(&config.host) {
        config.provider = rule.provider;
        (rule.classify)(&mut config);
    }

    config
}

/// Resolve only when a proxy is configured
pub fn resolve_optional(raw_url: &str) -> Option<ProxyConfig> {
    if is_configured(raw_url) {
        Some(resolve(raw_url))
    } else {
        None
    }
}
