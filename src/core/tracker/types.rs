// Core types for account tracking
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote account state as observed by a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Active,
    Suspended,
    NotFound,
    Shadowbanned,
    RateLimited,
    Error,
}

impl AccountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountState::Active => "active",
            AccountState::Suspended => "suspended",
            AccountState::NotFound => "not_found",
            AccountState::Shadowbanned => "shadowbanned",
            AccountState::RateLimited => "rate_limited",
            AccountState::Error => "error",
        }
    }

    /// States an account can be banned *from*
    pub fn is_live(&self) -> bool {
        matches!(self, AccountState::Active | AccountState::Shadowbanned)
    }

    /// Definite "gone" states
    pub fn is_gone(&self) -> bool {
        matches!(self, AccountState::Suspended | AccountState::NotFound)
    }
}

impl fmt::Display for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one status poll. Built fresh per poll, never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountStatus {
    pub account_id: String,
    pub state: AccountState,
    pub total_score: i64,
    pub comment_score: i64,
    pub link_score: i64,
    /// Account creation time, epoch seconds (0 when unknown)
    pub created_at: f64,
    pub error: Option<String>,
}

impl AccountStatus {
    pub fn bare(account_id: &str, state: AccountState) -> Self {
        Self {
            account_id: account_id.to_string(),
            state,
            total_score: 0,
            comment_score: 0,
            link_score: 0,
            created_at: 0.0,
            error: None,
        }
    }

    pub fn error(account_id: &str, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::bare(account_id, AccountState::Error)
        }
    }

    /// Same metrics, different state
    pub fn with_state(&self, state: AccountState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

/// Today's activity for an account currently active
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySnapshot {
    pub account_id: String,
    pub comments_today: u32,
    pub posts_today: u32,
    pub fetched_at: String,
}

/// Proxy health tags persisted into the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProxyHealthStatus {
    #[serde(rename = "pass")]
    Pass,
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "blocked")]
    Blocked,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl ProxyHealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyHealthStatus::Pass => "pass",
            ProxyHealthStatus::Fail => "fail",
            ProxyHealthStatus::Blocked => "blocked",
            ProxyHealthStatus::NotApplicable => "N/A",
        }
    }

    pub fn is_failing(&self) -> bool {
        matches!(self, ProxyHealthStatus::Fail | ProxyHealthStatus::Blocked)
    }
}

impl fmt::Display for ProxyHealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a proxy health check
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyHealth {
    pub status: ProxyHealthStatus,
    /// Explanation for fail/blocked
    pub reason: Option<String>,
    /// Attempts made (0 when no network call was needed)
    pub attempts: u32,
}

impl ProxyHealth {
    pub fn not_applicable() -> Self {
        Self {
            status: ProxyHealthStatus::NotApplicable,
            reason: None,
            attempts: 0,
        }
    }
}

/// Browser profile as delivered by the profile source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    /// Remote account id (username)
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(default, alias = "owner")]
    pub owner_label: String,
    #[serde(default, alias = "notes")]
    pub free_text_notes: String,
    #[serde(default, alias = "proxy")]
    pub proxy_connection_string: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Everything learned about one profile in one cycle
#[derive(Debug, Clone)]
pub struct AccountResult {
    pub profile: Profile,
    pub status: AccountStatus,
    pub category: String,
    pub score_change: i64,
    pub proxy_key: Option<String>,
    pub proxy_health: ProxyHealth,
    pub activity: Option<ActivitySnapshot>,
    pub warmup_tier: Option<String>,
    pub warnings: Vec<String>,
    pub checked_at: String,
}

/// Transport-level failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    /// Proxy rejected our credentials
    ProxyAuth,
    /// Proxy URL could not be used at all
    InvalidProxy,
    Other,
}

/// Failure below the HTTP status layer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Timeouts and connection errors are worth retrying; proxy auth/config errors never are
    pub fn is_transient(&self) -> bool {
        !matches!(
            self.kind,
            TransportErrorKind::ProxyAuth | TransportErrorKind::InvalidProxy
        )
    }
}

/// Crate error type
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Home directory not found")]
    HomeDirNotFound,
    #[error("Config read error: {0}")]
    ConfigReadError(String),
    #[error("Config parse error: {0}")]
    ConfigParseError(String),
    #[error("Invalid config: {0}")]
    ConfigInvalid(String),
    #[error("Profile source unavailable: {0}")]
    ProfileSourceError(String),
    #[error("HTTP error: {0}")]
    HttpError(String),
    #[error("State file error: {0}")]
    StateFileError(String),
    #[error("Sink error: {0}")]
    SinkError(String),
}

impl From<std::io::Error> for TrackerError {
    fn from(error: std::io::Error) -> Self {
        TrackerError::ConfigReadError(error.to_string())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(error: serde_json::Error) -> Self {
        TrackerError::ConfigParseError(error.to_string())
    }
}

/// Parse a boolean-ish env var: true/1/yes/on (case insensitive)
pub fn parse_env_flag(env_var: &str) -> bool {
    std::env::var(env_var)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(false)
}

/// Standardized local timezone ISO-8601 timestamp
pub fn get_local_timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Human-readable account age: "2y 3m", "6m", "15d" or "N/A"
pub fn format_account_age(created_at: f64, now_epoch: i64) -> String {
    if created_at <= 0.0 {
        return "N/A".to_string();
    }
    let delta = now_epoch - created_at as i64;
    if delta < 0 {
        return "N/A".to_string();
    }
    let days = delta / 86_400;
    let years = days / 365;
    let months = (days % 365) / 30;

    if years > 0 {
        format!("{}y {}m", years, months)
    } else if months > 0 {
        format!("{}m", months)
    } else {
        format!("{}d", days)
    }
}

/// Whole days since creation, None for unknown or future timestamps
pub fn account_age_days(created_at: f64, now_epoch: i64) -> Option<u32> {
    if created_at <= 0.0 {
        return None;
    }
    let delta = now_epoch - created_at as i64;
    if delta < 0 {
        return None;
    }
    u32::try_from(delta / 86_400).ok()
}
