use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Main config structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub poller: PollerConfig,
    pub proxy_health: ProxyHealthConfig,
    pub warmup: WarmupConfig,
    pub state: StateConfig,
    pub profiles: ProfilesConfig,
    pub report: ReportConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Randomized pre-call delay range, seconds
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub max_retries: u32,
    pub backoff_base: f64,
    pub request_timeout_ms: u64,
    pub user_agent: String,
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyHealthConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base: f64,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Fraction of a ceiling at which a WARNING is raised
    pub alert_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
    pub not_found_threshold_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Slack-compatible incoming webhook
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub max_listed: usize,
}
