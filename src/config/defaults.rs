// Built-in defaults; every field of config.toml is optional

use super::types::{
    AlertsConfig, PollerConfig, ProfilesConfig, ProxyHealthConfig, ReportConfig, StateConfig,
    TrackerConfig, WarmupConfig,
};
use std::path::PathBuf;

pub const APP_DIR: &str = ".acctwatch";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// `~/.acctwatch/<file>`, falling back to the working directory without a home
pub fn app_file(file: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(file)
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            poller: PollerConfig::default(),
            proxy_health: ProxyHealthConfig::default(),
            warmup: WarmupConfig::default(),
            state: StateConfig::default(),
            profiles: ProfilesConfig::default(),
            report: ReportConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 2.0,
            max_delay_secs: 5.0,
            max_retries: 5,
            backoff_base: 2.0,
            request_timeout_ms: 10_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_url: "https://www.reddit.com".to_string(),
        }
    }
}

impl Default for ProxyHealthConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_attempts: 3,
            backoff_base: 2.0,
            endpoint: "https://www.reddit.com/robots.txt".to_string(),
        }
    }
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self { alert_ratio: 0.8 }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: app_file("last_run_state.json"),
            not_found_threshold_days: 7,
        }
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            path: app_file("profiles.json"),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: app_file("report.json"),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_listed: 5,
        }
    }
}
