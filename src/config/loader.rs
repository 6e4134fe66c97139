use super::defaults::app_file;
use super::types::TrackerConfig;
use crate::core::tracker::proxy_health::ProxyHealthSettings;
use crate::core::tracker::runner::RunSettings;
use crate::core::tracker::status_poller::PollerSettings;
use crate::core::tracker::types::TrackerError;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STATE_PATH_ENV_VAR: &str = "ACCTWATCH_STATE_PATH";
pub const PROFILES_PATH_ENV_VAR: &str = "ACCTWATCH_PROFILES_PATH";
pub const WEBHOOK_URL_ENV_VAR: &str = "ACCTWATCH_WEBHOOK_URL";

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TrackerConfig {
    /// `~/.acctwatch/config.toml`
    pub fn default_path() -> PathBuf {
        app_file("config.toml")
    }

    /// Load from the default location; a missing file means defaults
    pub fn load() -> Result<Self, TrackerError> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, TrackerError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| TrackerError::ConfigReadError(format!("{}: {}", path.display(), e)))?;
            toml::from_str::<TrackerConfig>(&content)
                .map_err(|e| TrackerError::ConfigParseError(format!("{}: {}", path.display(), e)))?
        } else {
            TrackerConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(path) = env_value(STATE_PATH_ENV_VAR) {
            self.state.path = PathBuf::from(path);
        }
        if let Some(path) = env_value(PROFILES_PATH_ENV_VAR) {
            self.profiles.path = PathBuf::from(path);
        }
        if let Some(url) = env_value(WEBHOOK_URL_ENV_VAR) {
            self.alerts.webhook_url = Some(url);
        }
    }

    /// Write a default config file unless one already exists
    pub fn init() -> Result<PathBuf, TrackerError> {
        let path = Self::default_path();
        Self::init_at(&path)?;
        Ok(path)
    }

    pub fn init_at(path: &Path) -> Result<(), TrackerError> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, TrackerConfig::default().to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, TrackerError> {
        toml::to_string_pretty(self)
            .map_err(|e| TrackerError::ConfigParseError(format!("Failed to serialize config: {}", e)))
    }

    pub fn print(&self) -> Result<(), TrackerError> {
        print!("{}", self.to_toml()?);
        Ok(())
    }

    /// Reject values that would make a run meaningless
    pub fn check(&self) -> Result<(), TrackerError> {
        let poller = &self.poller;
        if !(poller.min_delay_secs >= 0.0 && poller.max_delay_secs >= 0.0) {
            return Err(TrackerError::ConfigInvalid(
                "poller delays must be non-negative".to_string(),
            ));
        }
        // Equal bounds would make every pre-call delay identical
        if poller.min_delay_secs >= poller.max_delay_secs {
            return Err(TrackerError::ConfigInvalid(format!(
                "poller.min_delay_secs ({}) must be below poller.max_delay_secs ({})",
                poller.min_delay_secs, poller.max_delay_secs
            )));
        }
        if poller.max_retries < 1 {
            return Err(TrackerError::ConfigInvalid(
                "poller.max_retries must be at least 1".to_string(),
            ));
        }
        if !(poller.backoff_base >= 1.0) || !(self.proxy_health.backoff_base >= 1.0) {
            return Err(TrackerError::ConfigInvalid(
                "backoff_base must be at least 1.0".to_string(),
            ));
        }
        if url::Url::parse(&poller.base_url).is_err() {
            return Err(TrackerError::ConfigInvalid(format!(
                "poller.base_url is not a URL: {}",
                poller.base_url
            )));
        }
        if self.proxy_health.max_attempts < 1 {
            return Err(TrackerError::ConfigInvalid(
                "proxy_health.max_attempts must be at least 1".to_string(),
            ));
        }
        if url::Url::parse(&self.proxy_health.endpoint).is_err() {
            return Err(TrackerError::ConfigInvalid(format!(
                "proxy_health.endpoint is not a URL: {}",
                self.proxy_health.endpoint
            )));
        }
        let ratio = self.warmup.alert_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(TrackerError::ConfigInvalid(format!(
                "warmup.alert_ratio must be in (0, 1], got {}",
                ratio
            )));
        }
        if self.state.not_found_threshold_days < 1 {
            return Err(TrackerError::ConfigInvalid(
                "state.not_found_threshold_days must be at least 1".to_string(),
            ));
        }
        if let Some(webhook) = &self.alerts.webhook_url {
            if url::Url::parse(webhook).is_err() {
                return Err(TrackerError::ConfigInvalid(
                    "alerts.webhook_url is not a URL".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            min_delay_secs: self.poller.min_delay_secs,
            max_delay_secs: self.poller.max_delay_secs,
            max_retries: self.poller.max_retries,
            backoff_base: self.poller.backoff_base,
        }
    }

    pub fn proxy_health_settings(&self) -> ProxyHealthSettings {
        ProxyHealthSettings {
            max_attempts: self.proxy_health.max_attempts,
            backoff_base: self.proxy_health.backoff_base,
            endpoint: self.proxy_health.endpoint.clone(),
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            proxy_timeout: Duration::from_millis(self.proxy_health.timeout_ms),
            alert_ratio: self.warmup.alert_ratio,
            not_found_threshold_days: self.state.not_found_threshold_days,
            max_listed: self.alerts.max_listed,
            limit: None,
        }
    }
}
