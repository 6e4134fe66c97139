//! Proxy Health Assessment
//!
//! - No proxy configured: N/A without touching the network
//! - 200: pass
//! - 403 / 429: blocked, a permanent verdict that is never retried
//! - any other status: fail with the code
//! - timeouts and connect errors: retried with backoff, then fail
//! - proxy auth / configuration errors: immediate fail

use crate::core::tracker::debug_logger::{get_debug_logger, TrackerLogger};
use crate::core::tracker::proxy_config::ProxyConfig;
use crate::core::tracker::proxy_health::client::ProxyProbeClient;
use crate::core::tracker::timing::{BackoffPolicy, JitterSource, Sleeper, ThreadRngJitter, TokioSleeper};
use crate::core::tracker::types::{ProxyHealth, ProxyHealthStatus, TransportError, TransportErrorKind};
use std::sync::Arc;
use std::time::Duration;

/// Retry and endpoint settings for the proxy check
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyHealthSettings {
    pub max_attempts: u32,
    pub backoff_base: f64,
    /// Low-cost page of the target service
    pub endpoint: String,
}

impl Default for ProxyHealthSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2.0,
            endpoint: "https://www.reddit.com/robots.txt".to_string(),
        }
    }
}

/// Map the probe's HTTP status to a health verdict
pub fn classify_probe_status(status_code: u16) -> (ProxyHealthStatus, Option<String>) {
    match status_code {
        200 => (ProxyHealthStatus::Pass, None),
        403 => (
            ProxyHealthStatus::Blocked,
            Some("403 Forbidden - Reddit blocking this IP".to_string()),
        ),
        429 => (
            ProxyHealthStatus::Blocked,
            Some("429 Rate Limited - IP likely flagged".to_string()),
        ),
        code => (ProxyHealthStatus::Fail, Some(format!("HTTP {}", code))),
    }
}

fn transport_reason(error: &TransportError) -> String {
    match error.kind {
        TransportErrorKind::Timeout => "Connection timeout".to_string(),
        TransportErrorKind::Connect => format!("Connection error: {}", error.message),
        TransportErrorKind::ProxyAuth | TransportErrorKind::InvalidProxy => {
            format!("Proxy error: {}", error.message)
        }
        TransportErrorKind::Other => format!("Unexpected error: {}", error.message),
    }
}

pub struct ProxyHealthProbe {
    client: Arc<dyn ProxyProbeClient>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
    settings: ProxyHealthSettings,
    logger: Arc<TrackerLogger>,
}

impl ProxyHealthProbe {
    pub fn new(client: Arc<dyn ProxyProbeClient>, settings: ProxyHealthSettings) -> Self {
        Self {
            client,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(ThreadRngJitter),
            settings,
            logger: Arc::new(get_debug_logger()),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_logger(mut self, logger: Arc<TrackerLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Check that `proxy` can reach the target service
    pub async fn check(&self, proxy: Option<&ProxyConfig>, timeout: Duration) -> ProxyHealth {
        let Some(proxy) = proxy else {
            return ProxyHealth::not_applicable();
        };

        let key = proxy.key();
        let policy = BackoffPolicy::new(self.settings.backoff_base, self.settings.max_attempts);
        let timeout_ms = timeout.as_millis() as u64;

        let mut attempt = 0;
        let health = loop {
            let outcome = self
                .client
                .get_via_proxy(proxy, &self.settings.endpoint, timeout_ms)
                .await;

            match outcome {
                Ok(status_code) => {
                    let (status, reason) = classify_probe_status(status_code);
                    break ProxyHealth {
                        status,
                        reason,
                        attempts: attempt + 1,
                    };
                }
                Err(error) if error.is_transient() && attempt + 1 < policy.max_attempts => {
                    let wait = policy.delay(attempt, None, self.jitter.as_ref());
                    self.logger.backoff(
                        "ProxyHealthProbe",
                        &key,
                        attempt,
                        wait.as_millis() as u64,
                        &error.message,
                    );
                    self.sleeper.sleep(wait).await;
                    attempt += 1;
                }
                Err(error) => {
                    break ProxyHealth {
                        status: ProxyHealthStatus::Fail,
                        reason: Some(transport_reason(&error)),
                        attempts: attempt + 1,
                    };
                }
            }
        };

        self.logger.proxy_check(
            &key,
            health.status.as_str(),
            health.reason.as_deref(),
            health.attempts,
        );
        health
    }
}
