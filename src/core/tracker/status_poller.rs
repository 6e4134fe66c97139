//! Resilient Status Poller
//!
//! One bounded retry loop per account, no state carried between calls.
//!
//! ## Response mapping
//!
//! - **200**: active, scores parsed from the body
//! - **404**: not_found
//! - **403**: suspended
//! - **429**: back off (`Retry-After` or `base^attempt + U(0,1)`) and retry;
//!   rate_limited once attempts run out
//! - **other**: error with `HTTP {code}`
//!
//! Transient transport errors share the 429 backoff path and surface as an
//! error status only on the final attempt. Every remote call is preceded by
//! a uniformly random delay.

use crate::core::tracker::debug_logger::{get_debug_logger, TrackerLogger};
use crate::core::tracker::status_client::{parse_account_page, ListingItem, ListingKind, StatusClient};
use crate::core::tracker::timing::{
    parse_retry_after, pre_call_delay, BackoffPolicy, JitterSource, Sleeper, ThreadRngJitter,
    TokioSleeper,
};
use crate::core::tracker::types::{AccountState, AccountStatus, ActivitySnapshot, get_local_timestamp};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Timing and retry knobs for the poller
#[derive(Debug, Clone, PartialEq)]
pub struct PollerSettings {
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    pub max_retries: u32,
    pub backoff_base: f64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            min_delay_secs: 2.0,
            max_delay_secs: 5.0,
            max_retries: 5,
            backoff_base: 2.0,
        }
    }
}

pub struct ResilientStatusPoller {
    client: Arc<dyn StatusClient>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
    settings: PollerSettings,
    logger: Arc<TrackerLogger>,
}

impl ResilientStatusPoller {
    pub fn new(client: Arc<dyn StatusClient>, settings: PollerSettings) -> Self {
        Self {
            client,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(ThreadRngJitter),
            settings,
            logger: Arc::new(get_debug_logger()),
        }
    }

    /// Configure with custom sleeper (for testing)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Configure with custom jitter source (for testing)
    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_logger(mut self, logger: Arc<TrackerLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn client(&self) -> Arc<dyn StatusClient> {
        Arc::clone(&self.client)
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    async fn randomized_pause(&self) -> u64 {
        let delay = pre_call_delay(
            self.settings.min_delay_secs,
            self.settings.max_delay_secs,
            self.jitter.as_ref(),
        );
        self.sleeper.sleep(delay).await;
        delay.as_millis() as u64
    }

    /// Determine the current state of one account
    pub async fn check_status(&self, account_id: &str) -> AccountStatus {
        let policy = BackoffPolicy::new(self.settings.backoff_base, self.settings.max_retries);

        for attempt in 0..policy.max_attempts {
            let is_last = attempt + 1 >= policy.max_attempts;
            let delay = pre_call_delay(
                self.settings.min_delay_secs,
                self.settings.max_delay_secs,
                self.jitter.as_ref(),
            );
            self.logger
                .poll_start(account_id, attempt, delay.as_millis() as u64);
            self.sleeper.sleep(delay).await;

            match self.client.get_account_page(account_id).await {
                Ok(response) => {
                    let status = match response.status_code {
                        200 => {
                            let metrics = parse_account_page(&response.body);
                            AccountStatus {
                                account_id: account_id.to_string(),
                                state: AccountState::Active,
                                total_score: metrics.total_score,
                                comment_score: metrics.comment_score,
                                link_score: metrics.link_score,
                                created_at: metrics.created_at,
                                error: None,
                            }
                        }
                        404 => AccountStatus::bare(account_id, AccountState::NotFound),
                        403 => AccountStatus::bare(account_id, AccountState::Suspended),
                        429 => {
                            if is_last {
                                break;
                            }
                            let hint = response.header("retry-after").and_then(parse_retry_after);
                            let wait = policy.delay(attempt, hint, self.jitter.as_ref());
                            self.logger.backoff(
                                "StatusPoller",
                                account_id,
                                attempt,
                                wait.as_millis() as u64,
                                "HTTP 429",
                            );
                            self.sleeper.sleep(wait).await;
                            continue;
                        }
                        code => AccountStatus::error(account_id, format!("HTTP {}", code)),
                    };

                    self.logger.poll_end(
                        account_id,
                        status.state.as_str(),
                        Some(response.status_code),
                        attempt + 1,
                    );
                    return status;
                }
                Err(error) => {
                    if is_last || !error.is_transient() {
                        self.logger.poll_end(account_id, "error", None, attempt + 1);
                        return AccountStatus::error(account_id, error.message);
                    }
                    let wait = policy.delay(attempt, None, self.jitter.as_ref());
                    self.logger.backoff(
                        "StatusPoller",
                        account_id,
                        attempt,
                        wait.as_millis() as u64,
                        &error.message,
                    );
                    self.sleeper.sleep(wait).await;
                }
            }
        }

        self.logger.poll_end(
            account_id,
            AccountState::RateLimited.as_str(),
            Some(429),
            policy.max_attempts,
        );
        AccountStatus::bare(account_id, AccountState::RateLimited)
    }

    /// Count today's comments and submissions. `None` when either listing
    /// cannot be read.
    pub async fn fetch_activity(&self, account_id: &str, now: DateTime<Utc>) -> Option<ActivitySnapshot> {
        let mut counts = [0u32; 2];

        for (slot, kind) in [ListingKind::Comments, ListingKind::Submitted].iter().enumerate() {
            self.randomized_pause().await;
            match self.client.get_listing(account_id, *kind).await {
                Ok(items) => counts[slot] = count_today(&items, now),
                Err(error) => {
                    self.logger.warn(
                        "StatusPoller",
                        "activity_fetch_failed",
                        &format!("{} {}: {}", account_id, kind.path_segment(), error),
                    );
                    return None;
                }
            }
        }

        Some(ActivitySnapshot {
            account_id: account_id.to_string(),
            comments_today: counts[0],
            posts_today: counts[1],
            fetched_at: get_local_timestamp(),
        })
    }
}

/// Items created on the same UTC calendar day as `now`
pub fn count_today(items: &[ListingItem], now: DateTime<Utc>) -> u32 {
    let today = now.date_naive();
    items
        .iter()
        .filter_map(|item| DateTime::<Utc>::from_timestamp(item.created_utc as i64, 0))
        .filter(|created| created.date_naive() == today)
        .count() as u32
}
