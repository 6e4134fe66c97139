//! Shadow Visibility Probe
//!
//! Runs only for accounts the poller reported active. The newest item in the
//! account's own submission feed is looked up directly; if the direct lookup
//! says it does not exist, the account's content is hidden from everyone else.
//!
//! Any ambiguity (empty feed, transport failure, unexpected status) keeps the
//! account active.

use crate::core::tracker::debug_logger::{get_debug_logger, TrackerLogger};
use crate::core::tracker::status_client::{ListingKind, StatusClient};
use crate::core::tracker::timing::{pre_call_delay, JitterSource, Sleeper, ThreadRngJitter, TokioSleeper};
use crate::core::tracker::types::{AccountState, AccountStatus};
use std::sync::Arc;

/// Probe verdict before it is folded into an [`AccountStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
    Inconclusive,
}

pub struct ShadowVisibilityProbe {
    client: Arc<dyn StatusClient>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
    min_delay_secs: f64,
    max_delay_secs: f64,
    logger: Arc<TrackerLogger>,
}

impl ShadowVisibilityProbe {
    pub fn new(client: Arc<dyn StatusClient>, min_delay_secs: f64, max_delay_secs: f64) -> Self {
        Self {
            client,
            sleeper: Arc::new(TokioSleeper),
            jitter: Arc::new(ThreadRngJitter),
            min_delay_secs,
            max_delay_secs,
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

    async fn pause(&self) {
        let delay = pre_call_delay(self.min_delay_secs, self.max_delay_secs, self.jitter.as_ref());
        self.sleeper.sleep(delay).await;
    }

    pub async fn probe(&self, account_id: &str) -> Visibility {
        self.pause().await;
        let submissions = match self.client.get_listing(account_id, ListingKind::Submitted).await {
            Ok(items) => items,
            Err(error) => {
                self.logger.warn(
                    "ShadowProbe",
                    "listing_failed",
                    &format!("{}: {}", account_id, error),
                );
                return Visibility::Inconclusive;
            }
        };

        let Some(newest) = submissions.first() else {
            return Visibility::Inconclusive;
        };

        self.pause().await;
        match self.client.get_submission_by_ref(&newest.id).await {
            Ok(404) => Visibility::Hidden,
            Ok(200) => Visibility::Visible,
            Ok(code) => {
                self.logger.debug(
                    "ShadowProbe",
                    "unexpected_status",
                    &format!("{}: lookup of {} returned HTTP {}", account_id, newest.id, code),
                );
                Visibility::Inconclusive
            }
            Err(error) => {
                self.logger.warn(
                    "ShadowProbe",
                    "lookup_failed",
                    &format!("{}: {}", account_id, error),
                );
                Visibility::Inconclusive
            }
        }
    }

    /// Refine an active status; any other state passes through untouched
    pub async fn refine(&self, status: AccountStatus) -> AccountStatus {
        if status.state != AccountState::Active {
            return status;
        }

        match self.probe(&status.account_id).await {
            Visibility::Hidden => {
                self.logger.warn(
                    "ShadowProbe",
                    "shadowbanned",
                    &format!("{}: newest submission hidden from direct lookup", status.account_id),
                );
                status.with_state(AccountState::Shadowbanned)
            }
            Visibility::Visible | Visibility::Inconclusive => status,
        }
    }
}
