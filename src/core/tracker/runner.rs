//! Tracking cycle orchestration
//!
//! Profiles are processed strictly one after another. Each account's work is
//! isolated: whatever happens while checking one account ends up in that
//! account's own result row, and the cycle moves on. Only an unreachable
//! profile source aborts the run.

use crate::core::tracker::audit::categorize_account;
use crate::core::tracker::debug_logger::{get_debug_logger, TrackerLogger};
use crate::core::tracker::profiles::ProfileSource;
use crate::core::tracker::proxy_config::resolve_optional;
use crate::core::tracker::proxy_health::ProxyHealthProbe;
use crate::core::tracker::shadow_probe::ShadowVisibilityProbe;
use crate::core::tracker::sinks::{build_alerts, AlertSink, ReportRow, ReportSink, UpsertStats};
use crate::core::tracker::state_store::{
    dead_account_events, diff, track_not_found, StateDiffStore, StateSnapshot, TransitionEvent,
};
use crate::core::tracker::status_poller::ResilientStatusPoller;
use crate::core::tracker::types::{
    account_age_days, get_local_timestamp, AccountResult, AccountState, AccountStatus, Profile,
    ProxyHealth, TrackerError,
};
use crate::core::tracker::warmup::{check_thresholds, tier_for};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "live-http")]
use crate::config::TrackerConfig;

/// Run-level knobs taken from the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub proxy_timeout: Duration,
    pub alert_ratio: f64,
    pub not_found_threshold_days: u32,
    pub max_listed: usize,
    /// Check only the first N profiles
    pub limit: Option<usize>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            proxy_timeout: Duration::from_secs(10),
            alert_ratio: 0.8,
            not_found_threshold_days: 7,
            max_listed: 5,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerSummary {
    pub categories: BTreeMap<String, usize>,
    pub total_score: i64,
}

/// Everything a completed cycle produced
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub profiles_total: usize,
    pub results: Vec<AccountResult>,
    pub events: Vec<TransitionEvent>,
    pub warmup_warnings: Vec<String>,
    pub archival_candidates: Vec<String>,
    pub by_category: BTreeMap<String, usize>,
    pub by_owner: BTreeMap<String, OwnerSummary>,
    pub total_score: i64,
    pub state_saved: bool,
    pub report: Option<UpsertStats>,
    pub sink_failures: usize,
}

impl RunSummary {
    fn tally(&mut self) {
        for result in &self.results {
            *self.by_category.entry(result.category.clone()).or_default() += 1;
            self.total_score += result.status.total_score;

            let owner = self
                .by_owner
                .entry(result.profile.owner_label.clone())
                .or_default();
            *owner.categories.entry(result.category.clone()).or_default() += 1;
            owner.total_score += result.status.total_score;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct Tracker {
    profiles: Arc<dyn ProfileSource>,
    poller: ResilientStatusPoller,
    shadow: ShadowVisibilityProbe,
    proxy_probe: ProxyHealthProbe,
    store: StateDiffStore,
    alert_sinks: Vec<Arc<dyn AlertSink>>,
    report_sink: Option<Arc<dyn ReportSink>>,
    settings: RunSettings,
    logger: Arc<TrackerLogger>,
}

impl Tracker {
    pub fn new(
        profiles: Arc<dyn ProfileSource>,
        poller: ResilientStatusPoller,
        shadow: ShadowVisibilityProbe,
        proxy_probe: ProxyHealthProbe,
        store: StateDiffStore,
        settings: RunSettings,
    ) -> Self {
        Self {
            profiles,
            poller,
            shadow,
            proxy_probe,
            store,
            alert_sinks: Vec::new(),
            report_sink: None,
            settings,
            logger: Arc::new(get_debug_logger()),
        }
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = Some(sink);
        self
    }

    pub fn with_logger(mut self, logger: Arc<TrackerLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Wire production clients and sinks from configuration
    #[cfg(feature = "live-http")]
    pub fn from_config(config: &TrackerConfig, limit: Option<usize>) -> Result<Self, TrackerError> {
        use crate::core::tracker::profiles::JsonFileProfileSource;
        use crate::core::tracker::proxy_health::IsahcProxyProbeClient;
        use crate::core::tracker::sinks::{JsonReportSink, LogAlertSink, WebhookAlertSink};
        use crate::core::tracker::status_client::{IsahcStatusClient, StatusClient};

        let logger = Arc::new(get_debug_logger());
        let status_client: Arc<dyn StatusClient> = Arc::new(IsahcStatusClient::new(
            &config.poller.base_url,
            &config.poller.user_agent,
            config.poller.request_timeout_ms,
        )?);

        let poller = ResilientStatusPoller::new(Arc::clone(&status_client), config.poller_settings())
            .with_logger(Arc::clone(&logger));
        let shadow = ShadowVisibilityProbe::new(
            status_client,
            config.poller.min_delay_secs,
            config.poller.max_delay_secs,
        )
        .with_logger(Arc::clone(&logger));
        let proxy_probe = ProxyHealthProbe::new(
            Arc::new(IsahcProxyProbeClient::new(&config.poller.user_agent)?),
            config.proxy_health_settings(),
        )
        .with_logger(Arc::clone(&logger));
        let store = StateDiffStore::new(config.state.path.clone()).with_logger(Arc::clone(&logger));

        let mut settings = config.run_settings();
        settings.limit = limit;

        let mut tracker = Tracker::new(
            Arc::new(JsonFileProfileSource::new(config.profiles.path.clone())),
            poller,
            shadow,
            proxy_probe,
            store,
            settings,
        )
        .with_alert_sink(Arc::new(LogAlertSink::new(Arc::clone(&logger))))
        .with_report_sink(Arc::new(JsonReportSink::new(config.report.path.clone())))
        .with_logger(logger);

        if let Some(url) = config.alerts.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            tracker = tracker.with_alert_sink(Arc::new(WebhookAlertSink::new(url)?));
        }

        Ok(tracker)
    }

    /// Everything learned about one profile
    async fn process_account(
        &self,
        profile: &Profile,
        previous: &StateSnapshot,
        now: DateTime<Utc>,
    ) -> AccountResult {
        let account_id = profile.display_name.as_str();
        let proxy = resolve_optional(&profile.proxy_connection_string);

        let mut status = self.poller.check_status(account_id).await;
        if status.state == AccountState::Active {
            status = self.shadow.refine(status).await;
        }

        let mut activity = None;
        let mut warmup_tier = None;
        let mut warnings = Vec::new();
        if status.state == AccountState::Active {
            activity = self.poller.fetch_activity(account_id, now).await;
            if let Some(age_days) = account_age_days(status.created_at, now.timestamp()) {
                let tier = tier_for(age_days);
                warmup_tier = Some(tier.as_str().to_string());
                if let Some(snapshot) = &activity {
                    warnings = check_thresholds(snapshot, tier, self.settings.alert_ratio);
                }
            }
        }

        let proxy_health = self
            .proxy_probe
            .check(proxy.as_ref(), self.settings.proxy_timeout)
            .await;

        let score_change = match previous.scores.get(account_id) {
            Some(last) if status.state.is_live() => status.total_score - last,
            _ => 0,
        };

        AccountResult {
            category: categorize_account(&profile.free_text_notes, status.state),
            profile: profile.clone(),
            status,
            score_change,
            proxy_key: proxy.as_ref().map(|p| p.key()),
            proxy_health,
            activity,
            warmup_tier,
            warnings,
            checked_at: get_local_timestamp(),
        }
    }

    /// `process_account` with a panic turned into an error row
    async fn process_isolated(
        &self,
        profile: &Profile,
        previous: &StateSnapshot,
        now: DateTime<Utc>,
    ) -> AccountResult {
        match AssertUnwindSafe(self.process_account(profile, previous, now))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = format!("account processing panicked: {}", panic_message(payload.as_ref()));
                self.logger.error("Tracker", "account_failed", &format!("{}: {}", profile.display_name, message));
                let status = AccountStatus::error(&profile.display_name, message);
                AccountResult {
                    category: categorize_account(&profile.free_text_notes, status.state),
                    profile: profile.clone(),
                    status,
                    score_change: 0,
                    proxy_key: resolve_optional(&profile.proxy_connection_string).map(|p| p.key()),
                    proxy_health: ProxyHealth::not_applicable(),
                    activity: None,
                    warmup_tier: None,
                    warnings: Vec::new(),
                    checked_at: get_local_timestamp(),
                }
            }
        }
    }

    async fn publish_alerts(&self, summary: &mut RunSummary) {
        let alerts = build_alerts(&summary.events, &summary.warmup_warnings, self.settings.max_listed);
        for (kind, payload) in &alerts {
            for sink in &self.alert_sinks {
                let outcome = sink.publish(*kind, payload).await;
                if outcome.is_failure() {
                    summary.sink_failures += 1;
                }
                self.logger.sink_outcome(
                    sink.name(),
                    !outcome.is_failure(),
                    &format!("{}: {}", payload.title, outcome.describe()),
                );
            }
        }
    }

    async fn sync_report(&self, summary: &mut RunSummary, valid_ids: &HashSet<String>, now: DateTime<Utc>) {
        let Some(sink) = &self.report_sink else {
            return;
        };

        let rows: Vec<ReportRow> = summary
            .results
            .iter()
            .map(|r| ReportRow::from_result(r, now.timestamp()))
            .collect();

        match sink.upsert(&rows).await {
            Ok(stats) => {
                self.logger.sink_outcome(
                    "report",
                    true,
                    &format!("{} updated, {} inserted", stats.updated, stats.inserted),
                );
                summary.report = Some(stats);
            }
            Err(e) => {
                summary.sink_failures += 1;
                self.logger.sink_outcome("report", false, &e.to_string());
                return;
            }
        }

        match sink.archive_missing(valid_ids).await {
            Ok(count) => self.logger.sink_outcome(
                "report",
                true,
                &format!("{} row(s) archived for removed profiles", count),
            ),
            Err(e) => {
                summary.sink_failures += 1;
                self.logger.sink_outcome("report", false, &e.to_string());
            }
        }

        if !summary.archival_candidates.is_empty() {
            match sink.archive_usernames(&summary.archival_candidates).await {
                Ok(count) => self.logger.sink_outcome(
                    "report",
                    true,
                    &format!("{} row(s) archived after prolonged not_found", count),
                ),
                Err(e) => {
                    summary.sink_failures += 1;
                    self.logger.sink_outcome("report", false, &e.to_string());
                }
            }
        }
    }

    /// Run one full cycle. Only a failing profile source is an error.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunSummary, TrackerError> {
        let mut profiles = self.profiles.list_profiles().await?;
        let valid_ids: HashSet<String> = profiles.iter().map(|p| p.id.clone()).collect();
        let profiles_total = profiles.len();
        if let Some(limit) = self.settings.limit {
            profiles.truncate(limit);
        }
        self.logger.debug(
            "Tracker",
            "run_start",
            &format!("Checking {} of {} profiles", profiles.len(), profiles_total),
        );

        let previous = self.store.load().await;

        let mut results = Vec::with_capacity(profiles.len());
        for profile in &profiles {
            results.push(self.process_isolated(profile, &previous, now).await);
        }

        let mut current = StateSnapshot::from_results(&results, &previous, now);
        let mut events = diff(&previous, &current);
        let (history, archival_candidates) = track_not_found(
            &current.accounts,
            &previous.not_found_history,
            self.settings.not_found_threshold_days,
            now,
        );
        current.not_found_history = history;
        events.extend(dead_account_events(&archival_candidates, &current.not_found_history));

        for event in &events {
            self.logger.transition(event.kind.as_str(), &event.subject, &event.detail);
        }

        let state_saved = match self.store.save(&current).await {
            Ok(()) => true,
            Err(e) => {
                self.logger.error("Tracker", "state_save_failed", &e.to_string());
                false
            }
        };

        let mut summary = RunSummary {
            profiles_total,
            warmup_warnings: results.iter().flat_map(|r| r.warnings.clone()).collect(),
            results,
            events,
            archival_candidates,
            state_saved,
            ..Default::default()
        };
        summary.tally();

        self.publish_alerts(&mut summary).await;
        self.sync_report(&mut summary, &valid_ids, now).await;

        self.logger.debug(
            "Tracker",
            "run_end",
            &format!(
                "{} accounts checked, {} transition(s), total score {}",
                summary.results.len(),
                summary.events.len(),
                summary.total_score
            ),
        );
        Ok(summary)
    }
}
