//! Alert and report sinks
//!
//! Both are best-effort collaborators. Every call returns an explicit
//! outcome which the runner logs; nothing here aborts a run.

use crate::core::tracker::debug_logger::{get_debug_logger, TrackerLogger};
use crate::core::tracker::state_store::{write_file_atomic, TransitionEvent, TransitionKind};
use crate::core::tracker::types::{format_account_age, AccountResult, AccountState, TrackerError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "live-http")]
use isahc::config::Configurable;
#[cfg(feature = "live-http")]
use isahc::{AsyncReadResponseExt, HttpClient, Request};
#[cfg(feature = "live-http")]
use std::time::Duration;

/// Result of one sink call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered,
    /// Nothing to do, e.g. no destination configured
    Skipped(String),
    Failed(String),
}

impl SinkOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SinkOutcome::Failed(_))
    }

    pub fn describe(&self) -> String {
        match self {
            SinkOutcome::Delivered => "delivered".to_string(),
            SinkOutcome::Skipped(why) => format!("skipped: {}", why),
            SinkOutcome::Failed(why) => format!("failed: {}", why),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    Ban,
    ProxyFailure,
    DeadAccount,
    Warmup,
}

impl AlertKind {
    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::Ban => "Account Alert",
            AlertKind::ProxyFailure => "Proxy Alert",
            AlertKind::DeadAccount => "Dead Account Alert",
            AlertKind::Warmup => "Warmup Alert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPayload {
    pub title: String,
    pub message: String,
}

#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, kind: AlertKind, payload: &AlertPayload) -> SinkOutcome;
}

/// `a, b, c (+2 more)`
pub fn format_subject_list(subjects: &[String], max_listed: usize) -> String {
    let mut listed = subjects
        .iter()
        .take(max_listed)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if subjects.len() > max_listed {
        listed.push_str(&format!(" (+{} more)", subjects.len() - max_listed));
    }
    listed
}

const PROXY_FAILURES_LISTED: usize = 3;

/// Group a run's transitions and warmup warnings into alerts, one per kind
pub fn build_alerts(
    events: &[TransitionEvent],
    warmup_warnings: &[String],
    max_listed: usize,
) -> Vec<(AlertKind, AlertPayload)> {
    let subjects = |kind: TransitionKind| -> Vec<String> {
        events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.subject.clone())
            .collect()
    };

    let mut alerts = Vec::new();

    let bans = subjects(TransitionKind::Ban);
    if !bans.is_empty() {
        alerts.push((
            AlertKind::Ban,
            AlertPayload {
                title: AlertKind::Ban.title().to_string(),
                message: format!(
                    "New bans ({}): {}",
                    bans.len(),
                    format_subject_list(&bans, max_listed)
                ),
            },
        ));
    }

    let proxies = subjects(TransitionKind::ProxyFailure);
    if !proxies.is_empty() {
        alerts.push((
            AlertKind::ProxyFailure,
            AlertPayload {
                title: AlertKind::ProxyFailure.title().to_string(),
                message: format!(
                    "Proxies failing ({}): {}",
                    proxies.len(),
                    format_subject_list(&proxies, PROXY_FAILURES_LISTED)
                ),
            },
        ));
    }

    let dead = subjects(TransitionKind::DeadAccount);
    if !dead.is_empty() {
        alerts.push((
            AlertKind::DeadAccount,
            AlertPayload {
                title: AlertKind::DeadAccount.title().to_string(),
                message: format!(
                    "Archiving not_found accounts ({}): {}",
                    dead.len(),
                    format_subject_list(&dead, max_listed)
                ),
            },
        ));
    }

    if !warmup_warnings.is_empty() {
        alerts.push((
            AlertKind::Warmup,
            AlertPayload {
                title: AlertKind::Warmup.title().to_string(),
                message: warmup_warnings.join("\n"),
            },
        ));
    }

    alerts
}

/// Writes alerts into the debug log
pub struct LogAlertSink {
    logger: Arc<TrackerLogger>,
}

impl LogAlertSink {
    pub fn new(logger: Arc<TrackerLogger>) -> Self {
        Self { logger }
    }
}

impl Default for LogAlertSink {
    fn default() -> Self {
        Self::new(Arc::new(get_debug_logger()))
    }
}

#[async_trait::async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, _kind: AlertKind, payload: &AlertPayload) -> SinkOutcome {
        self.logger.warn(
            "AlertSink",
            "alert",
            &format!("{}: {}", payload.title, payload.message),
        );
        SinkOutcome::Delivered
    }
}

/// Slack-compatible incoming webhook
#[cfg(feature = "live-http")]
pub struct WebhookAlertSink {
    client: HttpClient,
    url: String,
    username: String,
}

#[cfg(feature = "live-http")]
impl WebhookAlertSink {
    pub fn new(url: &str) -> Result<Self, TrackerError> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TrackerError::SinkError(format!("Failed to create webhook client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
            username: "acctwatch".to_string(),
        })
    }
}

#[cfg(feature = "live-http")]
#[async_trait::async_trait]
impl AlertSink for WebhookAlertSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn publish(&self, _kind: AlertKind, payload: &AlertPayload) -> SinkOutcome {
        let body = serde_json::json!({
            "text": format!("*{}*\n{}", payload.title, payload.message),
            "username": self.username,
        });
        let body = match serde_json::to_vec(&body) {
            Ok(body) => body,
            Err(e) => return SinkOutcome::Failed(format!("Failed to encode payload: {}", e)),
        };

        let request = match Request::post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
        {
            Ok(request) => request,
            Err(e) => return SinkOutcome::Failed(format!("Request creation failed: {}", e)),
        };

        match self.client.send_async(request).await {
            Ok(mut response) => {
                let status = response.status();
                let _ = response.consume().await;
                if status.is_success() {
                    SinkOutcome::Delivered
                } else {
                    SinkOutcome::Failed(format!("Webhook returned HTTP {}", status.as_u16()))
                }
            }
            Err(e) => SinkOutcome::Failed(format!("Webhook request failed: {}", e)),
        }
    }
}

/// One report row per profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub profile_id: String,
    pub username: String,
    pub status: String,
    pub category: String,
    pub total_score: i64,
    pub comment_score: i64,
    pub link_score: i64,
    pub account_age: String,
    pub owner: String,
    /// Credential-free proxy key, "None" without a proxy
    pub proxy: String,
    pub proxy_health: String,
    /// `+N`, `-N` or `0`
    pub score_delta: String,
    #[serde(default)]
    pub warmup_tier: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub checked_at: String,
    #[serde(default)]
    pub archived: bool,
}

impl ReportRow {
    pub fn from_result(result: &AccountResult, now_epoch: i64) -> Self {
        let score_delta = if result.score_change > 0 {
            format!("+{}", result.score_change)
        } else {
            result.score_change.to_string()
        };

        Self {
            profile_id: result.profile.id.clone(),
            username: result.profile.display_name.clone(),
            status: result.status.state.as_str().to_string(),
            category: result.category.clone(),
            total_score: result.status.total_score,
            comment_score: result.status.comment_score,
            link_score: result.status.link_score,
            account_age: format_account_age(result.status.created_at, now_epoch),
            owner: result.profile.owner_label.clone(),
            proxy: result.proxy_key.clone().unwrap_or_else(|| "None".to_string()),
            proxy_health: result.proxy_health.status.as_str().to_string(),
            score_delta,
            warmup_tier: result.warmup_tier.clone(),
            warnings: result.warnings.clone(),
            checked_at: result.checked_at.clone(),
            archived: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub updated: usize,
    pub inserted: usize,
}

#[async_trait::async_trait]
pub trait ReportSink: Send + Sync {
    /// Insert or replace rows keyed by profile id
    ///
    /// An archived row whose account is still not_found stays archived.
    async fn upsert(&self, rows: &[ReportRow]) -> Result<UpsertStats, TrackerError>;

    /// Mark rows whose profile id is not in `valid_ids` as archived
    async fn archive_missing(&self, valid_ids: &HashSet<String>) -> Result<usize, TrackerError>;

    /// Mark rows for the given usernames as archived
    async fn archive_usernames(&self, usernames: &[String]) -> Result<usize, TrackerError>;
}

/// Report kept as a JSON array of rows
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn read_rows(&self) -> Result<Vec<ReportRow>, TrackerError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| TrackerError::SinkError(format!("Report file unreadable: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(TrackerError::SinkError(format!("Report file unreadable: {}", e))),
        }
    }

    async fn write_rows(&self, rows: &[ReportRow]) -> Result<(), TrackerError> {
        let content = serde_json::to_string_pretty(rows)
            .map_err(|e| TrackerError::SinkError(format!("Failed to serialize report: {}", e)))?;
        write_file_atomic(&self.path, content.as_bytes())
            .await
            .map_err(|e| TrackerError::SinkError(format!("Failed to write report: {}", e)))
    }

    async fn archive_where<F>(&self, mut predicate: F) -> Result<usize, TrackerError>
    where
        F: FnMut(&ReportRow) -> bool + Send,
    {
        let mut rows = self.read_rows().await?;
        let mut archived = 0;
        for row in rows.iter_mut().filter(|r| !r.archived) {
            if predicate(row) {
                row.archived = true;
                archived += 1;
            }
        }
        if archived > 0 {
            self.write_rows(&rows).await?;
        }
        Ok(archived)
    }
}

#[async_trait::async_trait]
impl ReportSink for JsonReportSink {
    async fn upsert(&self, rows: &[ReportRow]) -> Result<UpsertStats, TrackerError> {
        let mut existing = self.read_rows().await?;
        let mut stats = UpsertStats::default();

        for row in rows {
            match existing.iter_mut().find(|r| r.profile_id == row.profile_id) {
                Some(slot) => {
                    // A dead account stays archived until it shows up again
                    let keep_archived =
                        slot.archived && row.status == AccountState::NotFound.as_str();
                    *slot = row.clone();
                    slot.archived = keep_archived;
                    stats.updated += 1;
                }
                None => {
                    existing.push(row.clone());
                    stats.inserted += 1;
                }
            }
        }

        self.write_rows(&existing).await?;
        Ok(stats)
    }

    async fn archive_missing(&self, valid_ids: &HashSet<String>) -> Result<usize, TrackerError> {
        self.archive_where(|row| !valid_ids.contains(&row.profile_id))
            .await
    }

    async fn archive_usernames(&self, usernames: &[String]) -> Result<usize, TrackerError> {
        let usernames: HashSet<&str> = usernames.iter().map(String::as_str).collect();
        self.archive_where(|row| usernames.contains(row.username.as_str()))
            .await
    }
}
