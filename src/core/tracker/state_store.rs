//! State Diff Store
//!
//! Owns the single persisted snapshot of the previous run and the pure
//! functions comparing it with the current one.
//!
//! ## File contract
//!
//! ```json
//! {
//!   "accounts": {"user": "active"},
//!   "proxies": {"dataimpulse:gw.dataimpulse.com:10000:10000:1a2b3c4d": "pass"},
//!   "notFoundHistory": {"gone_user": {"firstSeen": "...", "consecutiveDays": 3}},
//!   "takenAt": "2026-03-10T12:00:00+00:00",
//!   "scores": {"user": 120}
//! }
//! ```
//!
//! The schema is additive only: unknown fields are ignored, missing or
//! mistyped maps read as empty and a map entry whose value is not recognized
//! is dropped on its own. A missing or unreadable file is "no prior
//! state", never an error. Writes go to a sibling temp file which is
//! flushed, synced and then renamed over the canonical path.

use crate::core::tracker::debug_logger::{get_debug_logger, TrackerLogger};
use crate::core::tracker::types::{AccountResult, AccountState, ProxyHealthStatus, TrackerError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundEntry {
    /// RFC 3339 time of the first not_found observation
    pub first_seen: String,
    pub consecutive_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(default, deserialize_with = "lenient_map")]
    pub accounts: BTreeMap<String, AccountState>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub proxies: BTreeMap<String, ProxyHealthStatus>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub not_found_history: BTreeMap<String, NotFoundEntry>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<String>,
    /// Last known total score per account
    #[serde(default, deserialize_with = "lenient_map")]
    pub scores: BTreeMap<String, i64>,
}

/// A field of the wrong shape reads as its default instead of failing the whole document
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Per-entry leniency: an unrecognized value drops only its own entry
fn lenient_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Object(entries) = value else {
        return Ok(BTreeMap::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|(key, raw)| V::deserialize(raw).ok().map(|v| (key, v)))
        .collect())
}

impl StateSnapshot {
    /// Snapshot of one run's results
    ///
    /// Proxies are recorded only when a check actually ran. Scores of
    /// accounts that are not live this run carry over from `previous`.
    pub fn from_results(results: &[AccountResult], previous: &StateSnapshot, taken_at: DateTime<Utc>) -> Self {
        let mut snapshot = StateSnapshot {
            taken_at: Some(taken_at.to_rfc3339()),
            ..Default::default()
        };

        for result in results {
            let account_id = result.status.account_id.clone();
            snapshot.accounts.insert(account_id.clone(), result.status.state);

            if result.status.state.is_live() {
                snapshot.scores.insert(account_id, result.status.total_score);
            } else if let Some(score) = previous.scores.get(&account_id) {
                snapshot.scores.insert(account_id, *score);
            }

            if let Some(key) = &result.proxy_key {
                if result.proxy_health.status != ProxyHealthStatus::NotApplicable {
                    snapshot.proxies.insert(key.clone(), result.proxy_health.status);
                }
            }
        }

        snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Ban,
    ProxyFailure,
    DeadAccount,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Ban => "ban",
            TransitionKind::ProxyFailure => "proxy_failure",
            TransitionKind::DeadAccount => "dead_account",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produced and consumed within a single run; never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub kind: TransitionKind,
    pub subject: String,
    pub detail: String,
}

/// Ban and proxy-failure transitions between two snapshots
///
/// Only live -> gone account changes and pass -> fail/blocked proxy changes
/// count; a subject already in a bad state never fires again.
pub fn diff(previous: &StateSnapshot, current: &StateSnapshot) -> Vec<TransitionEvent> {
    let mut events = Vec::new();

    for (account, state) in &current.accounts {
        if let Some(prev_state) = previous.accounts.get(account) {
            if prev_state.is_live() && state.is_gone() {
                events.push(TransitionEvent {
                    kind: TransitionKind::Ban,
                    subject: account.clone(),
                    detail: format!("{}: {} -> {}", account, prev_state, state),
                });
            }
        }
    }

    for (proxy, health) in &current.proxies {
        if previous.proxies.get(proxy) == Some(&ProxyHealthStatus::Pass) && health.is_failing() {
            events.push(TransitionEvent {
                kind: TransitionKind::ProxyFailure,
                subject: proxy.clone(),
                detail: format!("{}: pass -> {}", proxy, health),
            });
        }
    }

    events
}

/// Inclusive calendar-day count (UTC) from `first_seen` to `now`
fn inclusive_days(first_seen: &str, now: DateTime<Utc>) -> Option<u32> {
    let first_seen = DateTime::parse_from_rfc3339(first_seen).ok()?.with_timezone(&Utc);
    let days = (now.date_naive() - first_seen.date_naive()).num_days() + 1;
    u32::try_from(days.max(1)).ok()
}

/// Update not_found history and pick accounts due for archival
///
/// An account is returned the run its count first reaches `threshold_days`.
/// Any state other than not_found deletes the entry, so a recurrence starts
/// again from day 1. Accounts absent from `current` keep their entry.
pub fn track_not_found(
    current: &BTreeMap<String, AccountState>,
    history: &BTreeMap<String, NotFoundEntry>,
    threshold_days: u32,
    now: DateTime<Utc>,
) -> (BTreeMap<String, NotFoundEntry>, Vec<String>) {
    let mut updated = history.clone();
    let mut to_archive = Vec::new();

    for (account, state) in current {
        if *state != AccountState::NotFound {
            updated.remove(account);
            continue;
        }

        let previous_days = updated.get(account).map(|e| e.consecutive_days).unwrap_or(0);
        let entry = match updated
            .get(account)
            .and_then(|e| inclusive_days(&e.first_seen, now).map(|d| (e.first_seen.clone(), d)))
        {
            Some((first_seen, days)) => NotFoundEntry {
                first_seen,
                consecutive_days: days,
            },
            // First sighting, or an entry whose timestamp no longer parses
            None => NotFoundEntry {
                first_seen: now.to_rfc3339(),
                consecutive_days: 1,
            },
        };

        if entry.consecutive_days >= threshold_days && previous_days < threshold_days {
            to_archive.push(account.clone());
        }
        updated.insert(account.clone(), entry);
    }

    (updated, to_archive)
}

/// Archival candidates as dead_account events
pub fn dead_account_events(
    candidates: &[String],
    history: &BTreeMap<String, NotFoundEntry>,
) -> Vec<TransitionEvent> {
    candidates
        .iter()
        .map(|account| {
            let days = history.get(account).map(|e| e.consecutive_days).unwrap_or(0);
            TransitionEvent {
                kind: TransitionKind::DeadAccount,
                subject: account.clone(),
                detail: format!("{}: not_found for {} consecutive day(s)", account, days),
            }
        })
        .collect()
}

/// Reads and atomically replaces the snapshot file
pub struct StateDiffStore {
    path: PathBuf,
    logger: Arc<TrackerLogger>,
}

impl StateDiffStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            logger: Arc::new(get_debug_logger()),
        }
    }

    pub fn with_logger(mut self, logger: Arc<TrackerLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous snapshot, or an empty one when there is none to read
    pub async fn load(&self) -> StateSnapshot {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    self.logger.warn(
                        "StateDiffStore",
                        "load_failed",
                        &format!("Failed to read state file, starting fresh: {}", e),
                    );
                }
                return StateSnapshot::default();
            }
        };

        match serde_json::from_str::<StateSnapshot>(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.logger.warn(
                    "StateDiffStore",
                    "load_failed",
                    &format!("Failed to parse state file, starting fresh: {}", e),
                );
                StateSnapshot::default()
            }
        }
    }

    /// Write the snapshot via a synced sibling temp file and rename
    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<(), TrackerError> {
        let content = serde_json::to_string_pretty(snapshot).map_err(|e| {
            TrackerError::StateFileError(format!("Failed to serialize state: {}", e))
        })?;

        write_file_atomic(&self.path, content.as_bytes())
            .await
            .map_err(|e| TrackerError::StateFileError(format!("Failed to write state file: {}", e)))?;

        self.logger.state_write_summary(
            snapshot.accounts.len(),
            snapshot.proxies.len(),
            snapshot.not_found_history.len(),
        );
        Ok(())
    }
}

/// Replace `path` so readers see either the old or the new content, never a mix
///
/// The temp file lives in the same directory, so the final rename never
/// crosses a filesystem.
pub async fn write_file_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state.json".to_string());
    let temp_path = parent.join(format!(
        ".{}.{}.tmp",
        file_name,
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    ));

    let written = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if written.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    written
}
