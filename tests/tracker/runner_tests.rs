/*!
End-to-end tracking cycles against scripted clients.
*/

use crate::common::{
    active_page, create_temp_dir, listing_item, page, profile, ScriptedProxyClient,
    ScriptedStatusClient,
};
use acctwatch::core::tracker::profiles::{ProfileSource, StaticProfileSource};
use acctwatch::core::tracker::proxy_health::{ProxyHealthProbe, ProxyHealthSettings};
use acctwatch::core::tracker::runner::{RunSettings, Tracker};
use acctwatch::core::tracker::shadow_probe::ShadowVisibilityProbe;
use acctwatch::core::tracker::sinks::{
    AlertKind, AlertPayload, AlertSink, JsonReportSink, SinkOutcome,
};
use acctwatch::core::tracker::state_store::{StateDiffStore, TransitionKind};
use acctwatch::core::tracker::status_client::{ListingItem, ListingKind, PageResponse, StatusClient};
use acctwatch::core::tracker::status_poller::{PollerSettings, ResilientStatusPoller};
use acctwatch::core::tracker::timing::{FixedJitter, RecordingSleeper};
use acctwatch::core::tracker::types::{
    AccountState, Profile, ProxyHealthStatus, TrackerError, TransportError,
};
use acctwatch::core::tracker::TrackerLogger;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex};

const ALICE_PROXY: &str = "http://user__cr.us:pw@gw.dataimpulse.com:10000";
const ALICE_PROXY_HOST: &str = "gw.dataimpulse.com";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap()
}

fn days_ago(days: i64) -> f64 {
    (now() - Duration::days(days)).timestamp() as f64
}

/// Collects every published alert
#[derive(Default)]
struct RecordingAlertSink {
    published: Mutex<Vec<(AlertKind, AlertPayload)>>,
}

impl RecordingAlertSink {
    fn kinds(&self) -> Vec<AlertKind> {
        self.published.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    fn message(&self, kind: AlertKind) -> Option<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, p)| p.message.clone())
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingAlertSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, kind: AlertKind, payload: &AlertPayload) -> SinkOutcome {
        self.published.lock().unwrap().push((kind, payload.clone()));
        SinkOutcome::Delivered
    }
}

struct FailingAlertSink;

#[async_trait::async_trait]
impl AlertSink for FailingAlertSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn publish(&self, _kind: AlertKind, _payload: &AlertPayload) -> SinkOutcome {
        SinkOutcome::Failed("webhook returned HTTP 500".to_string())
    }
}

struct UnreachableProfileSource;

#[async_trait::async_trait]
impl ProfileSource for UnreachableProfileSource {
    async fn list_profiles(&self) -> Result<Vec<Profile>, TrackerError> {
        Err(TrackerError::ProfileSourceError("connection refused".to_string()))
    }
}

/// Delegates to a scripted client but blows up for one account
struct PanickingStatusClient {
    inner: Arc<ScriptedStatusClient>,
    poison: &'static str,
}

#[async_trait::async_trait]
impl StatusClient for PanickingStatusClient {
    async fn get_account_page(&self, account_id: &str) -> Result<PageResponse, TransportError> {
        if account_id == self.poison {
            panic!("malformed page for {}", account_id);
        }
        self.inner.get_account_page(account_id).await
    }

    async fn get_listing(
        &self,
        account_id: &str,
        kind: ListingKind,
    ) -> Result<Vec<ListingItem>, TransportError> {
        self.inner.get_listing(account_id, kind).await
    }

    async fn get_submission_by_ref(&self, reference: &str) -> Result<u16, TransportError> {
        self.inner.get_submission_by_ref(reference).await
    }
}

fn tracker(
    profiles: Arc<dyn ProfileSource>,
    status_client: Arc<dyn StatusClient>,
    proxy_client: Arc<ScriptedProxyClient>,
    state_path: &Path,
    settings: RunSettings,
) -> Tracker {
    let logger = Arc::new(TrackerLogger::disabled());
    let sleeper = Arc::new(RecordingSleeper::new());
    let jitter = Arc::new(FixedJitter(0.0));

    let poller = ResilientStatusPoller::new(Arc::clone(&status_client), PollerSettings::default())
        .with_sleeper(sleeper.clone())
        .with_jitter(jitter.clone())
        .with_logger(logger.clone());
    let shadow = ShadowVisibilityProbe::new(status_client, 2.0, 5.0)
        .with_sleeper(sleeper.clone())
        .with_jitter(jitter.clone())
        .with_logger(logger.clone());
    let proxy_probe = ProxyHealthProbe::new(proxy_client, ProxyHealthSettings::default())
        .with_sleeper(sleeper)
        .with_jitter(jitter)
        .with_logger(logger.clone());
    let store = StateDiffStore::new(state_path.to_path_buf()).with_logger(logger.clone());

    Tracker::new(profiles, poller, shadow, proxy_probe, store, settings).with_logger(logger)
}

#[tokio::test]
async fn test_full_cycle_classifies_persists_and_reports() {
    let temp_dir = create_temp_dir();
    let state_path = temp_dir.path().join("last_run_state.json");
    let report_path = temp_dir.path().join("report.json");

    let mut client = ScriptedStatusClient::new();
    client.set_listing(
        "alice",
        ListingKind::Comments,
        Ok(vec![
            listing_item("c1", now().timestamp() as f64 - 60.0),
            listing_item("c2", now().timestamp() as f64 - 120.0),
            listing_item("c3", now().timestamp() as f64 - 180.0),
        ]),
    );
    client.set_listing("dave", ListingKind::Submitted, Ok(vec![listing_item("t3_dave", 0.0)]));
    client.set_lookup("t3_dave", Ok(404));
    client.push_page("alice", Ok(active_page(40, days_ago(3))));
    client.push_page("bob", Ok(page(404)));
    client.push_page("carol", Ok(page(403)));
    client.push_page("dave", Ok(active_page(900, days_ago(400))));

    let mut carol = profile("p3", "carol", "");
    carol.free_text_notes = "Banned in March".to_string();
    let profiles = vec![
        profile("p1", "alice", ALICE_PROXY),
        profile("p2", "bob", ""),
        carol,
        profile("p4", "dave", "None"),
    ];

    let alerts = Arc::new(RecordingAlertSink::default());
    let report = Arc::new(JsonReportSink::new(report_path.clone()));
    let tracker = tracker(
        Arc::new(StaticProfileSource::new(profiles)),
        Arc::new(client),
        Arc::new(ScriptedProxyClient::new()),
        &state_path,
        RunSettings::default(),
    )
    .with_alert_sink(alerts.clone())
    .with_report_sink(report.clone());

    let summary = tracker.run(now()).await.expect("run");

    let states: Vec<AccountState> = summary.results.iter().map(|r| r.status.state).collect();
    assert_eq!(
        states,
        vec![
            AccountState::Active,
            AccountState::NotFound,
            AccountState::Suspended,
            AccountState::Shadowbanned,
        ]
    );
    let categories: Vec<&str> = summary.results.iter().map(|r| r.category.as_str()).collect();
    assert_eq!(categories, vec!["active", "not_found", "known_suspended", "shadowbanned"]);

    let alice = &summary.results[0];
    assert_eq!(alice.warmup_tier.as_deref(), Some("new"));
    assert_eq!(alice.warnings, vec!["EXCEEDED: alice has 3 comments (limit: 3)".to_string()]);
    assert_eq!(alice.proxy_health.status, ProxyHealthStatus::Pass);
    assert!(alice.proxy_key.is_some());
    assert_eq!(summary.results[1].proxy_health.status, ProxyHealthStatus::NotApplicable);
    // Shadowbanned accounts are not checked for activity
    assert!(summary.results[3].activity.is_none());

    assert!(summary.events.is_empty());
    assert_eq!(summary.total_score, 940);
    assert_eq!(summary.by_category.get("active"), Some(&1));
    assert_eq!(summary.by_owner["owner-a"].total_score, 940);
    assert!(summary.state_saved);
    assert_eq!(summary.sink_failures, 0);
    assert_eq!(alerts.kinds(), vec![AlertKind::Warmup]);

    let stats = summary.report.expect("report stats");
    assert_eq!((stats.updated, stats.inserted), (0, 4));
    let rows = report.read_rows().await.unwrap();
    assert_eq!(rows[0].proxy, alice.proxy_key.clone().unwrap());
    assert_eq!(rows[1].proxy, "None");

    let saved = StateDiffStore::new(state_path)
        .with_logger(Arc::new(TrackerLogger::disabled()))
        .load()
        .await;
    assert_eq!(saved.accounts.len(), 4);
    assert_eq!(saved.accounts["dave"], AccountState::Shadowbanned);
    assert_eq!(saved.proxies.len(), 1);
    assert_eq!(saved.not_found_history["bob"].consecutive_days, 1);
    assert_eq!(saved.scores.get("alice"), Some(&40));
    assert_eq!(saved.taken_at, Some(now().to_rfc3339()));
}

#[tokio::test]
async fn test_second_cycle_emits_ban_and_proxy_failure() {
    let temp_dir = create_temp_dir();
    let state_path = temp_dir.path().join("state.json");

    let client = ScriptedStatusClient::new();
    client.push_page("alice", Ok(active_page(100, days_ago(90))));
    client.push_page("alice", Ok(active_page(130, days_ago(90))));
    client.push_page("bob", Ok(active_page(10, days_ago(90))));
    client.push_page("bob", Ok(page(403)));

    let mut proxy_client = ScriptedProxyClient::new();
    proxy_client.script(ALICE_PROXY_HOST, vec![Ok(200), Ok(403)]);

    let alerts = Arc::new(RecordingAlertSink::default());
    let tracker = tracker(
        Arc::new(StaticProfileSource::new(vec![
            profile("p1", "alice", ALICE_PROXY),
            profile("p2", "bob", ""),
        ])),
        Arc::new(client),
        Arc::new(proxy_client),
        &state_path,
        RunSettings::default(),
    )
    .with_alert_sink(alerts.clone());

    let first = tracker.run(now()).await.unwrap();
    assert!(first.events.is_empty());
    assert!(alerts.kinds().is_empty());

    let second = tracker.run(now() + Duration::days(1)).await.unwrap();
    let kinds: Vec<TransitionKind> = second.events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![TransitionKind::Ban, TransitionKind::ProxyFailure]);
    assert_eq!(second.events[0].subject, "bob");
    assert_eq!(second.events[0].detail, "bob: active -> suspended");
    assert_eq!(second.results[0].score_change, 30);
    assert_eq!(second.results[0].proxy_health.status, ProxyHealthStatus::Blocked);
    assert_eq!(second.results[1].score_change, 0);

    assert_eq!(alerts.kinds(), vec![AlertKind::Ban, AlertKind::ProxyFailure]);
    assert_eq!(alerts.message(AlertKind::Ban).as_deref(), Some("New bans (1): bob"));

    // A third identical cycle does not re-fire anything
    let third = tracker.run(now() + Duration::days(2)).await.unwrap();
    assert!(third.events.is_empty());
}

#[tokio::test]
async fn test_one_failing_account_does_not_abort_the_cycle() {
    let temp_dir = create_temp_dir();
    let inner = Arc::new(ScriptedStatusClient::new());
    inner.push_page("alice", Ok(page(404)));
    inner.push_page("carol", Ok(active_page(5, days_ago(60))));

    let tracker = tracker(
        Arc::new(StaticProfileSource::new(vec![
            profile("p1", "alice", ""),
            profile("p2", "boom", ""),
            profile("p3", "carol", ""),
        ])),
        Arc::new(PanickingStatusClient {
            inner: inner.clone(),
            poison: "boom",
        }),
        Arc::new(ScriptedProxyClient::new()),
        &temp_dir.path().join("state.json"),
        RunSettings::default(),
    );

    let summary = tracker.run(now()).await.expect("run survives");

    assert_eq!(summary.results.len(), 3);
    let boom = &summary.results[1];
    assert_eq!(boom.status.state, AccountState::Error);
    assert!(boom
        .status
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("malformed page for boom"));
    assert_eq!(summary.results[2].status.state, AccountState::Active);
    assert_eq!(inner.page_calls("carol"), 1);
    assert!(summary.state_saved);
}

#[tokio::test]
async fn test_unreachable_profile_source_is_fatal() {
    let temp_dir = create_temp_dir();
    let state_path = temp_dir.path().join("state.json");
    let client = Arc::new(ScriptedStatusClient::new());

    let tracker = tracker(
        Arc::new(UnreachableProfileSource),
        client.clone(),
        Arc::new(ScriptedProxyClient::new()),
        &state_path,
        RunSettings::default(),
    );

    let result = tracker.run(now()).await;
    assert!(matches!(result, Err(TrackerError::ProfileSourceError(_))));
    assert!(!state_path.exists());
}

#[tokio::test]
async fn test_limit_checks_only_first_profiles() {
    let temp_dir = create_temp_dir();
    let client = Arc::new(ScriptedStatusClient::new());
    for name in ["a", "b", "c"] {
        client.push_page(name, Ok(page(404)));
    }

    let tracker = tracker(
        Arc::new(StaticProfileSource::new(vec![
            profile("p1", "a", ""),
            profile("p2", "b", ""),
            profile("p3", "c", ""),
        ])),
        client.clone(),
        Arc::new(ScriptedProxyClient::new()),
        &temp_dir.path().join("state.json"),
        RunSettings {
            limit: Some(2),
            ..Default::default()
        },
    );

    let summary = tracker.run(now()).await.unwrap();
    assert_eq!(summary.profiles_total, 3);
    assert_eq!(summary.results.len(), 2);
    assert_eq!(client.page_calls("c"), 0);
}

#[tokio::test]
async fn test_dead_accounts_are_alerted_and_archived() {
    let temp_dir = create_temp_dir();
    let report_path = temp_dir.path().join("report.json");
    let client = Arc::new(ScriptedStatusClient::new());
    client.push_page("ghost", Ok(page(404)));
    client.push_page("alice", Ok(active_page(5, days_ago(60))));

    let report = Arc::new(JsonReportSink::new(report_path));
    let alerts = Arc::new(RecordingAlertSink::default());
    let tracker = tracker(
        Arc::new(StaticProfileSource::new(vec![
            profile("p1", "ghost", ""),
            profile("p2", "alice", ""),
        ])),
        client,
        Arc::new(ScriptedProxyClient::new()),
        &temp_dir.path().join("state.json"),
        RunSettings {
            not_found_threshold_days: 2,
            ..Default::default()
        },
    )
    .with_alert_sink(alerts.clone())
    .with_report_sink(report.clone());

    let first = tracker.run(now()).await.unwrap();
    assert!(first.archival_candidates.is_empty());

    let second = tracker.run(now() + Duration::days(1)).await.unwrap();
    assert_eq!(second.archival_candidates, vec!["ghost".to_string()]);
    assert_eq!(second.events.len(), 1);
    assert_eq!(second.events[0].kind, TransitionKind::DeadAccount);
    assert_eq!(
        alerts.message(AlertKind::DeadAccount).as_deref(),
        Some("Archiving not_found accounts (1): ghost")
    );

    let rows = report.read_rows().await.unwrap();
    let archived: Vec<&str> = rows.iter().filter(|r| r.archived).map(|r| r.username.as_str()).collect();
    assert_eq!(archived, vec!["ghost"]);

    // Already archived; the third day does not alert again
    let third = tracker.run(now() + Duration::days(2)).await.unwrap();
    assert!(third.archival_candidates.is_empty());
    assert!(third.events.is_empty());

    // The still-dead row is refreshed but stays archived
    let rows = report.read_rows().await.unwrap();
    let ghost = rows.iter().find(|r| r.username == "ghost").unwrap();
    assert_eq!(ghost.status, "not_found");
    assert!(ghost.archived);
    assert!(!rows.iter().find(|r| r.username == "alice").unwrap().archived);
}

#[tokio::test]
async fn test_sink_and_state_failures_are_not_fatal() {
    let temp_dir = create_temp_dir();
    // A directory where the state file should be; the rename cannot replace it
    let state_path = temp_dir.path().join("state_dir");
    std::fs::create_dir(&state_path).unwrap();
    let report_path = temp_dir.path().join("report.json");
    std::fs::write(&report_path, "{corrupt").unwrap();

    let client = Arc::new(ScriptedStatusClient::new());
    client.push_page("alice", Ok(active_page(10, days_ago(60))));

    let tracker = tracker(
        Arc::new(StaticProfileSource::new(vec![profile("p1", "alice", "")])),
        client,
        Arc::new(ScriptedProxyClient::new()),
        &state_path,
        RunSettings::default(),
    )
    .with_alert_sink(Arc::new(FailingAlertSink))
    .with_report_sink(Arc::new(JsonReportSink::new(report_path)));

    let summary = tracker.run(now()).await.expect("run completes");

    assert!(!summary.state_saved);
    assert!(summary.report.is_none());
    assert_eq!(summary.results[0].status.state, AccountState::Active);
    // Report upsert failed; no alerts were due
    assert_eq!(summary.sink_failures, 1);
}
