use crate::common::{create_temp_dir, IsolatedEnv};
use acctwatch::config::{TrackerConfig, STATE_PATH_ENV_VAR, WEBHOOK_URL_ENV_VAR};
use serial_test::serial;
use std::path::PathBuf;
use std::time::Duration;

#[test]
#[serial]
fn test_missing_file_yields_valid_defaults() {
    let _env = IsolatedEnv::new();
    let temp_dir = create_temp_dir();

    let config = TrackerConfig::load_from(&temp_dir.path().join("absent.toml")).unwrap();

    assert_eq!(config, TrackerConfig::default());
    assert!(config.check().is_ok());
    assert_eq!(config.poller.min_delay_secs, 2.0);
    assert_eq!(config.poller.max_delay_secs, 5.0);
    assert_eq!(config.poller.max_retries, 5);
    assert_eq!(config.proxy_health.max_attempts, 3);
    assert_eq!(config.warmup.alert_ratio, 0.8);
    assert_eq!(config.state.not_found_threshold_days, 7);
    assert!(config.alerts.webhook_url.is_none());
}

#[test]
#[serial]
fn test_partial_toml_overrides_only_given_fields() {
    let _env = IsolatedEnv::new();
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[poller]
min_delay_secs = 0.5
max_delay_secs = 1.5

[state]
path = "/var/lib/acctwatch/state.json"
not_found_threshold_days = 3

[alerts]
webhook_url = "https://hooks.example.com/T000/B000"
"#,
    )
    .unwrap();

    let config = TrackerConfig::load_from(&path).unwrap();

    assert_eq!(config.poller.min_delay_secs, 0.5);
    assert_eq!(config.poller.max_delay_secs, 1.5);
    assert_eq!(config.poller.max_retries, 5);
    assert_eq!(config.state.path, PathBuf::from("/var/lib/acctwatch/state.json"));
    assert_eq!(config.state.not_found_threshold_days, 3);
    assert_eq!(
        config.alerts.webhook_url.as_deref(),
        Some("https://hooks.example.com/T000/B000")
    );
    assert_eq!(config.alerts.max_listed, 5);
    assert!(config.check().is_ok());
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    let env = IsolatedEnv::new();
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[state]\npath = \"/from/file.json\"\n").unwrap();

    env.set(STATE_PATH_ENV_VAR, "/from/env.json");
    env.set(WEBHOOK_URL_ENV_VAR, "  ");

    let config = TrackerConfig::load_from(&path).unwrap();
    assert_eq!(config.state.path, PathBuf::from("/from/env.json"));
    // Blank values are ignored
    assert!(config.alerts.webhook_url.is_none());
}

#[test]
#[serial]
fn test_malformed_toml_is_an_error() {
    let _env = IsolatedEnv::new();
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "[poller\nmin_delay_secs = ").unwrap();

    assert!(TrackerConfig::load_from(&path).is_err());
}

#[test]
fn test_check_rejects_bad_values() {
    let mut inverted = TrackerConfig::default();
    inverted.poller.min_delay_secs = 6.0;
    assert!(inverted.check().is_err());

    let mut fixed = TrackerConfig::default();
    fixed.poller.min_delay_secs = 3.0;
    fixed.poller.max_delay_secs = 3.0;
    assert!(fixed.check().is_err());

    let mut no_retries = TrackerConfig::default();
    no_retries.poller.max_retries = 0;
    assert!(no_retries.check().is_err());

    let mut shrinking = TrackerConfig::default();
    shrinking.proxy_health.backoff_base = 0.5;
    assert!(shrinking.check().is_err());

    let mut ratio = TrackerConfig::default();
    ratio.warmup.alert_ratio = 1.5;
    assert!(ratio.check().is_err());

    let mut threshold = TrackerConfig::default();
    threshold.state.not_found_threshold_days = 0;
    assert!(threshold.check().is_err());

    let mut webhook = TrackerConfig::default();
    webhook.alerts.webhook_url = Some("not a url".to_string());
    assert!(webhook.check().is_err());

    let mut base_url = TrackerConfig::default();
    base_url.poller.base_url = "www.reddit.com".to_string();
    assert!(base_url.check().is_err());
}

#[test]
#[serial]
fn test_init_writes_once_and_round_trips() {
    let _env = IsolatedEnv::new();
    let temp_dir = create_temp_dir();
    let path = temp_dir.path().join("nested").join("config.toml");

    TrackerConfig::init_at(&path).unwrap();
    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("[poller]"));
    assert_eq!(TrackerConfig::load_from(&path).unwrap(), TrackerConfig::default());

    // An existing file is left alone
    std::fs::write(&path, "[warmup]\nalert_ratio = 0.5\n").unwrap();
    TrackerConfig::init_at(&path).unwrap();
    assert_eq!(TrackerConfig::load_from(&path).unwrap().warmup.alert_ratio, 0.5);
}

#[test]
fn test_component_settings_follow_config() {
    let mut config = TrackerConfig::default();
    config.poller.max_retries = 7;
    config.proxy_health.timeout_ms = 2500;
    config.alerts.max_listed = 10;

    assert_eq!(config.poller_settings().max_retries, 7);
    assert_eq!(config.proxy_health_settings().max_attempts, 3);
    let run = config.run_settings();
    assert_eq!(run.proxy_timeout, Duration::from_millis(2500));
    assert_eq!(run.max_listed, 10);
    assert!(run.limit.is_none());
}
