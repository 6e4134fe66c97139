use crate::common::profile;
use acctwatch::core::tracker::audit::{audit_profiles, audit_proxy, detect_shared_sessions, AuditIssue};
use acctwatch::core::tracker::proxy_config::resolve;

const STICKY_US: &str = "http://user__cr.us:pw@gw.dataimpulse.com:10001";
const STICKY_NO_GEO: &str = "http://user:pw@gw.dataimpulse.com:10002";
const ROTATING_US: &str = "http://user__cr.us:pw@gw.dataimpulse.com:823";

#[test]
fn test_audit_proxy_issues() {
    assert_eq!(audit_proxy(None), vec![AuditIssue::NoProxy]);
    assert!(audit_proxy(Some(&resolve(STICKY_US))).is_empty());
    assert_eq!(
        audit_proxy(Some(&resolve(ROTATING_US))),
        vec![AuditIssue::RotatingProxy]
    );
    assert_eq!(
        audit_proxy(Some(&resolve(STICKY_NO_GEO))),
        vec![AuditIssue::NoGeoTargeting]
    );
}

#[test]
fn test_shared_sessions_only_counts_duplicates() {
    let a = resolve(STICKY_US);
    let b = resolve(STICKY_US);
    let c = resolve(STICKY_NO_GEO);
    let rotating = resolve(ROTATING_US);

    let shared = detect_shared_sessions(vec![
        ("alice", Some(&a)),
        ("bob", Some(&b)),
        ("carol", Some(&c)),
        ("dave", Some(&rotating)),
        ("erin", Some(&rotating)),
        ("frank", None),
    ]);

    assert_eq!(shared.len(), 1);
    assert_eq!(
        shared.get("dataimpulse_gw.dataimpulse.com_10001"),
        Some(&vec!["alice".to_string(), "bob".to_string()])
    );
}

#[test]
fn test_audit_profiles_report() {
    let profiles = vec![
        profile("p1", "alice", STICKY_US),
        profile("p2", "bob", STICKY_US),
        profile("p3", "carol", ""),
        profile("p4", "dave", "None"),
        profile("p5", "erin", ROTATING_US),
        profile("p6", "frank", STICKY_NO_GEO),
        profile("p7", "grace", "http://user__cr.de:pw@gw.dataimpulse.com:10099"),
    ];

    let report = audit_profiles(&profiles);

    assert_eq!(report.total_profiles, 7);
    assert_eq!(report.no_proxy_count, 2);
    assert_eq!(report.rotating_proxy_count, 1);
    assert_eq!(report.no_geo_count, 1);
    assert_eq!(report.shared_proxy_count, 2);
    assert_eq!(report.shared_sessions.len(), 1);
    // grace is the only clean profile
    assert_eq!(report.profiles_with_issues, 6);

    let alice = &report.results[0];
    assert_eq!(alice.provider, "dataimpulse");
    assert_eq!(alice.session_type, "sticky");
    assert_eq!(alice.session_id.as_deref(), Some("10001"));
    assert_eq!(alice.issues, vec![AuditIssue::SharedSession]);

    let carol = &report.results[2];
    assert_eq!(carol.provider, "none");
    assert_eq!(carol.issues, vec![AuditIssue::NoProxy]);

    assert!(report.results[6].issues.is_empty());
}

#[test]
fn test_audit_issue_serializes_as_screaming_snake() {
    let json = serde_json::to_string(&vec![AuditIssue::NoGeoTargeting, AuditIssue::NoProxy]).unwrap();
    assert_eq!(json, r#"["NO_GEO_TARGETING","NO_PROXY"]"#);
    assert_eq!(AuditIssue::RotatingProxy.as_str(), "ROTATING_PROXY");
}
