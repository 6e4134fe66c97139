//! Account categorization and proxy configuration audit

use crate::core::tracker::proxy_config::{resolve_optional, ProxyConfig, ProxyProvider, SessionType};
use crate::core::tracker::types::{AccountState, Profile};
use serde::Serialize;
use std::collections::BTreeMap;

const NOT_CREATED_KEYWORDS: &[&str] = &[
    "need to create",
    "needs to be created",
    "need to login",
    "free space",
];
const KNOWN_SUSPENDED_KEYWORDS: &[&str] = &["suspend", "banned"];
const NEEDS_FARMING_KEYWORDS: &[&str] = &["needs to be farmed", "farming", "ready account"];

fn mentions_any(notes: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| notes.contains(keyword))
}

/// Report category from the remote state, refined by the profile notes
///
/// The remote state always wins over notes; notes only add detail.
pub fn categorize_account(notes: &str, state: AccountState) -> String {
    let notes = notes.to_lowercase();

    match state {
        AccountState::Active => {
            if mentions_any(&notes, NEEDS_FARMING_KEYWORDS) {
                "needs_farming".to_string()
            } else {
                "active".to_string()
            }
        }
        AccountState::NotFound | AccountState::Suspended => {
            if mentions_any(&notes, NOT_CREATED_KEYWORDS) {
                "not_created".to_string()
            } else if mentions_any(&notes, KNOWN_SUSPENDED_KEYWORDS) {
                "known_suspended".to_string()
            } else {
                state.as_str().to_string()
            }
        }
        other => other.as_str().to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditIssue {
    NoProxy,
    RotatingProxy,
    NoGeoTargeting,
    SharedSession,
}

impl AuditIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditIssue::NoProxy => "NO_PROXY",
            AuditIssue::RotatingProxy => "ROTATING_PROXY",
            AuditIssue::NoGeoTargeting => "NO_GEO_TARGETING",
            AuditIssue::SharedSession => "SHARED_SESSION",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileAudit {
    pub profile_id: String,
    pub account_id: String,
    pub owner: String,
    pub provider: String,
    pub session_type: String,
    pub session_id: Option<String>,
    pub issues: Vec<AuditIssue>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub total_profiles: usize,
    pub profiles_with_issues: usize,
    pub no_proxy_count: usize,
    pub rotating_proxy_count: usize,
    pub no_geo_count: usize,
    /// Profiles sitting in a shared sticky session
    pub shared_proxy_count: usize,
    /// `provider_host_session` -> account ids, only sessions used more than once
    pub shared_sessions: BTreeMap<String, Vec<String>>,
    pub results: Vec<ProfileAudit>,
}

/// Issues detectable from one profile's proxy alone
pub fn audit_proxy(proxy: Option<&ProxyConfig>) -> Vec<AuditIssue> {
    let Some(proxy) = proxy else {
        return vec![AuditIssue::NoProxy];
    };

    let mut issues = Vec::new();
    if proxy.session_type == SessionType::Rotating {
        issues.push(AuditIssue::RotatingProxy);
    }
    if proxy.provider == ProxyProvider::DataImpulse && proxy.geo.country.is_none() {
        issues.push(AuditIssue::NoGeoTargeting);
    }
    issues
}

/// Sticky sessions claimed by more than one profile
pub fn detect_shared_sessions<'a>(
    entries: impl IntoIterator<Item = (&'a str, Option<&'a ProxyConfig>)>,
) -> BTreeMap<String, Vec<String>> {
    let mut sessions: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (account_id, proxy) in entries {
        if let Some(key) = proxy.and_then(ProxyConfig::session_key) {
            sessions.entry(key).or_default().push(account_id.to_string());
        }
    }
    sessions.retain(|_, accounts| accounts.len() > 1);
    sessions
}

pub fn audit_profiles(profiles: &[Profile]) -> AuditReport {
    let resolved: Vec<(&Profile, Option<ProxyConfig>)> = profiles
        .iter()
        .map(|p| (p, resolve_optional(&p.proxy_connection_string)))
        .collect();

    let shared_sessions = detect_shared_sessions(
        resolved
            .iter()
            .map(|(profile, proxy)| (profile.display_name.as_str(), proxy.as_ref())),
    );

    let mut report = AuditReport {
        total_profiles: profiles.len(),
        ..Default::default()
    };

    for (profile, proxy) in &resolved {
        let mut issues = audit_proxy(proxy.as_ref());
        let shared = proxy
            .as_ref()
            .and_then(|p| p.session_key())
            .is_some_and(|key| shared_sessions.contains_key(&key));
        if shared {
            issues.push(AuditIssue::SharedSession);
            report.shared_proxy_count += 1;
        }

        if !issues.is_empty() {
            report.profiles_with_issues += 1;
        }
        for issue in &issues {
            match issue {
                AuditIssue::NoProxy => report.no_proxy_count += 1,
                AuditIssue::RotatingProxy => report.rotating_proxy_count += 1,
                AuditIssue::NoGeoTargeting => report.no_geo_count += 1,
                AuditIssue::SharedSession => {}
            }
        }

        report.results.push(ProfileAudit {
            profile_id: profile.id.clone(),
            account_id: profile.display_name.clone(),
            owner: profile.owner_label.clone(),
            provider: proxy
                .as_ref()
                .map(|p| p.provider.as_str())
                .unwrap_or("none")
                .to_string(),
            session_type: proxy
                .as_ref()
                .map(|p| p.session_type.as_str())
                .unwrap_or("none")
                .to_string(),
            session_id: proxy.as_ref().and_then(|p| p.session_id.clone()),
            issues,
        });
    }

    report.shared_sessions = shared_sessions;
    report
}
