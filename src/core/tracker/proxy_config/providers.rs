//! Provider table and per-provider username rules
//!
//! Providers are matched against the proxy host in table order; the first
//! entry whose domain pattern appears in the host wins. Adding a provider
//! means adding a table row and a classifier function.

use super::{ProxyConfig, ProxyProvider, SessionType};

/// One row of the provider table
pub struct ProviderRule {
    pub provider: ProxyProvider,
    /// Lowercase host substrings identifying the provider
    pub domains: &'static [&'static str],
    /// Fills session and geo fields from port and username tokens
    pub classify: fn(&mut ProxyConfig),
}

pub static PROVIDER_TABLE: &[ProviderRule] = &[
    ProviderRule {
        provider: ProxyProvider::Decodo,
        domains: &["decodo.com", "smartproxy.com"],
        classify: classify_decodo,
    },
    ProviderRule {
        provider: ProxyProvider::BrightData,
        domains: &["brightdata.com", "brd.superproxy.io", "luminati.io"],
        classify: classify_brightdata,
    },
    ProviderRule {
        provider: ProxyProvider::DataImpulse,
        domains: &["dataimpulse.com"],
        classify: classify_dataimpulse,
    },
];

/// First table row matching the host
pub fn match_provider(host: &str) -> Option<&'static ProviderRule> {
    let host = host.to_ascii_lowercase();
    PROVIDER_TABLE
        .iter()
        .find(|rule| rule.domains.iter().any(|domain| host.contains(domain)))
}

const DATAIMPULSE_ROTATING_PORT: u16 = 823;
const DATAIMPULSE_STICKY_PORT_FLOOR: u16 = 10_000;
const DECODO_ROTATING_PORT: u16 = 7000;

/// DataImpulse: `user__cr.us;state.california;city.x;zip.y[-sess_name]`
///
/// Port 823 rotates, ports from 10000 up are sticky sessions named by port.
fn classify_dataimpulse(config: &mut ProxyConfig) {
    match config.port {
        Some(DATAIMPULSE_ROTATING_PORT) => set_rotating(config),
        Some(port) if port >= DATAIMPULSE_STICKY_PORT_FLOOR => {
            set_sticky(config, port.to_string())
        }
        _ => config.session_type = SessionType::Unknown,
    }

    let username = config.username.clone().unwrap_or_default();
    let Some((_, params)) = username.split_once("__") else {
        return;
    };

    let params = match params.rsplit_once("-sess_") {
        Some((params, session)) => {
            set_sticky(config, format!("sess_{}", session));
            params
        }
        None => params,
    };

    for token in params.split(';') {
        if let Some(country) = token.strip_prefix("cr.") {
            config.geo.country = non_empty(country);
        } else if let Some(state) = token.strip_prefix("state.") {
            config.geo.state = non_empty(state);
        } else if let Some(city) = token.strip_prefix("city.") {
            config.geo.city = non_empty(city);
        } else if let Some(zip) = token.strip_prefix("zip.") {
            config.geo.zip = non_empty(zip);
        }
    }
}

/// `sessionduration_30` / `sessionduration-30` -> `duration_30`
fn session_duration(username: &str) -> Option<String> {
    let (_, tail) = username.split_once("sessionduration")?;
    let tail = tail.strip_prefix(|c: char| c == '_' || c == '-')?;
    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    non_empty(&digits).map(|d| format!("duration_{}", d))
}

/// Decodo: `user-sp1-country-us-sessionduration-30`
///
/// A `sessionduration` parameter with a value pins the session; otherwise
/// port 7000 rotates and every other port is its own sticky session.
fn classify_decodo(config: &mut ProxyConfig) {
    let username = config.username.clone().unwrap_or_default().to_lowercase();

    if let Some(session) = session_duration(&username) {
        set_sticky(config, session);
    } else {
        match config.port {
            Some(DECODO_ROTATING_PORT) => set_rotating(config),
            Some(port) => set_sticky(config, port.to_string()),
            None => config.session_type = SessionType::Unknown,
        }
    }

    config.geo.country = dash_param(&username, "country");
}

/// Bright Data: `brd-customer-c1-zone-res-country-us-session-abc123`
fn classify_brightdata(config: &mut ProxyConfig) {
    let username = config.username.clone().unwrap_or_default().to_lowercase();

    match dash_param(&username, "session") {
        Some(session) => set_sticky(config, session),
        None => set_rotating(config),
    }

    config.geo.country = dash_param(&username, "country");
}

/// Value following `name` in a `-`-delimited token stream
fn dash_param(username: &str, name: &str) -> Option<String> {
    let mut tokens = username.split('-');
    while let Some(token) = tokens.next() {
        if token == name {
            return tokens
                .next()
                .map(|v| v.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_'))
                .and_then(non_empty);
        }
    }
    None
}

fn set_rotating(config: &mut ProxyConfig) {
    config.session_type = SessionType::Rotating;
    config.session_id = None;
}

fn set_sticky(config: &mut ProxyConfig, session_id: String) {
    config.session_type = SessionType::Sticky;
    config.session_id = Some(session_id);
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
