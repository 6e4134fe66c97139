//! Shared isahc plumbing for the live clients

use crate::core::tracker::types::{TransportError, TransportErrorKind};
use isahc::error::ErrorKind;
use isahc::http::HeaderMap;
use std::collections::HashMap;

/// Map an isahc failure onto the retry classes used by the poller and probes
pub fn classify_isahc_error(error: &isahc::Error) -> TransportError {
    let message = error.to_string();

    // curl reports a rejected CONNECT as a generic failure carrying the code
    if message.contains("407") {
        return TransportError::new(TransportErrorKind::ProxyAuth, message);
    }

    let kind = match error.kind() {
        ErrorKind::Timeout => TransportErrorKind::Timeout,
        ErrorKind::ConnectionFailed | ErrorKind::NameResolution | ErrorKind::Io => {
            TransportErrorKind::Connect
        }
        ErrorKind::InvalidCredentials => TransportErrorKind::ProxyAuth,
        ErrorKind::ClientInitialization | ErrorKind::InvalidRequest => {
            TransportErrorKind::InvalidProxy
        }
        _ => TransportErrorKind::Other,
    };
    TransportError::new(kind, message)
}

/// Collect response headers with lowercased names
pub fn collect_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut collected = HashMap::new();
    for (key, value) in headers {
        if let Ok(value_str) = value.to_str() {
            collected.insert(key.as_str().to_lowercase(), value_str.to_string());
        }
    }
    collected
}
