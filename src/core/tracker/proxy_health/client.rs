//! Proxy Probe Client
//!
//! Issues one GET through a given proxy and reports the status code. The
//! proxy URI and its credentials are handed to the HTTP client separately,
//! so credentials are never re-encoded into an assembled URL.

use crate::core::tracker::proxy_config::ProxyConfig;
use crate::core::tracker::types::TransportError;

#[cfg(feature = "live-http")]
use crate::core::tracker::http::classify_isahc_error;
#[cfg(feature = "live-http")]
use crate::core::tracker::proxy_config::{build_proxy_url, ConnectionParts};
#[cfg(feature = "live-http")]
use crate::core::tracker::types::{TrackerError, TransportErrorKind};
#[cfg(feature = "live-http")]
use isahc::auth::{Authentication, Credentials};
#[cfg(feature = "live-http")]
use isahc::config::{Configurable, RedirectPolicy};
#[cfg(feature = "live-http")]
use isahc::{AsyncReadResponseExt, HttpClient, Request};
#[cfg(feature = "live-http")]
use std::time::Duration;

/// GET through a proxy, for dependency injection and testing
#[async_trait::async_trait]
pub trait ProxyProbeClient: Send + Sync {
    /// Returns the HTTP status the target answered with through `proxy`
    async fn get_via_proxy(
        &self,
        proxy: &ProxyConfig,
        url: &str,
        timeout_ms: u64,
    ) -> Result<u16, TransportError>;
}

/// Production probe client using isahc
#[cfg(feature = "live-http")]
pub struct IsahcProxyProbeClient {
    client: HttpClient,
    user_agent: String,
}

#[cfg(feature = "live-http")]
impl IsahcProxyProbeClient {
    pub fn new(user_agent: &str) -> Result<Self, TrackerError> {
        let client = HttpClient::builder()
            .redirect_policy(RedirectPolicy::None)
            .build()
            .map_err(|e| {
                TrackerError::HttpError(format!("Failed to create proxy probe client: {}", e))
            })?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }
}

#[cfg(feature = "live-http")]
#[async_trait::async_trait]
impl ProxyProbeClient for IsahcProxyProbeClient {
    async fn get_via_proxy(
        &self,
        proxy: &ProxyConfig,
        url: &str,
        timeout_ms: u64,
    ) -> Result<u16, TransportError> {
        let proxy_uri = build_proxy_url(&ConnectionParts {
            scheme: proxy.scheme.clone(),
            username: None,
            password: None,
            host: proxy.host.clone(),
            port: proxy.port,
        })
        .parse::<isahc::http::Uri>()
        .map_err(|e| {
            TransportError::new(
                TransportErrorKind::InvalidProxy,
                format!("Invalid proxy address: {}", e),
            )
        })?;

        let mut builder = Request::get(url)
            .timeout(Duration::from_millis(timeout_ms))
            .proxy(Some(proxy_uri))
            .header("User-Agent", self.user_agent.as_str());

        if let Some(username) = &proxy.username {
            builder = builder
                .proxy_authentication(Authentication::basic())
                .proxy_credentials(Credentials::new(
                    username.as_str(),
                    proxy.password.clone().unwrap_or_default(),
                ));
        }

        let request = builder.body(Vec::new()).map_err(|e| {
            TransportError::new(
                TransportErrorKind::InvalidProxy,
                format!("Request creation failed: {}", e),
            )
        })?;

        let mut response = self
            .client
            .send_async(request)
            .await
            .map_err(|e| classify_isahc_error(&e))?;

        let status = response.status().as_u16();
        // Drain so the connection can be reused
        let _ = response.consume().await;
        Ok(status)
    }
}
