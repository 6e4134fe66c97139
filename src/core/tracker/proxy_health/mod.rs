//! Proxy Health Probe
//!
//! Verifies that a resolved proxy can reach the target service with a single
//! lightweight request, retrying only transient transport failures.

pub mod checker;
pub mod client;

pub use checker::{classify_probe_status, ProxyHealthProbe, ProxyHealthSettings};
pub use client::ProxyProbeClient;

#[cfg(feature = "live-http")]
pub use client::IsahcProxyProbeClient;
