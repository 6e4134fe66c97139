pub mod audit;
pub mod debug_logger;
#[cfg(feature = "live-http")]
pub mod http;
pub mod profiles;
pub mod proxy_config;
pub mod proxy_health;
pub mod runner;
pub mod shadow_probe;
pub mod sinks;
pub mod state_store;
pub mod status_client;
pub mod status_poller;
pub mod timing;
pub mod types;
pub mod warmup;

// Re-export commonly used items
pub use debug_logger::{get_debug_logger, TrackerLogger};
pub use proxy_config::{resolve, resolve_optional, ProxyConfig, ProxyProvider, SessionType};
pub use proxy_health::{ProxyHealthProbe, ProxyProbeClient};
pub use runner::{RunSettings, RunSummary, Tracker};
pub use shadow_probe::ShadowVisibilityProbe;
pub use state_store::{StateDiffStore, StateSnapshot, TransitionEvent, TransitionKind};
pub use status_client::StatusClient;
pub use status_poller::{PollerSettings, ResilientStatusPoller};
pub use types::*;
pub use warmup::{check_thresholds, tier_for, WarmupTier};
