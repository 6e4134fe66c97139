pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::{PROFILES_PATH_ENV_VAR, STATE_PATH_ENV_VAR, WEBHOOK_URL_ENV_VAR};
pub use types::*;
