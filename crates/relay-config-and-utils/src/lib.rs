//! Configuration, filesystem paths and logging setup for the auth relay.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    BridgeConfig, CallbackConfig, Config, DEFAULT_EXTENSION_ID, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_RETRIES, DEFAULT_PROVIDER_BINDINGS, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_SITE_URL, DEFAULT_STORAGE_NAMESPACE, DEFAULT_SUPABASE_PUBLISHABLE_KEY,
    DEFAULT_SUPABASE_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging_for_service, normalize_level};
pub use paths::Paths;
