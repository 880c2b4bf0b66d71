//! Configuration management for the relay.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://random.supabase.co",
};

/// Default Supabase publishable key (can be overridden at compile time via SUPABASE_PUBLISHABLE_KEY env var).
pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "random-key",
};

/// Public site origin the relay runs on.
pub const DEFAULT_SITE_URL: &str = match option_env!("SIFT_SITE_URL") {
    Some(url) => url,
    None => "https://sift.app",
};

/// Extension identifier used for direct extension messaging.
pub const DEFAULT_EXTENSION_ID: &str = match option_env!("SIFT_EXTENSION_ID") {
    Some(id) => id,
    None => "sift-extension",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Delay between bridge poll cycles.
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1_000;

/// Poll cycles before the bridge gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 30;

/// Prefix for every page storage key.
pub const DEFAULT_STORAGE_NAMESPACE: &str = "sift";

/// Provider client bindings tried in order.
pub const DEFAULT_PROVIDER_BINDINGS: [&str; 3] = ["supabase", "_supabase", "supabaseClient"];

const DEFAULT_POST_LOGIN_PATH: &str = "/";
const DEFAULT_SIGN_IN_PATH: &str = "/auth";
const DEFAULT_SLOW_NOTICE_MS: u64 = 10_000;
const DEFAULT_CALLBACK_TIMEOUT_MS: u64 = 120_000;

/// Bridge polling and delivery options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Target for direct extension messaging.
    pub extension_id: String,
    /// Delay between poll cycles, in milliseconds.
    pub retry_interval_ms: u64,
    /// Poll-cycle ceiling before giving up.
    pub max_retries: u32,
    /// Log every relay step at debug level.
    pub debug: bool,
    /// Prefix for the relay's storage keys.
    pub storage_namespace: String,
    /// Provider client bindings, in discovery order.
    pub provider_bindings: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            extension_id: DEFAULT_EXTENSION_ID.to_string(),
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            debug: false,
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_string(),
            provider_bindings: DEFAULT_PROVIDER_BINDINGS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl BridgeConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Reject settings the poll loop cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_retries == 0 {
            return Err(CoreError::invalid("max_retries", "must be at least 1"));
        }
        if self.extension_id.trim().is_empty() {
            return Err(CoreError::invalid("extension_id", "must not be empty"));
        }
        if self.storage_namespace.trim().is_empty() {
            return Err(CoreError::invalid("storage_namespace", "must not be empty"));
        }
        Ok(())
    }
}

/// Sign-in callback page options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Where a completed sign-in lands.
    pub post_login_path: String,
    /// Sign-in entry point used after failures and sign-outs.
    pub sign_in_path: String,
    /// Pending time before the "taking longer than expected" notice.
    pub slow_notice_after_ms: u64,
    /// Pending time before the callback gives up. `None` waits forever.
    pub timeout_ms: Option<u64>,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            post_login_path: DEFAULT_POST_LOGIN_PATH.to_string(),
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            slow_notice_after_ms: DEFAULT_SLOW_NOTICE_MS,
            timeout_ms: Some(DEFAULT_CALLBACK_TIMEOUT_MS),
        }
    }
}

impl CallbackConfig {
    pub fn slow_notice_after(&self) -> Duration {
        Duration::from_millis(self.slow_notice_after_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Main relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Site origin the relay runs on; also the sign-in redirect base.
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_site_url() -> String {
    DEFAULT_SITE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            supabase_url: DEFAULT_SUPABASE_URL.to_string(),
            supabase_publishable_key: DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            bridge: BridgeConfig::default(),
            callback: CallbackConfig::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            tracing::debug!(path = %config_path.display(), "Loading relay config");
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.bridge.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|source| CoreError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("AUTH_RELAY_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(debug) = std::env::var("AUTH_RELAY_DEBUG") {
            self.bridge.debug = matches!(
                debug.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Ok(extension_id) = std::env::var("AUTH_RELAY_EXTENSION_ID") {
            if !extension_id.trim().is_empty() {
                self.bridge.extension_id = extension_id.trim().to_string();
            }
        }
    }

    /// Log level after applying the bridge debug flag.
    pub fn effective_log_level(&self) -> &str {
        if self.bridge.debug
            && !matches!(
                self.log_level.to_ascii_lowercase().as_str(),
                "debug" | "trace"
            )
        {
            "debug"
        } else {
            &self.log_level
        }
    }

    /// Get the Supabase URL as a parsed URL.
    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    /// Get the site URL as a parsed URL.
    pub fn site_url(&self) -> CoreResult<Url> {
        Url::parse(&self.site_url).map_err(CoreError::from)
    }

    /// Absolute URL of the sign-in callback page.
    pub fn callback_url(&self) -> CoreResult<Url> {
        Ok(self.site_url()?.join("/auth/callback")?)
    }
}
