//! Structured logging for the auth relay.
//!
//! Relay crates only emit `tracing` events. A binary installs the subscriber
//! once through [`init_with_config`]; with the default `file` feature every
//! event is appended as redacted JSONL to `~/.auth-relay/logs/relay.jsonl`
//! (`tail -f … | jq` reads it back), and optionally mirrored to stderr.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "auth-relay-cli".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! ```

#[cfg(feature = "file")]
mod file_sink;

mod json_layer;
mod redact;

use std::path::PathBuf;

pub use json_layer::LogEntry;
pub use redact::{redact_fields, redact_value};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every line as `service`.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_level: String,
    /// Defaults to `~/.auth-relay/logs/relay.jsonl`.
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "auth-relay".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Install the global subscriber. A second call in the same process does nothing.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "file")]
    file_sink::init_file_subscriber(&config);

    #[cfg(not(feature = "file"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .finish()
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "auth-relay");
        assert_eq!(config.default_level, "info");
        assert!(config.log_path.is_none());
        assert!(!config.also_stderr);
    }
}
