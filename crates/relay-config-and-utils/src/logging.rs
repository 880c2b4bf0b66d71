//! Logging setup for relay binaries.
//!
//! Events go to the JSONL relay log under the base directory and, unless
//! `AUTH_RELAY_QUIET` is set, to stderr.

use crate::Paths;
use observability::LogConfig;

/// Install the subscriber for `service_name`.
///
/// `level` accepts the usual names; anything unrecognized falls back to `info`.
/// `RUST_LOG` still wins when set.
pub fn init_logging_for_service(service_name: &str, level: &str, paths: &Paths) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: normalize_level(level).into(),
        log_path: Some(paths.log_file()),
        also_stderr: std::env::var_os("AUTH_RELAY_QUIET").is_none(),
    });
}

/// Map a configured level name onto an `EnvFilter` level.
pub fn normalize_level(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        "off" => "off",
        _ => "info",
    }
}
