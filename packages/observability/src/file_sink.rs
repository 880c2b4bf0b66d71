//! JSONL file sink.
//!
//! Appends one redacted JSON object per line to the central relay log.
//! Several relay processes may share the file; each line is flushed on write.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Central log file location: `~/.auth-relay/logs/relay.jsonl`.
/// Falls back to the system temp directory when no home directory exists.
fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".auth-relay")
        .join("logs")
        .join("relay.jsonl")
}

/// Append-only file writer shared by every event.
#[derive(Clone)]
pub struct CentralLogWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl CentralLogWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl io::Write for CentralLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let result = guard.write(buf);
        // Flush per line so concurrent processes see whole lines.
        guard.flush()?;
        result
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// MakeWriter implementation for tracing-subscriber.
#[derive(Clone)]
pub struct WriterFactory {
    writer: CentralLogWriter,
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = CentralLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

/// Install the registry with the JSONL file layer and the optional stderr layer.
///
/// If the log file cannot be opened, events go to stderr only.
pub fn init_file_subscriber(config: &LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);
    let (json_layer, open_error) = match CentralLogWriter::new(&log_path) {
        Ok(writer) => (
            Some(JsonLayer::new(
                config.service_name.clone(),
                WriterFactory { writer },
            )),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    let stderr_layer = (config.also_stderr || open_error.is_some()).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
    });

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let installed = tracing_subscriber::registry()
        .with(json_layer.map(|l| l.with_filter(env_filter.clone())))
        .with(stderr_layer.map(|l| l.with_filter(env_filter)))
        .try_init();

    if installed.is_err() {
        return;
    }
    match open_error {
        None => tracing::debug!(
            log_path = %log_path.display(),
            service = %config.service_name,
            "Relay log opened"
        ),
        Some(e) => tracing::warn!(
            log_path = %log_path.display(),
            error = %e,
            "Could not open relay log, logging to stderr only"
        ),
    }
}
