//! In-process page used by the CLI: records every delivery and navigation.

use async_trait::async_trait;
use auth_relay::{
    AuthSuccess, ExtensionRuntime, Navigator, Notifier, PageMessage, PageMessenger, RelayError,
    RelayResult,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// Collects messages posted to the page.
pub struct RecordingMessenger {
    origin: String,
    posted: Mutex<Vec<AuthSuccess>>,
}

impl RecordingMessenger {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            posted: Mutex::new(Vec::new()),
        }
    }

    pub fn posted(&self) -> Vec<AuthSuccess> {
        self.posted.lock().clone()
    }
}

impl PageMessenger for RecordingMessenger {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn post_message(&self, message: &PageMessage, target_origin: &str) -> RelayResult<()> {
        info!(message_type = message.type_name(), target_origin, "Page message posted");
        if let PageMessage::AuthSuccess(success) = message {
            self.posted.lock().push(success.clone());
        }
        Ok(())
    }
}

/// How the simulated extension behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionMode {
    /// Extension installed and acknowledging messages.
    #[default]
    Installed,
    /// Messaging API present but nothing listening.
    NotListening,
    /// No extension messaging API on the page.
    Absent,
}

/// Simulated extension runtime.
pub struct RecordingExtension {
    listening: bool,
    received: Mutex<Vec<(String, AuthSuccess)>>,
}

impl RecordingExtension {
    pub fn new(listening: bool) -> Self {
        Self {
            listening,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received(&self) -> Vec<(String, AuthSuccess)> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl ExtensionRuntime for RecordingExtension {
    async fn send_message(&self, extension_id: &str, message: &AuthSuccess) -> RelayResult<Value> {
        if !self.listening {
            return Err(RelayError::Extension(
                "Could not establish connection. Receiving end does not exist.".to_string(),
            ));
        }
        self.received
            .lock()
            .push((extension_id.to_string(), message.clone()));
        Ok(json!({ "success": true }))
    }
}

/// Prints notices and navigations as they happen.
#[derive(Default)]
pub struct ConsoleNavigator {
    paths: Mutex<Vec<String>>,
}

impl ConsoleNavigator {
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }
}

impl Navigator for ConsoleNavigator {
    fn replace(&self, path: &str) {
        info!(path, "Navigating");
        self.paths.lock().push(path.to_string());
    }
}

#[derive(Default)]
pub struct ConsoleNotifier {
    notices: Mutex<Vec<String>>,
}

impl ConsoleNotifier {
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }

    fn push(&self, level: &str, message: &str) {
        eprintln!("[{}] {}", level, message);
        self.notices.lock().push(format!("{}: {}", level, message));
    }
}

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        self.push("success", message);
    }

    fn info(&self, message: &str) {
        self.push("info", message);
    }

    fn error(&self, message: &str) {
        self.push("error", message);
    }
}
