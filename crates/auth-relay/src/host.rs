//! Capabilities the hosting page provides to the relay.

use crate::message::{AuthSuccess, PageMessage};
use crate::provider::BindingResolver;
use crate::RelayResult;
use async_trait::async_trait;
use relay_storage::PageStorage;
use serde_json::Value;
use std::sync::Arc;

/// Posts messages into the page's own message channel.
pub trait PageMessenger: Send + Sync {
    /// Origin of the hosting page.
    fn origin(&self) -> String;

    fn post_message(&self, message: &PageMessage, target_origin: &str) -> RelayResult<()>;
}

/// Direct messaging into the installed browser extension.
#[async_trait]
pub trait ExtensionRuntime: Send + Sync {
    /// Send a message to the extension and wait for its reply.
    ///
    /// Fails when no extension with `extension_id` is listening.
    async fn send_message(&self, extension_id: &str, message: &AuthSuccess) -> RelayResult<Value>;
}

/// Client-side navigation.
pub trait Navigator: Send + Sync {
    /// Replace the current location with `path`.
    fn replace(&self, path: &str);
}

/// User-visible notices.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn info(&self, message: &str);
    fn error(&self, message: &str);
}

/// Page readiness as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn is_ready(&self) -> bool {
        !matches!(self, ReadyState::Loading)
    }
}

/// Everything the bridge needs from its page.
#[derive(Clone)]
pub struct PageHandles {
    pub messenger: Arc<dyn PageMessenger>,
    pub storage: Arc<dyn PageStorage>,
    /// `None` when the page has no extension messaging API at all.
    pub extension: Option<Arc<dyn ExtensionRuntime>>,
    pub bindings: Arc<dyn BindingResolver>,
}
