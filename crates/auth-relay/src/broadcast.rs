//! Delivery of a captured session over every relay channel.

use crate::host::{ExtensionRuntime, PageHandles, PageMessenger};
use crate::message::{AuthSuccess, PageMessage};
use crate::{RelayResult, Session, SessionSource};
use relay_storage::AuthRecords;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one delivery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Delivered,
    /// Channel not available on this page.
    Skipped,
    Failed(String),
}

impl ChannelOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ChannelOutcome::Delivered)
    }

    fn from_result<T>(result: RelayResult<T>) -> Self {
        match result {
            Ok(_) => ChannelOutcome::Delivered,
            Err(e) => ChannelOutcome::Failed(e.to_string()),
        }
    }
}

/// Per-channel outcome of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub in_page: ChannelOutcome,
    pub extension: ChannelOutcome,
    pub storage: ChannelOutcome,
}

impl BroadcastReport {
    pub fn fully_delivered(&self) -> bool {
        self.in_page.is_delivered() && self.extension.is_delivered() && self.storage.is_delivered()
    }
}

/// Post an `AUTH_SUCCESS` message to the page's own origin.
pub fn post_auth_success(
    messenger: &dyn PageMessenger,
    session: &Session,
    source: Option<SessionSource>,
) -> RelayResult<()> {
    let message = PageMessage::AuthSuccess(AuthSuccess::from_session(session, source));
    messenger.post_message(&message, &messenger.origin())
}

/// Sends a session over in-page messaging, the extension runtime and page storage.
///
/// Every channel is attempted regardless of the others; failures are
/// logged and reported, never raised.
pub struct Broadcaster {
    messenger: Arc<dyn PageMessenger>,
    extension: Option<Arc<dyn ExtensionRuntime>>,
    records: AuthRecords,
    extension_id: String,
    debug: bool,
}

impl Broadcaster {
    pub fn new(
        handles: &PageHandles,
        records: AuthRecords,
        extension_id: impl Into<String>,
        debug: bool,
    ) -> Self {
        Self {
            messenger: handles.messenger.clone(),
            extension: handles.extension.clone(),
            records,
            extension_id: extension_id.into(),
            debug,
        }
    }

    pub async fn broadcast(&self, session: &Session) -> BroadcastReport {
        let in_page = self.post_in_page(session, Some(SessionSource::AuthBridge));
        let extension = self.send_to_extension(session).await;
        let storage = self.persist(session);

        let report = BroadcastReport {
            in_page,
            extension,
            storage,
        };
        debug!(
            in_page = ?report.in_page,
            extension = ?report.extension,
            storage = ?report.storage,
            "Broadcast finished"
        );
        report
    }

    /// In-page channel only.
    pub fn post_in_page(&self, session: &Session, source: Option<SessionSource>) -> ChannelOutcome {
        let outcome =
            ChannelOutcome::from_result(post_auth_success(self.messenger.as_ref(), session, source));
        match &outcome {
            ChannelOutcome::Failed(reason) => warn!(reason = %reason, "Failed to post auth message"),
            _ => relay_step!(self.debug, "Sent auth data via postMessage"),
        }
        outcome
    }

    async fn send_to_extension(&self, session: &Session) -> ChannelOutcome {
        let Some(extension) = &self.extension else {
            relay_step!(self.debug, "Extension messaging not available");
            return ChannelOutcome::Skipped;
        };

        let message = AuthSuccess::from_session(session, Some(SessionSource::Website));
        match extension.send_message(&self.extension_id, &message).await {
            Ok(response) => {
                relay_step!(self.debug, response = %response, "Extension response");
                ChannelOutcome::Delivered
            }
            Err(e) => {
                // Expected when the extension is not installed
                relay_step!(self.debug, error = %e, "Extension not available");
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }

    fn persist(&self, session: &Session) -> ChannelOutcome {
        match self
            .records
            .store_relayed(session.access_token(), session.user(), session.timestamp())
        {
            Ok(()) => {
                relay_step!(self.debug, "Stored auth data in page storage");
                ChannelOutcome::Delivered
            }
            Err(e) => {
                warn!(error = %e, "Failed to store auth data in page storage");
                ChannelOutcome::Failed(e.to_string())
            }
        }
    }
}
