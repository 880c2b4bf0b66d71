//! Session types handed from the website to the extension.

use crate::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Session as returned by the identity provider client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Provider-owned identity record, passed through unchanged.
    #[serde(default)]
    pub user: Value,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl ProviderSession {
    pub fn new(access_token: impl Into<String>, user: Value) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            user,
            expires_in: None,
            expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Only sessions with a non-empty access token are relayed.
    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.get("id").and_then(Value::as_str)
    }
}

/// Which relay path produced a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionSource {
    /// The bridge's polling path.
    AuthBridge,
    /// The direct extension-call path.
    Website,
}

impl SessionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionSource::AuthBridge => "auth-bridge",
            SessionSource::Website => "website",
        }
    }
}

/// A captured session. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    access_token: String,
    refresh_token: Option<String>,
    user: Value,
    timestamp: i64,
    source: Option<SessionSource>,
}

impl Session {
    /// Capture a session now.
    pub fn capture(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        user: Value,
        source: Option<SessionSource>,
    ) -> RelayResult<Self> {
        Self::restore(
            access_token,
            refresh_token,
            user,
            chrono::Utc::now().timestamp_millis(),
            source,
        )
    }

    /// Capture a provider session, optionally dropping its refresh token.
    pub fn from_provider(
        session: &ProviderSession,
        keep_refresh_token: bool,
        source: Option<SessionSource>,
    ) -> RelayResult<Self> {
        let refresh_token = if keep_refresh_token {
            session.refresh_token.clone()
        } else {
            None
        };
        Self::capture(
            session.access_token.clone(),
            refresh_token,
            session.user.clone(),
            source,
        )
    }

    /// Rebuild a session with a known capture time (listening side).
    pub(crate) fn restore(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        user: Value,
        timestamp: i64,
        source: Option<SessionSource>,
    ) -> RelayResult<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(RelayError::InvalidSession(
                "access token is empty".to_string(),
            ));
        }
        Ok(Self {
            access_token,
            refresh_token: refresh_token.filter(|t| !t.is_empty()),
            user,
            timestamp,
            source,
        })
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn user(&self) -> &Value {
        &self.user
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.get("id").and_then(Value::as_str)
    }

    /// Capture time, ms since epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn source(&self) -> Option<SessionSource> {
        self.source
    }
}
