//! Page message contract shared with the extension's content script.
//!
//! Messages are JSON objects discriminated by `type`:
//! - `AUTH_SUCCESS`: a relayed session (`token`, `user`, `timestamp`, optional
//!   `source` and `refreshToken`)
//! - `MANUAL_AUTH`: a session pushed by other site code (`token`, `user`)

use crate::{RelayResult, Session, SessionSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageMessage {
    #[serde(rename = "AUTH_SUCCESS")]
    AuthSuccess(AuthSuccess),
    #[serde(rename = "MANUAL_AUTH")]
    ManualAuth(ManualAuth),
}

impl PageMessage {
    /// Decode an inbound page message. Anything else on the channel is `None`.
    pub fn decode(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }

    pub fn to_value(&self) -> RelayResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PageMessage::AuthSuccess(_) => "AUTH_SUCCESS",
            PageMessage::ManualAuth(_) => "MANUAL_AUTH",
        }
    }
}

/// Announces a relayed session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccess {
    pub token: String,
    #[serde(default)]
    pub user: Value,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SessionSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl AuthSuccess {
    /// Build the message for one channel; the session itself is not touched.
    pub fn from_session(session: &Session, source: Option<SessionSource>) -> Self {
        Self {
            token: session.access_token().to_string(),
            user: session.user().clone(),
            timestamp: session.timestamp(),
            source,
            refresh_token: session.refresh_token().map(str::to_string),
        }
    }

    /// Rebuild the session a listener received.
    pub fn to_session(&self) -> RelayResult<Session> {
        Session::restore(
            self.token.clone(),
            self.refresh_token.clone(),
            self.user.clone(),
            self.timestamp,
            self.source,
        )
    }
}

/// Session pushed into the page by other site code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualAuth {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user: Value,
}

impl ManualAuth {
    /// Both a token and a user must be present.
    pub fn is_well_formed(&self) -> bool {
        !self.token.trim().is_empty() && !self.user.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        Session::restore(
            "access-token",
            Some("refresh-token".to_string()),
            json!({ "id": "u1", "email": "student@example.edu" }),
            1_700_000_000_000,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_auth_success_wire_shape() {
        let message =
            PageMessage::AuthSuccess(AuthSuccess::from_session(&session(), Some(SessionSource::AuthBridge)));

        assert_eq!(
            message.to_value().unwrap(),
            json!({
                "type": "AUTH_SUCCESS",
                "token": "access-token",
                "user": { "id": "u1", "email": "student@example.edu" },
                "timestamp": 1_700_000_000_000i64,
                "source": "auth-bridge",
                "refreshToken": "refresh-token"
            })
        );
    }

    #[test]
    fn test_auth_success_omits_absent_optionals() {
        let plain = Session::restore("tok", None, json!({ "id": "u1" }), 5, None).unwrap();
        let value = PageMessage::AuthSuccess(AuthSuccess::from_session(&plain, None))
            .to_value()
            .unwrap();

        assert!(value.get("source").is_none());
        assert!(value.get("refreshToken").is_none());
        assert_eq!(value["type"], "AUTH_SUCCESS");
    }

    #[test]
    fn test_listener_recovers_session_fields() {
        let original = session();
        let value = PageMessage::AuthSuccess(AuthSuccess::from_session(
            &original,
            Some(SessionSource::Website),
        ))
        .to_value()
        .unwrap();

        let Some(PageMessage::AuthSuccess(received)) = PageMessage::decode(&value) else {
            panic!("expected AUTH_SUCCESS");
        };
        let recovered = received.to_session().unwrap();

        assert_eq!(recovered.access_token(), original.access_token());
        assert_eq!(recovered.refresh_token(), original.refresh_token());
        assert_eq!(recovered.user(), original.user());
        assert_eq!(recovered.timestamp(), original.timestamp());
        assert_eq!(recovered.source(), Some(SessionSource::Website));
    }

    #[test]
    fn test_decode_manual_auth() {
        let data = json!({ "type": "MANUAL_AUTH", "token": "t", "user": { "id": "u1" } });
        let Some(PageMessage::ManualAuth(manual)) = PageMessage::decode(&data) else {
            panic!("expected MANUAL_AUTH");
        };
        assert!(manual.is_well_formed());
    }

    #[test]
    fn test_manual_auth_missing_fields_is_not_well_formed() {
        let missing_user = json!({ "type": "MANUAL_AUTH", "token": "t" });
        let Some(PageMessage::ManualAuth(manual)) = PageMessage::decode(&missing_user) else {
            panic!("expected MANUAL_AUTH");
        };
        assert!(!manual.is_well_formed());

        let missing_token = json!({ "type": "MANUAL_AUTH", "user": { "id": "u1" } });
        let Some(PageMessage::ManualAuth(manual)) = PageMessage::decode(&missing_token) else {
            panic!("expected MANUAL_AUTH");
        };
        assert!(!manual.is_well_formed());
    }

    #[test]
    fn test_decode_ignores_unrelated_messages() {
        assert!(PageMessage::decode(&json!({ "type": "SOMETHING_ELSE" })).is_none());
        assert!(PageMessage::decode(&json!("AUTH_SUCCESS")).is_none());
        assert!(PageMessage::decode(&json!({ "token": "t" })).is_none());
    }
}
