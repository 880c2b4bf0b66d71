//! Supabase auth client backing the provider seams.
//!
//! Covers what the website needs from Supabase auth:
//! - OAuth authorize URLs for provider sign-in
//! - Magic-link e-mail sign-in
//! - Establishing a session from the callback redirect
//! - Sign-out with auth-state notifications

use crate::provider::{
    AuthEvent, AuthEventSource, AuthStateListener, ListenerRegistry, SessionQuery, Subscription,
};
use crate::{ProviderSession, RelayError, RelayResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Supported OAuth sign-in providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Apple,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Apple => "apple",
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "apple" => Ok(OAuthProvider::Apple),
            other => Err(RelayError::InvalidInput(format!(
                "unsupported provider: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
}

/// Supabase auth client holding the page's current session.
#[derive(Clone)]
pub struct SupabaseAuthClient {
    http_client: reqwest::Client,
    api_url: String,
    publishable_key: String,
    session: Arc<Mutex<Option<ProviderSession>>>,
    pending_error: Arc<Mutex<Option<String>>>,
    listeners: ListenerRegistry,
}

impl SupabaseAuthClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_url` - The Supabase project URL (e.g., `https://xyz.supabase.co`)
    /// * `publishable_key` - The project's publishable (anon) key
    pub fn new(api_url: impl Into<String>, publishable_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.into(),
            session: Arc::new(Mutex::new(None)),
            pending_error: Arc::new(Mutex::new(None)),
            listeners: ListenerRegistry::new(),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    /// URL that starts an OAuth sign-in and returns to `redirect_to`.
    pub fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> RelayResult<Url> {
        let mut url = Url::parse(&self.auth_url("authorize"))?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    /// Send a magic sign-in link to `email`.
    pub async fn send_magic_link(&self, email: &str, redirect_to: &str) -> RelayResult<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(RelayError::InvalidInput("email is required".to_string()));
        }

        let mut url = Url::parse(&self.auth_url("otp"))?;
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);

        tracing::debug!("Requesting magic link");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.publishable_key)
            .header("Content-Type", "application/json")
            .json(&OtpRequest {
                email,
                create_user: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Failed to send magic link");
            return Err(RelayError::Provider(format!(
                "Failed to send magic link: {} ({})",
                status, body_summary
            )));
        }

        tracing::info!("Magic link sent");
        Ok(())
    }

    /// Establish the session carried by a callback redirect.
    ///
    /// Returns `Ok(None)` when the redirect carries neither tokens nor an error.
    /// Errors are also reported by the next [`SessionQuery::get_session`].
    pub async fn establish_from_redirect(
        &self,
        redirect: &Url,
    ) -> RelayResult<Option<ProviderSession>> {
        match self.session_from_redirect(redirect).await {
            Ok(Some(session)) => {
                *self.session.lock() = Some(session.clone());
                tracing::info!(user_id = session.user_id().unwrap_or("unknown"), "Session established from redirect");
                self.listeners.emit(AuthEvent::SignedIn, Some(&session));
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                *self.pending_error.lock() = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn session_from_redirect(&self, redirect: &Url) -> RelayResult<Option<ProviderSession>> {
        let params = redirect_params(redirect);

        if let Some(message) = params
            .get("error_description")
            .or_else(|| params.get("error"))
        {
            return Err(RelayError::Provider(message.clone()));
        }

        let Some(access_token) = params.get("access_token").filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let user = self.fetch_user(access_token).await?;
        Ok(Some(ProviderSession {
            access_token: access_token.clone(),
            refresh_token: params.get("refresh_token").cloned(),
            user,
            expires_in: params.get("expires_in").and_then(|v| v.parse().ok()),
            expires_at: params.get("expires_at").and_then(|v| v.parse().ok()),
        }))
    }

    /// Verify an access token and fetch its user.
    async fn fetch_user(&self, access_token: &str) -> RelayResult<Value> {
        let response = self
            .http_client
            .get(self.auth_url("user"))
            .header("apikey", &self.publishable_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body_summary = summarize_response_body(&body);
            tracing::error!(status = %status, body_summary = %body_summary, "Server rejected session");
            return Err(RelayError::Provider(format!(
                "Server rejected session: {}",
                status
            )));
        }

        Ok(response.json().await?)
    }

    /// Install a session restored by the host without notifying listeners.
    pub fn restore_session(&self, session: ProviderSession) {
        *self.session.lock() = Some(session);
    }

    /// Clear the current session and notify listeners.
    pub fn sign_out(&self) {
        let had_session = self.session.lock().take().is_some();
        tracing::info!(had_session, "Signed out");
        self.listeners.emit(AuthEvent::SignedOut, None);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.listener_count()
    }
}

#[async_trait]
impl SessionQuery for SupabaseAuthClient {
    async fn get_session(&self) -> RelayResult<Option<ProviderSession>> {
        if let Some(message) = self.pending_error.lock().take() {
            return Err(RelayError::Provider(message));
        }
        Ok(self.session.lock().clone())
    }
}

impl AuthEventSource for SupabaseAuthClient {
    fn on_auth_state_change(&self, listener: AuthStateListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

/// Query and fragment parameters of a redirect; the fragment wins.
fn redirect_params(redirect: &Url) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = redirect.query_pairs().into_owned().collect();
    if let Some(fragment) = redirect.fragment() {
        params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_authorize_url() {
        let client = SupabaseAuthClient::new("https://xyz.supabase.co/", "pk");
        let url = client
            .authorize_url(OAuthProvider::Google, "https://sift.app/auth/callback")
            .unwrap();

        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["provider"], "google");
        assert_eq!(pairs["redirect_to"], "https://sift.app/auth/callback");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Apple".parse::<OAuthProvider>().unwrap(), OAuthProvider::Apple);
        assert!("github".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn test_redirect_params_merge_query_and_fragment() {
        let url = Url::parse("https://sift.app/auth/callback?type=magiclink#access_token=a&refresh_token=r&expires_in=3600").unwrap();
        let params = redirect_params(&url);
        assert_eq!(params["type"], "magiclink");
        assert_eq!(params["access_token"], "a");
        assert_eq!(params["expires_in"], "3600");
    }

    #[tokio::test]
    async fn test_send_magic_link_posts_otp() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/otp"))
            .and(header("apikey", "pk"))
            .and(query_param("redirect_to", "https://sift.app/auth/callback"))
            .and(body_json(json!({ "email": "student@example.edu", "create_user": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(server.uri(), "pk");
        client
            .send_magic_link(" student@example.edu ", "https://sift.app/auth/callback")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_magic_link_rejects_empty_email() {
        let client = SupabaseAuthClient::new("http://127.0.0.1:9", "pk");
        let err = client.send_magic_link("  ", "https://sift.app").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_send_magic_link_surfaces_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/otp"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(server.uri(), "pk");
        let err = client
            .send_magic_link("student@example.edu", "https://sift.app")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Provider(msg) if msg.contains("429")));
    }

    #[tokio::test]
    async fn test_establish_from_redirect_verifies_and_notifies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("Authorization", "Bearer access-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": "u1", "email": "student@example.edu" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(server.uri(), "pk");
        let signed_in = Arc::new(AtomicUsize::new(0));
        let counter = signed_in.clone();
        let _sub = client.on_auth_state_change(Arc::new(move |event, session| {
            if event == AuthEvent::SignedIn && session.is_some() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let redirect = Url::parse(
            "https://sift.app/auth/callback#access_token=access-1&refresh_token=refresh-1&expires_in=3600",
        )
        .unwrap();
        let session = client.establish_from_redirect(&redirect).await.unwrap().unwrap();

        assert_eq!(session.user_id(), Some("u1"));
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(session.expires_in, Some(3600));
        assert_eq!(signed_in.load(Ordering::SeqCst), 1);
        assert_eq!(client.get_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_establish_from_redirect_error_is_reported_once() {
        let client = SupabaseAuthClient::new("http://127.0.0.1:9", "pk");
        let redirect = Url::parse(
            "https://sift.app/auth/callback#error=access_denied&error_description=Email+link+is+invalid+or+has+expired",
        )
        .unwrap();

        let err = client.establish_from_redirect(&redirect).await.unwrap_err();
        assert_eq!(err.to_string(), "Email link is invalid or has expired");

        let queried = client.get_session().await.unwrap_err();
        assert_eq!(queried.to_string(), "Email link is invalid or has expired");
        assert!(client.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_establish_from_redirect_without_tokens() {
        let client = SupabaseAuthClient::new("http://127.0.0.1:9", "pk");
        let redirect = Url::parse("https://sift.app/auth/callback").unwrap();
        assert!(client.establish_from_redirect(&redirect).await.unwrap().is_none());
        assert!(client.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_token_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SupabaseAuthClient::new(server.uri(), "pk");
        let redirect = Url::parse("https://sift.app/auth/callback#access_token=stale").unwrap();
        let err = client.establish_from_redirect(&redirect).await.unwrap_err();
        assert!(matches!(err, RelayError::Provider(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_sign_out_clears_and_notifies() {
        let client = SupabaseAuthClient::new("http://127.0.0.1:9", "pk");
        client.restore_session(ProviderSession::new("tok", json!({ "id": "u1" })));

        let signed_out = Arc::new(AtomicUsize::new(0));
        let counter = signed_out.clone();
        let sub = client.on_auth_state_change(Arc::new(move |event, _| {
            if event == AuthEvent::SignedOut {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        client.sign_out();
        assert!(client.get_session().await.unwrap().is_none());
        assert_eq!(signed_out.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        assert_eq!(client.listener_count(), 0);
    }
}
