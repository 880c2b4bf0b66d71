//! Identity provider seams.
//!
//! The relay never talks to the identity provider directly. It looks up a
//! [`ProviderBinding`] by name on the page and uses whichever of its two
//! capabilities are present: an active-session query and an auth-state
//! event feed.

use crate::{ProviderSession, RelayResult};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Auth-state change reported by the provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::InitialSession => "INITIAL_SESSION",
            AuthEvent::SignedIn => "SIGNED_IN",
            AuthEvent::SignedOut => "SIGNED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEvent::UserUpdated => "USER_UPDATED",
            AuthEvent::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }
}

/// Callback invoked on every auth-state change.
pub type AuthStateListener = Arc<dyn Fn(AuthEvent, Option<ProviderSession>) + Send + Sync>;

/// Query for the provider's current session.
#[async_trait]
pub trait SessionQuery: Send + Sync {
    async fn get_session(&self) -> RelayResult<Option<ProviderSession>>;
}

/// Source of auth-state change notifications.
pub trait AuthEventSource: Send + Sync {
    fn on_auth_state_change(&self, listener: AuthStateListener) -> Subscription;
}

// ==========================================
// Listener registry
// ==========================================

struct RegistryInner {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, AuthStateListener)>>,
}

/// Listener bookkeeping for [`AuthEventSource`] implementations.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self, listener: AuthStateListener) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// Notify every listener registered when the call starts.
    ///
    /// Listeners run outside the registry lock, so they may unsubscribe.
    pub fn emit(&self, event: AuthEvent, session: Option<&ProviderSession>) {
        let snapshot: Vec<AuthStateListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in snapshot {
            listener(event, session.cloned());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

/// Handle to a registered listener.
pub struct Subscription {
    id: u64,
    registry: Weak<RegistryInner>,
    active: AtomicBool,
}

impl Subscription {
    /// A subscription with nothing to remove.
    pub fn detached() -> Self {
        Self {
            id: 0,
            registry: Weak::new(),
            active: AtomicBool::new(false),
        }
    }

    /// Remove the listener. Returns true only for the call that removed it.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(inner) = self.registry.upgrade() {
            inner.listeners.lock().retain(|(id, _)| *id != self.id);
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ==========================================
// Bindings
// ==========================================

/// A provider client exposed on the page under a well-known name.
#[derive(Clone)]
pub struct ProviderBinding {
    name: String,
    query: Option<Arc<dyn SessionQuery>>,
    events: Option<Arc<dyn AuthEventSource>>,
}

impl ProviderBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: None,
            events: None,
        }
    }

    /// Binding backed by a client that has both capabilities.
    pub fn from_client<C>(name: impl Into<String>, client: Arc<C>) -> Self
    where
        C: SessionQuery + AuthEventSource + 'static,
    {
        Self::new(name)
            .with_query(client.clone())
            .with_events(client)
    }

    pub fn with_query(mut self, query: Arc<dyn SessionQuery>) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn AuthEventSource>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> Option<&Arc<dyn SessionQuery>> {
        self.query.as_ref()
    }

    pub fn events(&self) -> Option<&Arc<dyn AuthEventSource>> {
        self.events.as_ref()
    }

    /// Usable when it exposes at least one capability.
    pub fn is_usable(&self) -> bool {
        self.query.is_some() || self.events.is_some()
    }
}

impl std::fmt::Debug for ProviderBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBinding")
            .field("name", &self.name)
            .field("query", &self.query.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

/// Looks up provider bindings on the page by name.
pub trait BindingResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<ProviderBinding>;
}

/// First usable binding in priority order.
pub fn discover(resolver: &dyn BindingResolver, names: &[String]) -> Option<ProviderBinding> {
    names
        .iter()
        .filter_map(|name| resolver.resolve(name))
        .find(ProviderBinding::is_usable)
}

/// Resolver over a mutable name table. Bindings may appear at any time.
#[derive(Default)]
pub struct StaticBindings {
    bindings: RwLock<HashMap<String, ProviderBinding>>,
}

impl StaticBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, binding: ProviderBinding) {
        self.bindings
            .write()
            .insert(binding.name().to_string(), binding);
    }

    pub fn remove(&self, name: &str) -> Option<ProviderBinding> {
        self.bindings.write().remove(name)
    }
}

impl BindingResolver for StaticBindings {
    fn resolve(&self, name: &str) -> Option<ProviderBinding> {
        self.bindings.read().get(name).cloned()
    }
}
