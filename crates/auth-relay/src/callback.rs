//! Sign-in callback handler.
//!
//! Runs on the page the provider redirects back to. It settles the sign-in
//! exactly once: relays the session and navigates on, or navigates back to
//! sign-in with a notice.

use crate::broadcast::post_auth_success;
use crate::callback_fsm::{CallbackInput, CallbackMachine, CallbackState};
use crate::host::{Navigator, Notifier, PageMessenger};
use crate::provider::{AuthEvent, AuthEventSource, ProviderBinding, SessionQuery, Subscription};
use crate::{ProviderSession, RelayError, RelayResult, Session};
use parking_lot::Mutex;
use relay_config_and_utils::CallbackConfig;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const DEFAULT_FAILURE_MESSAGE: &str = "Authentication failed. Please try again.";
const SUCCESS_MESSAGE: &str = "Successfully logged in!";
const SLOW_MESSAGE: &str = "This is taking longer than expected...";
const TIMEOUT_MESSAGE: &str = "Sign-in timed out. Please try again.";

/// Page capabilities the callback handler drives.
#[derive(Clone)]
pub struct CallbackPage {
    pub messenger: Arc<dyn PageMessenger>,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct CallbackHandler {
    config: CallbackConfig,
    query: Arc<dyn SessionQuery>,
    events: Option<Arc<dyn AuthEventSource>>,
    page: CallbackPage,
    fsm: Mutex<CallbackMachine>,
    subscription: Mutex<Option<Subscription>>,
    state_tx: watch::Sender<CallbackState>,
    this: Weak<CallbackHandler>,
}

impl CallbackHandler {
    /// Build a handler for one callback page.
    ///
    /// The binding must expose a session query. Without an event source the
    /// handler settles on the query result, the timeout or an explicit
    /// [`handle_auth_event`](Self::handle_auth_event).
    pub fn new(
        config: CallbackConfig,
        binding: &ProviderBinding,
        page: CallbackPage,
    ) -> RelayResult<Arc<Self>> {
        let query = binding.query().cloned().ok_or_else(|| {
            RelayError::Config(format!(
                "provider binding '{}' has no session query",
                binding.name()
            ))
        })?;
        let events = binding.events().cloned();
        let (state_tx, _) = watch::channel(CallbackState::Pending);

        Ok(Arc::new_cyclic(|this| Self {
            config,
            query,
            events,
            page,
            fsm: Mutex::new(CallbackMachine::new()),
            subscription: Mutex::new(None),
            state_tx,
            this: this.clone(),
        }))
    }

    pub fn state(&self) -> CallbackState {
        *self.state_tx.borrow()
    }

    /// Subscribe, then wait for a terminal state while the session query runs.
    ///
    /// The slow notice and timeout run alongside the query, so a provider that
    /// never answers still settles the page.
    pub async fn run(&self) -> CallbackState {
        self.subscribe();
        self.wait_for_outcome().await
    }

    async fn wait_for_outcome(&self) -> CallbackState {
        let mut rx = self.state_tx.subscribe();

        let lookup = self.query.get_session();
        tokio::pin!(lookup);

        let slow = tokio::time::sleep(self.config.slow_notice_after());
        tokio::pin!(slow);
        let timeout = self.config.timeout();
        let deadline = async move {
            match timeout {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut lookup_done = false;
        let mut slow_fired = false;
        let mut deadline_fired = false;
        loop {
            let current = *rx.borrow_and_update();
            if current.is_terminal() {
                return current;
            }

            tokio::select! {
                result = &mut lookup, if !lookup_done => {
                    lookup_done = true;
                    self.handle_query_result(result);
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return self.state();
                    }
                }
                _ = &mut slow, if !slow_fired => {
                    slow_fired = true;
                    self.on_slow_provider();
                }
                _ = &mut deadline, if !deadline_fired => {
                    deadline_fired = true;
                    self.on_timeout();
                }
            }
        }
    }

    // ==========================================
    // Inputs
    // ==========================================

    pub fn handle_auth_event(&self, event: AuthEvent, session: Option<ProviderSession>) {
        debug!(event = event.as_str(), has_session = session.is_some(), "Callback auth state changed");
        match (event, session) {
            (AuthEvent::SignedIn, Some(session)) => self.succeed(&session),
            (AuthEvent::TokenRefreshed, None) => {
                self.fail(DEFAULT_FAILURE_MESSAGE, CallbackInput::RefreshWithoutSession)
            }
            (AuthEvent::SignedOut, _) => self.signed_out(),
            _ => {}
        }
    }

    pub fn handle_query_result(&self, result: RelayResult<Option<ProviderSession>>) {
        match result {
            Ok(Some(session)) => self.succeed(&session),
            Ok(None) => debug!("No session yet, waiting for auth state change"),
            Err(e) => {
                warn!(error = %e, "Auth callback error");
                let message = e
                    .user_message()
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                self.fail(&message, CallbackInput::ProviderError);
            }
        }
    }

    // ==========================================
    // Transitions
    // ==========================================

    fn succeed(&self, found: &ProviderSession) {
        let session = match Session::from_provider(found, true, None) {
            Ok(session) => session,
            Err(e) => {
                self.fail(&e.to_string(), CallbackInput::ProviderError);
                return;
            }
        };
        if self.transition(&CallbackInput::SessionReady).is_err() {
            return;
        }

        self.unsubscribe();
        info!(user_id = session.user_id().unwrap_or("unknown"), "Sign-in callback succeeded");
        self.page.notifier.success(SUCCESS_MESSAGE);
        if let Err(e) = post_auth_success(self.page.messenger.as_ref(), &session, None) {
            warn!(error = %e, "Failed to post auth message");
        }
        self.page.navigator.replace(&self.config.post_login_path);
    }

    fn fail(&self, message: &str, input: CallbackInput) {
        if self.transition(&input).is_err() {
            return;
        }

        self.unsubscribe();
        info!(reason = message, "Sign-in callback failed");
        self.page.notifier.error(message);
        self.page.navigator.replace(&self.config.sign_in_path);
    }

    fn signed_out(&self) {
        if self.transition(&CallbackInput::SignedOut).is_err() {
            return;
        }

        self.unsubscribe();
        info!("Signed out during sign-in callback");
        self.page.navigator.replace(&self.config.sign_in_path);
    }

    fn on_slow_provider(&self) {
        if self.transition(&CallbackInput::SlowProvider).is_ok() {
            self.page.notifier.info(SLOW_MESSAGE);
        }
    }

    fn on_timeout(&self) {
        self.fail(TIMEOUT_MESSAGE, CallbackInput::TimedOut);
    }

    /// Apply `input`; an error means the input does not apply in the current state.
    fn transition(&self, input: &CallbackInput) -> RelayResult<CallbackState> {
        let mut fsm = self.fsm.lock();
        let old_state = CallbackState::from(fsm.state());
        fsm.consume(input).map_err(|_| {
            debug!(from = old_state.as_str(), input = ?input, "Ignoring callback input");
            RelayError::InvalidStateTransition(format!(
                "cannot apply {:?} in state {}",
                input,
                old_state.as_str()
            ))
        })?;
        let new_state = CallbackState::from(fsm.state());
        debug!(from = old_state.as_str(), to = new_state.as_str(), "Callback FSM transition");
        self.state_tx.send_replace(new_state);
        Ok(new_state)
    }

    // ==========================================
    // Subscription
    // ==========================================

    fn subscribe(&self) {
        let Some(events) = &self.events else {
            return;
        };
        if self.subscription.lock().is_some() {
            return;
        }

        let handler = self.this.clone();
        let subscription = events.on_auth_state_change(Arc::new(move |event, session| {
            if let Some(handler) = handler.upgrade() {
                handler.handle_auth_event(event, session);
            }
        }));

        // A source may have settled us while subscribing.
        if self.state().is_terminal() {
            subscription.unsubscribe();
            return;
        }
        *self.subscription.lock() = Some(subscription);
    }

    fn unsubscribe(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }
}
