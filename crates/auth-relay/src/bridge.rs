//! Bridge that polls the page for a session and relays it once.

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::host::{PageHandles, ReadyState};
use crate::message::PageMessage;
use crate::provider::{self, AuthEvent, AuthEventSource, AuthStateListener};
use crate::{ProviderSession, RelayError, Session, SessionSource, Subscription};
use parking_lot::Mutex;
use relay_config_and_utils::BridgeConfig;
use relay_storage::AuthRecords;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Lifecycle of a relay run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Never started.
    Idle,
    /// Poll loop running.
    Active,
    /// A session was relayed.
    Completed,
    /// Gave up after the configured number of attempts.
    Exhausted,
}

/// What `record_miss` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissOutcome {
    Retry { attempt: u32 },
    Exhausted { attempts: u32 },
    /// The run is no longer active.
    Inactive,
}

/// Polling state for one page context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRun {
    attempt: u32,
    max_attempts: u32,
    phase: RunPhase,
    generation: u64,
}

impl RelayRun {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            phase: RunPhase::Idle,
            generation: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == RunPhase::Active
    }

    /// Incremented on every successful `start`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Begin a run. No-op while active or once a session was relayed.
    pub fn start(&mut self) -> bool {
        match self.phase {
            RunPhase::Active | RunPhase::Completed => false,
            RunPhase::Idle | RunPhase::Exhausted => {
                self.attempt = 0;
                self.phase = RunPhase::Active;
                self.generation += 1;
                true
            }
        }
    }

    /// Count a cycle that found nothing.
    pub fn record_miss(&mut self) -> MissOutcome {
        if !self.is_active() {
            return MissOutcome::Inactive;
        }
        self.attempt += 1;
        if self.attempt < self.max_attempts {
            MissOutcome::Retry {
                attempt: self.attempt,
            }
        } else {
            self.phase = RunPhase::Exhausted;
            MissOutcome::Exhausted {
                attempts: self.attempt,
            }
        }
    }

    /// Claim the run's single completion. Only the first caller wins.
    pub fn try_complete(&mut self) -> bool {
        if self.phase == RunPhase::Completed {
            return false;
        }
        self.phase = RunPhase::Completed;
        true
    }
}

/// What produced a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionTrigger {
    SessionQuery,
    AuthStateChange,
    ManualRecord,
    ManualMessage,
}

impl CompletionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionTrigger::SessionQuery => "session_query",
            CompletionTrigger::AuthStateChange => "auth_state_change",
            CompletionTrigger::ManualRecord => "manual_record",
            CompletionTrigger::ManualMessage => "manual_message",
        }
    }
}

/// Result of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Found,
    NotFound,
}

/// Relays the page's signed-in session to the extension.
pub struct AuthBridge {
    config: BridgeConfig,
    handles: PageHandles,
    records: AuthRecords,
    broadcaster: Broadcaster,
    run: Mutex<RelayRun>,
    subscription: Mutex<Option<Subscription>>,
    this: Weak<AuthBridge>,
}

impl AuthBridge {
    pub fn install(config: BridgeConfig, handles: PageHandles) -> Arc<Self> {
        let records = AuthRecords::new(handles.storage.clone(), &config.storage_namespace);
        let broadcaster = Broadcaster::new(
            &handles,
            records.clone(),
            config.extension_id.clone(),
            config.debug,
        );
        let max_attempts = config.max_retries;

        Arc::new_cyclic(|this| Self {
            config,
            handles,
            records,
            broadcaster,
            run: Mutex::new(RelayRun::new(max_attempts)),
            subscription: Mutex::new(None),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn records(&self) -> &AuthRecords {
        &self.records
    }

    /// Copy of the current run state.
    pub fn run_state(&self) -> RelayRun {
        self.run.lock().clone()
    }

    // ==========================================
    // Lifecycle triggers
    // ==========================================

    /// Start now if the page is already interactive.
    pub fn on_ready_state(&self, state: ReadyState) -> bool {
        if state.is_ready() {
            self.start()
        } else {
            relay_step!(self.config.debug, "Page still loading, waiting for DOM ready");
            false
        }
    }

    pub fn on_dom_ready(&self) -> bool {
        self.start()
    }

    pub fn on_window_load(&self) -> bool {
        self.start()
    }

    /// Start a run unless one is active or already completed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, cannot start auth monitoring");
            return false;
        };
        let Some(this) = self.this.upgrade() else {
            return false;
        };

        let generation = {
            let mut run = self.run.lock();
            if !run.start() {
                relay_step!(self.config.debug, phase = ?run.phase(), "Auth monitoring already started");
                return false;
            }
            run.generation()
        };

        info!(
            max_attempts = self.config.max_retries,
            interval_ms = self.config.retry_interval_ms,
            "Starting auth monitoring"
        );
        runtime.spawn(async move { this.run_loop(generation).await });
        true
    }

    async fn run_loop(self: Arc<Self>, generation: u64) {
        loop {
            let attempt = {
                let run = self.run.lock();
                if !run.is_active() || run.generation() != generation {
                    return;
                }
                run.attempt() + 1
            };
            relay_step!(
                self.config.debug,
                attempt,
                max_attempts = self.config.max_retries,
                "Auth check attempt"
            );

            let cycle_started = tokio::time::Instant::now();
            if self.poll_cycle().await == CycleOutcome::Found {
                return;
            }

            match self.run.lock().record_miss() {
                MissOutcome::Retry { .. } => {}
                MissOutcome::Exhausted { attempts } => {
                    info!(attempts, "Max retries reached, stopping auth monitoring");
                    return;
                }
                MissOutcome::Inactive => return,
            }
            let remaining = self
                .config
                .retry_interval()
                .saturating_sub(cycle_started.elapsed());
            tokio::time::sleep(remaining).await;
        }
    }

    // ==========================================
    // Poll cycle
    // ==========================================

    /// Look for a session once: provider first, then the Manual Auth Record.
    ///
    /// The provider query is bounded by the retry interval; a query still
    /// pending by then counts as no session for this cycle.
    pub async fn poll_cycle(&self) -> CycleOutcome {
        if let Some(binding) =
            provider::discover(self.handles.bindings.as_ref(), &self.config.provider_bindings)
        {
            relay_step!(self.config.debug, binding = binding.name(), "Found provider binding");

            if let Some(events) = binding.events() {
                self.ensure_listener(events.as_ref());
            }

            if let Some(query) = binding.query() {
                let lookup =
                    tokio::time::timeout(self.config.retry_interval(), query.get_session())
                        .await
                        .unwrap_or_else(|_| Err(RelayError::Timeout));
                match lookup {
                    Ok(Some(found)) if found.has_access_token() => {
                        match Session::from_provider(&found, false, Some(SessionSource::AuthBridge))
                        {
                            Ok(session) => {
                                self.complete(session, CompletionTrigger::SessionQuery).await;
                                return CycleOutcome::Found;
                            }
                            Err(e) => debug!(error = %e, "Ignoring unusable provider session"),
                        }
                    }
                    Ok(_) => relay_step!(self.config.debug, "No active provider session"),
                    Err(e) if e.is_transient() => {
                        relay_step!(self.config.debug, error = %e, "Provider session unavailable, will retry")
                    }
                    Err(e) => debug!(error = %e, "Error getting provider session"),
                }
            }
        }

        if self.check_manual_record().await {
            return CycleOutcome::Found;
        }
        CycleOutcome::NotFound
    }

    fn ensure_listener(&self, events: &dyn AuthEventSource) {
        if self.subscription.lock().is_some() {
            return;
        }

        let bridge = self.this.clone();
        let verbose = self.config.debug;
        let listener: AuthStateListener = Arc::new(move |event, session| {
            relay_step!(verbose, event = event.as_str(), "Provider auth state changed");
            if event != AuthEvent::SignedIn {
                return;
            }
            let Some(session) = session.filter(ProviderSession::has_access_token) else {
                return;
            };
            if let Some(bridge) = bridge.upgrade() {
                bridge.spawn_completion(session);
            }
        });

        // Registered outside the lock: sources may dispatch during subscribe.
        let subscription = events.on_auth_state_change(listener);
        let mut slot = self.subscription.lock();
        if slot.is_none() {
            *slot = Some(subscription);
            relay_step!(verbose, "Registered auth state listener");
        } else {
            subscription.unsubscribe();
        }
    }

    fn spawn_completion(&self, found: ProviderSession) {
        let session = match Session::from_provider(&found, false, Some(SessionSource::AuthBridge)) {
            Ok(session) => session,
            Err(e) => {
                debug!(error = %e, "Ignoring unusable signed-in session");
                return;
            }
        };
        let (Ok(runtime), Some(this)) = (tokio::runtime::Handle::try_current(), self.this.upgrade())
        else {
            warn!("No async runtime available, dropping signed-in session");
            return;
        };
        runtime.spawn(async move {
            this.complete(session, CompletionTrigger::AuthStateChange).await;
        });
    }

    async fn check_manual_record(&self) -> bool {
        let record = match self.records.read_manual_record() {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                debug!(error = %e, "Error parsing manual auth data");
                return false;
            }
        };

        relay_step!(self.config.debug, "Found manual auth data in page storage");
        let session = match Session::capture(
            record.token,
            None,
            record.user,
            Some(SessionSource::AuthBridge),
        ) {
            Ok(session) => session,
            Err(e) => {
                debug!(error = %e, "Ignoring unusable manual auth data");
                return false;
            }
        };

        if self
            .complete(session, CompletionTrigger::ManualRecord)
            .await
            .is_some()
        {
            if let Err(e) = self.records.clear_manual_record() {
                warn!(error = %e, "Failed to remove manual auth data");
            }
        }
        true
    }

    // ==========================================
    // Inbound page messages
    // ==========================================

    /// Handle a message posted to the page. Returns true if it completed the run.
    pub async fn handle_page_message(&self, origin: &str, data: &Value) -> bool {
        if origin != self.handles.messenger.origin() {
            relay_step!(self.config.debug, origin, "Ignoring cross-origin page message");
            return false;
        }
        let Some(PageMessage::ManualAuth(manual)) = PageMessage::decode(data) else {
            return false;
        };

        relay_step!(self.config.debug, "Received manual auth message");
        if !manual.is_well_formed() {
            debug!("Ignoring malformed manual auth message");
            return false;
        }

        match Session::capture(
            manual.token,
            None,
            manual.user,
            Some(SessionSource::AuthBridge),
        ) {
            Ok(session) => self
                .complete(session, CompletionTrigger::ManualMessage)
                .await
                .is_some(),
            Err(e) => {
                debug!(error = %e, "Ignoring unusable manual auth message");
                false
            }
        }
    }

    // ==========================================
    // Completion
    // ==========================================

    /// Relay `session` if this run has not completed yet.
    ///
    /// Returns the broadcast report, or `None` when another trigger already won.
    pub async fn complete(
        &self,
        session: Session,
        trigger: CompletionTrigger,
    ) -> Option<BroadcastReport> {
        if !self.run.lock().try_complete() {
            relay_step!(
                self.config.debug,
                trigger = trigger.as_str(),
                "Session already relayed, skipping"
            );
            return None;
        }

        info!(
            trigger = trigger.as_str(),
            user_id = session.user_id().unwrap_or("unknown"),
            "Session found, relaying to extension"
        );
        Some(self.broadcaster.broadcast(&session).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_starts_idle() {
        let run = RelayRun::new(30);
        assert_eq!(run.phase(), RunPhase::Idle);
        assert_eq!(run.attempt(), 0);
        assert_eq!(run.max_attempts(), 30);
        assert!(!run.is_active());
    }

    #[test]
    fn test_start_is_idempotent_while_active() {
        let mut run = RelayRun::new(3);
        assert!(run.start());
        assert!(!run.start());
        assert_eq!(run.generation(), 1);
    }

    #[test]
    fn test_record_miss_until_exhausted() {
        let mut run = RelayRun::new(3);
        run.start();

        assert_eq!(run.record_miss(), MissOutcome::Retry { attempt: 1 });
        assert_eq!(run.record_miss(), MissOutcome::Retry { attempt: 2 });
        assert_eq!(run.record_miss(), MissOutcome::Exhausted { attempts: 3 });
        assert_eq!(run.phase(), RunPhase::Exhausted);
        assert_eq!(run.record_miss(), MissOutcome::Inactive);
    }

    #[test]
    fn test_restart_after_exhaustion_resets_attempts() {
        let mut run = RelayRun::new(1);
        run.start();
        run.record_miss();
        assert_eq!(run.phase(), RunPhase::Exhausted);

        assert!(run.start());
        assert_eq!(run.attempt(), 0);
        assert_eq!(run.generation(), 2);
    }

    #[test]
    fn test_try_complete_wins_once() {
        let mut run = RelayRun::new(3);
        run.start();
        assert!(run.try_complete());
        assert!(!run.try_complete());
        assert_eq!(run.phase(), RunPhase::Completed);
        assert!(!run.start());
        assert_eq!(run.record_miss(), MissOutcome::Inactive);
    }

    #[test]
    fn test_try_complete_after_exhaustion() {
        let mut run = RelayRun::new(1);
        run.start();
        run.record_miss();
        assert!(run.try_complete());
    }
}
