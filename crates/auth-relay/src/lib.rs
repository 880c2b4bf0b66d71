//! Cross-context auth relay for the Sift website.
//!
//! This crate provides:
//! - The bridge that polls the page for a signed-in session and relays it to
//!   the browser extension over in-page messaging, direct extension messaging
//!   and page storage
//! - The sign-in callback handler, an explicit FSM that settles a provider
//!   redirect or magic-link sign-in exactly once
//! - The page message contract shared with the extension's content script
//! - A Supabase auth client implementing the provider seams
//!
//! Every browser capability is a trait in [`host`] or [`provider`], so hosts
//! decide how messages, storage and navigation are actually performed.

/// Per-step relay trace; promoted to `debug` when the bridge debug flag is set.
macro_rules! relay_step {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::debug!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    };
}

mod bridge;
mod broadcast;
mod callback;
mod callback_fsm;
mod error;
pub mod host;
mod message;
pub mod provider;
mod session;
mod supabase_client;

#[cfg(test)]
mod tests;

pub use bridge::{AuthBridge, CompletionTrigger, CycleOutcome, MissOutcome, RelayRun, RunPhase};
pub use broadcast::{post_auth_success, BroadcastReport, Broadcaster, ChannelOutcome};
pub use callback::{CallbackHandler, CallbackPage};
pub use callback_fsm::callback_machine;
pub use callback_fsm::{CallbackInput, CallbackMachine, CallbackMachineState, CallbackState};
pub use error::{RelayError, RelayResult};
pub use host::{ExtensionRuntime, Navigator, Notifier, PageHandles, PageMessenger, ReadyState};
pub use message::{AuthSuccess, ManualAuth, PageMessage};
pub use provider::{
    AuthEvent, AuthEventSource, AuthStateListener, BindingResolver, ListenerRegistry,
    ProviderBinding, SessionQuery, StaticBindings, Subscription,
};
pub use session::{ProviderSession, Session, SessionSource};
pub use supabase_client::{OAuthProvider, SupabaseAuthClient};

pub use relay_config_and_utils::{BridgeConfig, CallbackConfig};
