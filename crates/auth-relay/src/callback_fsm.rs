//! Sign-in callback state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐  SlowProvider   ┌─────────────────┐
//! │     Pending     │ ──────────────► │     Delayed     │
//! └────────┬────────┘                 └────────┬────────┘
//!          │                                   │
//!          ├───────────────────┬───────────────┤
//!          │ SessionReady      │ ProviderError │ SignedOut
//!          ▼                   │ RefreshWithout│
//!     Succeeded                │ Session       ▼
//!                              │ TimedOut   SignedOut
//!                              ▼
//!                            Failed
//! ```
//!
//! Succeeded, Failed and SignedOut are terminal: every input is rejected.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub callback_machine(Pending)

    Pending => {
        SessionReady => Succeeded,
        ProviderError => Failed,
        RefreshWithoutSession => Failed,
        SignedOut => SignedOut,
        SlowProvider => Delayed,
        TimedOut => Failed
    },
    Delayed => {
        SessionReady => Succeeded,
        ProviderError => Failed,
        RefreshWithoutSession => Failed,
        SignedOut => SignedOut,
        TimedOut => Failed
    }
}

pub use callback_machine::Input as CallbackInput;
pub use callback_machine::State as CallbackMachineState;
pub use callback_machine::StateMachine as CallbackMachine;

/// Callback handler state for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackState {
    /// Waiting for the provider to settle the sign-in.
    Pending,
    /// Still waiting after the slow-provider notice.
    Delayed,
    /// Session relayed, navigated to the post-login path.
    Succeeded,
    /// Navigated back to sign-in with an error notice.
    Failed,
    /// Provider reported sign-out, navigated back to sign-in.
    SignedOut,
}

impl CallbackState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallbackState::Succeeded | CallbackState::Failed | CallbackState::SignedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackState::Pending => "pending",
            CallbackState::Delayed => "delayed",
            CallbackState::Succeeded => "succeeded",
            CallbackState::Failed => "failed",
            CallbackState::SignedOut => "signed_out",
        }
    }
}

impl From<&CallbackMachineState> for CallbackState {
    fn from(state: &CallbackMachineState) -> Self {
        match state {
            CallbackMachineState::Pending => CallbackState::Pending,
            CallbackMachineState::Delayed => CallbackState::Delayed,
            CallbackMachineState::Succeeded => CallbackState::Succeeded,
            CallbackMachineState::Failed => CallbackState::Failed,
            CallbackMachineState::SignedOut => CallbackState::SignedOut,
        }
    }
}
