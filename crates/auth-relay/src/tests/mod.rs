//! Scenario tests for the auth relay.
//!
//! - `harness.rs`           - Recording page capabilities and a scripted provider
//! - `run_lifecycle.rs`     - Run start idempotence, attempt timing and exhaustion
//! - `broadcast.rs`         - Delivery over every channel, with channels failing
//! - `manual_auth.rs`       - Manual Auth Record and `MANUAL_AUTH` messages
//! - `auth_listener.rs`     - Provider discovery and the auth-state listener
//! - `callback_flow.rs`     - Sign-in callback outcomes, notices and navigation

mod auth_listener;
mod broadcast;
