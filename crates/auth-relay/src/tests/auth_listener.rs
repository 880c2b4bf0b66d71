//! Provider discovery and the bridge's auth-state listener.

use super::harness::{provider_session, settle, PageHarness};
use crate::provider::{AuthEvent, ProviderBinding};
use crate::RunPhase;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn listener_is_registered_once_per_bridge() {
    let page = PageHarness::new().with_provider();
    let bridge = page.bridge(5);

    bridge.start();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(page.provider.query_count(), 5);
    assert_eq!(page.provider.listener_count(), 1);

    // A second run reuses the same listener
    bridge.on_window_load();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(page.provider.listener_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn signed_in_event_after_exhaustion_still_relays() {
    let page = PageHarness::new().with_provider();
    let bridge = page.bridge(2);

    bridge.start();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(bridge.run_state().phase(), RunPhase::Exhausted);

    page.provider
        .emit(AuthEvent::SignedIn, Some(provider_session("late-token")));
    settle().await;

    let sent = page.messenger.auth_successes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, "late-token");
    assert_eq!(bridge.run_state().phase(), RunPhase::Completed);

    // Repeated events after completion are dropped
    page.provider
        .emit(AuthEvent::SignedIn, Some(provider_session("later-token")));
    settle().await;
    assert_eq!(page.messenger.auth_successes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn signed_in_event_during_polling_wins_once() {
    let page = PageHarness::new().with_provider();
    let bridge = page.bridge(30);

    bridge.start();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let session = provider_session("event-token");
    page.provider.set_session(Some(session.clone()));
    page.provider.emit(AuthEvent::SignedIn, Some(session));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let sent = page.messenger.auth_successes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, "event-token");
    // The poll loop stopped instead of relaying the same session again
    assert_eq!(page.provider.query_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn other_events_are_ignored() {
    let page = PageHarness::new().with_provider();
    let bridge = page.bridge(30);

    bridge.start();
    settle().await;

    page.provider
        .emit(AuthEvent::TokenRefreshed, Some(provider_session("refreshed")));
    page.provider
        .emit(AuthEvent::InitialSession, Some(provider_session("initial")));
    page.provider.emit(AuthEvent::SignedOut, None);
    page.provider.emit(AuthEvent::SignedIn, None);
    page.provider
        .emit(AuthEvent::SignedIn, Some(provider_session("")));
    settle().await;

    assert!(page.messenger.auth_successes().is_empty());
    assert_eq!(bridge.run_state().phase(), RunPhase::Active);
}

#[tokio::test(start_paused = true)]
async fn provider_binding_appearing_later_is_discovered() {
    let page = PageHarness::new();
    let bridge = page.bridge(30);

    bridge.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(page.provider.query_count(), 0);

    page.provider.set_session(Some(provider_session("late-client")));
    page.bind_provider("supabaseClient");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(page.provider.query_count(), 1);
    assert_eq!(page.messenger.auth_successes()[0].token, "late-client");
}

#[tokio::test(start_paused = true)]
async fn first_usable_binding_is_used() {
    let page = PageHarness::new();
    // Listed first, but exposes nothing
    page.bindings.insert(ProviderBinding::new("supabase"));
    page.bind_provider("_supabase");
    page.provider.set_session(Some(provider_session("from-underscore")));
    let bridge = page.bridge(30);

    bridge.start();
    settle().await;

    assert_eq!(page.messenger.auth_successes()[0].token, "from-underscore");
}

#[tokio::test(start_paused = true)]
async fn events_only_binding_relays_through_listener() {
    let page = PageHarness::new();
    page.bindings
        .insert(ProviderBinding::new("supabase").with_events(page.provider.clone()));
    let bridge = page.bridge(30);

    bridge.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(page.provider.query_count(), 0);
    assert_eq!(page.provider.listener_count(), 1);

    page.provider
        .emit(AuthEvent::SignedIn, Some(provider_session("evt")));
    settle().await;

    assert_eq!(page.messenger.auth_successes()[0].token, "evt");
}
