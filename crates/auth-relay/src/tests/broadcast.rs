//! Broadcast totality: every channel is attempted regardless of the others.

use super::harness::{provider_session, settle, PageHarness, ORIGIN};
use crate::{ChannelOutcome, CompletionTrigger, RunPhase, Session, SessionSource};
use serde_json::json;

fn session(token: &str) -> Session {
    Session::capture(
        token,
        None,
        json!({ "id": "user-1" }),
        Some(SessionSource::AuthBridge),
    )
    .unwrap()
}

#[tokio::test]
async fn healthy_page_receives_all_three_channels() {
    let page = PageHarness::new().with_provider();
    page.provider.set_session(Some(provider_session("access-1")));
    let bridge = page.bridge(30);

    bridge.start();
    settle().await;

    let in_page = page.messenger.auth_successes();
    assert_eq!(in_page.len(), 1);
    assert_eq!(in_page[0].token, "access-1");
    assert_eq!(in_page[0].source, Some(SessionSource::AuthBridge));
    assert_eq!(in_page[0].user["email"], "student@example.edu");
    // The polling path never forwards the refresh token
    assert_eq!(in_page[0].refresh_token, None);
    assert_eq!(page.messenger.target_origins(), vec![ORIGIN.to_string()]);

    let calls = page.extension.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "sift-extension-test");
    assert_eq!(calls[0].1.source, Some(SessionSource::Website));
    assert_eq!(calls[0].1.token, "access-1");

    assert_eq!(page.stored("sift_auth_token").as_deref(), Some("access-1"));
    assert_eq!(
        page.stored("sift_auth_timestamp"),
        Some(in_page[0].timestamp.to_string())
    );
    let stored_user: serde_json::Value =
        serde_json::from_str(&page.stored("sift_auth_user").unwrap()).unwrap();
    assert_eq!(stored_user["id"], "user-1");

    assert_eq!(bridge.run_state().phase(), RunPhase::Completed);
}

#[tokio::test]
async fn failing_extension_and_storage_do_not_block_in_page_delivery() {
    let page = PageHarness::new().with_provider();
    page.provider.set_session(Some(provider_session("access-1")));
    page.extension.set_failing(true);
    page.storage.set_failing_writes(true);
    let bridge = page.bridge(30);

    bridge.start();
    settle().await;

    assert_eq!(page.messenger.auth_successes().len(), 1);
    assert_eq!(page.extension.calls().len(), 1);
    assert!(page.storage.write_attempts() >= 1);
    assert!(page.stored("sift_auth_token").is_none());

    // The run still deactivates
    assert_eq!(bridge.run_state().phase(), RunPhase::Completed);
}

#[tokio::test]
async fn report_records_each_channel() {
    let page = PageHarness::new();
    page.extension.set_failing(true);
    page.storage.set_failing_writes(true);
    let bridge = page.bridge(30);

    let report = bridge
        .complete(session("tok"), CompletionTrigger::ManualMessage)
        .await
        .unwrap();

    assert_eq!(report.in_page, ChannelOutcome::Delivered);
    assert!(matches!(report.extension, ChannelOutcome::Failed(_)));
    assert!(matches!(report.storage, ChannelOutcome::Failed(ref reason) if reason.contains("quota")));
    assert!(!report.fully_delivered());
}

#[tokio::test]
async fn failing_page_messaging_still_reaches_extension_and_storage() {
    let page = PageHarness::new();
    page.messenger.set_failing(true);
    let bridge = page.bridge(30);

    let report = bridge
        .complete(session("tok"), CompletionTrigger::ManualMessage)
        .await
        .unwrap();

    assert!(matches!(report.in_page, ChannelOutcome::Failed(_)));
    assert_eq!(report.extension, ChannelOutcome::Delivered);
    assert_eq!(report.storage, ChannelOutcome::Delivered);
    assert_eq!(page.stored("sift_auth_token").as_deref(), Some("tok"));
}

#[tokio::test]
async fn missing_extension_runtime_is_skipped() {
    let page = PageHarness::new().without_extension();
    let bridge = page.bridge(30);

    let report = bridge
        .complete(session("tok"), CompletionTrigger::SessionQuery)
        .await
        .unwrap();

    assert_eq!(report.in_page, ChannelOutcome::Delivered);
    assert_eq!(report.extension, ChannelOutcome::Skipped);
    assert_eq!(report.storage, ChannelOutcome::Delivered);
    assert!(page.extension.calls().is_empty());
}

#[tokio::test]
async fn second_completion_is_rejected() {
    let page = PageHarness::new();
    let bridge = page.bridge(30);

    assert!(bridge
        .complete(session("first"), CompletionTrigger::AuthStateChange)
        .await
        .is_some());
    assert!(bridge
        .complete(session("second"), CompletionTrigger::SessionQuery)
        .await
        .is_none());

    let sent = page.messenger.auth_successes();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].token, "first");
    assert_eq!(page.stored("sift_auth_token").as_deref(), Some("first"));
}

#[tokio::test]
async fn relayed_session_can_be_read_back() {
    let page = PageHarness::new();
    let bridge = page.bridge(30);
    let captured = session("tok");

    bridge
        .complete(captured.clone(), CompletionTrigger::ManualMessage)
        .await;

    let relayed = page.records().read_relayed().unwrap().unwrap();
    assert_eq!(relayed.token, "tok");
    assert_eq!(relayed.user, json!({ "id": "user-1" }));
    assert_eq!(relayed.timestamp, captured.timestamp());
}
