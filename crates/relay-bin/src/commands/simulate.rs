//! Run a bridge against an in-memory page described by a JSON fixture.

use crate::output::{self, OutputFormat};
use crate::page::{ExtensionMode, RecordingExtension, RecordingMessenger};
use anyhow::{Context, Result};
use async_trait::async_trait;
use auth_relay::provider::{
    AuthEvent, AuthEventSource, AuthStateListener, ListenerRegistry, ProviderBinding,
    SessionQuery, StaticBindings, Subscription,
};
use auth_relay::{
    AuthBridge, BridgeConfig, ExtensionRuntime, PageHandles, ProviderSession, RelayError,
    RelayResult, RunPhase,
};
use relay_storage::{AuthRecords, MemoryStorage, PageStorage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SITE_ORIGIN: &str = "https://sift.app";

/// Scripted page for one simulation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Bridge settings; unset fields take the configured values.
    pub bridge: BridgeOverrides,
    pub extension: ExtensionMode,
    pub storage_quota_bytes: Option<usize>,
    pub provider: Option<ProviderFixture>,
    pub manual_record: Option<ManualRecordFixture>,
    pub manual_message: Option<ManualMessageFixture>,
    /// How long to let the bridge run. Defaults to the full retry window.
    pub run_for_ms: Option<u64>,
}

/// Fixture-level bridge settings, applied over the loaded config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeOverrides {
    pub extension_id: Option<String>,
    pub retry_interval_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub debug: Option<bool>,
    pub storage_namespace: Option<String>,
    pub provider_bindings: Option<Vec<String>>,
}

impl BridgeOverrides {
    pub fn apply(&self, base: &BridgeConfig) -> BridgeConfig {
        let mut config = base.clone();
        if let Some(id) = &self.extension_id {
            config.extension_id = id.clone();
        }
        if let Some(ms) = self.retry_interval_ms {
            config.retry_interval_ms = ms;
        }
        if let Some(max) = self.max_retries {
            config.max_retries = max;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if let Some(namespace) = &self.storage_namespace {
            config.storage_namespace = namespace.clone();
        }
        if let Some(bindings) = &self.provider_bindings {
            config.provider_bindings = bindings.clone();
        }
        config
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderFixture {
    #[serde(default = "default_binding")]
    pub binding: String,
    #[serde(default)]
    pub session: Option<ProviderSession>,
    /// Attempt (1-based) from which the session query returns the session.
    #[serde(default = "default_first_attempt")]
    pub available_from_attempt: u32,
    /// Emit SIGNED_IN with the session after this delay.
    #[serde(default)]
    pub signed_in_after_ms: Option<u64>,
    /// Every session query fails with this message.
    #[serde(default)]
    pub error: Option<String>,
}

fn default_binding() -> String {
    "supabase".to_string()
}

fn default_first_attempt() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualRecordFixture {
    pub token: String,
    /// Stored exactly as given, so malformed JSON can be simulated.
    pub user_json: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualMessageFixture {
    pub after_ms: u64,
    #[serde(default)]
    pub origin: Option<String>,
    pub data: Value,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("parsing fixture {}", path.display()))
    }
}

/// Provider client driven by a fixture.
struct FixtureProvider {
    session: Option<ProviderSession>,
    available_from_attempt: u32,
    error: Option<String>,
    queries: AtomicU32,
    listeners: ListenerRegistry,
}

#[async_trait]
impl SessionQuery for FixtureProvider {
    async fn get_session(&self) -> RelayResult<Option<ProviderSession>> {
        let attempt = self.queries.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(message) = &self.error {
            return Err(RelayError::Provider(message.clone()));
        }
        if attempt >= self.available_from_attempt {
            Ok(self.session.clone())
        } else {
            Ok(None)
        }
    }
}

impl AuthEventSource for FixtureProvider {
    fn on_auth_state_change(&self, listener: AuthStateListener) -> Subscription {
        self.listeners.subscribe(listener)
    }
}

/// One delivery observed during a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub channel: &'static str,
    pub token: String,
    pub source: Option<String>,
    pub timestamp: i64,
}

/// What the simulated page saw.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub phase: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub provider_queries: u32,
    pub deliveries: Vec<Delivery>,
    pub stored_keys: Vec<String>,
    pub manual_record_remaining: bool,
}

impl SimulationReport {
    pub fn relayed(&self) -> bool {
        self.phase == "completed"
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", output::heading("Relay simulation"))?;
        writeln!(f, "{}", output::row("phase", &self.phase))?;
        writeln!(
            f,
            "{}",
            output::row("attempts", &format!("{}/{}", self.attempts, self.max_attempts))
        )?;
        writeln!(
            f,
            "{}",
            output::row("provider queries", &self.provider_queries.to_string())
        )?;
        writeln!(
            f,
            "{}",
            output::row("manual record", if self.manual_record_remaining { "present" } else { "none" })
        )?;
        writeln!(f, "{}", output::row("stored keys", &self.stored_keys.join(", ")))?;
        writeln!(f, "\n{}", output::heading("Deliveries"))?;
        if self.deliveries.is_empty() {
            write!(f, "  (none)")?;
        }
        for delivery in &self.deliveries {
            writeln!(
                f,
                "  {:<10} token={} source={}",
                delivery.channel,
                output::mask_token(&delivery.token),
                delivery.source.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }
}

fn phase_name(phase: RunPhase) -> &'static str {
    match phase {
        RunPhase::Idle => "idle",
        RunPhase::Active => "active",
        RunPhase::Completed => "completed",
        RunPhase::Exhausted => "exhausted",
    }
}

/// Every attempt plus a short grace period.
fn full_retry_window(config: &BridgeConfig) -> Duration {
    Duration::from_millis(
        config
            .retry_interval_ms
            .saturating_mul(u64::from(config.max_retries))
            .saturating_add(500),
    )
}

/// Run one fixture to completion.
pub async fn run_fixture(fixture: Fixture, defaults: &BridgeConfig) -> Result<SimulationReport> {
    let config = fixture.bridge.apply(defaults);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid bridge settings: {}", e))?;

    let storage: Arc<MemoryStorage> = Arc::new(match fixture.storage_quota_bytes {
        Some(quota) => MemoryStorage::with_quota(quota),
        None => MemoryStorage::new(),
    });
    let records = AuthRecords::new(storage.clone(), &config.storage_namespace);
    if let Some(record) = &fixture.manual_record {
        storage.set(&records.keys().manual_token(), &record.token)?;
        storage.set(&records.keys().manual_user(), &record.user_json)?;
    }

    let messenger = Arc::new(RecordingMessenger::new(SITE_ORIGIN));
    let extension = Arc::new(RecordingExtension::new(
        fixture.extension == ExtensionMode::Installed,
    ));
    let bindings = Arc::new(StaticBindings::new());

    let provider = fixture.provider.as_ref().map(|p| {
        let client = Arc::new(FixtureProvider {
            session: p.session.clone(),
            available_from_attempt: p.available_from_attempt,
            error: p.error.clone(),
            queries: AtomicU32::new(0),
            listeners: ListenerRegistry::new(),
        });
        bindings.insert(ProviderBinding::from_client(p.binding.clone(), client.clone()));
        client
    });

    let handles = PageHandles {
        messenger: messenger.clone(),
        storage: storage.clone(),
        extension: match fixture.extension {
            ExtensionMode::Absent => None,
            _ => Some(extension.clone() as Arc<dyn ExtensionRuntime>),
        },
        bindings,
    };
    let bridge = AuthBridge::install(config.clone(), handles);

    info!(max_attempts = config.max_retries, "Starting simulation");
    bridge.on_dom_ready();
    bridge.on_window_load();

    let run_for = fixture
        .run_for_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| full_retry_window(&config));

    let mut scheduled: Vec<(Duration, Scheduled)> = Vec::new();
    if let (Some(p), Some(client)) = (&fixture.provider, &provider) {
        if let (Some(after), Some(session)) = (p.signed_in_after_ms, &p.session) {
            scheduled.push((
                Duration::from_millis(after),
                Scheduled::SignedIn(client.clone(), session.clone()),
            ));
        }
    }
    if let Some(message) = &fixture.manual_message {
        scheduled.push((
            Duration::from_millis(message.after_ms),
            Scheduled::Message(
                message.origin.clone().unwrap_or_else(|| SITE_ORIGIN.to_string()),
                message.data.clone(),
            ),
        ));
    }
    scheduled.sort_by_key(|(at, _)| *at);

    let started = tokio::time::Instant::now();
    for (at, event) in scheduled {
        if at > run_for {
            break;
        }
        tokio::time::sleep(at.saturating_sub(started.elapsed())).await;
        match event {
            Scheduled::SignedIn(client, session) => {
                client.listeners.emit(AuthEvent::SignedIn, Some(&session));
                tokio::task::yield_now().await;
            }
            Scheduled::Message(origin, data) => {
                let handled = bridge.handle_page_message(&origin, &data).await;
                info!(handled, origin = %origin, "Delivered page message");
            }
        }
    }
    tokio::time::sleep(run_for.saturating_sub(started.elapsed())).await;

    let run = bridge.run_state();
    let mut deliveries: Vec<Delivery> = messenger
        .posted()
        .into_iter()
        .map(|m| Delivery {
            channel: "in-page",
            token: m.token,
            source: m.source.map(|s| s.as_str().to_string()),
            timestamp: m.timestamp,
        })
        .collect();
    deliveries.extend(extension.received().into_iter().map(|(_, m)| Delivery {
        channel: "extension",
        token: m.token,
        source: m.source.map(|s| s.as_str().to_string()),
        timestamp: m.timestamp,
    }));
    if let Some(relayed) = records.read_relayed()? {
        deliveries.push(Delivery {
            channel: "storage",
            token: relayed.token,
            source: None,
            timestamp: relayed.timestamp,
        });
    }

    let mut stored_keys: Vec<String> = storage.snapshot().into_keys().collect();
    stored_keys.sort();

    Ok(SimulationReport {
        phase: phase_name(run.phase()).to_string(),
        attempts: run.attempt(),
        max_attempts: run.max_attempts(),
        provider_queries: provider
            .map(|p| p.queries.load(Ordering::SeqCst))
            .unwrap_or(0),
        deliveries,
        stored_keys,
        manual_record_remaining: storage.has(&records.keys().manual_token())?,
    })
}

enum Scheduled {
    SignedIn(Arc<FixtureProvider>, ProviderSession),
    Message(String, Value),
}

/// `auth-relay simulate --fixture <file>`
pub async fn simulate(fixture_path: &Path, defaults: &BridgeConfig, format: &OutputFormat) -> Result<()> {
    let fixture = Fixture::load(fixture_path)?;
    let report = run_fixture(fixture, defaults).await?;
    output::print(&report, format);
    if !report.relayed() {
        info!(phase = %report.phase, "Simulation finished without relaying a session");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fast_bridge(max_retries: u32) -> BridgeConfig {
        BridgeConfig {
            retry_interval_ms: 100,
            max_retries,
            ..BridgeConfig::default()
        }
    }

    fn fixture(value: Value) -> Fixture {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_fixture_defaults() {
        let parsed = fixture(json!({}));
        assert_eq!(parsed.extension, ExtensionMode::Installed);
        assert!(parsed.bridge.max_retries.is_none());
        assert!(parsed.provider.is_none());
    }

    #[test]
    fn test_bridge_block_keeps_configured_values() {
        let configured = BridgeConfig {
            extension_id: "from-env".to_string(),
            retry_interval_ms: 750,
            ..BridgeConfig::default()
        };
        let parsed = fixture(json!({ "bridge": { "max_retries": 2 } }));

        let merged = parsed.bridge.apply(&configured);
        assert_eq!(merged.max_retries, 2);
        assert_eq!(merged.extension_id, "from-env");
        assert_eq!(merged.retry_interval_ms, 750);
    }

    #[test]
    fn test_retry_window_saturates() {
        assert_eq!(full_retry_window(&fast_bridge(5)), Duration::from_millis(1000));

        let huge = BridgeConfig {
            retry_interval_ms: u64::MAX,
            max_retries: 2,
            ..BridgeConfig::default()
        };
        assert_eq!(full_retry_window(&huge), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_fixture_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.json");
        std::fs::write(
            &path,
            r#"{ "extension": "absent", "provider": { "session": { "access_token": "t" } } }"#,
        )
        .unwrap();

        let loaded = Fixture::load(&path).unwrap();
        assert_eq!(loaded.extension, ExtensionMode::Absent);
        let provider = loaded.provider.unwrap();
        assert_eq!(provider.binding, "supabase");
        assert_eq!(provider.available_from_attempt, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_on_third_attempt_is_relayed_everywhere() {
        let parsed = fixture(json!({
            "provider": {
                "session": { "access_token": "access-1", "user": { "id": "u1" } },
                "available_from_attempt": 3
            }
        }));

        let report = run_fixture(parsed, &fast_bridge(5)).await.unwrap();

        assert!(report.relayed());
        assert_eq!(report.provider_queries, 3);
        let channels: Vec<&str> = report.deliveries.iter().map(|d| d.channel).collect();
        assert_eq!(channels, vec!["in-page", "extension", "storage"]);
        assert_eq!(
            report.stored_keys,
            vec!["sift_auth_timestamp", "sift_auth_token", "sift_auth_user"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_session_exhausts_quietly() {
        let parsed = fixture(json!({ "provider": {} }));

        let report = run_fixture(parsed, &fast_bridge(4)).await.unwrap();

        assert_eq!(report.phase, "exhausted");
        assert_eq!(report.attempts, 4);
        assert_eq!(report.provider_queries, 4);
        assert!(report.deliveries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_record_with_missing_extension() {
        let parsed = fixture(json!({
            "extension": "absent",
            "manual_record": { "token": "manual", "user_json": "{\"id\":\"u2\"}" }
        }));

        let report = run_fixture(parsed, &fast_bridge(3)).await.unwrap();

        assert!(report.relayed());
        assert!(!report.manual_record_remaining);
        let channels: Vec<&str> = report.deliveries.iter().map(|d| d.channel).collect();
        assert_eq!(channels, vec!["in-page", "storage"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_signed_in_event() {
        let parsed = fixture(json!({
            "provider": {
                "session": { "access_token": "late", "user": { "id": "u1" } },
                "available_from_attempt": 100,
                "signed_in_after_ms": 1000
            },
            "run_for_ms": 2000
        }));

        let report = run_fixture(parsed, &fast_bridge(3)).await.unwrap();

        assert!(report.relayed());
        assert_eq!(report.provider_queries, 3);
        assert_eq!(report.deliveries[0].token, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_message_from_other_origin_is_ignored() {
        let parsed = fixture(json!({
            "manual_message": {
                "after_ms": 50,
                "origin": "https://evil.example",
                "data": { "type": "MANUAL_AUTH", "token": "t", "user": { "id": "u" } }
            }
        }));

        let report = run_fixture(parsed, &fast_bridge(2)).await.unwrap();
        assert_eq!(report.phase, "exhausted");
        assert!(report.deliveries.is_empty());
    }
}
