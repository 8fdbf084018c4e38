//! Shared fixtures for the integration flows.
//!
//! A `Backend` stands in for the authoritative side (store, feed, ledger,
//! fan-out). Each `Client` is one independent process: its own cache, its
//! own session set, its own sync bridge.

use shared_bus::{ChangeFilter, InMemoryChangeFeed};
use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;
use vote_lifecycle::adapters::{
    InMemoryNotificationLedger, InMemoryVoteStore, RealtimeSyncBridge, RecordingDispatcher,
    SyncHandle,
};
use vote_lifecycle::{LifecycleConfig, ManualTimeSource, VoteLifecycleService};
use vote_telemetry::TelemetryConfig;

/// 2023-11-14T22:13:20Z
pub const NOW: u64 = 1_700_000_000_000;
pub const MINUTE: u64 = 60 * 1000;

pub type Service =
    VoteLifecycleService<InMemoryVoteStore, InMemoryNotificationLedger, RecordingDispatcher>;

static LOGGING: Once = Once::new();

/// Install the test subscriber once per test binary.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let config = TelemetryConfig {
            log_level: "warn".to_string(),
            ..TelemetryConfig::from_env()
        };
        // Another harness may own the global subscriber
        let _ = vote_telemetry::init_logging(&config);
    });
}

/// The authoritative side, shared by every client.
pub struct Backend {
    pub feed: Arc<InMemoryChangeFeed>,
    pub store: Arc<InMemoryVoteStore>,
    pub ledger: Arc<InMemoryNotificationLedger>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub clock: Arc<ManualTimeSource>,
}

impl Backend {
    pub fn new() -> Self {
        init_test_logging();
        let feed = Arc::new(InMemoryChangeFeed::new());
        let ledger = Arc::new(InMemoryNotificationLedger::new());
        Self {
            store: Arc::new(InMemoryVoteStore::with_feed(feed.clone())),
            dispatcher: Arc::new(RecordingDispatcher::new(5).with_ledger(ledger.clone())),
            feed,
            ledger,
            clock: Arc::new(ManualTimeSource::new(NOW)),
        }
    }

    /// A client watching every change.
    pub fn client(&self) -> Client {
        self.client_with(ChangeFilter::all())
    }

    pub fn client_with(&self, filter: ChangeFilter) -> Client {
        let service = Service::new(
            LifecycleConfig::default(),
            self.store.clone(),
            self.ledger.clone(),
            self.dispatcher.clone(),
            self.clock.clone(),
        )
        .expect("default config is valid");
        let sync = RealtimeSyncBridge::spawn(self.feed.as_ref(), filter, service.cache());
        Client {
            service: Arc::new(service),
            sync,
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::new()
    }
}

/// One independent client process.
pub struct Client {
    pub service: Arc<Service>,
    pub sync: SyncHandle,
}

impl Client {
    /// Wait until the bridge has processed `events` changes.
    pub async fn synced(&self, events: u64) {
        eventually(|| async move { self.sync.events_seen() >= events }).await;
    }
}

/// Poll `check` until it holds, failing the test after one second.
pub async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let polled = tokio::time::timeout(Duration::from_secs(1), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "condition not reached within 1s");
}
