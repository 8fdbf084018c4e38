//! # Change Publisher
//!
//! Defines the publishing side of the change feed.

use crate::events::{ChangeEvent, ChangeFilter};
use crate::subscriber::{ChangeStream, ChangeSubscriber, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Trait for publishing changes to the feed.
///
/// The authoritative store (or its adapter) publishes here after every
/// committed write.
#[async_trait]
pub trait ChangePublisher: Send + Sync {
    /// Publish a change to the feed.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the change.
    async fn publish(&self, event: ChangeEvent) -> usize;

    /// Get the total number of changes published.
    fn events_published(&self) -> u64;
}

/// In-memory implementation of the change feed.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
/// Delivery is best-effort: a lagging subscriber loses the oldest changes
/// and is told how many through `Received::Lagged`.
pub struct InMemoryChangeFeed {
    /// Broadcast sender for changes.
    sender: broadcast::Sender<ChangeEvent>,

    /// Active subscription count by scope.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total changes published.
    events_published: AtomicU64,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryChangeFeed {
    /// Create a new in-memory feed with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory feed with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to changes matching a filter.
    ///
    /// Returns a `Subscription` handle; dropping it unsubscribes.
    #[must_use]
    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let key = filter.tracking_key();

        {
            if let Ok(mut subs) = self.subscriptions.write() {
                *subs.entry(key.clone()).or_insert(0) += 1;
            }
        }

        debug!(topics = ?filter.topics, posts = filter.posts.len(), "New subscription created");

        Subscription::new(receiver, filter, self.subscriptions.clone(), key)
    }

    /// Get a stream of changes matching a filter.
    #[must_use]
    pub fn change_stream(&self, filter: ChangeFilter) -> ChangeStream {
        ChangeStream::new(self.subscribe(filter))
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the number of distinct subscription scopes.
    #[must_use]
    pub fn active_scopes(&self) -> usize {
        self.subscriptions.read().map(|subs| subs.len()).unwrap_or(0)
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSubscriber for InMemoryChangeFeed {
    fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        InMemoryChangeFeed::subscribe(self, filter)
    }
}

#[async_trait]
impl ChangePublisher for InMemoryChangeFeed {
    async fn publish(&self, event: ChangeEvent) -> usize {
        let topic = event.topic();
        let post_id = event.post_id();

        // Always increment counter (change was attempted)
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receiver_count) => {
                debug!(
                    topic = ?topic,
                    post_id = %post_id,
                    receivers = receiver_count,
                    "Change published"
                );
                receiver_count
            }
            Err(e) => {
                // No receivers - change is dropped
                warn!(
                    topic = ?topic,
                    post_id = %post_id,
                    error = %e,
                    "Change dropped (no receivers)"
                );
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
