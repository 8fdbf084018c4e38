//! Driven Ports (SPI - Outbound Dependencies)
//!
//! The authoritative collaborators the engine consumes. Each is opaque: the
//! engine trusts what they report and never caches their failures.

use crate::domain::{TransitionKind, UpsertVote};
use crate::error::{DispatchResult, StoreResult};
use async_trait::async_trait;
use shared_types::{PostId, Timestamp, UserId, Vote, VoteTarget};
use std::sync::atomic::{AtomicU64, Ordering};

/// Authoritative vote storage.
///
/// Must provide read-after-write consistency for the caller's own writes;
/// other clients' writes arrive through the change feed.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// All votes on a target.
    async fn read_votes(&self, target: VoteTarget) -> StoreResult<Vec<Vote>>;

    /// Insert or update the `(target, user)` vote, returning the stored row.
    async fn upsert_vote(&self, vote: UpsertVote) -> StoreResult<Vote>;

    /// Remove the `(target, user)` vote.
    ///
    /// Keyed by user rather than vote id: the caller may only hold a
    /// provisional id.
    async fn delete_vote(&self, target: VoteTarget, user_id: UserId) -> StoreResult<()>;
}

/// Server-side record of announced transitions.
#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// `true` if the transition has not been announced yet.
    async fn is_transition_not_sent(
        &self,
        post_id: PostId,
        kind: TransitionKind,
    ) -> DispatchResult<bool>;
}

/// Notification fan-out.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Create notification records for everyone affected by the transition.
    /// Returns the number of recipients.
    async fn create_lifecycle_notifications(
        &self,
        post_id: PostId,
        kind: TransitionKind,
        title: &str,
    ) -> DispatchResult<usize>;
}

/// Time source for consistent timestamp handling.
///
/// Abstracted to allow testing with deterministic time.
pub trait TimeSource: Send + Sync {
    /// Returns the current timestamp in milliseconds.
    fn now(&self) -> Timestamp;
}

/// Default system time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }
}

/// Manually driven clock.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    time: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(initial: Timestamp) -> Self {
        Self {
            time: AtomicU64::new(initial),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.time.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, time: Timestamp) {
        self.time.store(time, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        self.time.load(Ordering::SeqCst)
    }
}
