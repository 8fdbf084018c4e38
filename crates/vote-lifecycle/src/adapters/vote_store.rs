//! In-memory vote store
//!
//! Implements `VoteStore` with one row per `(target, user)` and publishes
//! `VotesChanged` to the change feed after every committed write.

use crate::domain::UpsertVote;
use crate::error::{StoreError, StoreResult};
use crate::ports::outbound::VoteStore;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_bus::{ChangeEvent, ChangePublisher};
use shared_types::{UserId, Vote, VoteId, VoteTarget};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryVoteStore {
    rows: RwLock<HashMap<VoteTarget, Vec<Vote>>>,
    feed: Option<Arc<dyn ChangePublisher>>,
    next_read_failure: Mutex<Option<String>>,
    next_write_failure: Mutex<Option<String>>,
    read_delay: Mutex<Duration>,
    writes: AtomicU64,
}

impl InMemoryVoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that announces its writes on `feed`.
    pub fn with_feed(feed: Arc<dyn ChangePublisher>) -> Self {
        Self {
            feed: Some(feed),
            ..Self::default()
        }
    }

    /// Make the next `read_votes` fail with `Unavailable`.
    pub fn fail_next_read(&self, reason: &str) {
        *self.next_read_failure.lock() = Some(reason.to_string());
    }

    /// Make the next upsert or delete fail with `Unavailable`.
    pub fn fail_next_write(&self, reason: &str) {
        *self.next_write_failure.lock() = Some(reason.to_string());
    }

    /// Delay every `read_votes`. Rows are captured before the delay, so a
    /// slow read returns what the store held when it started.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock() = delay;
    }

    /// Committed writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Current rows for a target, bypassing failure injection.
    pub fn rows(&self, target: &VoteTarget) -> Vec<Vote> {
        self.rows.read().get(target).cloned().unwrap_or_default()
    }

    fn take_failure(slot: &Mutex<Option<String>>) -> StoreResult<()> {
        let failure = slot.lock().take();
        match failure {
            Some(reason) => Err(StoreError::Unavailable { reason }),
            None => Ok(()),
        }
    }

    async fn committed(&self, target: VoteTarget) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        if let Some(feed) = &self.feed {
            feed.publish(ChangeEvent::VotesChanged { target }).await;
        }
    }
}

#[async_trait]
impl VoteStore for InMemoryVoteStore {
    async fn read_votes(&self, target: VoteTarget) -> StoreResult<Vec<Vote>> {
        Self::take_failure(&self.next_read_failure)?;
        let rows = self.rows(&target);
        let delay = *self.read_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(rows)
    }

    async fn upsert_vote(&self, vote: UpsertVote) -> StoreResult<Vote> {
        Self::take_failure(&self.next_write_failure)?;

        let stored = {
            let mut rows = self.rows.write();
            let votes = rows.entry(vote.target).or_default();
            match votes.iter_mut().find(|v| v.user_id == vote.user_id) {
                Some(existing) => {
                    existing.value = vote.value;
                    existing.persuasion_changed = vote.persuasion_changed;
                    existing.original_value = vote.original_value;
                    existing.changed_at = vote.changed_at;
                    existing.clone()
                }
                None => {
                    let mut row = Vote::new(
                        VoteId::Confirmed(Uuid::new_v4()),
                        vote.target,
                        vote.user_id,
                        vote.value,
                    );
                    row.persuasion_changed = vote.persuasion_changed;
                    row.original_value = vote.original_value;
                    row.changed_at = vote.changed_at;
                    votes.push(row.clone());
                    row
                }
            }
        };

        debug!(target_id = %stored.target, user_id = %stored.user_id, "Vote row upserted");
        self.committed(stored.target).await;
        Ok(stored)
    }

    async fn delete_vote(&self, target: VoteTarget, user_id: UserId) -> StoreResult<()> {
        Self::take_failure(&self.next_write_failure)?;

        let removed = {
            let mut rows = self.rows.write();
            match rows.get_mut(&target) {
                Some(votes) => {
                    let before = votes.len();
                    votes.retain(|v| v.user_id != user_id);
                    votes.len() != before
                }
                None => false,
            }
        };
        if !removed {
            return Err(StoreError::NotFound {
                target: target.to_string(),
            });
        }

        debug!(target_id = %target, user_id = %user_id, "Vote row deleted");
        self.committed(target).await;
        Ok(())
    }
}
