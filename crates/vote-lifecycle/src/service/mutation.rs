//! Optimistic mutation engine
//!
//! Applies a vote to the local cache before the authoritative call, then
//! confirms or rolls back when the call settles.
//!
//! ```text
//! apply_vote ──→ [cache write, snapshot] ──→ store.upsert / store.delete
//!                                                 │
//!                               ┌── Ok ──→ confirm (keep, swap provisional id)
//!                               └── Err ─→ roll back (restore snapshot,
//!                                           or invalidate and reload when
//!                                           another vote overlapped)
//! ```

use crate::domain::{
    aggregate_votes, AggregateOptions, FetchedVotes, PhaseClassifier, SharedVoteCache,
    StoreCommand, VoteMutation, VoteOutcome, VoteTally,
};
use crate::error::{MutationError, MutationResult, StoreResult};
use crate::metrics;
use crate::ports::inbound::VoteRequest;
use crate::ports::outbound::{TimeSource, VoteStore};
use shared_types::{UserId, Vote, VoteTarget};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Optimistic vote mutation service.
pub struct VoteMutationService<S: VoteStore> {
    store: Arc<S>,
    cache: SharedVoteCache,
    clock: Arc<dyn TimeSource>,
    classifier: PhaseClassifier,
}

impl<S: VoteStore> VoteMutationService<S> {
    pub fn new(
        store: Arc<S>,
        cache: SharedVoteCache,
        clock: Arc<dyn TimeSource>,
        classifier: PhaseClassifier,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            classifier,
        }
    }

    /// The cache this service writes to.
    pub fn cache(&self) -> SharedVoteCache {
        Arc::clone(&self.cache)
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Apply a vote click.
    ///
    /// The cache write and snapshot happen under one lock with no await in
    /// between, so clicks from one user land in the cache in click order.
    /// A miss is loaded first; the load is retried if the target is
    /// invalidated while it runs.
    pub async fn apply_vote(&self, request: VoteRequest) -> MutationResult<VoteOutcome> {
        let Some(user_id) = request.actor else {
            warn!(target_id = %request.target, "Vote rejected: unauthenticated");
            return Err(MutationError::Unauthenticated);
        };
        let target = request.target;

        let mut fetched: Option<FetchedVotes> = None;
        let pending = loop {
            let epoch = {
                let mut cache = self.cache.write();
                let epoch = cache.epoch(&target);
                let fresh = fetched.as_ref().is_some_and(|f| f.epoch == epoch);
                if fresh || cache.contains(&target) {
                    let now = self.clock.now();
                    let phase = self.classifier.classify(request.vote_deadline, now);
                    break VoteMutation::begin(
                        &mut cache,
                        fetched.take(),
                        target,
                        user_id,
                        request.value,
                        phase,
                        now,
                    );
                }
                epoch
            };
            if fetched.is_some() {
                debug!(target_id = %target, "Target invalidated during load, reloading");
            } else {
                debug!(target_id = %target, "Cache miss before vote, loading");
            }
            let votes = self.store.read_votes(target).await?;
            fetched = Some(FetchedVotes { votes, epoch });
        };

        debug!(
            target_id = %target,
            user_id = %user_id,
            change = ?pending.change(),
            "Optimistic vote applied"
        );

        match self.execute(pending.command()).await {
            Ok(stored) => {
                let confirmed = pending.confirm(&mut self.cache.write(), stored);
                let outcome = confirmed.outcome();
                metrics::record_vote_mutation(outcome.label());
                info!(
                    target_id = %target,
                    user_id = %user_id,
                    outcome = outcome.label(),
                    "Vote confirmed"
                );
                Ok(outcome)
            }
            Err(err) => {
                let rolled_back = pending.roll_back(&mut self.cache.write());
                metrics::record_rollback();
                warn!(
                    target_id = %target,
                    user_id = %user_id,
                    error = %err,
                    restored = rolled_back.restored(),
                    "Vote rejected by store, rolled back"
                );
                if !rolled_back.restored() {
                    if let Err(reload) = self.votes_for(target).await {
                        debug!(target_id = %target, error = %reload, "Reload after rollback failed");
                    }
                }
                Err(err.into())
            }
        }
    }

    async fn execute(&self, command: StoreCommand) -> StoreResult<Option<Vote>> {
        match command {
            StoreCommand::Upsert(vote) => self.store.upsert_vote(vote).await.map(Some),
            StoreCommand::Delete { target, user_id } => {
                self.store.delete_vote(target, user_id).await.map(|()| None)
            }
        }
    }

    /// Votes on `target`, loading from the store on a miss.
    pub async fn votes_for(&self, target: VoteTarget) -> MutationResult<Vec<Vote>> {
        let epoch = {
            let cache = self.cache.read();
            if let Some(votes) = cache.get(&target) {
                return Ok(votes.to_vec());
            }
            cache.epoch(&target)
        };

        let votes = self.store.read_votes(target).await?;
        let mut cache = self.cache.write();
        if !cache.fill(target, votes.clone(), epoch) {
            // Someone else filled it first; prefer theirs if still there
            if let Some(current) = cache.get(&target) {
                return Ok(current.to_vec());
            }
        }
        Ok(votes)
    }

    pub async fn tally_for(
        &self,
        target: VoteTarget,
        viewer: Option<UserId>,
        options: AggregateOptions,
    ) -> MutationResult<VoteTally> {
        let votes = self.votes_for(target).await?;
        Ok(aggregate_votes(&votes, viewer, options))
    }

    /// Cached votes without touching the store.
    pub fn cached_votes(&self, target: &VoteTarget) -> Option<Vec<Vote>> {
        self.cache.read().get(target).map(<[Vote]>::to_vec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryVoteStore;
    use crate::domain::{UpsertVote, VoteCache};
    use crate::error::StoreError;
    use crate::ports::outbound::ManualTimeSource;
    use async_trait::async_trait;
    use shared_types::{CommentId, PostId, VoteValue};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    const NOW: u64 = 1_700_000_000_000;
    const HOUR: u64 = 60 * 60 * 1000;

    fn service() -> (VoteMutationService<InMemoryVoteStore>, Arc<ManualTimeSource>) {
        let clock = Arc::new(ManualTimeSource::new(NOW));
        let service = VoteMutationService::new(
            Arc::new(InMemoryVoteStore::new()),
            VoteCache::shared(),
            clock.clone(),
            PhaseClassifier::default(),
        );
        (service, clock)
    }

    fn request(target: VoteTarget, user: UserId, value: VoteValue) -> VoteRequest {
        VoteRequest::new(target, Some(user), value, Some(NOW + 2 * HOUR))
    }

    fn row(target: VoteTarget, user_id: UserId, value: VoteValue) -> UpsertVote {
        UpsertVote {
            target,
            user_id,
            value,
            persuasion_changed: false,
            original_value: None,
            changed_at: None,
        }
    }

    /// Holds the first upsert until released, then fails it.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryVoteStore,
        upserts: AtomicUsize,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl VoteStore for GatedStore {
        async fn read_votes(&self, target: VoteTarget) -> StoreResult<Vec<Vote>> {
            self.inner.read_votes(target).await
        }

        async fn upsert_vote(&self, vote: UpsertVote) -> StoreResult<Vote> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.notify_one();
                self.release.notified().await;
                return Err(StoreError::Unavailable {
                    reason: "timed out".to_string(),
                });
            }
            self.inner.upsert_vote(vote).await
        }

        async fn delete_vote(&self, target: VoteTarget, user_id: UserId) -> StoreResult<()> {
            self.inner.delete_vote(target, user_id).await
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_leaves_cache_untouched() {
        let (service, _) = service();
        let target = VoteTarget::Post(PostId::new_v4());

        let err = service
            .apply_vote(VoteRequest::new(target, None, VoteValue::Up, None))
            .await
            .unwrap_err();

        assert_eq!(err, MutationError::Unauthenticated);
        assert!(service.cache().read().is_empty());
        assert_eq!(service.store().write_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_confirms_with_store_id() {
        let (service, _) = service();
        let target = VoteTarget::Post(PostId::new_v4());
        let user = UserId::new_v4();

        let outcome = service
            .apply_vote(request(target, user, VoteValue::Up))
            .await
            .unwrap();

        let VoteOutcome::Inserted { vote } = outcome else {
            panic!("expected insert");
        };
        assert!(!vote.id.is_provisional());
        let cached = service.cached_votes(&target).unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].id, vote.id);
    }

    #[tokio::test]
    async fn test_toggle_law() {
        let (service, _) = service();
        let target = VoteTarget::Post(PostId::new_v4());
        let user = UserId::new_v4();

        service
            .apply_vote(request(target, user, VoteValue::Up))
            .await
            .unwrap();
        let second = service
            .apply_vote(request(target, user, VoteValue::Up))
            .await
            .unwrap();

        assert_eq!(second.label(), "deleted");
        assert!(service.cached_votes(&target).unwrap().is_empty());
        assert!(service.store().read_votes(target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flip_during_persuasion_is_audited() {
        let (service, clock) = service();
        let target = VoteTarget::Post(PostId::new_v4());
        let user = UserId::new_v4();
        let deadline = NOW + 2 * HOUR;

        service
            .apply_vote(VoteRequest::new(target, Some(user), VoteValue::Up, Some(deadline)))
            .await
            .unwrap();
        clock.advance(90 * 60 * 1000);
        let outcome = service
            .apply_vote(VoteRequest::new(target, Some(user), VoteValue::Down, Some(deadline)))
            .await
            .unwrap();

        let vote = outcome.current().unwrap();
        assert!(vote.persuasion_changed);
        assert_eq!(vote.original_value, Some(VoteValue::Up));

        let stored = service.store().read_votes(target).await.unwrap();
        assert!(stored[0].persuasion_changed);
        assert_eq!(stored[0].value, VoteValue::Down);
    }

    #[tokio::test]
    async fn test_failure_restores_exact_snapshot() {
        let (service, _) = service();
        let target = VoteTarget::Post(PostId::new_v4());
        let user = UserId::new_v4();

        service
            .apply_vote(request(target, UserId::new_v4(), VoteValue::Down))
            .await
            .unwrap();
        let before = service.cache().read().snapshot(&target);

        service.store().fail_next_write("connection reset");
        let err = service
            .apply_vote(request(target, user, VoteValue::Up))
            .await
            .unwrap_err();

        assert!(matches!(err, MutationError::NetworkFailure { .. }));
        assert_eq!(service.cache().read().snapshot(&target), before);
    }

    #[tokio::test]
    async fn test_failure_on_uncached_target_leaves_it_uncached() {
        let (service, _) = service();
        let target = VoteTarget::Comment {
            post_id: PostId::new_v4(),
            comment_id: CommentId::new_v4(),
        };

        service.store().fail_next_write("503");
        let result = service
            .apply_vote(request(target, UserId::new_v4(), VoteValue::Up))
            .await;

        assert!(result.is_err());
        assert!(service.cached_votes(&target).is_none());
    }

    #[tokio::test]
    async fn test_read_failure_is_network_failure() {
        let (service, _) = service();
        let target = VoteTarget::Post(PostId::new_v4());

        service.store().fail_next_read("timeout");
        let err = service.votes_for(target).await.unwrap_err();
        assert!(matches!(err, MutationError::NetworkFailure { .. }));
        assert!(service.cached_votes(&target).is_none());
    }

    #[tokio::test]
    async fn test_tally_reads_through() {
        let (service, _) = service();
        let target = VoteTarget::Post(PostId::new_v4());
        let viewer = UserId::new_v4();
        for user in [viewer, UserId::new_v4(), UserId::new_v4()] {
            service
                .apply_vote(request(target, user, VoteValue::Up))
                .await
                .unwrap();
        }
        service.cache().write().invalidate(&target);

        let tally = service
            .tally_for(target, Some(viewer), AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(tally.up_count, 3);
        assert_eq!(tally.user_vote, Some(VoteValue::Up));
        assert!(service.cache().read().contains(&target));
    }

    #[tokio::test]
    async fn test_late_failure_keeps_later_vote() {
        let store = Arc::new(GatedStore::default());
        let service = VoteMutationService::new(
            store.clone(),
            VoteCache::shared(),
            Arc::new(ManualTimeSource::new(NOW)),
            PhaseClassifier::default(),
        );
        let target = VoteTarget::Post(PostId::new_v4());
        let user = UserId::new_v4();
        service.votes_for(target).await.unwrap();

        let second_click = async {
            store.entered.notified().await;
            let outcome = service.apply_vote(request(target, user, VoteValue::Down)).await;
            store.release.notify_one();
            outcome
        };
        let (first, second) = tokio::join!(
            service.apply_vote(request(target, user, VoteValue::Up)),
            second_click
        );

        assert!(matches!(first, Err(MutationError::NetworkFailure { .. })));
        assert_eq!(second.unwrap().label(), "updated");

        let stored = store.inner.rows(&target);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, VoteValue::Down);
        assert_eq!(service.cached_votes(&target), Some(stored));
        assert_eq!(service.cache().read().pending_writes(&target), 0);
    }

    #[tokio::test]
    async fn test_invalidation_during_load_forces_reload() {
        let (service, _) = service();
        let store = service.store();
        let target = VoteTarget::Post(PostId::new_v4());
        let neighbour = UserId::new_v4();
        let user = UserId::new_v4();
        store
            .upsert_vote(row(target, neighbour, VoteValue::Up))
            .await
            .unwrap();
        store.set_read_delay(Duration::from_millis(40));

        let remote_flip = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store
                .upsert_vote(row(target, neighbour, VoteValue::Down))
                .await
                .unwrap();
            service.cache().write().invalidate(&target);
        };
        let (outcome, ()) = tokio::join!(
            service.apply_vote(request(target, user, VoteValue::Up)),
            remote_flip
        );
        outcome.unwrap();

        let cached = service.cached_votes(&target).unwrap();
        assert_eq!(cached.len(), 2);
        let flipped = cached.iter().find(|v| v.user_id == neighbour).unwrap();
        assert_eq!(flipped.value, VoteValue::Down);
    }
}
