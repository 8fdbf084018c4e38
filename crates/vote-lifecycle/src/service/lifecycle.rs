//! Vote lifecycle facade
//!
//! Wires the mutation and notification services over one cache, one clock
//! and one configuration, and exposes them as [`VoteLifecycleApi`].

use crate::config::LifecycleConfig;
use crate::domain::{
    AggregateOptions, LifecyclePhase, PhaseClassifier, SharedVoteCache, VoteCache, VoteOutcome,
    VoteTally,
};
use crate::error::{ConfigError, MutationResult};
use crate::ports::inbound::{VoteLifecycleApi, VoteRequest};
use crate::ports::outbound::{NotificationDispatcher, NotificationLedger, TimeSource, VoteStore};
use crate::service::mutation::VoteMutationService;
use crate::service::notification::NotificationService;
use async_trait::async_trait;
use shared_types::{PostId, Timestamp, UserId, Vote, VoteTarget};
use std::sync::Arc;
use tracing::info;

/// The vote lifecycle engine.
pub struct VoteLifecycleService<S, L, D>
where
    S: VoteStore,
    L: NotificationLedger,
    D: NotificationDispatcher,
{
    config: LifecycleConfig,
    clock: Arc<dyn TimeSource>,
    classifier: PhaseClassifier,
    mutations: VoteMutationService<S>,
    notifications: NotificationService<L, D>,
}

impl<S, L, D> VoteLifecycleService<S, L, D>
where
    S: VoteStore,
    L: NotificationLedger + 'static,
    D: NotificationDispatcher + 'static,
{
    /// Build over a fresh cache.
    pub fn new(
        config: LifecycleConfig,
        store: Arc<S>,
        ledger: Arc<L>,
        dispatcher: Arc<D>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ConfigError> {
        Self::with_cache(config, VoteCache::shared(), store, ledger, dispatcher, clock)
    }

    /// Build over an existing cache (shared with a sync bridge, say).
    pub fn with_cache(
        config: LifecycleConfig,
        cache: SharedVoteCache,
        store: Arc<S>,
        ledger: Arc<L>,
        dispatcher: Arc<D>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let classifier = PhaseClassifier::new(config.persuasion_window_ms);

        let mutations =
            VoteMutationService::new(store, cache, Arc::clone(&clock), classifier);
        let notifications = NotificationService::new(
            ledger,
            dispatcher,
            Arc::clone(&clock),
            classifier,
            config.expiry_grace_ms,
        );

        info!(
            persuasion_window_ms = config.persuasion_window_ms,
            expiry_grace_ms = config.expiry_grace_ms,
            "Vote lifecycle service ready"
        );

        Ok(Self {
            config,
            clock,
            classifier,
            mutations,
            notifications,
        })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn cache(&self) -> SharedVoteCache {
        self.mutations.cache()
    }

    pub fn mutations(&self) -> &VoteMutationService<S> {
        &self.mutations
    }

    pub fn notifications(&self) -> &NotificationService<L, D> {
        &self.notifications
    }

    /// Current phase of a post with this deadline.
    pub fn phase_of(&self, vote_deadline: Option<Timestamp>) -> LifecyclePhase {
        self.classifier.classify(vote_deadline, self.clock.now())
    }

    /// Aggregation options carrying the configured empathy weight.
    pub fn aggregate_options(&self, exclude_user: Option<UserId>) -> AggregateOptions {
        AggregateOptions {
            exclude_user,
            empathy_weight: self.config.empathy_weight,
        }
    }
}

#[async_trait]
impl<S, L, D> VoteLifecycleApi for VoteLifecycleService<S, L, D>
where
    S: VoteStore,
    L: NotificationLedger + 'static,
    D: NotificationDispatcher + 'static,
{
    async fn apply_vote(&self, request: VoteRequest) -> MutationResult<VoteOutcome> {
        self.mutations.apply_vote(request).await
    }

    async fn check_and_notify_persuasion_started(
        &self,
        post_id: PostId,
        title: &str,
        vote_deadline: Option<Timestamp>,
    ) -> bool {
        self.notifications
            .check_and_notify_persuasion_started(post_id, title, vote_deadline)
            .await
    }

    async fn check_and_notify_deadline_ended(
        &self,
        post_id: PostId,
        title: &str,
        vote_deadline: Option<Timestamp>,
        created_at: Option<Timestamp>,
    ) -> bool {
        self.notifications
            .check_and_notify_deadline_ended(post_id, title, vote_deadline, created_at)
            .await
    }

    async fn votes_for(&self, target: VoteTarget) -> MutationResult<Vec<Vote>> {
        self.mutations.votes_for(target).await
    }

    async fn tally_for(
        &self,
        target: VoteTarget,
        viewer: Option<UserId>,
        options: AggregateOptions,
    ) -> MutationResult<VoteTally> {
        self.mutations.tally_for(target, viewer, options).await
    }
}
