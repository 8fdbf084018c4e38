//! Driving Ports (API - Inbound)
//!
//! What UI handlers, interval timers and mount effects call.

use crate::domain::{AggregateOptions, VoteOutcome, VoteTally};
use crate::error::MutationResult;
use async_trait::async_trait;
use shared_types::{PostId, Timestamp, UserId, Vote, VoteTarget, VoteValue};

/// A vote click.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRequest {
    pub target: VoteTarget,
    /// `None` when nobody is signed in.
    pub actor: Option<UserId>,
    pub value: VoteValue,
    /// Deadline of the post the target belongs to.
    pub vote_deadline: Option<Timestamp>,
}

impl VoteRequest {
    pub fn new(
        target: VoteTarget,
        actor: Option<UserId>,
        value: VoteValue,
        vote_deadline: Option<Timestamp>,
    ) -> Self {
        Self {
            target,
            actor,
            value,
            vote_deadline,
        }
    }
}

/// Public surface of the vote lifecycle engine.
#[async_trait]
pub trait VoteLifecycleApi: Send + Sync {
    /// Apply a vote optimistically and reconcile with the store.
    ///
    /// Same value as the current vote removes it; a different value updates it.
    async fn apply_vote(&self, request: VoteRequest) -> MutationResult<VoteOutcome>;

    /// Announce that the persuasion window opened.
    ///
    /// Returns `true` for exactly one caller per dispatch: the first to
    /// observe it, even if the caller that started it was dropped.
    async fn check_and_notify_persuasion_started(
        &self,
        post_id: PostId,
        title: &str,
        vote_deadline: Option<Timestamp>,
    ) -> bool;

    /// Announce that voting closed.
    ///
    /// Suppressed while the post is younger than the grace window.
    async fn check_and_notify_deadline_ended(
        &self,
        post_id: PostId,
        title: &str,
        vote_deadline: Option<Timestamp>,
        created_at: Option<Timestamp>,
    ) -> bool;

    /// Votes on a target, read through the cache.
    async fn votes_for(&self, target: VoteTarget) -> MutationResult<Vec<Vote>>;

    /// Aggregated view of a target, read through the cache.
    async fn tally_for(
        &self,
        target: VoteTarget,
        viewer: Option<UserId>,
        options: AggregateOptions,
    ) -> MutationResult<VoteTally>;
}
