//! Vote aggregation
//!
//! Derives counts, percentages and the viewer's own vote from a vote
//! collection. Pure and deterministic; an empty collection is all zeros.

use crate::config::DEFAULT_EMPATHY_WEIGHT;
use serde::{Deserialize, Serialize};
use shared_types::{UserId, Vote, VoteValue};

/// Aggregation options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregateOptions {
    /// Leave this user's vote out of the counts (the author, for empathy displays).
    pub exclude_user: Option<UserId>,
    /// Multiplier applied to the counted reactions for `derived_score`.
    pub empathy_weight: f64,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            exclude_user: None,
            empathy_weight: DEFAULT_EMPATHY_WEIGHT,
        }
    }
}

impl AggregateOptions {
    /// Count only others' reactions to `author`'s content.
    pub fn excluding_author(author: UserId) -> Self {
        Self {
            exclude_user: Some(author),
            ..Self::default()
        }
    }
}

/// Aggregated view of a vote collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub up_count: u64,
    pub down_count: u64,
    /// Always `up_count + down_count`.
    pub total: u64,
    pub up_percent: f64,
    pub down_percent: f64,
    /// The viewer's vote, counted or not.
    pub user_vote: Option<VoteValue>,
    /// `total * empathy_weight`.
    pub derived_score: f64,
}

impl VoteTally {
    pub fn empty() -> Self {
        Self {
            up_count: 0,
            down_count: 0,
            total: 0,
            up_percent: 0.0,
            down_percent: 0.0,
            user_vote: None,
            derived_score: 0.0,
        }
    }

    /// `up_count - down_count`.
    pub fn net(&self) -> i64 {
        self.up_count as i64 - self.down_count as i64
    }
}

/// Aggregate `votes` for an optional viewer.
pub fn aggregate_votes(
    votes: &[Vote],
    viewer: Option<UserId>,
    options: AggregateOptions,
) -> VoteTally {
    let mut tally = VoteTally::empty();

    for vote in votes {
        if viewer == Some(vote.user_id) {
            tally.user_vote = Some(vote.value);
        }
        if options.exclude_user == Some(vote.user_id) {
            continue;
        }
        match vote.value {
            VoteValue::Up => tally.up_count += 1,
            VoteValue::Down => tally.down_count += 1,
        }
    }

    tally.total = tally.up_count + tally.down_count;
    if tally.total > 0 {
        tally.up_percent = tally.up_count as f64 * 100.0 / tally.total as f64;
        tally.down_percent = tally.down_count as f64 * 100.0 / tally.total as f64;
    }
    tally.derived_score = tally.total as f64 * options.empathy_weight;
    tally
}
