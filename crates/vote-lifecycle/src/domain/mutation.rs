//! # Optimistic Vote Mutation
//!
//! Toggle semantics and the per-mutation state machine.
//!
//! ## Toggle Rules
//!
//! | Existing vote | Requested | Change |
//! |---------------|-----------|--------|
//! | none          | v         | insert provisional vote `v` |
//! | `v`           | v         | delete (toggle-off) |
//! | `w != v`      | v         | update to `v`; flagged if the post is in its persuasion window |
//!
//! ## State Machine
//!
//! ```text
//! [Pending] ──confirm──→ [Confirmed]
//!     │
//!     └── roll_back ──→ [RolledBack]
//! ```
//!
//! `VoteMutation<Pending>::begin` snapshots the target, plans the change and
//! writes it to the cache in one synchronous step. The type parameter makes a
//! second settle of the same mutation impossible.
//!
//! A rollback restores the snapshot only when the mutation ran alone on its
//! target. If another mutation on the same target overlapped it, the snapshot
//! would erase that mutation too, so the target is invalidated instead.

use crate::domain::phase::LifecyclePhase;
use crate::domain::vote_cache::{CacheSnapshot, FetchedVotes, VoteCache, WriteTicket};
use shared_types::{TargetKind, Timestamp, UserId, Vote, VoteId, VoteTarget, VoteValue};
use std::marker::PhantomData;

// =============================================================================
// STATE MARKERS (Zero-Sized Types)
// =============================================================================

/// Marker: optimistic write applied, authoritative call outstanding.
#[derive(Debug, Clone, Copy)]
pub struct Pending;

/// Marker: the authoritative store accepted the write.
#[derive(Debug, Clone, Copy)]
pub struct Confirmed;

/// Marker: the authoritative store rejected the write.
#[derive(Debug, Clone, Copy)]
pub struct RolledBack;

// =============================================================================
// PLANNING
// =============================================================================

/// A vote write as sent to the authoritative store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertVote {
    pub target: VoteTarget,
    pub user_id: UserId,
    pub value: VoteValue,
    pub persuasion_changed: bool,
    pub original_value: Option<VoteValue>,
    pub changed_at: Option<Timestamp>,
}

impl UpsertVote {
    fn from_vote(vote: &Vote) -> Self {
        Self {
            target: vote.target,
            user_id: vote.user_id,
            value: vote.value,
            persuasion_changed: vote.persuasion_changed,
            original_value: vote.original_value,
            changed_at: vote.changed_at,
        }
    }
}

/// The authoritative call a change needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCommand {
    Upsert(UpsertVote),
    Delete { target: VoteTarget, user_id: UserId },
}

/// A planned change to one user's vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteChange {
    Insert { vote: Vote },
    Update { before: Vote, after: Vote },
    Delete { removed: Vote },
}

impl VoteChange {
    /// Decide what `value` does to `existing` (toggle semantics).
    pub fn plan(
        existing: Option<&Vote>,
        target: VoteTarget,
        user_id: UserId,
        value: VoteValue,
        phase: LifecyclePhase,
        now: Timestamp,
    ) -> Self {
        let Some(before) = existing else {
            let mut vote = Vote::new(VoteId::provisional(), target, user_id, value);
            vote.changed_at = Some(now);
            return Self::Insert { vote };
        };

        if before.value == value {
            return Self::Delete {
                removed: before.clone(),
            };
        }

        let mut after = before.clone();
        after.value = value;
        after.changed_at = Some(now);
        if target.kind() == TargetKind::Post && phase == LifecyclePhase::Persuasion {
            after.persuasion_changed = true;
            // Keep the pre-window value across repeated flips
            if after.original_value.is_none() {
                after.original_value = Some(before.value);
            }
        }
        Self::Update {
            before: before.clone(),
            after,
        }
    }

    /// Apply to a target's cached votes.
    pub fn apply(&self, votes: &mut Vec<Vote>) {
        match self {
            Self::Insert { vote } => votes.push(vote.clone()),
            Self::Update { before, after } => {
                if let Some(slot) = votes.iter_mut().find(|v| v.user_id == before.user_id) {
                    *slot = after.clone();
                }
            }
            Self::Delete { removed } => votes.retain(|v| v.user_id != removed.user_id),
        }
    }

    pub fn command(&self) -> StoreCommand {
        match self {
            Self::Insert { vote } => StoreCommand::Upsert(UpsertVote::from_vote(vote)),
            Self::Update { after, .. } => StoreCommand::Upsert(UpsertVote::from_vote(after)),
            Self::Delete { removed } => StoreCommand::Delete {
                target: removed.target,
                user_id: removed.user_id,
            },
        }
    }

    pub fn target(&self) -> VoteTarget {
        match self {
            Self::Insert { vote } => vote.target,
            Self::Update { after, .. } => after.target,
            Self::Delete { removed } => removed.target,
        }
    }
}

/// What `apply_vote` did, after settlement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Inserted { vote: Vote },
    Updated { vote: Vote },
    Deleted { previous: Vote },
}

impl VoteOutcome {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
        }
    }

    /// The user's vote after the mutation; `None` after toggle-off.
    pub fn current(&self) -> Option<&Vote> {
        match self {
            Self::Inserted { vote } | Self::Updated { vote } => Some(vote),
            Self::Deleted { .. } => None,
        }
    }
}

// =============================================================================
// TYPE-STATE MUTATION
// =============================================================================

/// One optimistic vote mutation.
#[derive(Debug)]
pub struct VoteMutation<S> {
    change: VoteChange,
    snapshot: CacheSnapshot,
    ticket: WriteTicket,
    started_at: Timestamp,
    /// Whether the cache was written back on settle
    cache_settled: bool,
    _state: PhantomData<S>,
}

impl<S> VoteMutation<S> {
    pub fn change(&self) -> &VoteChange {
        &self.change
    }

    pub fn snapshot(&self) -> &CacheSnapshot {
        &self.snapshot
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    fn transition<T>(self, cache_settled: bool) -> VoteMutation<T> {
        VoteMutation {
            change: self.change,
            snapshot: self.snapshot,
            ticket: self.ticket,
            started_at: self.started_at,
            cache_settled,
            _state: PhantomData,
        }
    }
}

impl VoteMutation<Pending> {
    /// Snapshot `target`, plan the change against the cached vote and write it.
    ///
    /// `fetched` seeds the cache when the target was not cached; it must
    /// carry the target's current epoch or it is ignored. Nothing here
    /// awaits, so a burst of calls is applied in call order.
    pub fn begin(
        cache: &mut VoteCache,
        fetched: Option<FetchedVotes>,
        target: VoteTarget,
        user_id: UserId,
        value: VoteValue,
        phase: LifecyclePhase,
        now: Timestamp,
    ) -> Self {
        let snapshot = cache.snapshot(&target);
        if let Some(fetched) = fetched {
            cache.fill(target, fetched.votes, fetched.epoch);
        }
        let ticket = cache.begin_write(target);

        let change = VoteChange::plan(
            cache.find_vote(&target, user_id),
            target,
            user_id,
            value,
            phase,
            now,
        );
        change.apply(cache.votes_mut(target));

        Self {
            change,
            snapshot,
            ticket,
            started_at: now,
            cache_settled: false,
            _state: PhantomData,
        }
    }

    pub fn command(&self) -> StoreCommand {
        self.change.command()
    }

    /// Accept the authoritative result.
    ///
    /// The optimistic state stays; a provisional id is swapped for the
    /// confirmed one. If the target was invalidated in the meantime it is
    /// invalidated again, since a read taken before this write committed
    /// may have refilled it.
    #[must_use = "The confirmed mutation carries the outcome"]
    pub fn confirm(self, cache: &mut VoteCache, authoritative: Option<Vote>) -> VoteMutation<Confirmed> {
        let target = self.change.target();
        cache.end_write(&target, self.ticket);
        let current = cache.epoch(&target) == self.snapshot.epoch;
        if !current {
            cache.invalidate(&target);
        }

        let mut settled = false;
        let mut change = self.change.clone();
        if let (VoteChange::Insert { vote }, Some(stored)) = (&mut change, authoritative) {
            let provisional = vote.id;
            vote.id = stored.id;
            if current {
                if let Some(slot) = cache
                    .votes_mut(target)
                    .iter_mut()
                    .find(|v| v.id == provisional)
                {
                    slot.id = stored.id;
                    settled = true;
                }
            }
        }

        let mut confirmed = self.transition::<Confirmed>(settled);
        confirmed.change = change;
        confirmed
    }

    /// Undo the optimistic write.
    ///
    /// Restores the pre-mutation snapshot when this mutation ran alone on
    /// its target, and invalidates the target when another one overlapped.
    #[must_use = "The rolled-back mutation reports whether the snapshot was restored"]
    pub fn roll_back(self, cache: &mut VoteCache) -> VoteMutation<RolledBack> {
        let target = self.snapshot.target;
        let restored = if cache.end_write(&target, self.ticket) {
            cache.restore(self.snapshot.clone())
        } else {
            cache.invalidate(&target);
            false
        };
        self.transition(restored)
    }
}

impl VoteMutation<Confirmed> {
    pub fn outcome(&self) -> VoteOutcome {
        match &self.change {
            VoteChange::Insert { vote } => VoteOutcome::Inserted { vote: vote.clone() },
            VoteChange::Update { after, .. } => VoteOutcome::Updated {
                vote: after.clone(),
            },
            VoteChange::Delete { removed } => VoteOutcome::Deleted {
                previous: removed.clone(),
            },
        }
    }

    /// Whether a provisional id was replaced in the cache.
    pub fn id_reconciled(&self) -> bool {
        self.cache_settled
    }
}

impl VoteMutation<RolledBack> {
    /// `false` when the target was invalidated instead: either an
    /// invalidation arrived first or another mutation overlapped this one.
    pub fn restored(&self) -> bool {
        self.cache_settled
    }
}
