//! Local vote cache
//!
//! Holds the client's view of each target's votes: authoritative rows
//! mixed with optimistic writes that have not settled yet.
//!
//! ## Invalidation Epochs
//!
//! Every target carries an epoch that is bumped on invalidation. Snapshots
//! and fills record the epoch they were taken at; a restore or fill whose
//! epoch is stale is dropped, so invalidation always wins over lingering
//! optimistic state. A cache-wide generation is folded into every epoch, so
//! when the cache cannot tell which targets went stale it can void all
//! outstanding snapshots and fills at once.
//!
//! ## Overlapping Writes
//!
//! Optimistic writes register per target. A snapshot is only an exact undo
//! for a write that ran alone on its target; when another write on the same
//! target overlapped it, a rollback must invalidate instead.

use parking_lot::RwLock;
use shared_types::{PostId, TargetKind, UserId, Vote, VoteTarget};
use std::collections::HashMap;
use std::sync::Arc;

/// Cache handle shared by the mutation engine and the sync bridge.
pub type SharedVoteCache = Arc<RwLock<VoteCache>>;

/// Pre-mutation state of one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub target: VoteTarget,
    /// `None` when the target was not cached.
    pub votes: Option<Vec<Vote>>,
    pub epoch: u64,
}

/// An authoritative read together with the epoch sampled before it started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedVotes {
    pub votes: Vec<Vote>,
    pub epoch: u64,
}

/// Registration of one optimistic write on a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteTicket {
    seq: u64,
    overlapped: bool,
}

#[derive(Debug, Default)]
struct PendingWrites {
    count: u32,
    latest: u64,
}

#[derive(Debug, Default)]
pub struct VoteCache {
    entries: HashMap<VoteTarget, Vec<Vote>>,
    epochs: HashMap<VoteTarget, u64>,
    generation: u64,
    writes: HashMap<VoteTarget, PendingWrites>,
}

impl VoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedVoteCache {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn get(&self, target: &VoteTarget) -> Option<&[Vote]> {
        self.entries.get(target).map(Vec::as_slice)
    }

    pub fn contains(&self, target: &VoteTarget) -> bool {
        self.entries.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn epoch(&self, target: &VoteTarget) -> u64 {
        self.epochs.get(target).copied().unwrap_or(0) + self.generation
    }

    /// Optimistic writes on `target` that have not settled.
    pub fn pending_writes(&self, target: &VoteTarget) -> u32 {
        self.writes.get(target).map_or(0, |w| w.count)
    }

    /// Register an optimistic write on `target`.
    pub fn begin_write(&mut self, target: VoteTarget) -> WriteTicket {
        let writes = self.writes.entry(target).or_default();
        writes.latest += 1;
        let ticket = WriteTicket {
            seq: writes.latest,
            overlapped: writes.count > 0,
        };
        writes.count += 1;
        ticket
    }

    /// Settle a write registered with `begin_write`.
    ///
    /// Returns `true` when no other write on the target was pending at any
    /// point during its lifetime.
    pub fn end_write(&mut self, target: &VoteTarget, ticket: WriteTicket) -> bool {
        let Some(writes) = self.writes.get_mut(target) else {
            return false;
        };
        let isolated = !ticket.overlapped && writes.latest == ticket.seq;
        writes.count = writes.count.saturating_sub(1);
        if writes.count == 0 {
            self.writes.remove(target);
        }
        isolated
    }

    /// The acting user's vote on `target`, if cached.
    pub fn find_vote(&self, target: &VoteTarget, user_id: UserId) -> Option<&Vote> {
        self.entries
            .get(target)?
            .iter()
            .find(|vote| vote.user_id == user_id)
    }

    /// Populate from an authoritative read started at `epoch`.
    ///
    /// Ignored when the target is already cached or was invalidated since.
    pub fn fill(&mut self, target: VoteTarget, votes: Vec<Vote>, epoch: u64) -> bool {
        if self.contains(&target) || self.epoch(&target) != epoch {
            return false;
        }
        self.entries.insert(target, votes);
        true
    }

    pub fn snapshot(&self, target: &VoteTarget) -> CacheSnapshot {
        CacheSnapshot {
            target: *target,
            votes: self.entries.get(target).cloned(),
            epoch: self.epoch(target),
        }
    }

    /// Put a target back exactly as snapshotted.
    ///
    /// Returns `false` (and leaves the cache alone) if the target was
    /// invalidated after the snapshot was taken.
    pub fn restore(&mut self, snapshot: CacheSnapshot) -> bool {
        if self.epoch(&snapshot.target) != snapshot.epoch {
            return false;
        }
        match snapshot.votes {
            Some(votes) => {
                self.entries.insert(snapshot.target, votes);
            }
            None => {
                self.entries.remove(&snapshot.target);
            }
        }
        true
    }

    /// Mutable access for an in-place optimistic write.
    pub fn votes_mut(&mut self, target: VoteTarget) -> &mut Vec<Vote> {
        self.entries.entry(target).or_default()
    }

    /// Drop a target so the next read re-fetches. Returns whether it was cached.
    pub fn invalidate(&mut self, target: &VoteTarget) -> bool {
        *self.epochs.entry(*target).or_insert(0) += 1;
        self.entries.remove(target).is_some()
    }

    /// Invalidate every cached comment target under `post_id`.
    pub fn invalidate_comments_of(&mut self, post_id: PostId) -> usize {
        self.invalidate_where(|t| t.kind() == TargetKind::Comment && t.post_id() == post_id)
    }

    /// Invalidate every cached target `in_scope` accepts.
    pub fn invalidate_where(&mut self, in_scope: impl Fn(&VoteTarget) -> bool) -> usize {
        let targets: Vec<VoteTarget> = self.entries.keys().filter(|&t| in_scope(t)).copied().collect();
        for target in &targets {
            self.invalidate(target);
        }
        targets.len()
    }

    /// Void every outstanding snapshot and fill, cached or not.
    ///
    /// Used when changes were lost and the affected targets are unknown.
    /// Entries stay cached; pair with `invalidate_where` to drop them.
    pub fn advance_generation(&mut self) {
        self.generation += 1;
    }
}
