//! Realtime sync bridge
//!
//! Subscribes to the change feed and invalidates cache entries so the next
//! read re-fetches authoritative state.
//!
//! | Event | Invalidates |
//! |-------|-------------|
//! | `VotesChanged { target }` | that target |
//! | `CommentsChanged { post_id }` | every cached comment target of the post |
//! | lag (changes lost to overflow) | every cached target the filter covers |
//!
//! Invalidation bumps the target's epoch, so an optimistic write still in
//! flight cannot restore or confirm over it. After a lag the bridge cannot
//! tell which targets changed, so it also voids every outstanding fill and
//! snapshot in the cache.

use crate::domain::{SharedVoteCache, VoteCache};
use crate::metrics;
use shared_bus::{ChangeEvent, ChangeFilter, ChangeSubscriber, Received, Subscription};
use shared_types::{TargetKind, VoteTarget};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Invalidate the entries an event covers. Returns how many were cached.
pub fn apply_change(cache: &mut VoteCache, event: &ChangeEvent) -> usize {
    match event {
        ChangeEvent::VotesChanged { target } => usize::from(cache.invalidate(target)),
        ChangeEvent::CommentsChanged { post_id } => cache.invalidate_comments_of(*post_id),
    }
}

/// Recover from lost changes: invalidate every cached target `filter` covers
/// and void outstanding fills and snapshots. Returns how many were cached.
pub fn invalidate_scope(cache: &mut VoteCache, filter: &ChangeFilter) -> usize {
    cache.advance_generation();
    cache.invalidate_where(|target| covers(filter, target))
}

fn covers(filter: &ChangeFilter, target: &VoteTarget) -> bool {
    filter.matches(&ChangeEvent::VotesChanged { target: *target })
        || (target.kind() == TargetKind::Comment
            && filter.matches(&ChangeEvent::CommentsChanged {
                post_id: target.post_id(),
            }))
}

pub struct RealtimeSyncBridge;

impl RealtimeSyncBridge {
    /// Subscribe with `filter` and invalidate `cache` on every matching change.
    pub fn spawn(
        feed: &dyn ChangeSubscriber,
        filter: ChangeFilter,
        cache: SharedVoteCache,
    ) -> SyncHandle {
        let subscription = feed.subscribe(filter);
        let events_seen = Arc::new(AtomicU64::new(0));
        let missed = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(run(
            subscription,
            cache,
            Arc::clone(&events_seen),
            Arc::clone(&missed),
            shutdown_rx,
        ));

        SyncHandle {
            events_seen,
            missed,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

async fn run(
    mut subscription: Subscription,
    cache: SharedVoteCache,
    events_seen: Arc<AtomicU64>,
    missed: Arc<AtomicU64>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(filter = ?subscription.filter(), "Sync bridge subscribed");
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            received = subscription.recv() => match received {
                Some(Received::Change(event)) => {
                    let invalidated = apply_change(&mut cache.write(), &event);
                    events_seen.fetch_add(1, Ordering::Relaxed);
                    if invalidated > 0 {
                        metrics::record_cache_invalidation(invalidated as u64);
                    }
                    debug!(post_id = %event.post_id(), invalidated, "Cache invalidated by change");
                }
                Some(Received::Lagged(count)) => {
                    let invalidated = invalidate_scope(&mut cache.write(), subscription.filter());
                    missed.fetch_add(count, Ordering::Relaxed);
                    if invalidated > 0 {
                        metrics::record_cache_invalidation(invalidated as u64);
                    }
                    warn!(missed = count, invalidated, "Change feed lagged, subscribed scope invalidated");
                }
                None => {
                    info!("Change feed closed, sync bridge stopping");
                    break;
                }
            },
        }
    }
    subscription.unsubscribe();
}

/// Handle to a running bridge. Dropping it unsubscribes.
pub struct SyncHandle {
    events_seen: Arc<AtomicU64>,
    missed: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Changes processed so far.
    pub fn events_seen(&self) -> u64 {
        self.events_seen.load(Ordering::Relaxed)
    }

    /// Changes lost to feed overflow so far.
    pub fn missed(&self) -> u64 {
        self.missed.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the bridge and wait until its subscription is released.
    pub async fn unsubscribe(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{ChangePublisher, InMemoryChangeFeed};
    use shared_types::{CommentId, PostId, UserId, Vote, VoteId, VoteTarget, VoteValue};
    use std::time::Duration;

    fn seeded(targets: &[VoteTarget]) -> SharedVoteCache {
        let cache = VoteCache::shared();
        for target in targets {
            let vote = Vote::new(VoteId::provisional(), *target, UserId::new_v4(), VoteValue::Up);
            cache.write().fill(*target, vec![vote], 0);
        }
        cache
    }

    async fn wait_for(handle: &SyncHandle, events: u64) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while handle.events_seen() < events {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("bridge did not process events in time");
    }

    #[test]
    fn test_apply_change_comments_scope() {
        let post_id = PostId::new_v4();
        let post = VoteTarget::Post(post_id);
        let comment = VoteTarget::Comment {
            post_id,
            comment_id: CommentId::new_v4(),
        };
        let cache = seeded(&[post, comment]);

        let n = apply_change(&mut cache.write(), &ChangeEvent::CommentsChanged { post_id });
        assert_eq!(n, 1);
        assert!(cache.read().contains(&post));
        assert!(!cache.read().contains(&comment));
    }

    #[tokio::test]
    async fn test_remote_vote_invalidates_target() {
        let feed = InMemoryChangeFeed::new();
        let post_id = PostId::new_v4();
        let target = VoteTarget::Post(post_id);
        let cache = seeded(&[target]);

        let handle = RealtimeSyncBridge::spawn(&feed, ChangeFilter::post_votes(post_id), cache.clone());
        feed.publish(ChangeEvent::VotesChanged { target }).await;
        wait_for(&handle, 1).await;

        assert!(!cache.read().contains(&target));
        assert_eq!(cache.read().epoch(&target), 1);
    }

    #[tokio::test]
    async fn test_lost_changes_invalidate_subscribed_scope() {
        let feed = InMemoryChangeFeed::with_capacity(1);
        let first = VoteTarget::Post(PostId::new_v4());
        let second = VoteTarget::Post(PostId::new_v4());
        let cache = seeded(&[first, second]);

        let handle = RealtimeSyncBridge::spawn(&feed, ChangeFilter::all(), cache.clone());
        // Both land before the bridge runs; the first is overwritten
        feed.publish(ChangeEvent::VotesChanged { target: first }).await;
        feed.publish(ChangeEvent::VotesChanged { target: second }).await;
        wait_for(&handle, 1).await;

        assert_eq!(handle.missed(), 1);
        assert!(!cache.read().contains(&first));
        assert!(!cache.read().contains(&second));
    }

    #[test]
    fn test_lag_recovery_respects_filter() {
        let watched = PostId::new_v4();
        let post = VoteTarget::Post(watched);
        let comment = VoteTarget::Comment {
            post_id: watched,
            comment_id: CommentId::new_v4(),
        };
        let elsewhere = VoteTarget::Post(PostId::new_v4());
        let cache = seeded(&[post, comment, elsewhere]);
        let unloaded = VoteTarget::Post(PostId::new_v4());
        let epoch = cache.read().epoch(&unloaded);

        let n = invalidate_scope(&mut cache.write(), &ChangeFilter::post_comments(watched));
        assert_eq!(n, 1);
        assert!(!cache.read().contains(&comment));
        assert!(cache.read().contains(&post));
        assert!(cache.read().contains(&elsewhere));
        // A read started before the lag can no longer fill
        assert!(!cache.write().fill(unloaded, Vec::new(), epoch));
    }

    #[tokio::test]
    async fn test_other_posts_are_filtered_out() {
        let feed = InMemoryChangeFeed::new();
        let watched = PostId::new_v4();
        let other = VoteTarget::Post(PostId::new_v4());
        let cache = seeded(&[other]);

        let handle = RealtimeSyncBridge::spawn(&feed, ChangeFilter::post_votes(watched), cache.clone());
        feed.publish(ChangeEvent::VotesChanged { target: other }).await;
        feed.publish(ChangeEvent::VotesChanged {
            target: VoteTarget::Post(watched),
        })
        .await;
        wait_for(&handle, 1).await;

        assert!(cache.read().contains(&other));
        assert_eq!(handle.events_seen(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_subscription() {
        let feed = InMemoryChangeFeed::new();
        let handle = RealtimeSyncBridge::spawn(&feed, ChangeFilter::all(), VoteCache::shared());
        assert_eq!(feed.subscriber_count(), 1);

        handle.unsubscribe().await;
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(feed.active_scopes(), 0);
    }
}
