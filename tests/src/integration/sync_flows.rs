//! # Optimistic Writes Against the Change Feed
//!
//! Several clients share one store and one feed. Each client's sync bridge
//! invalidates its cache on remote changes; invalidation always wins over
//! local optimistic state.

#[cfg(test)]
mod tests {
    use crate::support::{Backend, MINUTE, NOW};
    use shared_bus::{ChangeEvent, ChangeFilter, ChangePublisher};
    use shared_types::{CommentId, PostId, UserId, VoteTarget, VoteValue};
    use vote_lifecycle::{AggregateOptions, MutationError, VoteLifecycleApi, VoteRequest};

    fn request(target: VoteTarget, user: UserId, value: VoteValue) -> VoteRequest {
        VoteRequest::new(target, Some(user), value, Some(NOW + 120 * MINUTE))
    }

    #[tokio::test]
    async fn test_remote_vote_invalidates_stale_tally() {
        let backend = Backend::new();
        let alice = backend.client();
        let bob = backend.client();
        let target = VoteTarget::Post(PostId::new_v4());

        let before = alice
            .service
            .tally_for(target, None, AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(before.total, 0);
        assert!(alice.service.cache().read().contains(&target));

        bob.service
            .apply_vote(request(target, UserId::new_v4(), VoteValue::Up))
            .await
            .unwrap();
        alice.synced(1).await;
        assert!(!alice.service.cache().read().contains(&target));

        let after = alice
            .service
            .tally_for(target, None, AggregateOptions::default())
            .await
            .unwrap();
        assert_eq!(after.up_count, 1);
        assert_eq!(after.up_percent, 100.0);
    }

    #[tokio::test]
    async fn test_own_write_echo_rereads_confirmed_row() {
        let backend = Backend::new();
        let alice = backend.client();
        let user = UserId::new_v4();
        let target = VoteTarget::Post(PostId::new_v4());

        let outcome = alice
            .service
            .apply_vote(request(target, user, VoteValue::Down))
            .await
            .unwrap();
        alice.synced(1).await;

        let votes = alice.service.votes_for(target).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert!(!votes[0].id.is_provisional());
        assert_eq!(Some(votes[0].id), outcome.current().map(|v| v.id));
    }

    #[tokio::test]
    async fn test_comment_thread_change_drops_comment_targets_only() {
        let backend = Backend::new();
        let alice = backend.client();
        let post_id = PostId::new_v4();
        let post = VoteTarget::Post(post_id);
        let comments: Vec<VoteTarget> = (0..2)
            .map(|_| VoteTarget::Comment {
                post_id,
                comment_id: CommentId::new_v4(),
            })
            .collect();

        for target in std::iter::once(&post).chain(comments.iter()) {
            alice.service.votes_for(*target).await.unwrap();
        }
        backend
            .feed
            .publish(ChangeEvent::CommentsChanged { post_id })
            .await;
        alice.synced(1).await;

        let cache = alice.service.cache();
        let cache = cache.read();
        assert!(cache.contains(&post));
        assert!(comments.iter().all(|c| !cache.contains(c)));
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_without_publishing() {
        let backend = Backend::new();
        let alice = backend.client();
        let target = VoteTarget::Post(PostId::new_v4());

        alice
            .service
            .apply_vote(request(target, UserId::new_v4(), VoteValue::Up))
            .await
            .unwrap();
        alice.synced(1).await;
        alice.service.votes_for(target).await.unwrap();
        let snapshot = alice.service.cache().read().snapshot(&target);
        let published = backend.feed.events_published();

        backend.store.fail_next_write("connection reset");
        let err = alice
            .service
            .apply_vote(request(target, UserId::new_v4(), VoteValue::Down))
            .await
            .unwrap_err();

        assert!(matches!(err, MutationError::NetworkFailure { .. }));
        assert_eq!(alice.service.cache().read().snapshot(&target), snapshot);
        assert_eq!(backend.feed.events_published(), published);
    }

    #[tokio::test]
    async fn test_persuasion_flip_is_visible_to_other_clients() {
        let backend = Backend::new();
        let alice = backend.client();
        let bob = backend.client();
        let user = UserId::new_v4();
        let target = VoteTarget::Post(PostId::new_v4());
        let deadline = Some(NOW + 90 * MINUTE);

        alice
            .service
            .apply_vote(VoteRequest::new(target, Some(user), VoteValue::Up, deadline))
            .await
            .unwrap();
        backend.clock.advance(45 * MINUTE);
        alice
            .service
            .apply_vote(VoteRequest::new(target, Some(user), VoteValue::Down, deadline))
            .await
            .unwrap();

        let votes = bob.service.votes_for(target).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].value, VoteValue::Down);
        assert!(votes[0].persuasion_changed);
        assert_eq!(votes[0].original_value, Some(VoteValue::Up));
        assert_eq!(votes[0].changed_at, Some(NOW + 45 * MINUTE));
    }

    #[tokio::test]
    async fn test_scoped_bridge_ignores_other_posts() {
        let backend = Backend::new();
        let watched = PostId::new_v4();
        let carol = backend.client_with(ChangeFilter::post_votes(watched));
        let alice = backend.client();
        let elsewhere = VoteTarget::Post(PostId::new_v4());

        carol.service.votes_for(elsewhere).await.unwrap();
        alice
            .service
            .apply_vote(request(elsewhere, UserId::new_v4(), VoteValue::Up))
            .await
            .unwrap();
        alice.synced(1).await;

        assert_eq!(carol.sync.events_seen(), 0);
        assert!(carol.service.cache().read().contains(&elsewhere));
    }

    #[tokio::test]
    async fn test_unsubscribed_client_keeps_stale_cache() {
        let backend = Backend::new();
        let alice = backend.client();
        let bob = backend.client();
        let target = VoteTarget::Post(PostId::new_v4());

        alice.service.votes_for(target).await.unwrap();
        let service = alice.service.clone();
        alice.sync.unsubscribe().await;
        assert_eq!(backend.feed.subscriber_count(), 1);

        bob.service
            .apply_vote(request(target, UserId::new_v4(), VoteValue::Up))
            .await
            .unwrap();
        bob.synced(1).await;

        assert_eq!(service.votes_for(target).await.unwrap().len(), 0);
    }

    #[test]
    fn test_metrics_exposition_renders() {
        assert!(vote_telemetry::encode_metrics().is_ok());
    }
}
