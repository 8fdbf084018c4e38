//! # Lifecycle Notification Flows
//!
//! Dedup across callers within one client, across independent clients
//! sharing the authoritative ledger, and driven by the deadline watcher.

#[cfg(test)]
mod tests {
    use crate::support::{eventually, Backend, MINUTE, NOW};
    use futures::future::join_all;
    use shared_types::PostId;
    use std::time::Duration;
    use vote_lifecycle::{DeadlineWatcher, TransitionKind, VoteLifecycleApi, WatchedPost};

    const TICK: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_mounted_components_collapse_to_one_dispatch() {
        let backend = Backend::new();
        let client = backend.client();
        let post_id = PostId::new_v4();
        let deadline = Some(NOW + 20 * MINUTE);
        backend.dispatcher.set_delay(Duration::from_millis(20));

        let calls = (0..10).map(|_| {
            client
                .service
                .check_and_notify_persuasion_started(post_id, "Where to eat", deadline)
        });
        let results = join_all(calls).await;

        assert_eq!(results.iter().filter(|sent| **sent).count(), 1);
        assert_eq!(backend.dispatcher.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_second_client_defers_to_ledger() {
        let backend = Backend::new();
        let alice = backend.client();
        let bob = backend.client();
        let post_id = PostId::new_v4();
        let deadline = Some(NOW - MINUTE);
        let created = Some(NOW - 30 * MINUTE);

        let (a, b) = tokio::join!(
            alice
                .service
                .check_and_notify_deadline_ended(post_id, "t", deadline, created),
            bob.service
                .check_and_notify_deadline_ended(post_id, "t", deadline, created),
        );

        assert!(a ^ b);
        assert_eq!(backend.dispatcher.dispatch_count(), 1);
        assert!(backend
            .ledger
            .is_sent(post_id, TransitionKind::DeadlineEnded));

        // Both sessions now remember it
        let checks = backend.ledger.check_count();
        assert!(
            !bob.service
                .check_and_notify_deadline_ended(post_id, "t", deadline, created)
                .await
        );
        assert!(
            !alice
                .service
                .check_and_notify_deadline_ended(post_id, "t", deadline, created)
                .await
        );
        assert_eq!(backend.ledger.check_count(), checks);
    }

    #[tokio::test]
    async fn test_watcher_walks_posts_through_their_lifecycle() {
        let backend = Backend::new();
        let client = backend.client();
        let soon = PostId::new_v4();
        let later = PostId::new_v4();

        let watcher = DeadlineWatcher::spawn(client.service.clone(), TICK);
        watcher.track(WatchedPost {
            post_id: soon,
            title: "Movie night".into(),
            vote_deadline: Some(NOW + 30 * MINUTE),
            created_at: Some(NOW - 60 * MINUTE),
        });
        watcher.track(WatchedPost {
            post_id: later,
            title: "Team offsite".into(),
            vote_deadline: Some(NOW + 180 * MINUTE),
            created_at: Some(NOW - 60 * MINUTE),
        });

        let dispatcher = backend.dispatcher.clone();
        let kinds_are = |post_id: PostId, expected: Vec<TransitionKind>| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatched_kinds(post_id) == expected }
        };

        eventually(|| kinds_are(soon, vec![TransitionKind::PersuasionStarted])).await;
        assert!(backend.dispatcher.dispatched_kinds(later).is_empty());

        backend.clock.advance(150 * MINUTE);
        eventually(|| {
            kinds_are(
                soon,
                vec![
                    TransitionKind::PersuasionStarted,
                    TransitionKind::DeadlineEnded,
                ],
            )
        })
        .await;
        eventually(|| kinds_are(later, vec![TransitionKind::PersuasionStarted])).await;

        backend.clock.advance(60 * MINUTE);
        eventually(|| {
            kinds_are(
                later,
                vec![
                    TransitionKind::PersuasionStarted,
                    TransitionKind::DeadlineEnded,
                ],
            )
        })
        .await;

        // Further ticks change nothing
        tokio::time::sleep(TICK * 4).await;
        assert_eq!(backend.dispatcher.dispatch_count(), 4);
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_watcher_retries_after_dispatch_failure() {
        let backend = Backend::new();
        let client = backend.client();
        let post_id = PostId::new_v4();
        backend.dispatcher.fail_next("fan-out unavailable");

        let watcher = DeadlineWatcher::spawn(client.service.clone(), TICK);
        watcher.track(WatchedPost {
            post_id,
            title: "t".into(),
            vote_deadline: Some(NOW - MINUTE),
            created_at: None,
        });

        let dispatcher = backend.dispatcher.clone();
        eventually(|| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch_count() == 1 }
        })
        .await;
        assert!(backend.ledger.is_sent(post_id, TransitionKind::DeadlineEnded));
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_watcher_respects_grace_window() {
        let backend = Backend::new();
        let client = backend.client();
        let post_id = PostId::new_v4();

        let watcher = DeadlineWatcher::spawn(client.service.clone(), TICK);
        // An auto-nested post whose deadline already passed at creation
        watcher.track(WatchedPost {
            post_id,
            title: "Nested".into(),
            vote_deadline: Some(NOW - 1),
            created_at: Some(NOW - 10 * 1000),
        });

        tokio::time::sleep(TICK * 6).await;
        assert_eq!(backend.dispatcher.dispatch_count(), 0);

        backend.clock.advance(MINUTE);
        let dispatcher = backend.dispatcher.clone();
        eventually(|| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatched_kinds(post_id) == vec![TransitionKind::DeadlineEnded] }
        })
        .await;
        watcher.shutdown().await;
    }
}
