//! Deadline watcher
//!
//! The interval-timer caller of the notification checks: every tick, both
//! transitions are checked for every tracked post. Dedup makes repeated
//! ticks harmless.

use crate::ports::inbound::VoteLifecycleApi;
use parking_lot::RwLock;
use shared_types::{PostId, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Shortest tick the watcher runs at.
pub const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(1);

/// A post being watched for lifecycle transitions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchedPost {
    pub post_id: PostId,
    pub title: String,
    pub vote_deadline: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
}

type Watched = Arc<RwLock<HashMap<PostId, WatchedPost>>>;

/// Handle to a running watcher task. Dropping it stops the task.
pub struct DeadlineWatcher {
    posts: Watched,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DeadlineWatcher {
    /// Start watching on the current tokio runtime.
    ///
    /// An interval below `MIN_WATCH_INTERVAL` is raised to it.
    pub fn spawn(api: Arc<dyn VoteLifecycleApi>, interval: Duration) -> Self {
        if interval < MIN_WATCH_INTERVAL {
            warn!(requested_ms = interval.as_millis() as u64, "Watch interval too short, clamped");
        }
        let interval = interval.max(MIN_WATCH_INTERVAL);
        let posts: Watched = Arc::new(RwLock::new(HashMap::new()));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task_posts = Arc::clone(&posts);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "Deadline watcher started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let sent = check_all(api.as_ref(), &task_posts).await;
                        if sent > 0 {
                            debug!(sent, "Watcher tick dispatched notifications");
                        }
                    }
                }
            }
            info!("Deadline watcher stopped");
        });

        Self {
            posts,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Start (or replace) watching a post.
    pub fn track(&self, post: WatchedPost) {
        debug!(post_id = %post.post_id, "Tracking post");
        self.posts.write().insert(post.post_id, post);
    }

    pub fn untrack(&self, post_id: PostId) -> Option<WatchedPost> {
        self.posts.write().remove(&post_id)
    }

    pub fn tracked(&self) -> usize {
        self.posts.read().len()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for DeadlineWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// One pass over the tracked posts. Returns how many notifications this pass sent.
async fn check_all(api: &dyn VoteLifecycleApi, posts: &Watched) -> usize {
    let batch: Vec<WatchedPost> = posts.read().values().cloned().collect();
    let mut sent = 0;
    for post in batch {
        if api
            .check_and_notify_persuasion_started(post.post_id, &post.title, post.vote_deadline)
            .await
        {
            sent += 1;
        }
        if api
            .check_and_notify_deadline_ended(
                post.post_id,
                &post.title,
                post.vote_deadline,
                post.created_at,
            )
            .await
        {
            sent += 1;
        }
    }
    sent
}
