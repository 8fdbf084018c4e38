//! # Change Events
//!
//! Defines the "something changed" events delivered by the change feed.
//! Events carry the scope of the change only; consumers re-read the
//! authoritative store to learn what actually changed.

use serde::{Deserialize, Serialize};
use shared_types::{PostId, VoteTarget};

/// All events that can be published to the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    /// A vote row on `target` was inserted, updated or deleted.
    VotesChanged {
        /// The post or comment whose votes changed.
        target: VoteTarget,
    },

    /// The comment thread of a post changed (comment added, edited, removed).
    CommentsChanged {
        /// The post owning the thread.
        post_id: PostId,
    },
}

impl ChangeEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> ChangeTopic {
        match self {
            Self::VotesChanged { .. } => ChangeTopic::Votes,
            Self::CommentsChanged { .. } => ChangeTopic::Comments,
        }
    }

    /// The post this change is scoped to.
    #[must_use]
    pub fn post_id(&self) -> PostId {
        match self {
            Self::VotesChanged { target } => target.post_id(),
            Self::CommentsChanged { post_id } => *post_id,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeTopic {
    /// Vote rows on posts and comments.
    Votes,
    /// Comment threads.
    Comments,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<ChangeTopic>,
    /// Posts to include. Empty means all posts.
    pub posts: Vec<PostId>,
}

impl ChangeFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<ChangeTopic>) -> Self {
        Self {
            topics,
            posts: Vec::new(),
        }
    }

    /// Vote changes on a post and on its comments.
    #[must_use]
    pub fn post_votes(post_id: PostId) -> Self {
        Self {
            topics: vec![ChangeTopic::Votes],
            posts: vec![post_id],
        }
    }

    /// Comment thread changes on a post.
    #[must_use]
    pub fn post_comments(post_id: PostId) -> Self {
        Self {
            topics: vec![ChangeTopic::Comments],
            posts: vec![post_id],
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&ChangeTopic::All)
            || self.topics.contains(&event.topic());

        let post_match = self.posts.is_empty() || self.posts.contains(&event.post_id());

        topic_match && post_match
    }

    /// Key used to track active subscriptions per scope.
    pub(crate) fn tracking_key(&self) -> String {
        format!("{:?}|{:?}", self.topics, self.posts)
    }
}
