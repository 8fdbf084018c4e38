//! # Core Domain Entities
//!
//! Defines the voting entities shared by the lifecycle engine, the change
//! feed, and the adapters.
//!
//! ## Clusters
//!
//! - **Identity**: `PostId`, `CommentId`, `UserId`
//! - **Votes**: `VoteValue`, `VoteTarget`, `VoteId`, `Vote`
//! - **Deadlines**: `Timestamp`, `PostDeadline`

use crate::errors::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Milliseconds since the UNIX epoch.
pub type Timestamp = u64;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a post (the unit that owns a voting deadline).
    PostId
);
uuid_id!(
    /// Identifier of a comment on a post.
    CommentId
);
uuid_id!(
    /// Identifier of an authenticated user.
    UserId
);

// =============================================================================
// CLUSTER B: VOTES
// =============================================================================

/// The value of a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum VoteValue {
    /// `+1`
    Up,
    /// `-1`
    Down,
}

impl VoteValue {
    /// Signed representation stored by the authoritative store.
    #[must_use]
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    /// The opposite value.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

impl TryFrom<i8> for VoteValue {
    type Error = TypeError;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(TypeError::InvalidVoteValue { value: other }),
        }
    }
}

impl From<VoteValue> for i8 {
    fn from(value: VoteValue) -> Self {
        value.as_i8()
    }
}

/// Whether a vote targets a post or a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
    Post,
    Comment,
}

/// The resource a vote is cast on.
///
/// Comment targets carry their parent post so that a change on a post's
/// comment thread can be mapped back to every cached comment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteTarget {
    Post(PostId),
    Comment { post_id: PostId, comment_id: CommentId },
}

impl VoteTarget {
    #[must_use]
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Post(_) => TargetKind::Post,
            Self::Comment { .. } => TargetKind::Comment,
        }
    }

    /// The post that owns this target (the post itself for post targets).
    #[must_use]
    pub fn post_id(&self) -> PostId {
        match self {
            Self::Post(post_id) => *post_id,
            Self::Comment { post_id, .. } => *post_id,
        }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post(post_id) => write!(f, "post/{post_id}"),
            Self::Comment {
                post_id,
                comment_id,
            } => write!(f, "post/{post_id}/comment/{comment_id}"),
        }
    }
}

/// Identity of a vote row.
///
/// A vote created optimistically holds a `Provisional` id until the
/// authoritative store confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteId {
    Provisional(Uuid),
    Confirmed(Uuid),
}

impl VoteId {
    /// Mint a fresh provisional id.
    #[must_use]
    pub fn provisional() -> Self {
        Self::Provisional(Uuid::new_v4())
    }

    #[must_use]
    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

/// A single user's vote on a target.
///
/// Unique per `(target, user_id)` in the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: VoteId,
    pub target: VoteTarget,
    pub user_id: UserId,
    pub value: VoteValue,
    /// The user flipped this vote while the post was in its persuasion window.
    pub persuasion_changed: bool,
    /// Value held before the first persuasion-window flip.
    pub original_value: Option<VoteValue>,
    /// When the vote value was last changed.
    pub changed_at: Option<Timestamp>,
}

impl Vote {
    /// A fresh, unflagged vote.
    #[must_use]
    pub fn new(id: VoteId, target: VoteTarget, user_id: UserId, value: VoteValue) -> Self {
        Self {
            id,
            target,
            user_id,
            value,
            persuasion_changed: false,
            original_value: None,
            changed_at: None,
        }
    }
}

// =============================================================================
// CLUSTER C: DEADLINES
// =============================================================================

/// Deadline context of a post. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDeadline {
    pub post_id: PostId,
    pub vote_deadline: Option<Timestamp>,
}
