//! Lifecycle transitions eligible for notification

use crate::domain::phase::LifecyclePhase;
use serde::{Deserialize, Serialize};
use shared_types::PostId;
use std::fmt;

/// A post's passage into a notifiable phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The persuasion window opened.
    PersuasionStarted,
    /// Voting closed.
    DeadlineEnded,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersuasionStarted => "persuasion_started",
            Self::DeadlineEnded => "deadline_ended",
        }
    }

    /// The phase a post must be in for this transition to be announced.
    pub fn required_phase(self) -> LifecyclePhase {
        match self {
            Self::PersuasionStarted => LifecyclePhase::Persuasion,
            Self::DeadlineEnded => LifecyclePhase::Expired,
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one notification operation: `"<post_id>:<kind>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationKey(String);

impl OperationKey {
    pub fn new(post_id: PostId, kind: TransitionKind) -> Self {
        Self(format!("{post_id}:{kind}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one coalesced notification execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Notifications were created for this many recipients.
    Dispatched { recipients: usize },
    /// The authoritative ledger reports the transition already announced.
    AlreadySent,
    /// The ledger or dispatcher failed; nothing was recorded.
    Failed { reason: String },
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }

    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dispatched { .. } => "dispatched",
            Self::AlreadySent => "already_sent",
            Self::Failed { .. } => "failed",
        }
    }
}
