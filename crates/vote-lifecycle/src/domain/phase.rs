//! Deadline phase classification
//!
//! The single authority for time-window logic. Every component that needs
//! to know "is this post in its persuasion window" asks here, with an
//! injected `now`.
//!
//! ```text
//!        ACTIVE                 PERSUASION          EXPIRED
//! ──────────────────────┼──────────────────────┼──────────────────→ now
//!               deadline - window           deadline
//! ```

use crate::config::DEFAULT_PERSUASION_WINDOW_MS;
use serde::{Deserialize, Serialize};
use shared_types::Timestamp;

/// Lifecycle phase of a post's vote. Derived, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// Voting open, deadline more than one window away.
    Active,
    /// The final window before the deadline.
    Persuasion,
    /// Deadline reached or passed.
    Expired,
    /// The post has no deadline.
    NoDeadline,
}

impl LifecyclePhase {
    /// Whether votes can still be cast or changed.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Persuasion | Self::NoDeadline)
    }
}

/// Classify with the default one-hour persuasion window.
pub fn classify_phase(vote_deadline: Option<Timestamp>, now: Timestamp) -> LifecyclePhase {
    PhaseClassifier::default().classify(vote_deadline, now)
}

/// Phase classifier with a configurable persuasion window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseClassifier {
    persuasion_window_ms: u64,
}

impl Default for PhaseClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PERSUASION_WINDOW_MS)
    }
}

impl PhaseClassifier {
    pub fn new(persuasion_window_ms: u64) -> Self {
        Self {
            persuasion_window_ms,
        }
    }

    pub fn persuasion_window_ms(&self) -> u64 {
        self.persuasion_window_ms
    }

    /// Total over its domain: every `(deadline, now)` maps to exactly one phase.
    ///
    /// `now == deadline - window` is `Persuasion`, `now == deadline` is `Expired`.
    pub fn classify(&self, vote_deadline: Option<Timestamp>, now: Timestamp) -> LifecyclePhase {
        let Some(deadline) = vote_deadline else {
            return LifecyclePhase::NoDeadline;
        };

        if now >= deadline {
            LifecyclePhase::Expired
        } else if now >= self.persuasion_starts_at(deadline) {
            LifecyclePhase::Persuasion
        } else {
            LifecyclePhase::Active
        }
    }

    /// Start of the persuasion window. Saturates at the epoch.
    pub fn persuasion_starts_at(&self, deadline: Timestamp) -> Timestamp {
        deadline.saturating_sub(self.persuasion_window_ms)
    }
}

/// Milliseconds left until the deadline; `None` without a deadline, zero once passed.
pub fn time_remaining(vote_deadline: Option<Timestamp>, now: Timestamp) -> Option<u64> {
    vote_deadline.map(|deadline| deadline.saturating_sub(now))
}
