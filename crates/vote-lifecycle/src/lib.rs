//! # vote-lifecycle
//!
//! Client-side vote lifecycle engine for deadline-bound posts.
//!
//! ## Overview
//!
//! This crate provides:
//! - **Phase classification**: `Active → Persuasion → Expired` from a deadline and `now`
//! - **Aggregation**: counts, percentages, the viewer's own vote, empathy score
//! - **Optimistic mutation**: toggle-style voting with snapshot rollback
//! - **Notification dedup**: at-most-once lifecycle announcements per process
//! - **Realtime sync**: change-feed driven cache invalidation
//!
//! ## Architecture
//!
//! ```text
//! UI handler ──apply_vote──→ VoteMutationService ──→ VoteStore ──publish──→ ChangeFeed
//!                                   │                                          │
//!                                   └──────────── VoteCache ←── invalidate ─── RealtimeSyncBridge
//!
//! Interval timer (DeadlineWatcher) ──check_and_notify_*──→ NotificationService
//!                                                              │
//!                                   SingleFlight ──→ NotificationLedger ──→ NotificationDispatcher
//! ```
//!
//! ## Lifecycle
//!
//! | Phase | Condition | Votes |
//! |-------|-----------|-------|
//! | `Active` | `now < deadline - window` | open |
//! | `Persuasion` | `deadline - window <= now < deadline` | open, flips audited |
//! | `Expired` | `now >= deadline` | closed |
//! | `NoDeadline` | no deadline | open |
//!
//! ## Example
//!
//! ```rust,ignore
//! use vote_lifecycle::{LifecycleConfig, VoteLifecycleService, VoteRequest};
//! use vote_lifecycle::ports::inbound::VoteLifecycleApi;
//!
//! let service = VoteLifecycleService::new(
//!     LifecycleConfig::from_env()?,
//!     store,
//!     ledger,
//!     dispatcher,
//!     Arc::new(SystemTimeSource),
//! )?;
//!
//! let outcome = service
//!     .apply_vote(VoteRequest::new(target, Some(user), VoteValue::Up, deadline))
//!     .await?;
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use config::LifecycleConfig;
pub use domain::{
    aggregate_votes, classify_phase, time_remaining, AggregateOptions, CacheSnapshot, Coalesced,
    DispatchOutcome, FlightRole, LifecyclePhase, OperationKey, PhaseClassifier, SharedVoteCache,
    SingleFlight, TransitionKind, VoteCache, VoteChange, VoteOutcome, VoteTally,
};
pub use error::{
    ConfigError, DispatchError, DispatchResult, MutationError, MutationResult, StoreError,
    StoreResult,
};
pub use ports::{
    ManualTimeSource, NotificationDispatcher, NotificationLedger, SystemTimeSource, TimeSource,
    VoteLifecycleApi, VoteRequest, VoteStore,
};
pub use service::{
    DeadlineWatcher, NotificationService, VoteLifecycleService, VoteMutationService, WatchedPost,
};
