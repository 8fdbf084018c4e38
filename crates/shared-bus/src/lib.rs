//! # Shared Bus - Change Feed
//!
//! The realtime change feed that tells clients "something changed" on a
//! post's votes or comments.
//!
//! ## Delivery Model
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Vote Store   │                    │ Sync Bridge  │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │ Change Feed  │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! - Events carry no payload diff; consumers re-read authoritative state.
//! - Delivery is at-most-once per subscriber. A subscriber that falls behind
//!   the channel capacity receives `Received::Lagged` in place of the lost
//!   changes.
//! - Dropping a `Subscription` (or `ChangeStream`) unsubscribes.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{ChangeEvent, ChangeFilter, ChangeTopic};
pub use publisher::{ChangePublisher, InMemoryChangeFeed};
pub use subscriber::{ChangeStream, ChangeSubscriber, Received, Subscription, SubscriptionError};

/// Maximum changes to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
