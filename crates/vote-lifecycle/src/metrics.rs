//! # Lifecycle Metrics
//!
//! Prometheus counters for vote mutations and lifecycle notifications.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! vote-lifecycle = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `vote_mutations_total` - Counter of settled mutations (by outcome)
//! - `vote_rollbacks_total` - Counter of optimistic writes rolled back
//! - `vote_cache_invalidations_total` - Counter of cache entries invalidated by the change feed
//! - `lifecycle_notifications_total` - Counter of notification checks (by kind and result)
//! - `single_flight_joins_total` - Counter of callers that joined an in-flight operation

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Settled vote mutations, labeled by outcome
    pub static ref VOTE_MUTATIONS: IntCounterVec = register_int_counter_vec!(
        "vote_mutations_total",
        "Total number of vote mutations confirmed by the store",
        &["outcome"]
    )
    .expect("Failed to create VOTE_MUTATIONS metric");

    /// Optimistic writes rolled back
    pub static ref VOTE_ROLLBACKS: IntCounter = register_int_counter!(
        "vote_rollbacks_total",
        "Total number of optimistic vote writes rolled back"
    )
    .expect("Failed to create VOTE_ROLLBACKS metric");

    /// Cache entries invalidated by remote changes
    pub static ref CACHE_INVALIDATIONS: IntCounter = register_int_counter!(
        "vote_cache_invalidations_total",
        "Total number of vote cache entries invalidated"
    )
    .expect("Failed to create CACHE_INVALIDATIONS metric");

    /// Notification checks, labeled by transition kind and result
    pub static ref LIFECYCLE_NOTIFICATIONS: IntCounterVec = register_int_counter_vec!(
        "lifecycle_notifications_total",
        "Total number of lifecycle notification checks",
        &["kind", "result"]
    )
    .expect("Failed to create LIFECYCLE_NOTIFICATIONS metric");

    /// Callers that joined an in-flight operation
    pub static ref SINGLE_FLIGHT_JOINS: IntCounter = register_int_counter!(
        "single_flight_joins_total",
        "Total number of callers coalesced into an in-flight operation"
    )
    .expect("Failed to create SINGLE_FLIGHT_JOINS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a confirmed mutation
#[cfg(feature = "metrics")]
pub fn record_vote_mutation(outcome: &str) {
    VOTE_MUTATIONS.with_label_values(&[outcome]).inc();
}

/// Record a rollback
#[cfg(feature = "metrics")]
pub fn record_rollback() {
    VOTE_ROLLBACKS.inc();
}

/// Record cache invalidations
#[cfg(feature = "metrics")]
pub fn record_cache_invalidation(count: u64) {
    CACHE_INVALIDATIONS.inc_by(count);
}

/// Record a notification check result
#[cfg(feature = "metrics")]
pub fn record_notification(kind: &str, result: &str) {
    LIFECYCLE_NOTIFICATIONS
        .with_label_values(&[kind, result])
        .inc();
}

/// Record a coalesced caller
#[cfg(feature = "metrics")]
pub fn record_single_flight_join() {
    SINGLE_FLIGHT_JOINS.inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_vote_mutation(_outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_rollback() {}

#[cfg(not(feature = "metrics"))]
pub fn record_cache_invalidation(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_notification(_kind: &str, _result: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_single_flight_join() {}
