//! Ports module for the vote lifecycle engine

pub mod inbound;
pub mod outbound;

pub use inbound::{VoteLifecycleApi, VoteRequest};
pub use outbound::{
    ManualTimeSource, NotificationDispatcher, NotificationLedger, SystemTimeSource, TimeSource,
    VoteStore,
};
