//! # Adapters Layer (Hexagonal Architecture)
//!
//! In-memory implementations of the outbound ports, and the bridge from the
//! change feed to the vote cache.

mod notification;
mod sync_bridge;
mod vote_store;

pub use notification::{DispatchRecord, InMemoryNotificationLedger, RecordingDispatcher};
pub use sync_bridge::{apply_change, RealtimeSyncBridge, SyncHandle};
pub use vote_store::InMemoryVoteStore;
