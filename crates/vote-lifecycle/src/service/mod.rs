//! Application services

pub mod lifecycle;
pub mod mutation;
pub mod notification;
pub mod watcher;

pub use lifecycle::VoteLifecycleService;
pub use mutation::VoteMutationService;
pub use notification::NotificationService;
pub use watcher::{DeadlineWatcher, WatchedPost};
