//! Domain layer for the vote lifecycle engine
//!
//! Pure logic and process-local state. Nothing here performs I/O.

pub mod aggregate;
pub mod mutation;
pub mod phase;
pub mod single_flight;
pub mod transition;
pub mod vote_cache;

pub use aggregate::{aggregate_votes, AggregateOptions, VoteTally};
pub use mutation::{
    Confirmed, Pending, RolledBack, StoreCommand, UpsertVote, VoteChange, VoteMutation,
    VoteOutcome,
};
pub use phase::{classify_phase, time_remaining, LifecyclePhase, PhaseClassifier};
pub use single_flight::{Coalesced, FlightRole, SingleFlight};
pub use transition::{DispatchOutcome, OperationKey, TransitionKind};
pub use vote_cache::{CacheSnapshot, FetchedVotes, SharedVoteCache, VoteCache, WriteTicket};
