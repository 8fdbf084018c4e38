//! # Error Types
//!
//! Errors raised while constructing shared entities.

use thiserror::Error;

/// Errors from converting raw values into domain entities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// A stored vote value was neither `+1` nor `-1`.
    #[error("Invalid vote value {value}: expected +1 or -1")]
    InvalidVoteValue { value: i8 },
}
