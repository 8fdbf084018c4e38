//! Error types for the vote lifecycle engine

use thiserror::Error;

/// Errors surfaced by `apply_vote`.
///
/// Both variants are recoverable: the caller may retry the same request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// No acting user. Rejected before any cache mutation.
    #[error("Vote rejected: no authenticated user")]
    Unauthenticated,

    /// The authoritative call was rejected. Local state was rolled back.
    #[error("Vote could not be saved: {reason}")]
    NetworkFailure { reason: String },
}

impl From<StoreError> for MutationError {
    fn from(err: StoreError) -> Self {
        Self::NetworkFailure {
            reason: err.to_string(),
        }
    }
}

/// Errors returned by the authoritative vote store port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Vote store unavailable: {reason}")]
    Unavailable { reason: String },

    /// The store refused the write (permissions, constraint).
    #[error("Vote store rejected write: {reason}")]
    Rejected { reason: String },

    /// The row addressed by the call does not exist.
    #[error("Vote not found for {target}")]
    NotFound { target: String },
}

/// Errors returned by the notification ports.
///
/// These never escape the notification engine; they are logged and turned
/// into a `false` result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The authoritative "not yet sent" check failed.
    #[error("Notification ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },

    /// The fan-out call failed.
    #[error("Notification dispatch rejected: {reason}")]
    DispatchRejected { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A duration that must be positive was zero.
    #[error("Invalid configuration: {field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    /// An environment variable could not be parsed.
    #[error("Invalid configuration: {var}={value} is not a number of seconds")]
    InvalidEnv { var: &'static str, value: String },
}

/// Result type for vote mutations
pub type MutationResult<T> = Result<T, MutationError>;

/// Result type for vote store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for notification port calls
pub type DispatchResult<T> = Result<T, DispatchError>;
