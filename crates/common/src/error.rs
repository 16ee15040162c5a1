//! Unified error taxonomy for the veris platform.
//!
//! Every failure that can abort a transaction maps onto one of the
//! variants below. The split matters at the surfaced-error level:
//! [`Error::ResourceExceeded`] marks sandbox-fatal failures (possible
//! abuse, candidates for throttling or rent forfeiture), while the other
//! variants are ordinary business-logic rejections. There are no automatic
//! retries anywhere: any error aborts the whole transaction with zero
//! persisted side effects.

use thiserror::Error;

/// A type alias for `Result<T, Error>`.
///
/// This is the standard result type used throughout the veris crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Which execution resource was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// The sandbox memory ceiling.
    Ram,
    /// The wall-clock time limit.
    Time,
    /// The per-invocation call allowance.
    Calls,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Ram => write!(f, "ram"),
            ResourceKind::Time => write!(f, "time"),
            ResourceKind::Calls => write!(f, "calls"),
        }
    }
}

/// Platform-wide error type.
///
/// Variants follow the platform's error taxonomy. Errors raised inside a
/// sandboxed contract cross the isolation boundary by value, so the type
/// is `Clone` and carries only owned data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Bad argument shape or range, event-type mismatch, out-of-range rent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Ownership or mint-permission check failed.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// A withdrawal would drive a balance negative.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// A ledger operation received a non-positive amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A sandbox budget was exhausted. Sandbox-fatal and non-retryable
    /// within the same transaction.
    #[error("resource exceeded ({kind}): {message}")]
    ResourceExceeded {
        /// The exhausted resource.
        kind: ResourceKind,
        /// Human-readable detail (used/limit figures).
        message: String,
    },

    /// An identity string failed address validation.
    #[error("bad address format: {0}")]
    AddressFormat(String),

    /// Re-initialization, unknown program, or invalid deploy state.
    #[error("deployment failed: {0}")]
    Deployment(String),

    /// A storage-layer failure (encoding, missing partition).
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for sandbox-fatal failures that terminated the isolate.
    ///
    /// Callers use this to distinguish abuse signals from ordinary
    /// rejections when deciding whether to throttle a contract.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Error::ResourceExceeded { .. })
    }

    /// Shorthand constructor for [`Error::ResourceExceeded`].
    pub fn resource(kind: ResourceKind, message: impl Into<String>) -> Self {
        Error::ResourceExceeded {
            kind,
            message: message.into(),
        }
    }
}
