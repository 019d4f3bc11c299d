//! Error kinds for store operations, by layer.

use maitre_core::{PartyId, PartyStatus, Version};
use thiserror::Error;

/// Backend fault in a storage implementation.
///
/// Store errors bubble up through the engine unchanged; only the layer
/// errors below carry coordination semantics.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Serialization or deserialization of a stored record failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing database rejected or failed an operation.
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Stored state contradicts itself (e.g. a queued id without a record).
    #[error("inconsistent store state: {0}")]
    Inconsistent(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Errors from waitlist operations.
#[derive(Debug, Error)]
pub enum WaitlistError {
    /// A party with this id is already in the queue.
    #[error("party {0} is already in queue")]
    AlreadyQueued(PartyId),

    /// No such party in the queue.
    #[error("party {0} not found in queue")]
    NotFound(PartyId),

    /// The requested status change is not a permitted forward transition.
    #[error("invalid party status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition {
        /// Status the party currently has.
        from: PartyStatus,
        /// Status the caller asked for.
        to: PartyStatus,
    },

    /// Backend fault.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Errors from host-desk operations.
#[derive(Debug, Error)]
pub enum HostDeskError {
    /// A service state already exists for this party.
    #[error("party {0} already has seats at the desk")]
    AlreadyExists(PartyId),

    /// No service state exists for this party.
    #[error("party {0} not found at the desk")]
    NotFound(PartyId),

    /// The party's state exists but its seats are not in `Preserved` status.
    #[error("party {0} has no preserved seats")]
    NoPreservedSeats(PartyId),

    /// Not enough free seats for the request.
    #[error("insufficient capacity: requested {requested}, free {free}")]
    InsufficientCapacity {
        /// Seats the caller asked for.
        requested: u32,
        /// Seats actually free at mutation time.
        free: u32,
    },

    /// The caller's expected version no longer matches the stats version.
    #[error("version mismatch: expected {expected}, current {actual}")]
    VersionMismatch {
        /// Version the caller observed.
        expected: Version,
        /// Version at mutation time.
        actual: Version,
    },

    /// The party is in a state the operation does not accept.
    #[error("party {0} is in an invalid state for this operation")]
    InvalidState(PartyId),

    /// Backend fault.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl HostDeskError {
    /// Whether this error is the optimistic-lock retry signal.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, HostDeskError::VersionMismatch { .. })
    }

    /// Whether this error means the desk lacked free seats.
    pub fn is_insufficient_capacity(&self) -> bool {
        matches!(self, HostDeskError::InsufficientCapacity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_is_retryable() {
        let err = HostDeskError::VersionMismatch {
            expected: Version(3),
            actual: Version(4),
        };
        assert!(err.is_version_mismatch());
        assert!(!err.is_insufficient_capacity());
    }

    #[test]
    fn storage_errors_bubble_transparently() {
        let inner = StoreError::Database("read txn failed".into());
        let err = WaitlistError::from(inner);
        assert_eq!(err.to_string(), "database error: read txn failed");
    }
}
