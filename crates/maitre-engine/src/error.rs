//! Engine error types.

use thiserror::Error;

use maitre_traits::error::{HostDeskError, WaitlistError};

/// Errors from seat-manager orchestration.
#[derive(Debug, Error)]
pub enum SeatingError {
    /// Holding seats for a new arrival failed for a non-retryable reason.
    #[error("failed to preserve seats")]
    PreserveSeats(#[source] HostDeskError),

    /// The arrival could not be placed in the waitlist.
    #[error("failed to join waitlist")]
    JoinWaitlist(#[source] WaitlistError),

    /// The optimistic preserve loop exhausted its retry budget.
    #[error("too many optimistic lock retries")]
    TooManyOptimisticLockRetries,

    /// The party can never be seated at this desk.
    #[error("party of size {size} exceeds the desk capacity of {total_capacity}")]
    InvalidPartySize {
        /// Requested seats.
        size: u32,
        /// Seats the desk has in total.
        total_capacity: u32,
    },

    /// Waitlist failure outside the admission path.
    #[error(transparent)]
    Waitlist(#[from] WaitlistError),

    /// Host-desk failure outside the admission path.
    #[error(transparent)]
    HostDesk(#[from] HostDeskError),
}

/// Errors from engine configuration and wiring.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration file could not be read.
    #[error("config IO error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The builder is missing a required component.
    #[error("missing component: {0}")]
    MissingComponent(&'static str),
}

/// Convenience result alias for engine operations.
pub type SeatingResult<T> = Result<T, SeatingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use maitre_core::{PartyId, Version};

    #[test]
    fn preserve_failure_keeps_its_source() {
        let err = SeatingError::PreserveSeats(HostDeskError::VersionMismatch {
            expected: Version(1),
            actual: Version(2),
        });
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("version mismatch"));
    }

    #[test]
    fn layer_errors_convert() {
        let err: SeatingError = WaitlistError::NotFound(PartyId::new("p")).into();
        assert!(matches!(err, SeatingError::Waitlist(_)));
    }
}
