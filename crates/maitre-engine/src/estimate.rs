//! Service-time estimation.

use std::time::Duration;

use async_trait::async_trait;

use maitre_core::Party;
use maitre_traits::error::StoreError;
use maitre_traits::estimator::{EstimatedServiceTime, ServiceTimeEstimator};

/// Linear estimator: a fixed duration per guest.
///
/// Deterministic by construction, so the figure quoted at join time is the
/// figure the waitlist folds into its prefix sums.
#[derive(Debug, Clone, Copy)]
pub struct FixedRateEstimator {
    time_per_guest: Duration,
}

impl FixedRateEstimator {
    /// Create an estimator charging `time_per_guest` per seat.
    pub fn new(time_per_guest: Duration) -> Self {
        Self { time_per_guest }
    }
}

#[async_trait]
impl ServiceTimeEstimator for FixedRateEstimator {
    async fn estimate(&self, party: &Party) -> Result<EstimatedServiceTime, StoreError> {
        Ok(EstimatedServiceTime::new(
            self.time_per_guest * party.size,
        ))
    }
}
