//! Service-time estimation seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use maitre_core::Party;

use crate::error::StoreError;

/// Expected service duration for a party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedServiceTime {
    /// The estimated duration.
    pub duration: Duration,
}

impl EstimatedServiceTime {
    /// Wrap a duration.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

/// Produces the expected service duration for a party.
///
/// Estimates must be deterministic for a given party size: the figure quoted
/// to a joining party is the same figure later folded into the queue's
/// prefix sums.
#[async_trait]
pub trait ServiceTimeEstimator: Send + Sync {
    /// Estimate how long serving `party` will take once seated.
    async fn estimate(&self, party: &Party) -> Result<EstimatedServiceTime, StoreError>;
}
