//! Component health reporting.
//!
//! The HTTP layer's health endpoint is out of this crate's scope; what it
//! reports comes from here. [`SeatingEngine::health_check`] probes each
//! store with a real read and aggregates the component statuses.
//!
//! [`SeatingEngine::health_check`]: crate::engine::SeatingEngine::health_check

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Health status of a service component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Component is healthy and ready to serve requests.
    Healthy,
    /// Component is unhealthy and cannot serve requests.
    Unhealthy,
}

/// Status of an individual component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Component name.
    pub name: String,
    /// Current health status.
    pub status: HealthStatus,
    /// Failure detail, when unhealthy.
    pub message: Option<String>,
    /// Probe round-trip in milliseconds.
    pub response_time_ms: u64,
}

impl ComponentStatus {
    /// A healthy component.
    pub fn healthy(name: impl Into<String>, started: Instant) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// An unhealthy component with its failure.
    pub fn unhealthy(name: impl Into<String>, started: Instant, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Aggregated health of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status: unhealthy if any component is.
    pub status: HealthStatus,
    /// Individual component statuses.
    pub components: Vec<ComponentStatus>,
    /// When the report was taken.
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Aggregate component statuses into a report.
    pub fn from_components(components: Vec<ComponentStatus>) -> Self {
        let status = if components
            .iter()
            .all(|c| c.status == HealthStatus::Healthy)
        {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self {
            status,
            components,
            checked_at: Utc::now(),
        }
    }

    /// Whether every component passed its probe.
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_is_unhealthy_if_any_component_is() {
        let started = Instant::now();
        let report = HealthReport::from_components(vec![
            ComponentStatus::healthy("waitlist", started),
            ComponentStatus::unhealthy("hostdesk", started, "stats read failed"),
        ]);
        assert!(!report.is_healthy());
        assert_eq!(report.components.len(), 2);
    }

    #[test]
    fn all_healthy_components_make_a_healthy_report() {
        let started = Instant::now();
        let report = HealthReport::from_components(vec![
            ComponentStatus::healthy("waitlist", started),
            ComponentStatus::healthy("hostdesk", started),
        ]);
        assert!(report.is_healthy());
        assert!(report.components.iter().all(|c| c.message.is_none()));
    }
}
