//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Engine configuration.
///
/// Durations are whole seconds so the TOML and environment surfaces stay
/// flat; the accessor methods hand out [`Duration`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seats the host desk can hold in total.
    #[serde(default = "default_total_capacity")]
    pub total_capacity: u32,

    /// Service duration charged per guest by the service timer.
    #[serde(default = "default_duration_per_guest_secs")]
    pub duration_per_guest_secs: u64,

    /// Estimated service time charged per guest by the estimator.
    #[serde(default = "default_time_per_guest_secs")]
    pub time_per_guest_secs: u64,

    /// Soft expiry for queued records.
    #[serde(default = "default_entity_ttl_secs")]
    pub entity_ttl_secs: u64,

    /// Batch size for waitlist scans.
    #[serde(default = "default_scan_chunk_size")]
    pub scan_chunk_size: usize,

    /// Attempts the admission loop makes against the capacity version.
    #[serde(default = "default_preserve_max_retries")]
    pub preserve_max_retries: u32,
}

fn default_total_capacity() -> u32 {
    20
}

fn default_duration_per_guest_secs() -> u64 {
    180
}

fn default_time_per_guest_secs() -> u64 {
    180
}

fn default_entity_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_scan_chunk_size() -> usize {
    16
}

fn default_preserve_max_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            total_capacity: default_total_capacity(),
            duration_per_guest_secs: default_duration_per_guest_secs(),
            time_per_guest_secs: default_time_per_guest_secs(),
            entity_ttl_secs: default_entity_ttl_secs(),
            scan_chunk_size: default_scan_chunk_size(),
            preserve_max_retries: default_preserve_max_retries(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn from_file(path: &str) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self =
            toml::from_str(&content).map_err(|e| EngineError::ConfigParse(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment variable overrides.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over file-based configuration.
    /// Supported variables:
    /// - `MAITRE_TOTAL_CAPACITY` - total seats at the desk
    /// - `MAITRE_DURATION_PER_GUEST_SECS` - service seconds per guest
    /// - `MAITRE_TIME_PER_GUEST_SECS` - estimated seconds per guest
    /// - `MAITRE_ENTITY_TTL_SECS` - soft expiry of queued records
    /// - `MAITRE_SCAN_CHUNK_SIZE` - waitlist scan batch size
    /// - `MAITRE_PRESERVE_MAX_RETRIES` - optimistic retry budget
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("MAITRE_TOTAL_CAPACITY") {
            self.total_capacity = v;
        }
        if let Some(v) = env_parse("MAITRE_DURATION_PER_GUEST_SECS") {
            self.duration_per_guest_secs = v;
        }
        if let Some(v) = env_parse("MAITRE_TIME_PER_GUEST_SECS") {
            self.time_per_guest_secs = v;
        }
        if let Some(v) = env_parse("MAITRE_ENTITY_TTL_SECS") {
            self.entity_ttl_secs = v;
        }
        if let Some(v) = env_parse("MAITRE_SCAN_CHUNK_SIZE") {
            self.scan_chunk_size = v;
        }
        if let Some(v) = env_parse("MAITRE_PRESERVE_MAX_RETRIES") {
            self.preserve_max_retries = v;
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.total_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "total_capacity must be positive".into(),
            ));
        }
        if self.scan_chunk_size == 0 {
            return Err(EngineError::InvalidConfig(
                "scan_chunk_size must be at least 1".into(),
            ));
        }
        if self.preserve_max_retries == 0 {
            return Err(EngineError::InvalidConfig(
                "preserve_max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Service duration per guest.
    pub fn duration_per_guest(&self) -> Duration {
        Duration::from_secs(self.duration_per_guest_secs)
    }

    /// Estimated service time per guest.
    pub fn time_per_guest(&self) -> Duration {
        Duration::from_secs(self.time_per_guest_secs)
    }

    /// Soft expiry for queued records.
    pub fn entity_ttl(&self) -> Duration {
        Duration::from_secs(self.entity_ttl_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.total_capacity, 20);
        assert_eq!(config.entity_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn toml_fields_override_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            total_capacity = 12
            preserve_max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.total_capacity, 12);
        assert_eq!(config.preserve_max_retries, 5);
        assert_eq!(config.scan_chunk_size, 16, "unset fields keep defaults");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = EngineConfig {
            total_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = EngineConfig::default();
        std::env::set_var("MAITRE_TOTAL_CAPACITY", "42");
        config.apply_env_overrides();
        std::env::remove_var("MAITRE_TOTAL_CAPACITY");
        assert_eq!(config.total_capacity, 42);
    }
}
