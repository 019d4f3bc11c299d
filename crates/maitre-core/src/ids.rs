//! Identifier types used across the seat coordination core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Party identifier.
///
/// An opaque string id. Generated ids are UUIDv7, so ids created later sort
/// lexicographically after ids created earlier; the waitlist relies on this
/// for deterministic ordering when join scores collide.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PartyId(pub String);

impl PartyId {
    /// Create a party ID from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh time-ordered party ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PartyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PartyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Optimistic-lock version counter for host-desk capacity state.
///
/// Strictly monotonic: every capacity-changing mutation increments it by
/// exactly one. Compare-and-set callers read a version, decide, and submit
/// the expected version with their mutation.
#[derive(
    Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Version(pub u64);

impl Version {
    /// The initial version of a freshly created host desk.
    pub const ZERO: Version = Version(0);

    /// The version after one more mutation.
    #[must_use]
    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }

    /// Raw counter value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_sortable() {
        let a = PartyId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = PartyId::generate();
        assert!(a < b, "later id should sort after earlier id: {a} vs {b}");
    }

    #[test]
    fn version_increments_by_one() {
        let v = Version::ZERO;
        assert_eq!(v.next(), Version(1));
        assert_eq!(v.next().next().value(), 2);
    }

    #[test]
    fn party_id_display_round_trip() {
        let id = PartyId::new("party-42");
        assert_eq!(id.to_string(), "party-42");
        assert_eq!(PartyId::from("party-42"), id);
    }
}
