//! Unique identifier types for the energy simulator
//!
//! This module contains UUID-based identifier types for simulations
//! (parameter records) and device profiles.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a simulation parameter record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimulationId(pub Uuid);

impl SimulationId {
    /// Create a new random simulation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable 64-bit fingerprint of the identifier
    pub fn fingerprint(&self) -> u64 {
        let (hi, lo) = self.0.as_u64_pair();
        hi ^ lo.rotate_left(32)
    }
}

impl Default for SimulationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIM_{}", self.0.simple())
    }
}

impl FromStr for SimulationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("SIM_").unwrap_or(s);
        Ok(SimulationId(Uuid::parse_str(raw)?))
    }
}

impl Serialize for SimulationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SimulationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Raw UUIDs are accepted as well as the prefixed form
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Unique identifier for a device profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    /// Create a new random device ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Stable 64-bit fingerprint of the identifier, used to seed per-device randomness
    pub fn fingerprint(&self) -> u64 {
        let (hi, lo) = self.0.as_u64_pair();
        hi ^ lo.rotate_left(32)
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DEV_{}", self.0.simple())
    }
}

impl FromStr for DeviceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("DEV_").unwrap_or(s);
        Ok(DeviceId(Uuid::parse_str(raw)?))
    }
}

impl Serialize for DeviceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(SimulationId::new(), SimulationId::new());
        assert_ne!(DeviceId::new(), DeviceId::new());
    }

    #[test]
    fn test_display_prefixes() {
        assert!(SimulationId::new().to_string().starts_with("SIM_"));
        assert!(DeviceId::new().to_string().starts_with("DEV_"));
    }

    #[test]
    fn test_serde_round_trip_accepts_raw_uuid() {
        let id = SimulationId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: SimulationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);

        let raw = format!("\"{}\"", id.0);
        let parsed: SimulationId = serde_json::from_str(&raw).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let id = DeviceId::new();
        assert_eq!(id.fingerprint(), id.fingerprint());
    }
}
