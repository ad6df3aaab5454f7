//! Simulation parameters and updates
//!
//! A [`SimulationParameters`] record is replaced whole on every change; the
//! [`ParameterUpdate`] type describes the partial edits the API accepts and
//! produces a validated replacement.

use crate::types::{
    parse_output_unit, parse_time_unit, parse_timestamp, require_positive, ConfigValidationError,
    OutputUnit, RuntimeConfig, SimulationId, TimeUnit,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How simulated time relates to wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Simulated time starts at zero when the simulation is activated
    Live,
    /// Simulated time starts at a historical anchor
    Replay,
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationMode::Live => write!(f, "live"),
            SimulationMode::Replay => write!(f, "replay"),
        }
    }
}

/// One simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Unique identifier
    pub id: SimulationId,
    /// Human-readable name
    pub name: String,
    /// Unit published values are rendered in
    pub output_unit: OutputUnit,
    /// Unit device durations are expressed in
    pub time_unit: TimeUnit,
    /// Simulated seconds per real second
    pub time_speed: f64,
    /// Historical anchor; live mode when absent
    pub simulation_start_time: Option<DateTime<Utc>>,
    /// Whether this record is the active one
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl SimulationParameters {
    /// New inactive record with default settings
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SimulationId::new(),
            name: name.into(),
            output_unit: OutputUnit::Watts,
            time_unit: TimeUnit::Seconds,
            time_speed: 1.0,
            simulation_start_time: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Initial record described by the runtime configuration
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigValidationError> {
        let params = Self::new(config.simulation_name.clone())
            .with_output_unit(config.output_unit)
            .with_time_unit(config.time_unit)
            .with_time_speed(config.time_speed)
            .with_start_time(config.simulation_start_time);
        params.validate()?;
        Ok(params)
    }

    /// Set the output unit
    pub fn with_output_unit(mut self, unit: OutputUnit) -> Self {
        self.output_unit = unit;
        self
    }

    /// Set the time unit
    pub fn with_time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = unit;
        self
    }

    /// Set the speed multiplier
    pub fn with_time_speed(mut self, speed: f64) -> Self {
        self.time_speed = speed;
        self
    }

    /// Set or clear the historical anchor
    pub fn with_start_time(mut self, start: Option<DateTime<Utc>>) -> Self {
        self.simulation_start_time = start;
        self
    }

    /// Validate the record
    ///
    /// Units are closed enums, so only the speed can be out of range here.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        require_positive("time_speed", self.time_speed)?;
        if self.name.trim().is_empty() {
            return Err(ConfigValidationError::missing("name"));
        }
        Ok(())
    }

    /// Live or replay
    pub fn mode(&self) -> SimulationMode {
        if self.simulation_start_time.is_some() {
            SimulationMode::Replay
        } else {
            SimulationMode::Live
        }
    }

    /// Position on the algorithm time axis for a simulated instant in seconds
    pub fn algorithm_time(&self, simulated_seconds: f64) -> f64 {
        simulated_seconds / self.time_unit.seconds()
    }
}

/// Partial edit of the active simulation
///
/// Units arrive as strings so that an unknown label is reported against the
/// field it was supplied for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    /// New output unit label
    #[serde(default)]
    pub output_unit: Option<String>,
    /// New time unit label
    #[serde(default)]
    pub time_unit: Option<String>,
    /// New speed multiplier
    #[serde(default)]
    pub time_speed: Option<f64>,
    /// New historical anchor (RFC 3339)
    #[serde(default)]
    pub simulation_start_time: Option<String>,
    /// Drop the historical anchor and return to live mode
    #[serde(default)]
    pub clear_start_time: bool,
}

impl ParameterUpdate {
    /// Empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the output unit
    pub fn output_unit(mut self, unit: impl Into<String>) -> Self {
        self.output_unit = Some(unit.into());
        self
    }

    /// Change the time unit
    pub fn time_unit(mut self, unit: impl Into<String>) -> Self {
        self.time_unit = Some(unit.into());
        self
    }

    /// Change the speed
    pub fn time_speed(mut self, speed: f64) -> Self {
        self.time_speed = Some(speed);
        self
    }

    /// Anchor the simulation at a historical instant
    pub fn start_time(mut self, start: impl Into<String>) -> Self {
        self.simulation_start_time = Some(start.into());
        self
    }

    /// Return to live mode
    pub fn live(mut self) -> Self {
        self.clear_start_time = true;
        self
    }

    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.output_unit.is_none()
            && self.time_unit.is_none()
            && self.time_speed.is_none()
            && self.simulation_start_time.is_none()
            && !self.clear_start_time
    }

    /// Produce the replacement record for `current`
    ///
    /// Nothing is returned unless every supplied field is valid.
    pub fn apply(
        &self,
        current: &SimulationParameters,
    ) -> Result<SimulationParameters, ConfigValidationError> {
        if self.clear_start_time && self.simulation_start_time.is_some() {
            return Err(ConfigValidationError::Inconsistent {
                field: "simulation_start_time".to_string(),
                reason: "cannot set and clear the start time in one update".to_string(),
            });
        }

        let mut next = current.clone();

        if let Some(unit) = &self.output_unit {
            next.output_unit = parse_output_unit("output_unit", unit)?;
        }
        if let Some(unit) = &self.time_unit {
            next.time_unit = parse_time_unit("time_unit", unit)?;
        }
        if let Some(speed) = self.time_speed {
            require_positive("time_speed", speed)?;
            next.time_speed = speed;
        }
        if let Some(start) = &self.simulation_start_time {
            next.simulation_start_time = Some(parse_timestamp("simulation_start_time", start)?);
        }
        if self.clear_start_time {
            next.simulation_start_time = None;
        }

        next.validate()?;
        next.updated_at = Utc::now();
        Ok(next)
    }
}
