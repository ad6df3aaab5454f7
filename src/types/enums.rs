//! Enumeration types for the energy simulator
//!
//! This module contains the enumeration types used throughout the simulation:
//! output units, time units, algorithm variants and message bus transports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Units a simulated consumption value can be rendered in
///
/// The Algorithm Engine works in watts; every other unit is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputUnit {
    /// Instantaneous power in watts
    #[serde(rename = "W")]
    Watts,
    /// Instantaneous power in kilowatts
    #[serde(rename = "kW")]
    Kilowatts,
    /// Energy per day if the current draw were sustained
    #[serde(rename = "kWh/day")]
    KilowattHoursPerDay,
    /// Energy per 30-day month if the current draw were sustained
    #[serde(rename = "kWh/month")]
    KilowattHoursPerMonth,
    /// Energy per 365-day year if the current draw were sustained
    #[serde(rename = "kWh/year")]
    KilowattHoursPerYear,
}

impl OutputUnit {
    /// All supported output units, in presentation order
    pub fn all() -> [OutputUnit; 5] {
        [
            OutputUnit::Watts,
            OutputUnit::Kilowatts,
            OutputUnit::KilowattHoursPerDay,
            OutputUnit::KilowattHoursPerMonth,
            OutputUnit::KilowattHoursPerYear,
        ]
    }

    /// Wire label of the unit (`"W"`, `"kWh/day"`, ...)
    pub fn label(&self) -> &'static str {
        match self {
            OutputUnit::Watts => "W",
            OutputUnit::Kilowatts => "kW",
            OutputUnit::KilowattHoursPerDay => "kWh/day",
            OutputUnit::KilowattHoursPerMonth => "kWh/month",
            OutputUnit::KilowattHoursPerYear => "kWh/year",
        }
    }

    /// Human-readable name of the unit
    pub fn display_name(&self) -> &'static str {
        match self {
            OutputUnit::Watts => "Watts",
            OutputUnit::Kilowatts => "Kilowatts",
            OutputUnit::KilowattHoursPerDay => "kWh per day",
            OutputUnit::KilowattHoursPerMonth => "kWh per month",
            OutputUnit::KilowattHoursPerYear => "kWh per year",
        }
    }

    /// Whether the unit is an instantaneous power unit (as opposed to an energy rate)
    pub fn is_power(&self) -> bool {
        matches!(self, OutputUnit::Watts | OutputUnit::Kilowatts)
    }
}

impl fmt::Display for OutputUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OutputUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "W" | "w" => Ok(OutputUnit::Watts),
            "kW" | "kw" => Ok(OutputUnit::Kilowatts),
            "kWh/day" | "kwh/day" => Ok(OutputUnit::KilowattHoursPerDay),
            "kWh/month" | "kwh/month" => Ok(OutputUnit::KilowattHoursPerMonth),
            "kWh/year" | "kwh/year" => Ok(OutputUnit::KilowattHoursPerYear),
            other => Err(format!("Unknown output unit: {}", other)),
        }
    }
}

/// Time base of the simulation
///
/// Device durations (cycle periods, schedule windows, active episode lengths)
/// are expressed in this unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// One algorithm time unit is one second
    Seconds,
    /// One algorithm time unit is one minute
    Minutes,
    /// One algorithm time unit is one hour
    Hours,
    /// One algorithm time unit is one day
    Days,
}

impl TimeUnit {
    /// Number of seconds in one unit
    pub fn seconds(&self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Days => 86_400.0,
        }
    }

    /// Wire label of the unit
    pub fn label(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    /// All supported time units
    pub fn all() -> [TimeUnit; 4] {
        [TimeUnit::Seconds, TimeUnit::Minutes, TimeUnit::Hours, TimeUnit::Days]
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "seconds" | "second" | "s" => Ok(TimeUnit::Seconds),
            "minutes" | "minute" | "min" => Ok(TimeUnit::Minutes),
            "hours" | "hour" | "h" => Ok(TimeUnit::Hours),
            "days" | "day" | "d" => Ok(TimeUnit::Days),
            other => Err(format!("Unknown time unit: {}", other)),
        }
    }
}

/// Tag of the consumption algorithm a device profile uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmType {
    /// Compressor-style periodic on/off
    Cyclic,
    /// Fixed windows within a repeating period
    Schedule,
    /// Constant draw
    Constant,
    /// Semi-random activation episodes
    Active,
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmType::Cyclic => write!(f, "cyclic"),
            AlgorithmType::Schedule => write!(f, "schedule"),
            AlgorithmType::Constant => write!(f, "constant"),
            AlgorithmType::Active => write!(f, "active"),
        }
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cyclic" => Ok(AlgorithmType::Cyclic),
            "schedule" => Ok(AlgorithmType::Schedule),
            "constant" => Ok(AlgorithmType::Constant),
            "active" => Ok(AlgorithmType::Active),
            _ => Err(format!("Unknown algorithm type: {}", s)),
        }
    }
}

/// Message bus transport selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// MQTT 3.1.1 broker
    Mqtt,
    /// In-process bus, nothing leaves the process
    Memory,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKind::Mqtt => write!(f, "mqtt"),
            BusKind::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mqtt" => Ok(BusKind::Mqtt),
            "memory" | "in-memory" | "inmemory" => Ok(BusKind::Memory),
            _ => Err(format!("Unknown bus kind: {}", s)),
        }
    }
}
