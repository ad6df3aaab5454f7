//! Core types and identifiers for the energy simulator
//!
//! This module contains fundamental types, identifiers, and configuration structures
//! used throughout the simulator.
//!
//! # Overview
//!
//! - **Identifiers**: UUID-based identifiers for simulations and devices
//! - **Enums**: Output units, time units, algorithm tags and bus transports
//! - **Configuration**: Runtime configuration with validation and CLI support
//!
//! # Usage Example
//!
//! ```rust
//! use energy_stream_simulator::types::*;
//!
//! let unit: OutputUnit = "kWh/day".parse().unwrap();
//! assert_eq!(unit, OutputUnit::KilowattHoursPerDay);
//!
//! let config = RuntimeConfig {
//!     time_speed: 60.0,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod enums;
pub mod identifiers;

// Re-export all public types for convenience
pub use config::*;
pub use enums::*;
pub use identifiers::*;
