//! Unit conversion between power and energy domains
//!
//! The Algorithm Engine always works in watts. This module renders those
//! values in the unit a simulation asks for and converts between time bases.

pub mod converter;

pub use converter::{
    convert, convert_seconds_to_time_unit, convert_time_to_seconds, energy_unit,
    round_to_precision, supported_units, total_energy, unit_to_watts, watts_to_unit, Converted,
    UnitInfo, DISPLAY_PRECISION,
};
