//! Power/energy unit converter

use crate::types::{OutputUnit, TimeUnit};
use serde::Serialize;

/// Decimal places kept when a value leaves the simulator
pub const DISPLAY_PRECISION: u32 = 2;

const HOURS_PER_DAY: f64 = 24.0;
const HOURS_PER_MONTH: f64 = 24.0 * 30.0;
const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

/// Hours in the period of `unit`, or `None` for power units
fn period_hours(unit: OutputUnit) -> Option<f64> {
    match unit {
        OutputUnit::Watts | OutputUnit::Kilowatts => None,
        OutputUnit::KilowattHoursPerDay => Some(HOURS_PER_DAY),
        OutputUnit::KilowattHoursPerMonth => Some(HOURS_PER_MONTH),
        OutputUnit::KilowattHoursPerYear => Some(HOURS_PER_YEAR),
    }
}

/// Convert a draw in watts to `unit` at full precision
///
/// Energy-rate units report the energy the current draw would use over the
/// unit's period if sustained.
pub fn watts_to_unit(watts: f64, unit: OutputUnit) -> f64 {
    match (unit, period_hours(unit)) {
        (OutputUnit::Watts, _) => watts,
        (_, Some(hours)) => watts * hours / 1000.0,
        _ => watts / 1000.0,
    }
}

/// Inverse of [`watts_to_unit`]
pub fn unit_to_watts(value: f64, unit: OutputUnit) -> f64 {
    match (unit, period_hours(unit)) {
        (OutputUnit::Watts, _) => value,
        (_, Some(hours)) => value * 1000.0 / hours,
        _ => value * 1000.0,
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to_precision(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// A value rendered for output
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Converted {
    /// Rounded value in `unit`
    pub value: f64,
    /// Unit of `value`
    pub unit: OutputUnit,
    /// Time base the value was produced under
    pub time_unit: TimeUnit,
}

/// Render a draw in watts for output, rounding only here
///
/// The time unit scales the algorithm time axis, not the value; it is carried
/// along so the caller can label the result.
pub fn convert(watts: f64, unit: OutputUnit, time_unit: TimeUnit) -> Converted {
    Converted {
        value: round_to_precision(watts_to_unit(watts, unit), DISPLAY_PRECISION),
        unit,
        time_unit,
    }
}

/// Convert a duration expressed in `unit` to seconds
pub fn convert_time_to_seconds(value: f64, unit: TimeUnit) -> f64 {
    value * unit.seconds()
}

/// Convert a duration in seconds to `unit`
pub fn convert_seconds_to_time_unit(seconds: f64, unit: TimeUnit) -> f64 {
    seconds / unit.seconds()
}

/// Unit in which the total energy of a series is reported
pub fn energy_unit(unit: OutputUnit) -> &'static str {
    if unit.is_power() {
        "kWh"
    } else {
        unit.label()
    }
}

/// Total energy of a series with average value `average` (in `unit`) over `duration_hours`
///
/// Power units integrate to kWh. Energy-rate units are prorated by the
/// fraction of their period the series covers.
pub fn total_energy(average: f64, duration_hours: f64, unit: OutputUnit) -> f64 {
    match unit {
        OutputUnit::Watts => average * duration_hours / 1000.0,
        OutputUnit::Kilowatts => average * duration_hours,
        OutputUnit::KilowattHoursPerDay => average * duration_hours / HOURS_PER_DAY,
        OutputUnit::KilowattHoursPerMonth => average * duration_hours / HOURS_PER_MONTH,
        OutputUnit::KilowattHoursPerYear => average * duration_hours / HOURS_PER_YEAR,
    }
}

/// Description of a supported output unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitInfo {
    /// Wire label
    pub value: &'static str,
    /// Human-readable name
    pub display_name: &'static str,
}

/// List every output unit the converter supports
pub fn supported_units() -> Vec<UnitInfo> {
    OutputUnit::all()
        .iter()
        .map(|unit| UnitInfo { value: unit.label(), display_name: unit.display_name() })
        .collect()
}
