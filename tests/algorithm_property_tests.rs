//! Tests for the Algorithm Engine and Unit Converter through the public API
//!
//! These tests check the documented behavior of each consumption algorithm
//! and the unit conversions applied at the output boundary.

use energy_stream_simulator::device::{power_at, AlgorithmSpec, DeviceProfile, Installation, ScheduleWindow};
use energy_stream_simulator::types::{OutputUnit, TimeUnit};
use energy_stream_simulator::units::{convert, unit_to_watts, watts_to_unit};

#[test]
fn test_cyclic_peak_windows_repeat() {
    let fridge = DeviceProfile::cyclic("fridge", 10.0, 100.0, 10.0, 0.3).unwrap();

    for cycle in 0..5 {
        let offset = cycle as f64 * 10.0;
        for t in [0.0, 1.0, 2.5, 2.99] {
            assert_eq!(power_at(&fridge, offset + t), 100.0, "t = {}", offset + t);
        }
        for t in [3.0, 5.0, 9.99] {
            assert_eq!(power_at(&fridge, offset + t), 10.0, "t = {}", offset + t);
        }
    }
}

#[test]
fn test_schedule_single_window() {
    let lamp = DeviceProfile::schedule("lamp", 10.0, vec![ScheduleWindow::new(0.0, 5.0, 100.0)], None)
        .unwrap();
    assert_eq!(power_at(&lamp, 2.0), 100.0);
    assert_eq!(power_at(&lamp, 7.0), 10.0);
}

#[test]
fn test_time_unit_scales_durations() {
    // A 10-minute cycle sampled with a minutes time base
    let fridge = DeviceProfile::cyclic("fridge", 10.0, 100.0, 10.0, 0.3).unwrap();
    assert_eq!(fridge.power_at(2.0, TimeUnit::Minutes), 100.0);
    assert_eq!(fridge.power_at(5.0, TimeUnit::Minutes), 10.0);
}

#[test]
fn test_active_profile_agrees_across_calls() {
    let kettle = DeviceProfile::active("kettle", 0.0, 2_000.0, 0.2, 60.0, 240.0)
        .unwrap()
        .with_seed(7);

    let first: Vec<f64> = (0..500).map(|i| power_at(&kettle, i as f64 * 37.0)).collect();
    let second: Vec<f64> = (0..500).map(|i| power_at(&kettle, i as f64 * 37.0)).collect();
    assert_eq!(first, second);
    assert!(first.iter().all(|w| *w == 0.0 || *w == 2_000.0));
    assert!(first.iter().any(|w| *w == 2_000.0));
}

#[test]
fn test_installation_sums_meter_base_and_devices() {
    let installation = Installation::new("flat", 40.0)
        .with_device(DeviceProfile::constant("router", 12.0).unwrap())
        .with_device(DeviceProfile::cyclic("fridge", 5.0, 150.0, 10.0, 0.5).unwrap());

    assert_eq!(installation.power_at(1.0, TimeUnit::Seconds), 40.0 + 12.0 + 150.0);
    assert_eq!(installation.power_at(6.0, TimeUnit::Seconds), 40.0 + 12.0 + 5.0);

    let breakdown = installation.breakdown_at(1.0, TimeUnit::Seconds);
    assert_eq!(breakdown.meter_base, 40.0);
    assert_eq!(breakdown.devices.len(), 2);
    assert_eq!(breakdown.total, 202.0);
}

#[test]
fn test_installation_json_is_validated() {
    let json = r#"{
        "name": "workshop",
        "base_consumption": 25,
        "devices": [
            {"name": "compressor", "algorithm_type": "cyclic", "base_consumption": 0,
             "peak_consumption": 900, "cycle_period": 600, "on_duration": 150},
            {"name": "lights", "algorithm_type": "schedule", "base_consumption": 0,
             "windows": [{"start": 28800, "duration": 36000, "level": 300}]}
        ]
    }"#;
    let installation: Installation = serde_json::from_str(json).unwrap();
    assert_eq!(
        installation.devices[0].algorithm,
        AlgorithmSpec::Cyclic { cycle_period: 600.0, duty_fraction: 0.25 }
    );

    let bad = r#"{"name": "x", "devices": [{"name": "heater", "algorithm_type": "cyclic",
        "base_consumption": 0, "peak_consumption": 900, "cycle_period": 0, "duty_fraction": 0.5}]}"#;
    let err = serde_json::from_str::<Installation>(bad).unwrap_err();
    assert!(err.to_string().contains("cycle_period"), "{}", err);
}

#[test]
fn test_unit_round_trip() {
    for watts in [0.5, 1.0, 63.7, 1_234.5, 98_765.4321] {
        let per_day = watts_to_unit(watts, OutputUnit::KilowattHoursPerDay);
        assert!((unit_to_watts(per_day, OutputUnit::KilowattHoursPerDay) - watts).abs() < 1e-9);
    }

    let rendered = convert(1_500.0, OutputUnit::KilowattHoursPerDay, TimeUnit::Seconds);
    assert_eq!(rendered.value, 36.0);
    assert_eq!(convert(1_500.0, OutputUnit::Kilowatts, TimeUnit::Seconds).value, 1.5);
}
