//! Tests for the Parameter Store and the Simulation Clock
//!
//! These tests check the singleton-active invariant under sequential and
//! concurrent activation, and that speed changes never make simulated time
//! jump.

use chrono::{TimeZone, Utc};
use energy_stream_simulator::simulation::{
    ManualWallClock, ParameterStore, ParameterUpdate, SimulationClock, SimulationParameters,
};
use std::sync::Arc;

#[test]
fn test_singleton_active_after_any_sequence() {
    let store = ParameterStore::new(SimulationParameters::new("first")).unwrap();
    let mut ids = vec![store.get_active().id];

    for i in 0..20 {
        if i % 3 == 0 {
            // Re-activate an earlier record
            store.activate(ids[i / 2]).unwrap();
        } else {
            let params = SimulationParameters::new(format!("sim-{}", i));
            ids.push(params.id);
            store.set_active(params).unwrap();
        }
        assert_eq!(store.active_count(), 1);

        let active: Vec<_> = store.records().into_iter().filter(|r| r.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, store.get_active().id);
    }
}

#[test]
fn test_concurrent_updates_are_serialized() {
    let store = Arc::new(ParameterStore::new(SimulationParameters::new("shared")).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for step in 0..25 {
                    let speed = (worker * 100 + step + 1) as f64;
                    store
                        .update_active(|current| ParameterUpdate::new().time_speed(speed).apply(current))
                        .unwrap();
                    let snapshot = store.get_active();
                    assert!(snapshot.time_speed > 0.0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.revision(), 100);
    assert_eq!(store.records().len(), 1);
    assert_eq!(store.active_count(), 1);
}

#[test]
fn test_rejected_update_keeps_snapshot() {
    let store = ParameterStore::new(SimulationParameters::new("keep")).unwrap();
    let before = store.get_active();

    let err = store
        .update_active(|current| ParameterUpdate::new().output_unit("MWh").apply(current))
        .unwrap_err();
    assert_eq!(err.field(), "output_unit");
    assert_eq!(store.get_active().revision(), before.revision());
    assert_eq!(store.get_active().output_unit, before.output_unit);
}

fn manual_store(name: &str) -> (ManualWallClock, ParameterStore) {
    let wall = ManualWallClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    let clock = SimulationClock::new(Arc::new(wall.clone()));
    let store = ParameterStore::with_clock(SimulationParameters::new(name), clock).unwrap();
    (wall, store)
}

#[test]
fn test_clock_has_no_jumps_across_speed_changes() {
    let (wall, store) = manual_store("speedy");

    let speeds = [2.0, 60.0, 0.25, 3_600.0, 1.0, 86_400.0, 0.001];
    for (i, speed) in speeds.iter().enumerate() {
        wall.advance_secs(0.37 * (i + 1) as f64);
        let before = store.now().1.simulated_seconds;
        store
            .update_active(|current| ParameterUpdate::new().time_speed(*speed).apply(current))
            .unwrap();
        let after = store.now().1.simulated_seconds;
        assert!(
            (after - before).abs() <= f64::EPSILON * before.abs().max(1.0),
            "jump from {} to {}",
            before,
            after
        );
    }
}

#[test]
fn test_clock_speed_sixty() {
    let (wall, store) = manual_store("fast");
    store.update_active(|current| ParameterUpdate::new().time_speed(60.0).apply(current)).unwrap();

    let (_, start) = store.now();
    wall.advance_secs(1.0);
    let (_, next) = store.now();
    assert!((next.simulated_seconds - start.simulated_seconds - 60.0).abs() < 1e-9);
    assert_eq!(next.timestamp() - start.timestamp(), 60);
}

#[test]
fn test_live_axis_starts_at_activation() {
    let (wall, store) = manual_store("activated");

    // Time passes before anyone reads the clock
    wall.advance_secs(30.0);
    assert!((store.now().1.simulated_seconds - 30.0).abs() < 1e-9);
}

#[test]
fn test_speed_change_applies_from_moment_of_change() {
    let (wall, store) = manual_store("rebased");

    wall.advance_secs(100.0);
    store.update_active(|current| ParameterUpdate::new().time_speed(3_600.0).apply(current)).unwrap();
    wall.advance_secs(10.0);

    let (snapshot, instant) = store.now();
    assert_eq!(snapshot.anchor().speed, 3_600.0);
    assert!((instant.simulated_seconds - (100.0 + 36_000.0)).abs() < 1e-6);
}
