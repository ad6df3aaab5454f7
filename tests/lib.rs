// Integration tests test your crate's public API. They only have access to items
// in your crate that are marked pub. See the Cargo Targets page of the Cargo Book
// for more information.
//
//   https://doc.rust-lang.org/cargo/reference/cargo-targets.html#integration-tests
//

use energy_stream_simulator::*;

// Engine and data model
mod algorithm_property_tests;
mod parameter_store_tests;



#[test]
fn test_core_id_types() {
    let simulation_id = SimulationId::new();
    let device_id = DeviceId::new();

    // Test that IDs are unique
    assert_ne!(simulation_id, SimulationId::new());
    assert_ne!(device_id, DeviceId::new());

    // Test string formatting
    assert!(simulation_id.to_string().starts_with("SIM_"));
    assert!(device_id.to_string().starts_with("DEV_"));

    let parsed: SimulationId = simulation_id.to_string().parse().unwrap();
    assert_eq!(parsed, simulation_id);
}

#[test]
fn test_unit_labels() {
    let labels: Vec<_> = OutputUnit::all().iter().map(|unit| unit.label()).collect();
    assert_eq!(labels, vec!["W", "kW", "kWh/day", "kWh/month", "kWh/year"]);

    for unit in OutputUnit::all() {
        assert_eq!(unit.label().parse::<OutputUnit>().unwrap(), unit);
        assert!(!unit.display_name().is_empty());
    }
    for unit in TimeUnit::all() {
        assert_eq!(unit.label().parse::<TimeUnit>().unwrap(), unit);
    }
}

#[test]
fn test_id_json_output_has_prefixes() {
    let params = SimulationParameters::new("json");
    let json = serde_json::to_string(&params).unwrap();
    assert!(json.contains("\"SIM_"));
    assert!(json.contains("\"output_unit\":\"W\""));

    let back: SimulationParameters = serde_json::from_str(&json).unwrap();
    assert_eq!(back, params);
}

#[test]
fn test_facade_quick_start() {
    let installation = Installation::default_household().unwrap();
    let service = SimulationService::from_config(&RuntimeConfig::default(), installation).unwrap();

    service
        .update_parameters(&ParameterUpdate::new().output_unit("kW").time_speed(60.0))
        .unwrap();
    let message = service.sample_message().unwrap();
    assert_eq!(message.unit, "kW");
    assert_eq!(message.time_speed, 60.0);
    assert!(message.value > 0.0);
}
