//! Wire format of a published tick

use crate::simulation::{SimulatedInstant, SimulationParameters};
use crate::types::SimulationId;
use crate::units::Converted;
use serde::{Deserialize, Serialize};

/// JSON payload published on every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    /// Rounded value in `unit`
    pub value: f64,
    /// Output unit label, e.g. `"kW"`
    pub unit: String,
    /// Time unit label, e.g. `"seconds"`
    pub time_unit: String,
    /// Speed multiplier in effect
    pub time_speed: f64,
    /// Simulation identifier, e.g. `"SIM_…"`
    pub simulation_id: String,
    /// Unix timestamp of the simulated instant, in whole seconds
    pub timestamp: i64,
}

impl BusMessage {
    /// Build the message for one tick
    pub fn new(
        params: &SimulationParameters,
        instant: &SimulatedInstant,
        converted: Converted,
    ) -> Self {
        Self {
            value: converted.value,
            unit: converted.unit.label().to_string(),
            time_unit: converted.time_unit.label().to_string(),
            time_speed: params.time_speed,
            simulation_id: params.id.to_string(),
            timestamp: instant.timestamp(),
        }
    }

    /// Serialize to the JSON payload
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a JSON payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Per-simulation topic
pub fn topic_for(prefix: &str, simulation_id: SimulationId) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), simulation_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OutputUnit, TimeUnit};
    use crate::units;

    #[test]
    fn test_message_shape() {
        let params = SimulationParameters::new("sim").with_time_speed(60.0);
        let instant =
            SimulatedInstant { simulated_seconds: 60.0, epoch_seconds: 1_700_000_060.4, speed: 60.0 };
        let converted = units::convert(1234.567, OutputUnit::Kilowatts, TimeUnit::Seconds);

        let message = BusMessage::new(&params, &instant, converted);
        let json: serde_json::Value =
            serde_json::from_slice(&message.to_payload().unwrap()).unwrap();

        assert_eq!(json["value"], 1.23);
        assert_eq!(json["unit"], "kW");
        assert_eq!(json["time_unit"], "seconds");
        assert_eq!(json["time_speed"], 60.0);
        assert_eq!(json["simulation_id"], params.id.to_string());
        assert_eq!(json["timestamp"], 1_700_000_060i64);
        assert_eq!(json.as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_topic_joins_prefix_and_id() {
        let id = SimulationId::new();
        assert_eq!(topic_for("energy/simulations/", id), format!("energy/simulations/{}", id));
        assert!(topic_for("energy", id).starts_with("energy/SIM_"));
    }
}
