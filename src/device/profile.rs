//! Device profiles and installations
//!
//! A [`DeviceProfile`] describes how one device draws power over time. Profiles
//! are declared in a flat, partially optional form ([`DeviceProfileConfig`]) and
//! validated into a closed [`AlgorithmSpec`] so that every profile reaching the
//! Algorithm Engine carries exactly the fields its algorithm needs.

use crate::types::{
    require_in_range, require_non_negative, require_positive, AlgorithmType, ConfigError,
    ConfigValidationError, DeviceId,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One window of a schedule profile, in algorithm time units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// Offset of the window from the start of the period
    pub start: f64,
    /// Length of the window
    pub duration: f64,
    /// Draw in watts while the window is open
    pub level: f64,
}

impl ScheduleWindow {
    /// Create a new window
    pub fn new(start: f64, duration: f64, level: f64) -> Self {
        Self { start, duration, level }
    }

    /// End offset of the window (exclusive)
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether `offset` falls inside `[start, start + duration)`
    pub fn contains(&self, offset: f64) -> bool {
        offset >= self.start && offset < self.end()
    }
}

/// Validated algorithm-specific parameters
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmSpec {
    /// Periodic on/off
    Cyclic {
        /// Length of one cycle
        cycle_period: f64,
        /// Fraction of the cycle spent at peak, in `[0, 1]`
        duty_fraction: f64,
    },
    /// Windows within a repeating period
    Schedule {
        /// Windows, in declaration order; the first match wins
        windows: Vec<ScheduleWindow>,
        /// Explicit period; 24 hours when absent
        period: Option<f64>,
    },
    /// Constant draw at the base consumption
    Constant,
    /// Seeded semi-random activation episodes
    Active {
        /// Probability that an episode starts in a given bucket
        activation_probability: f64,
        /// Shortest episode
        min_active_duration: f64,
        /// Longest episode
        max_active_duration: f64,
        /// Explicit seed; derived from the device id when absent
        seed: Option<u64>,
    },
}

impl AlgorithmSpec {
    /// Tag of the algorithm
    pub fn algorithm_type(&self) -> AlgorithmType {
        match self {
            AlgorithmSpec::Cyclic { .. } => AlgorithmType::Cyclic,
            AlgorithmSpec::Schedule { .. } => AlgorithmType::Schedule,
            AlgorithmSpec::Constant => AlgorithmType::Constant,
            AlgorithmSpec::Active { .. } => AlgorithmType::Active,
        }
    }
}

/// Declared form of a device profile, as found in installation files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfileConfig {
    /// Identifier; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DeviceId>,
    /// Device name
    pub name: String,
    /// Free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Algorithm tag
    pub algorithm_type: Option<AlgorithmType>,
    /// Idle draw in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_consumption: Option<f64>,
    /// Peak draw in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_consumption: Option<f64>,
    /// Cyclic: length of one cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_period: Option<f64>,
    /// Cyclic: fraction of the cycle at peak
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duty_fraction: Option<f64>,
    /// Cyclic: time at peak per cycle, alternative to `duty_fraction`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_duration: Option<f64>,
    /// Schedule: windows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<Vec<ScheduleWindow>>,
    /// Schedule: explicit period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<f64>,
    /// Active: probability an episode starts in a bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_probability: Option<f64>,
    /// Active: shortest episode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_active_duration: Option<f64>,
    /// Active: longest episode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_active_duration: Option<f64>,
    /// Active: explicit seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// A validated device profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DeviceProfileConfig", into = "DeviceProfileConfig")]
pub struct DeviceProfile {
    /// Unique identifier
    pub id: DeviceId,
    /// Device name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Idle draw in watts
    pub base_consumption: f64,
    /// Peak draw in watts
    pub peak_consumption: f64,
    /// Algorithm-specific parameters
    pub algorithm: AlgorithmSpec,
}

fn required(field: &str, value: Option<f64>) -> Result<f64, ConfigValidationError> {
    value.ok_or_else(|| ConfigValidationError::missing(field))
}

impl TryFrom<DeviceProfileConfig> for DeviceProfile {
    type Error = ConfigValidationError;

    fn try_from(config: DeviceProfileConfig) -> Result<Self, Self::Error> {
        let algorithm_type = config
            .algorithm_type
            .ok_or_else(|| ConfigValidationError::missing("algorithm_type"))?;

        let base_consumption = required("base_consumption", config.base_consumption)?;
        require_non_negative("base_consumption", base_consumption)?;

        let needs_peak = matches!(algorithm_type, AlgorithmType::Cyclic | AlgorithmType::Active);
        let peak_consumption = match config.peak_consumption {
            Some(peak) => peak,
            None if needs_peak => return Err(ConfigValidationError::missing("peak_consumption")),
            None => base_consumption,
        };
        require_non_negative("peak_consumption", peak_consumption)?;

        let algorithm = match algorithm_type {
            AlgorithmType::Constant => AlgorithmSpec::Constant,
            AlgorithmType::Cyclic => {
                let cycle_period = required("cycle_period", config.cycle_period)?;
                require_positive("cycle_period", cycle_period)?;

                let duty_fraction = match (config.duty_fraction, config.on_duration) {
                    (Some(duty), _) => {
                        require_in_range("duty_fraction", duty, 0.0, 1.0)?;
                        duty
                    }
                    (None, Some(on_duration)) => {
                        require_in_range("on_duration", on_duration, 0.0, cycle_period)?;
                        on_duration / cycle_period
                    }
                    (None, None) => return Err(ConfigValidationError::missing("duty_fraction")),
                };

                AlgorithmSpec::Cyclic { cycle_period, duty_fraction }
            }
            AlgorithmType::Schedule => {
                let windows = config
                    .windows
                    .filter(|windows| !windows.is_empty())
                    .ok_or_else(|| ConfigValidationError::missing("windows"))?;

                for (index, window) in windows.iter().enumerate() {
                    require_non_negative(&format!("windows[{}].start", index), window.start)?;
                    require_positive(&format!("windows[{}].duration", index), window.duration)?;
                    require_non_negative(&format!("windows[{}].level", index), window.level)?;
                }
                if let Some(period) = config.period {
                    require_positive("period", period)?;
                }

                AlgorithmSpec::Schedule { windows, period: config.period }
            }
            AlgorithmType::Active => {
                let activation_probability =
                    required("activation_probability", config.activation_probability)?;
                require_in_range("activation_probability", activation_probability, 0.0, 1.0)?;

                let min_active_duration =
                    required("min_active_duration", config.min_active_duration)?;
                require_non_negative("min_active_duration", min_active_duration)?;

                let max_active_duration =
                    required("max_active_duration", config.max_active_duration)?;
                require_non_negative("max_active_duration", max_active_duration)?;

                if max_active_duration < min_active_duration {
                    return Err(ConfigValidationError::Inconsistent {
                        field: "max_active_duration".to_string(),
                        reason: format!(
                            "must be >= min_active_duration ({} < {})",
                            max_active_duration, min_active_duration
                        ),
                    });
                }

                AlgorithmSpec::Active {
                    activation_probability,
                    min_active_duration,
                    max_active_duration,
                    seed: config.seed,
                }
            }
        };

        Ok(Self {
            id: config.id.unwrap_or_default(),
            name: config.name,
            description: config.description,
            base_consumption,
            peak_consumption,
            algorithm,
        })
    }
}

impl From<DeviceProfile> for DeviceProfileConfig {
    fn from(profile: DeviceProfile) -> Self {
        let mut config = DeviceProfileConfig {
            id: Some(profile.id),
            name: profile.name,
            description: profile.description,
            algorithm_type: Some(profile.algorithm.algorithm_type()),
            base_consumption: Some(profile.base_consumption),
            peak_consumption: Some(profile.peak_consumption),
            ..Default::default()
        };

        match profile.algorithm {
            AlgorithmSpec::Cyclic { cycle_period, duty_fraction } => {
                config.cycle_period = Some(cycle_period);
                config.duty_fraction = Some(duty_fraction);
            }
            AlgorithmSpec::Schedule { windows, period } => {
                config.windows = Some(windows);
                config.period = period;
            }
            AlgorithmSpec::Constant => {}
            AlgorithmSpec::Active {
                activation_probability,
                min_active_duration,
                max_active_duration,
                seed,
            } => {
                config.activation_probability = Some(activation_probability);
                config.min_active_duration = Some(min_active_duration);
                config.max_active_duration = Some(max_active_duration);
                config.seed = seed;
            }
        }

        config
    }
}

impl DeviceProfile {
    /// Constant draw device
    pub fn constant(name: impl Into<String>, base_consumption: f64) -> Result<Self, ConfigValidationError> {
        DeviceProfileConfig {
            name: name.into(),
            algorithm_type: Some(AlgorithmType::Constant),
            base_consumption: Some(base_consumption),
            ..Default::default()
        }
        .try_into()
    }

    /// Periodic on/off device
    pub fn cyclic(
        name: impl Into<String>,
        base_consumption: f64,
        peak_consumption: f64,
        cycle_period: f64,
        duty_fraction: f64,
    ) -> Result<Self, ConfigValidationError> {
        DeviceProfileConfig {
            name: name.into(),
            algorithm_type: Some(AlgorithmType::Cyclic),
            base_consumption: Some(base_consumption),
            peak_consumption: Some(peak_consumption),
            cycle_period: Some(cycle_period),
            duty_fraction: Some(duty_fraction),
            ..Default::default()
        }
        .try_into()
    }

    /// Device following fixed windows within a repeating period
    pub fn schedule(
        name: impl Into<String>,
        base_consumption: f64,
        windows: Vec<ScheduleWindow>,
        period: Option<f64>,
    ) -> Result<Self, ConfigValidationError> {
        DeviceProfileConfig {
            name: name.into(),
            algorithm_type: Some(AlgorithmType::Schedule),
            base_consumption: Some(base_consumption),
            windows: Some(windows),
            period,
            ..Default::default()
        }
        .try_into()
    }

    /// Device with semi-random activation episodes
    pub fn active(
        name: impl Into<String>,
        base_consumption: f64,
        peak_consumption: f64,
        activation_probability: f64,
        min_active_duration: f64,
        max_active_duration: f64,
    ) -> Result<Self, ConfigValidationError> {
        DeviceProfileConfig {
            name: name.into(),
            algorithm_type: Some(AlgorithmType::Active),
            base_consumption: Some(base_consumption),
            peak_consumption: Some(peak_consumption),
            activation_probability: Some(activation_probability),
            min_active_duration: Some(min_active_duration),
            max_active_duration: Some(max_active_duration),
            ..Default::default()
        }
        .try_into()
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fix the seed of an active profile; no effect on other algorithms
    pub fn with_seed(mut self, value: u64) -> Self {
        if let AlgorithmSpec::Active { seed, .. } = &mut self.algorithm {
            *seed = Some(value);
        }
        self
    }

    /// Tag of the profile's algorithm
    pub fn algorithm_type(&self) -> AlgorithmType {
        self.algorithm.algorithm_type()
    }
}

/// Power drawn by one device at an instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevicePower {
    /// Device identifier
    pub device_id: DeviceId,
    /// Device name
    pub name: String,
    /// Draw in watts
    pub watts: f64,
}

/// Decomposition of an installation's draw at an instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerBreakdown {
    /// Meter-level base draw in watts
    pub meter_base: f64,
    /// Per-device draw, in installation order
    pub devices: Vec<DevicePower>,
    /// Meter base plus every device
    pub total: f64,
}

/// A metered installation: a base draw plus a set of devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installation {
    /// Installation name
    pub name: String,
    /// Meter-level base draw in watts
    #[serde(default)]
    pub base_consumption: f64,
    /// Devices behind the meter
    #[serde(default)]
    pub devices: Vec<DeviceProfile>,
}

impl Installation {
    /// Empty installation with a meter base draw
    pub fn new(name: impl Into<String>, base_consumption: f64) -> Self {
        Self { name: name.into(), base_consumption, devices: Vec::new() }
    }

    /// Installation made of a single device and no meter base
    pub fn single(profile: DeviceProfile) -> Self {
        Self { name: profile.name.clone(), base_consumption: 0.0, devices: vec![profile] }
    }

    /// Add a device
    pub fn with_device(mut self, profile: DeviceProfile) -> Self {
        self.devices.push(profile);
        self
    }

    /// Load an installation from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let content = fs::read_to_string(path)?;
                let installation: Installation = serde_json::from_str(&content)?;
                installation.validate()?;
                Ok(installation)
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::UnsupportedFormat("no extension".to_string())),
        }
    }

    /// Validate installation-level fields; device fields are validated on construction
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        require_non_negative("base_consumption", self.base_consumption)
    }

    /// Look up a device by id
    pub fn device(&self, id: DeviceId) -> Option<&DeviceProfile> {
        self.devices.iter().find(|device| device.id == id)
    }

    /// Installation restricted to `ids`, keeping the meter base
    pub fn subset(&self, ids: &[DeviceId]) -> Result<Self, ConfigValidationError> {
        let mut devices = Vec::with_capacity(ids.len());
        for id in ids {
            let device = self
                .device(*id)
                .ok_or_else(|| ConfigValidationError::unsupported("devices", id.to_string()))?;
            devices.push(device.clone());
        }

        Ok(Self { name: self.name.clone(), base_consumption: self.base_consumption, devices })
    }

    /// Household used when no installation file is supplied
    ///
    /// Durations assume a seconds time base.
    pub fn default_household() -> Result<Self, ConfigValidationError> {
        let fridge = DeviceProfile::cyclic("Refrigerator", 5.0, 150.0, 1_800.0, 0.4)?
            .with_description("Compressor cycling every 30 minutes");
        let lighting = DeviceProfile::schedule(
            "Lighting",
            0.0,
            vec![
                ScheduleWindow::new(6.0 * 3_600.0, 2.0 * 3_600.0, 120.0),
                ScheduleWindow::new(18.0 * 3_600.0, 5.0 * 3_600.0, 240.0),
            ],
            None,
        )?;
        let router = DeviceProfile::constant("Router", 12.0)?;
        let kettle = DeviceProfile::active("Kettle", 0.0, 2_000.0, 0.02, 60.0, 300.0)?
            .with_seed(0x6b65_7474_6c65);

        Ok(Self::new("Household", 50.0)
            .with_device(fridge)
            .with_device(lighting)
            .with_device(router)
            .with_device(kettle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_algorithm_field_is_reported() {
        let config = DeviceProfileConfig {
            name: "fridge".to_string(),
            algorithm_type: Some(AlgorithmType::Cyclic),
            base_consumption: Some(5.0),
            peak_consumption: Some(150.0),
            duty_fraction: Some(0.3),
            ..Default::default()
        };

        let err = DeviceProfile::try_from(config).unwrap_err();
        assert_eq!(err, ConfigValidationError::missing("cycle_period"));
    }

    #[test]
    fn test_negative_values_are_rejected() {
        let err = DeviceProfile::constant("router", -1.0).unwrap_err();
        assert_eq!(err.field(), "base_consumption");

        let err = DeviceProfile::schedule(
            "lamp",
            0.0,
            vec![ScheduleWindow::new(0.0, -5.0, 100.0)],
            None,
        )
        .unwrap_err();
        assert_eq!(err.field(), "windows[0].duration");
    }

    #[test]
    fn test_on_duration_converts_to_duty_fraction() {
        let config = DeviceProfileConfig {
            name: "fridge".to_string(),
            algorithm_type: Some(AlgorithmType::Cyclic),
            base_consumption: Some(5.0),
            peak_consumption: Some(150.0),
            cycle_period: Some(20.0),
            on_duration: Some(5.0),
            ..Default::default()
        };

        let profile = DeviceProfile::try_from(config).unwrap();
        assert_eq!(
            profile.algorithm,
            AlgorithmSpec::Cyclic { cycle_period: 20.0, duty_fraction: 0.25 }
        );
    }

    #[test]
    fn test_active_bounds_must_be_ordered() {
        let err = DeviceProfile::active("kettle", 0.0, 2000.0, 0.5, 300.0, 60.0).unwrap_err();
        assert_eq!(err.field(), "max_active_duration");

        let err = DeviceProfile::active("kettle", 0.0, 2000.0, 1.5, 60.0, 300.0).unwrap_err();
        assert_eq!(err.field(), "activation_probability");
    }

    #[test]
    fn test_profile_json_validates_on_load() {
        let json = r#"{"name": "heater", "algorithm_type": "active", "base_consumption": 0}"#;
        let err = serde_json::from_str::<DeviceProfile>(json).unwrap_err();
        assert!(err.to_string().contains("peak_consumption"));

        let json = r#"{
            "name": "fridge",
            "algorithm_type": "cyclic",
            "base_consumption": 5,
            "peak_consumption": 150,
            "cycle_period": 10,
            "duty_fraction": 0.3
        }"#;
        let profile: DeviceProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.algorithm_type(), AlgorithmType::Cyclic);
        assert_eq!(profile.peak_consumption, 150.0);
    }

    #[test]
    fn test_installation_subset() {
        let household = Installation::default_household().unwrap();
        let router = household.devices[2].id;

        let subset = household.subset(&[router]).unwrap();
        assert_eq!(subset.devices.len(), 1);
        assert_eq!(subset.base_consumption, household.base_consumption);

        let err = household.subset(&[DeviceId::new()]).unwrap_err();
        assert_eq!(err.field(), "devices");
    }

    #[test]
    fn test_installation_file_loading() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        let json = r#"{
            "name": "Flat",
            "base_consumption": 30,
            "devices": [
                {"name": "router", "algorithm_type": "constant", "base_consumption": 12}
            ]
        }"#;
        file.write_all(json.as_bytes()).unwrap();
        file.flush().unwrap();

        let installation = Installation::from_file(file.path()).unwrap();
        assert_eq!(installation.name, "Flat");
        assert_eq!(installation.devices.len(), 1);
        assert_eq!(installation.devices[0].algorithm, AlgorithmSpec::Constant);
    }
}
