//! Configuration structures for the energy simulator
//!
//! This module contains the runtime configuration (broker, publisher cadence,
//! initial simulation parameters), its CLI surface and the validation logic
//! shared by every component that accepts configuration.

use super::{BusKind, OutputUnit, TimeUnit};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default cadence constants
pub mod defaults {
    /// Wall-clock interval between publisher ticks
    pub const TICK_INTERVAL_MS: u64 = 1_000;

    /// Broker connect attempt timeout
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Broker publish attempt timeout
    pub const PUBLISH_TIMEOUT_MS: u64 = 2_000;

    /// First reconnect delay
    pub const RECONNECT_INITIAL_MS: u64 = 500;

    /// Upper bound on the reconnect delay
    pub const RECONNECT_MAX_MS: u64 = 30_000;

    /// Default broker port
    pub const BROKER_PORT: u16 = 1883;

    /// Default topic prefix; the simulation id is appended
    pub const TOPIC_PREFIX: &str = "energy/simulations";
}

/// Command line arguments structure
#[derive(Debug, Clone, Parser)]
#[command(
    name = "energy-stream-simulator",
    version,
    about = "Energy Stream Simulator - Simulates device consumption and streams it in real time",
    long_about = "Simulates energy consumption for configurable device profiles and publishes the values over a message bus, or generates bounded historical datasets from the same engine.

EXAMPLES:
    # Stream the default installation in real time
    energy-stream-simulator

    # Stream at 60x speed in kilowatts
    energy-stream-simulator --time-speed 60 --output-unit kW

    # Replay history starting at a fixed instant
    energy-stream-simulator --start-time 2024-01-01T00:00:00Z --time-speed 3600

    # Generate a dataset without publishing
    energy-stream-simulator generate --start 2024-01-01T00:00:00Z --end 2024-01-02T00:00:00Z --step-seconds 300

    # Preview the next 24 hours
    energy-stream-simulator preview --hours 24

CONFIGURATION:
    Configuration can be provided via:
    1. Command line arguments and environment variables (highest priority)
    2. Configuration file (--config flag, JSON)
    3. Default values (lowest priority)

    Use --print-config to generate a template configuration file."
)]
pub struct CliArgs {
    /// Configuration file path (JSON format)
    #[arg(short, long, help = "Configuration file path (JSON format)")]
    pub config: Option<String>,

    /// Installation file path (JSON: meter base consumption and device profiles)
    #[arg(long, help = "Installation file with device profiles (JSON)")]
    pub installation: Option<String>,

    /// Message bus transport
    #[arg(long, help = "Message bus transport (mqtt or memory)")]
    pub bus: Option<String>,

    /// Broker host
    #[arg(long, env = "SIM_BROKER_HOST", help = "Broker host")]
    pub broker_host: Option<String>,

    /// Broker port
    #[arg(long, env = "SIM_BROKER_PORT", help = "Broker port")]
    pub broker_port: Option<u16>,

    /// Broker username
    #[arg(long, env = "SIM_BROKER_USERNAME", help = "Broker username")]
    pub broker_username: Option<String>,

    /// Broker password
    #[arg(long, env = "SIM_BROKER_PASSWORD", hide_env_values = true, help = "Broker password")]
    pub broker_password: Option<String>,

    /// Topic prefix; the simulation id is appended
    #[arg(long, help = "Topic prefix for published messages")]
    pub topic_prefix: Option<String>,

    /// Output unit of published values
    #[arg(
        long,
        help = "Output unit (W, kW, kWh/day, kWh/month, kWh/year)",
        long_help = "Unit in which consumption values are published. Supported: W, kW, kWh/day, kWh/month, kWh/year. Default: W"
    )]
    pub output_unit: Option<String>,

    /// Time unit of device durations
    #[arg(long, help = "Time unit of device durations (seconds, minutes, hours, days)")]
    pub time_unit: Option<String>,

    /// Simulated seconds per real second
    #[arg(
        long,
        help = "Simulation speed multiplier (> 0)",
        long_help = "Simulated seconds per real second. Must be greater than 0. Default: 1.0"
    )]
    pub time_speed: Option<f64>,

    /// Historical anchor for replay mode (RFC 3339)
    #[arg(long, help = "Replay start time (RFC 3339); omit for live mode")]
    pub start_time: Option<String>,

    /// Publisher tick interval in milliseconds
    #[arg(long, help = "Publisher tick interval in milliseconds")]
    pub tick_interval_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, help = "Enable debug logging")]
    pub debug: bool,

    /// Write JSON logs to daily files in this directory
    #[arg(long, value_name = "DIR", help = "Write JSON logs to daily files in this directory")]
    pub log_dir: Option<String>,

    /// Dry run mode - validate configuration without running
    #[arg(long, help = "Validate configuration without running")]
    pub dry_run: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in JSON format and exit")]
    pub print_config: bool,

    /// Operation to run; streaming when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operations offered by the binary
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Stream consumption values to the message bus until interrupted
    Stream,
    /// Generate a bounded dataset over an absolute simulated range
    Generate {
        /// Range start (RFC 3339)
        #[arg(long)]
        start: String,
        /// Range end, inclusive (RFC 3339)
        #[arg(long)]
        end: String,
        /// Seconds between samples
        #[arg(long, visible_alias = "step", default_value = "60")]
        step_seconds: f64,
    },
    /// Preview the upcoming simulated hours starting now
    Preview {
        /// Hours to cover
        #[arg(long, default_value = "24")]
        hours: f64,
        /// Minutes between samples
        #[arg(long, default_value = "5")]
        interval_minutes: f64,
        /// Cap on the number of samples
        #[arg(long, default_value = "288")]
        max_samples: usize,
    },
}

/// Configuration file structure (allows partial configuration)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    /// Message bus transport
    pub bus: Option<BusKind>,
    /// Broker host
    pub broker_host: Option<String>,
    /// Broker port
    pub broker_port: Option<u16>,
    /// Broker username
    pub broker_username: Option<String>,
    /// Broker password
    pub broker_password: Option<String>,
    /// Client identifier presented to the broker
    pub client_id: Option<String>,
    /// Topic prefix
    pub topic_prefix: Option<String>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
    /// Publish timeout in milliseconds
    pub publish_timeout_ms: Option<u64>,
    /// Publisher tick interval in milliseconds
    pub tick_interval_ms: Option<u64>,
    /// First reconnect delay in milliseconds
    pub reconnect_initial_ms: Option<u64>,
    /// Maximum reconnect delay in milliseconds
    pub reconnect_max_ms: Option<u64>,
    /// Name of the initial simulation
    pub simulation_name: Option<String>,
    /// Output unit of the initial simulation
    pub output_unit: Option<OutputUnit>,
    /// Time unit of the initial simulation
    pub time_unit: Option<TimeUnit>,
    /// Speed of the initial simulation
    pub time_speed: Option<f64>,
    /// Replay anchor of the initial simulation
    pub simulation_start_time: Option<DateTime<Utc>>,
    /// Installation file path
    pub installation_path: Option<String>,
}

/// Runtime configuration of the simulator process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Message bus transport
    pub bus: BusKind,

    /// Broker host
    pub broker_host: String,

    /// Broker port
    pub broker_port: u16,

    /// Broker username
    pub broker_username: Option<String>,

    /// Broker password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_password: Option<String>,

    /// Client identifier presented to the broker
    pub client_id: String,

    /// Topic prefix; the simulation id is appended
    pub topic_prefix: String,

    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Publish timeout in milliseconds
    pub publish_timeout_ms: u64,

    /// Publisher tick interval in milliseconds
    pub tick_interval_ms: u64,

    /// First reconnect delay in milliseconds
    pub reconnect_initial_ms: u64,

    /// Maximum reconnect delay in milliseconds
    pub reconnect_max_ms: u64,

    /// Name of the initial simulation
    pub simulation_name: String,

    /// Output unit of the initial simulation
    pub output_unit: OutputUnit,

    /// Time unit of the initial simulation
    pub time_unit: TimeUnit,

    /// Speed of the initial simulation
    pub time_speed: f64,

    /// Replay anchor of the initial simulation; live mode when absent
    pub simulation_start_time: Option<DateTime<Utc>>,

    /// Installation file path; the built-in household is used when absent
    pub installation_path: Option<String>,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    /// Configuration file read error
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    /// JSON parsing error
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Unsupported configuration file format
    #[error("Unsupported configuration file format: {0} (supported: .json)")]
    UnsupportedFormat(String),

    /// A supplied value failed validation
    #[error(transparent)]
    Invalid(#[from] ConfigValidationError),
}

/// Validation errors for configuration values
///
/// Every variant names the offending field so the caller can surface it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigValidationError {
    /// Value is not one of the supported options
    #[error("Unsupported value for {field}: {value}")]
    UnsupportedValue {
        /// Name of the offending field
        field: String,
        /// The rejected value
        value: String,
    },

    /// Value must be strictly positive
    #[error("{field} must be greater than 0, got {value}")]
    NonPositive {
        /// Name of the offending field
        field: String,
        /// The rejected value
        value: f64,
    },

    /// Value must not be negative
    #[error("{field} must not be negative, got {value}")]
    Negative {
        /// Name of the offending field
        field: String,
        /// The rejected value
        value: f64,
    },

    /// Value is outside its allowed interval
    #[error("Invalid value for {field}: {value} (must be between {min} and {max})")]
    OutOfRange {
        /// Name of the offending field
        field: String,
        /// The rejected value
        value: f64,
        /// Lower bound (inclusive)
        min: f64,
        /// Upper bound (inclusive)
        max: f64,
    },

    /// Field required by the declared algorithm is absent
    #[error("Missing required field {field}")]
    MissingField {
        /// Name of the missing field
        field: String,
    },

    /// Two related values are inconsistent
    #[error("Invalid {field}: {reason}")]
    Inconsistent {
        /// Name of the offending field
        field: String,
        /// Why the combination is rejected
        reason: String,
    },
}

impl ConfigValidationError {
    /// Name of the field the error refers to
    pub fn field(&self) -> &str {
        match self {
            ConfigValidationError::UnsupportedValue { field, .. }
            | ConfigValidationError::NonPositive { field, .. }
            | ConfigValidationError::Negative { field, .. }
            | ConfigValidationError::OutOfRange { field, .. }
            | ConfigValidationError::MissingField { field }
            | ConfigValidationError::Inconsistent { field, .. } => field,
        }
    }

    /// Shorthand for an unsupported value error
    pub fn unsupported(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnsupportedValue { field: field.into(), value: value.into() }
    }

    /// Shorthand for a missing field error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }
}

/// Reject non-finite or non-positive values
pub fn require_positive(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigValidationError::NonPositive { field: field.to_string(), value });
    }
    Ok(())
}

/// Reject non-finite or negative values
pub fn require_non_negative(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigValidationError::Negative { field: field.to_string(), value });
    }
    Ok(())
}

/// Reject values outside `[min, max]`
pub fn require_in_range(
    field: &str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ConfigValidationError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Parse an output unit label, naming the field on failure
pub fn parse_output_unit(field: &str, value: &str) -> Result<OutputUnit, ConfigValidationError> {
    value.parse().map_err(|_| ConfigValidationError::unsupported(field, value))
}

/// Parse a time unit label, naming the field on failure
pub fn parse_time_unit(field: &str, value: &str) -> Result<TimeUnit, ConfigValidationError> {
    value.parse().map_err(|_| ConfigValidationError::unsupported(field, value))
}

/// Parse an RFC 3339 timestamp, naming the field on failure
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, ConfigValidationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| ConfigValidationError::unsupported(field, value))
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::Mqtt,
            broker_host: "localhost".to_string(),
            broker_port: defaults::BROKER_PORT,
            broker_username: None,
            broker_password: None,
            client_id: "energy-stream-simulator".to_string(),
            topic_prefix: defaults::TOPIC_PREFIX.to_string(),
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            publish_timeout_ms: defaults::PUBLISH_TIMEOUT_MS,
            tick_interval_ms: defaults::TICK_INTERVAL_MS,
            reconnect_initial_ms: defaults::RECONNECT_INITIAL_MS,
            reconnect_max_ms: defaults::RECONNECT_MAX_MS,
            simulation_name: "First Simulation".to_string(),
            output_unit: OutputUnit::Watts,
            time_unit: TimeUnit::Seconds,
            time_speed: 1.0,
            simulation_start_time: None,
            installation_path: None,
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from parsed CLI arguments
    pub fn from_cli_args(args: &CliArgs) -> Result<Self, ConfigError> {
        // Start with default configuration
        let mut config = Self::default();

        // Load from config file if specified
        if let Some(config_path) = &args.config {
            config = Self::from_file(config_path)?;
        }

        // Override with command line arguments (CLI takes precedence)
        config.apply_cli_overrides(args)?;

        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let config_file: ConfigFile = serde_json::from_str(&content)?;
                Ok(Self::from_config_file(config_file))
            }
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::UnsupportedFormat("no extension".to_string())),
        }
    }

    /// Create configuration from a config file, merging with defaults
    fn from_config_file(file: ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bus: file.bus.unwrap_or(defaults.bus),
            broker_host: file.broker_host.unwrap_or(defaults.broker_host),
            broker_port: file.broker_port.unwrap_or(defaults.broker_port),
            broker_username: file.broker_username.or(defaults.broker_username),
            broker_password: file.broker_password.or(defaults.broker_password),
            client_id: file.client_id.unwrap_or(defaults.client_id),
            topic_prefix: file.topic_prefix.unwrap_or(defaults.topic_prefix),
            connect_timeout_ms: file.connect_timeout_ms.unwrap_or(defaults.connect_timeout_ms),
            publish_timeout_ms: file.publish_timeout_ms.unwrap_or(defaults.publish_timeout_ms),
            tick_interval_ms: file.tick_interval_ms.unwrap_or(defaults.tick_interval_ms),
            reconnect_initial_ms: file
                .reconnect_initial_ms
                .unwrap_or(defaults.reconnect_initial_ms),
            reconnect_max_ms: file.reconnect_max_ms.unwrap_or(defaults.reconnect_max_ms),
            simulation_name: file.simulation_name.unwrap_or(defaults.simulation_name),
            output_unit: file.output_unit.unwrap_or(defaults.output_unit),
            time_unit: file.time_unit.unwrap_or(defaults.time_unit),
            time_speed: file.time_speed.unwrap_or(defaults.time_speed),
            simulation_start_time: file.simulation_start_time.or(defaults.simulation_start_time),
            installation_path: file.installation_path.or(defaults.installation_path),
        }
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&mut self, args: &CliArgs) -> Result<(), ConfigValidationError> {
        if let Some(value) = &args.bus {
            self.bus = value.parse().map_err(|_| ConfigValidationError::unsupported("bus", value))?;
        }
        if let Some(value) = &args.broker_host {
            self.broker_host = value.clone();
        }
        if let Some(value) = args.broker_port {
            self.broker_port = value;
        }
        if let Some(value) = &args.broker_username {
            self.broker_username = Some(value.clone());
        }
        if let Some(value) = &args.broker_password {
            self.broker_password = Some(value.clone());
        }
        if let Some(value) = &args.topic_prefix {
            self.topic_prefix = value.clone();
        }
        if let Some(value) = &args.output_unit {
            self.output_unit = parse_output_unit("output_unit", value)?;
        }
        if let Some(value) = &args.time_unit {
            self.time_unit = parse_time_unit("time_unit", value)?;
        }
        if let Some(value) = args.time_speed {
            self.time_speed = value;
        }
        if let Some(value) = &args.start_time {
            self.simulation_start_time = Some(parse_timestamp("simulation_start_time", value)?);
        }
        if let Some(value) = args.tick_interval_ms {
            self.tick_interval_ms = value;
        }
        if let Some(value) = &args.installation {
            self.installation_path = Some(value.clone());
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Print configuration as JSON
    pub fn print_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        require_positive("time_speed", self.time_speed)?;

        if self.broker_host.trim().is_empty() {
            return Err(ConfigValidationError::missing("broker_host"));
        }
        if self.broker_port == 0 {
            return Err(ConfigValidationError::NonPositive {
                field: "broker_port".to_string(),
                value: 0.0,
            });
        }
        if self.topic_prefix.trim().is_empty() {
            return Err(ConfigValidationError::missing("topic_prefix"));
        }
        if self.client_id.is_empty() || self.client_id.starts_with(char::is_whitespace) {
            return Err(ConfigValidationError::unsupported("client_id", self.client_id.clone()));
        }

        for (field, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("publish_timeout_ms", self.publish_timeout_ms),
            ("reconnect_initial_ms", self.reconnect_initial_ms),
        ] {
            if value == 0 {
                return Err(ConfigValidationError::NonPositive {
                    field: field.to_string(),
                    value: 0.0,
                });
            }
        }

        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(ConfigValidationError::Inconsistent {
                field: "reconnect_max_ms".to_string(),
                reason: format!(
                    "must be >= reconnect_initial_ms ({} < {})",
                    self.reconnect_max_ms, self.reconnect_initial_ms
                ),
            });
        }

        Ok(())
    }
}
