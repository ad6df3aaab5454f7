//! Error types and handling
//!
//! This module contains the crate-wide error type and the policy deciding how
//! each class of failure is handled.

use crate::publisher::BusError;
use crate::types::{ConfigError, ConfigValidationError};
use thiserror::Error;
use tracing::{error, warn};

/// Errors that can occur while simulating, generating or streaming
#[derive(Debug, Error)]
pub enum SimulationError {
    /// A configuration value was rejected
    #[error("Configuration validation failed: {0}")]
    ConfigurationError(#[from] ConfigValidationError),

    /// A configuration or installation file could not be loaded
    #[error("Configuration loading failed: {0}")]
    ConfigLoadError(#[from] ConfigError),

    /// The message bus failed
    #[error("Message bus error: {0}")]
    BusError(#[from] BusError),

    /// The simulation produced an unusable value
    #[error("Computation failed: {0}")]
    ComputationError(String),

    /// Simulated time could not be mapped to a timestamp
    #[error("Time management error: {0}")]
    TimeError(String),

    /// Data generation failed
    #[error("Data generation failed: {0}")]
    GenerationError(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl SimulationError {
    /// Create a computation error
    pub fn computation_error(msg: impl Into<String>) -> Self {
        Self::ComputationError(msg.into())
    }

    /// Create a time management error
    pub fn time_error(msg: impl Into<String>) -> Self {
        Self::TimeError(msg.into())
    }

    /// Create a data generation error
    pub fn generation_error(msg: impl Into<String>) -> Self {
        Self::GenerationError(msg.into())
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            SimulationError::ConfigurationError(_) => false,
            SimulationError::ConfigLoadError(_) => false,
            SimulationError::BusError(_) => true,
            SimulationError::ComputationError(_) => true,
            SimulationError::TimeError(_) => true,
            SimulationError::GenerationError(_) => true,
            SimulationError::IoError(_) => true,
            SimulationError::SerializationError(_) => true,
        }
    }

    /// Get the error category
    pub fn category(&self) -> &'static str {
        match self {
            SimulationError::ConfigurationError(_) => "Configuration",
            SimulationError::ConfigLoadError(_) => "Configuration",
            SimulationError::BusError(_) => "Message Bus",
            SimulationError::ComputationError(_) => "Computation",
            SimulationError::TimeError(_) => "Time Management",
            SimulationError::GenerationError(_) => "Data Generation",
            SimulationError::IoError(_) => "IO",
            SimulationError::SerializationError(_) => "Serialization",
        }
    }

    /// Field a configuration error refers to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            SimulationError::ConfigurationError(err)
            | SimulationError::ConfigLoadError(ConfigError::Invalid(err)) => Some(err.field()),
            _ => None,
        }
    }

    /// How a long-running task should react to this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            SimulationError::BusError(_) | SimulationError::IoError(_) => {
                RecoveryStrategy::Reconnect
            }
            _ if self.is_recoverable() => RecoveryStrategy::Skip,
            _ => RecoveryStrategy::Abort,
        }
    }

    /// Log the error at the level its strategy calls for and return the strategy
    pub fn report(&self, context: &str) -> RecoveryStrategy {
        let strategy = self.recovery_strategy();
        match strategy {
            RecoveryStrategy::Reconnect => {
                warn!(category = self.category(), "Transient error in {}: {}", context, self)
            }
            RecoveryStrategy::Skip => {
                error!(category = self.category(), "Skipping {} after error: {}", context, self)
            }
            RecoveryStrategy::Abort => {
                error!(category = self.category(), "Critical error in {}: {}", context, self)
            }
        }
        strategy
    }
}

/// Result type for simulation operations
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Error recovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Drop the connection and retry it with backoff
    Reconnect,
    /// Skip the current operation and continue
    Skip,
    /// Abort the operation and surface the error
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_creation() {
        let err = SimulationError::computation_error("non-finite power");
        assert!(matches!(err, SimulationError::ComputationError(_)));
        assert_eq!(err.to_string(), "Computation failed: non-finite power");
    }

    #[test]
    fn test_configuration_error_keeps_field() {
        let err: SimulationError = ConfigValidationError::missing("cycle_period").into();
        assert_eq!(err.field(), Some("cycle_period"));
        assert!(!err.is_recoverable());
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::Abort);
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let sim_error: SimulationError = io_error.into();
        assert!(matches!(sim_error, SimulationError::IoError(_)));
        assert_eq!(sim_error.recovery_strategy(), RecoveryStrategy::Reconnect);
    }

    #[test]
    fn test_bus_errors_trigger_reconnect() {
        let err: SimulationError = BusError::Timeout { operation: "publish", millis: 100 }.into();
        assert_eq!(err.category(), "Message Bus");
        assert_eq!(err.report("tick"), RecoveryStrategy::Reconnect);
    }

    #[test]
    fn test_computation_errors_skip() {
        let err = SimulationError::computation_error("unreachable");
        assert_eq!(err.recovery_strategy(), RecoveryStrategy::Skip);
        assert_eq!(SimulationError::time_error("overflow").category(), "Time Management");
    }
}
