//! Simulation state, time and batch generation
//!
//! This module contains everything between the device models and the message
//! bus: the simulation parameters and the store holding the active one, the
//! clock mapping wall time to simulated time, the batch data generator, the
//! crate-wide error type and the logging setup.
//!
//! # Overview
//!
//! - **ParameterStore**: Holds the single active `SimulationParameters` behind one lock
//! - **SimulationClock**: Anchor-based mapping from real to simulated time, owned by the store
//! - **DataGenerator**: Bounded series over a simulated range, without publishing
//! - **SimulationError**: Error taxonomy and recovery policy
//! - **LoggingConfig**: Tracing subscriber setup, console or daily JSON files
//!
//! # Usage Example
//!
//! ```rust
//! use energy_stream_simulator::simulation::*;
//! use energy_stream_simulator::types::OutputUnit;
//!
//! let store = ParameterStore::new(SimulationParameters::new("demo")).unwrap();
//! let (_, snapshot) = store
//!     .update_active(|current| ParameterUpdate::new().output_unit("kW").apply(current))
//!     .unwrap();
//! assert_eq!(snapshot.output_unit, OutputUnit::Kilowatts);
//! assert_eq!(store.active_count(), 1);
//! ```

pub mod clock;
pub mod error;
pub mod generator;
pub mod logging;
pub mod parameters;
pub mod store;

// Re-export all public types for convenience
pub use clock::*;
pub use error::*;
pub use generator::*;
pub use logging::*;
pub use parameters::*;
pub use store::*;
