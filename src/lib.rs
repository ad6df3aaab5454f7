//! Energy Stream Simulator
//!
//! Simulates the power draw of metered installations and streams it in real
//! time over a publish/subscribe channel, while exposing the same computation
//! for historical and batch data generation.
//!
//! # Overview
//!
//! A simulation is described by [`SimulationParameters`]: the output unit,
//! the time unit device durations are expressed in, a speed multiplier and an
//! optional historical anchor. Exactly one simulation is active at a time; it
//! lives in the [`ParameterStore`], which every consumer reads as a whole
//! snapshot.
//!
//! ## Key Features
//!
//! - **Device Algorithms**: Cyclic, schedule, constant and seeded "active" consumption models
//! - **Simulation Clock**: Live, accelerated and replay time without discontinuities
//! - **Unit Conversion**: Watts, kilowatts and kWh per day, month or year
//! - **Streaming Publisher**: One message per tick, reconnecting with backoff on outages
//! - **Data Generation**: Bounded series and previews, computed off the async workers
//!
//! ## Quick Start
//!
//! ```rust
//! use energy_stream_simulator::*;
//!
//! let installation = Installation::default_household()?;
//! let service = SimulationService::from_config(&RuntimeConfig::default(), installation)?;
//!
//! service.update_parameters(&ParameterUpdate::new().output_unit("kW").time_speed(60.0))?;
//! let message = service.sample_message()?;
//! assert_eq!(message.unit, "kW");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`types`]: Identifiers, unit enums, runtime configuration and CLI arguments
//! - [`units`]: Unit Converter
//! - [`device`]: Device profiles, installations and the Algorithm Engine
//! - [`simulation`]: Parameters, Parameter Store, Simulation Clock, Data Generator
//! - [`publisher`]: Message bus seam, transports and the Streaming Publisher
//! - [`service`]: API facade
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │   Service   │───►│  Parameter  │◄───┤  Publisher  │──► MessageBus
//! │  (API)      │    │   Store     │    │  (task)     │
//! └─────────────┘    └─────────────┘    └─────────────┘
//!        │                                     │
//!        ▼                                     ▼
//! ┌─────────────┐    ┌─────────────┐    ┌─────────────┐
//! │    Data     │───►│  Algorithm  │◄───┤ Simulation  │
//! │  Generator  │    │   Engine    │    │   Clock     │
//! └─────────────┘    └─────────────┘    └─────────────┘
//!        │                  │
//!        ▼                  ▼
//! ┌─────────────────────────────────┐
//! │         Unit Converter          │
//! └─────────────────────────────────┘
//! ```
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

// Module declarations
pub mod device;
pub mod publisher;
pub mod service;
pub mod simulation;
pub mod types;
pub mod units;

// Core types and configuration
pub use types::{
    BusKind, CliArgs, Command, ConfigError, ConfigValidationError, DeviceId, OutputUnit,
    RuntimeConfig, SimulationId, TimeUnit,
};

// Devices and the Algorithm Engine
pub use device::{power_at, AlgorithmSpec, DeviceProfile, Installation, ScheduleWindow};

// Simulation state, time and generation
pub use simulation::{
    DataGenerator, GeneratedSeries, GenerationRange, GenerationRequest, LoggingConfig,
    ParameterStore, ParameterUpdate, PreviewRequest, SimulationClock, SimulationError,
    SimulationParameters, SimulationResult,
};

// Streaming
pub use publisher::{
    BusError, BusMessage, InMemoryBus, MessageBus, MqttBus, PublisherHandle, PublisherState,
    StreamingPublisher,
};

// API facade
pub use service::{SimulationService, StreamingParameters};
