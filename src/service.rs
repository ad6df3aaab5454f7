//! API facade
//!
//! [`SimulationService`] is what a request handler talks to: it reads and
//! updates the active simulation, lists units, runs generation off the async
//! workers and describes what the publisher is currently emitting.

use crate::device::Installation;
use crate::publisher::{topic_for, BusMessage, PublisherConfig, StreamingPublisher};
use crate::publisher::{MessageBus, PublisherHandle};
use crate::simulation::{
    ActiveSnapshot, DataGenerator, GeneratedSeries, GenerationRequest, ParameterStore,
    ParameterUpdate, PreviewRequest, SimulationClock, SimulationError, SimulationMode,
    SimulationParameters, SimulationResult,
};
use crate::types::{ConfigValidationError, RuntimeConfig, SimulationId, TimeUnit};
use crate::units::{self, UnitInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Units a simulation may be configured with
#[derive(Debug, Clone, Serialize)]
pub struct SupportedUnits {
    /// Output units with display names
    pub output_units: Vec<UnitInfo>,
    /// Time unit labels
    pub time_units: Vec<&'static str>,
}

/// What the publisher is emitting right now
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingParameters {
    /// Active simulation
    pub simulation_id: SimulationId,
    /// Its name
    pub name: String,
    /// Output unit label
    pub output_unit: &'static str,
    /// Time unit label
    pub time_unit: &'static str,
    /// Speed multiplier
    pub time_speed: f64,
    /// Live or replay
    pub mode: SimulationMode,
    /// Replay anchor, if any
    pub simulation_start_time: Option<DateTime<Utc>>,
    /// Topic messages are published on
    pub topic: String,
    /// Store revision these values were read at
    pub revision: u64,
}

/// Result of an accepted update
#[derive(Debug, Clone)]
pub struct ParameterChange {
    /// Record before the update
    pub previous: Arc<SimulationParameters>,
    /// Record after the update
    pub current: ActiveSnapshot,
}

/// Facade over the parameter store, installation and data generator
#[derive(Debug)]
pub struct SimulationService {
    store: Arc<ParameterStore>,
    installation: Arc<Installation>,
    generator: DataGenerator,
    publisher: PublisherConfig,
}

impl SimulationService {
    /// Create a service over existing components
    pub fn new(
        store: Arc<ParameterStore>,
        installation: Arc<Installation>,
        publisher: PublisherConfig,
    ) -> Self {
        Self {
            store,
            generator: DataGenerator::new(Arc::clone(&installation)),
            installation,
            publisher,
        }
    }

    /// Build the service described by the runtime configuration
    pub fn from_config(
        config: &RuntimeConfig,
        installation: Installation,
    ) -> SimulationResult<Self> {
        Self::from_config_with_clock(config, installation, SimulationClock::system())
    }

    /// Build the service with simulated time read through `clock`
    #[instrument(skip_all)]
    pub fn from_config_with_clock(
        config: &RuntimeConfig,
        installation: Installation,
        clock: SimulationClock,
    ) -> SimulationResult<Self> {
        config.validate()?;
        installation.validate()?;

        let initial = SimulationParameters::from_config(config)?;
        let store = Arc::new(ParameterStore::with_clock(initial, clock)?);
        info!(
            installation = %installation.name,
            devices = installation.devices.len(),
            "Simulation service ready"
        );

        Ok(Self::new(store, Arc::new(installation), PublisherConfig::from_config(config)))
    }

    /// Shared parameter store
    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    /// Installation being simulated
    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    /// Spawn the streaming publisher over this service's store and installation
    pub fn start_publisher(&self, bus: Box<dyn MessageBus>) -> PublisherHandle {
        StreamingPublisher::new(
            bus,
            Arc::clone(&self.store),
            Arc::clone(&self.installation),
            self.publisher.clone(),
        )
        .spawn()
    }

    /// Active configuration
    pub fn active_parameters(&self) -> ActiveSnapshot {
        self.store.get_active()
    }

    /// Apply a partial update to the active configuration
    ///
    /// Validation and the swap happen under the store lock, so concurrent
    /// updates are applied one after another and none is lost.
    #[instrument(skip(self))]
    pub fn update_parameters(
        &self,
        update: &ParameterUpdate,
    ) -> Result<ParameterChange, ConfigValidationError> {
        if update.is_empty() {
            return Err(ConfigValidationError::missing("update"));
        }

        let (previous, current) = self.store.update_active(|active| update.apply(active))?;
        info!(
            simulation_id = %current.id,
            output_unit = %current.output_unit.label(),
            time_unit = %current.time_unit.label(),
            time_speed = current.time_speed,
            revision = current.revision(),
            "Simulation parameters updated"
        );
        Ok(ParameterChange { previous, current })
    }

    /// Make `params` the active simulation
    pub fn activate(
        &self,
        params: SimulationParameters,
    ) -> Result<Arc<SimulationParameters>, ConfigValidationError> {
        self.store.set_active(params)
    }

    /// Units accepted by [`update_parameters`](Self::update_parameters)
    pub fn supported_units(&self) -> SupportedUnits {
        SupportedUnits {
            output_units: units::supported_units(),
            time_units: TimeUnit::all().iter().map(|unit| unit.label()).collect(),
        }
    }

    /// Generate a series for the active simulation
    pub async fn generate(&self, request: GenerationRequest) -> SimulationResult<GeneratedSeries> {
        let params = self.store.get_active().params().as_ref().clone();
        self.generator.generate_blocking(params, request).await
    }

    /// Look ahead from the simulated instant currently being streamed
    pub async fn preview(&self, request: PreviewRequest) -> SimulationResult<GeneratedSeries> {
        let (snapshot, instant) = self.store.now();
        let range = request.range_from(instant)?;
        let params = snapshot.params().as_ref().clone();
        self.generator.preview_blocking(params, range, request.max_samples).await
    }

    /// Settings the publisher applies on its next tick
    pub fn streaming_parameters(&self) -> StreamingParameters {
        let snapshot = self.store.get_active();
        StreamingParameters {
            simulation_id: snapshot.id,
            name: snapshot.name.clone(),
            output_unit: snapshot.output_unit.label(),
            time_unit: snapshot.time_unit.label(),
            time_speed: snapshot.time_speed,
            mode: snapshot.mode(),
            simulation_start_time: snapshot.simulation_start_time,
            topic: topic_for(&self.publisher.topic_prefix, snapshot.id),
            revision: snapshot.revision(),
        }
    }

    /// Message the publisher would emit for the current simulated instant
    pub fn sample_message(&self) -> SimulationResult<BusMessage> {
        let (snapshot, instant) = self.store.now();
        let at = snapshot.algorithm_time(instant.simulated_seconds);

        let watts = self.installation().power_at(at, snapshot.time_unit);
        if !watts.is_finite() {
            return Err(SimulationError::computation_error(format!(
                "non-finite power {} at simulated time {}",
                watts, instant.simulated_seconds
            )));
        }

        let converted = units::convert(watts, snapshot.output_unit, snapshot.time_unit);
        Ok(BusMessage::new(&snapshot, &instant, converted))
    }
}
