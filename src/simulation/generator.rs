//! Data Generator
//!
//! Produces bounded time series from the same Algorithm Engine and Unit
//! Converter the publisher uses, with simulated times supplied directly rather
//! than read from a wall clock. Large runs are moved onto tokio's blocking pool
//! so they never compete with publish ticks.

use super::clock::SimulatedInstant;
use super::error::{SimulationError, SimulationResult};
use super::parameters::SimulationParameters;
use crate::device::{Installation, PowerBreakdown};
use crate::perf_span;
use crate::types::{
    require_positive, ConfigValidationError, DeviceId, OutputUnit, SimulationId, TimeUnit,
};
use crate::units::{self, round_to_precision, DISPLAY_PRECISION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Largest series a single request may produce
pub const MAX_GENERATED_SAMPLES: usize = 1_000_000;

/// A range on the simulated axis, in seconds, with an inclusive end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationRange {
    /// First simulated time
    pub start: f64,
    /// Last simulated time (inclusive)
    pub end: f64,
    /// Distance between samples
    pub step: f64,
    /// Unix time of simulated zero
    pub epoch_origin: f64,
}

impl GenerationRange {
    /// Create a validated range
    pub fn new(
        start: f64,
        end: f64,
        step: f64,
        epoch_origin: f64,
    ) -> Result<Self, ConfigValidationError> {
        require_positive("step", step)?;
        if !start.is_finite() || !end.is_finite() || end < start {
            return Err(ConfigValidationError::Inconsistent {
                field: "end".to_string(),
                reason: format!("must not precede start ({} < {})", end, start),
            });
        }

        let range = Self { start, end, step, epoch_origin };
        if range.intervals() + 1.0 > MAX_GENERATED_SAMPLES as f64 {
            return Err(ConfigValidationError::OutOfRange {
                field: "step".to_string(),
                value: step,
                min: (end - start) / (MAX_GENERATED_SAMPLES - 1) as f64,
                max: f64::MAX,
            });
        }
        Ok(range)
    }

    /// Range between two absolute instants, on the replay axis
    pub fn between(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step_seconds: f64,
    ) -> Result<Self, ConfigValidationError> {
        Self::new(
            super::clock::epoch_seconds(start),
            super::clock::epoch_seconds(end),
            step_seconds,
            0.0,
        )
    }

    /// Range of `duration_seconds` beginning at a resolved instant
    pub fn starting_at(
        instant: SimulatedInstant,
        duration_seconds: f64,
        step_seconds: f64,
    ) -> Result<Self, ConfigValidationError> {
        require_positive("duration", duration_seconds)?;
        Self::new(
            instant.simulated_seconds,
            instant.simulated_seconds + duration_seconds,
            step_seconds,
            instant.epoch_seconds - instant.simulated_seconds,
        )
    }

    /// Number of samples the range yields
    ///
    /// Saturates for ranges built without [`GenerationRange::new`].
    pub fn sample_count(&self) -> usize {
        let intervals = self.intervals();
        if intervals.is_nan() {
            return 1;
        }
        (intervals as usize).saturating_add(1)
    }

    /// Whole steps between start and end
    fn intervals(&self) -> f64 {
        // Tolerate representation error so that an exact end is included
        ((self.end - self.start) / self.step + 1e-9).floor()
    }

    /// Length of the range in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.end - self.start
    }

    fn time_at(&self, index: usize) -> f64 {
        self.start + index as f64 * self.step
    }
}

/// One produced value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    simulated_time: f64,
    timestamp: i64,
    value: f64,
    unit: OutputUnit,
}

impl Sample {
    /// Create a sample
    pub fn new(simulated_time: f64, timestamp: i64, value: f64, unit: OutputUnit) -> Self {
        Self { simulated_time, timestamp, value, unit }
    }

    /// Position on the simulated axis, in seconds
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    /// Unix timestamp, in whole seconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Value in `unit`
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Unit of the value
    pub fn unit(&self) -> OutputUnit {
        self.unit
    }
}

/// Summary of a series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStatistics {
    /// Number of samples
    pub count: usize,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Mean value
    pub average: f64,
    /// Simulated seconds covered
    pub duration_seconds: f64,
    /// Energy over the covered duration
    pub total_energy: f64,
    /// Unit of `total_energy`
    pub energy_unit: String,
}

impl SeriesStatistics {
    /// Summarize full-precision values, rounding only the results
    fn from_values(values: &[f64], duration_seconds: f64, unit: OutputUnit) -> Self {
        let count = values.len();
        let (min, max, sum) = values.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), value| (min.min(*value), max.max(*value), sum + value),
        );
        let average = if count > 0 { sum / count as f64 } else { 0.0 };
        let total_energy = units::total_energy(average, duration_seconds / 3_600.0, unit);

        let round = |value: f64| round_to_precision(value, DISPLAY_PRECISION);
        Self {
            count,
            min: if count > 0 { round(min) } else { 0.0 },
            max: if count > 0 { round(max) } else { 0.0 },
            average: round(average),
            duration_seconds,
            total_energy: round(total_energy),
            energy_unit: units::energy_unit(unit).to_string(),
        }
    }
}

/// A generated dataset
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedSeries {
    /// Simulation the series was generated for
    pub simulation_id: SimulationId,
    /// Unit of every sample
    pub output_unit: OutputUnit,
    /// Time unit of the algorithm axis
    pub time_unit: TimeUnit,
    /// Speed the series is labelled with
    pub time_speed: f64,
    /// Samples in time order
    pub samples: Vec<Sample>,
    /// Per-sample device decomposition, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Vec<PowerBreakdown>>,
    /// Summary of `samples`
    pub statistics: SeriesStatistics,
    /// Whether a sample cap cut the range short
    pub truncated: bool,
}

/// What to generate and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Simulated range
    pub range: GenerationRange,
    /// Output unit; the simulation's when absent
    #[serde(default)]
    pub output_unit: Option<OutputUnit>,
    /// Time unit; the simulation's when absent
    #[serde(default)]
    pub time_unit: Option<TimeUnit>,
    /// Speed label; the simulation's when absent
    #[serde(default)]
    pub time_speed: Option<f64>,
    /// Restrict to these devices; every device when absent
    #[serde(default)]
    pub devices: Option<Vec<DeviceId>>,
    /// Keep the per-device decomposition of every sample
    #[serde(default)]
    pub include_breakdown: bool,
    /// Stop after this many samples
    #[serde(default)]
    pub max_samples: Option<usize>,
}

impl GenerationRequest {
    /// Request covering `range` with the simulation's own settings
    pub fn new(range: GenerationRange) -> Self {
        Self {
            range,
            output_unit: None,
            time_unit: None,
            time_speed: None,
            devices: None,
            include_breakdown: false,
            max_samples: None,
        }
    }

    /// Override the output unit
    pub fn with_output_unit(mut self, unit: OutputUnit) -> Self {
        self.output_unit = Some(unit);
        self
    }

    /// Override the time unit
    pub fn with_time_unit(mut self, unit: TimeUnit) -> Self {
        self.time_unit = Some(unit);
        self
    }

    /// Override the speed label
    pub fn with_time_speed(mut self, speed: f64) -> Self {
        self.time_speed = Some(speed);
        self
    }

    /// Restrict to a subset of devices
    pub fn with_devices(mut self, devices: Vec<DeviceId>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Keep the per-device decomposition
    pub fn with_breakdown(mut self) -> Self {
        self.include_breakdown = true;
        self
    }

    /// Cap the number of samples
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples);
        self
    }

    /// Parameters with the overrides applied
    fn effective_parameters(
        &self,
        params: &SimulationParameters,
    ) -> Result<SimulationParameters, ConfigValidationError> {
        let mut effective = params.clone();
        if let Some(unit) = self.output_unit {
            effective.output_unit = unit;
        }
        if let Some(unit) = self.time_unit {
            effective.time_unit = unit;
        }
        if let Some(speed) = self.time_speed {
            require_positive("time_speed", speed)?;
            effective.time_speed = speed;
        }
        Ok(effective)
    }
}

/// Defaults for an exploratory look ahead
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviewRequest {
    /// Hours to cover
    pub hours: f64,
    /// Minutes between samples
    pub interval_minutes: f64,
    /// Cap on the number of samples
    pub max_samples: usize,
}

impl Default for PreviewRequest {
    fn default() -> Self {
        Self { hours: 24.0, interval_minutes: 5.0, max_samples: 288 }
    }
}

impl PreviewRequest {
    /// Range covered by the preview, starting at `instant`
    pub fn range_from(
        &self,
        instant: SimulatedInstant,
    ) -> Result<GenerationRange, ConfigValidationError> {
        require_positive("hours", self.hours)?;
        require_positive("interval_minutes", self.interval_minutes)?;
        if self.max_samples == 0 {
            return Err(ConfigValidationError::NonPositive {
                field: "max_samples".to_string(),
                value: 0.0,
            });
        }
        GenerationRange::starting_at(instant, self.hours * 3_600.0, self.interval_minutes * 60.0)
    }
}

/// Batch counterpart of the publisher
#[derive(Debug, Clone)]
pub struct DataGenerator {
    installation: Arc<Installation>,
}

impl DataGenerator {
    /// Create a generator over an installation
    pub fn new(installation: Arc<Installation>) -> Self {
        Self { installation }
    }

    /// Installation the generator samples
    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    /// Produce the series described by `request`
    #[instrument(
        skip(self, params, request),
        fields(simulation_id = %params.id, samples = request.range.sample_count())
    )]
    pub fn generate(
        &self,
        params: &SimulationParameters,
        request: &GenerationRequest,
    ) -> SimulationResult<GeneratedSeries> {
        let _span =
            perf_span!("generate_series", devices = self.installation.devices.len()).entered();

        let effective = request.effective_parameters(params)?;
        let subset;
        let installation = match &request.devices {
            Some(ids) => {
                subset = self.installation.subset(ids)?;
                &subset
            }
            None => self.installation.as_ref(),
        };

        let range = request.range;
        let available = range.sample_count();
        let count = request.max_samples.map_or(available, |cap| cap.min(available));
        let unit = effective.output_unit;

        let mut samples = Vec::with_capacity(count);
        let mut values = Vec::with_capacity(count);
        let mut breakdown = request.include_breakdown.then(|| Vec::with_capacity(count));

        for index in 0..count {
            let simulated = range.time_at(index);
            let at = effective.algorithm_time(simulated);

            let watts = match breakdown.as_mut() {
                Some(rows) => {
                    let row = installation.breakdown_at(at, effective.time_unit);
                    let total = row.total;
                    rows.push(row);
                    total
                }
                None => installation.power_at(at, effective.time_unit),
            };
            if !watts.is_finite() {
                return Err(SimulationError::computation_error(format!(
                    "non-finite power {} at simulated time {}",
                    watts, simulated
                )));
            }

            let value = units::watts_to_unit(watts, unit);
            let timestamp = (range.epoch_origin + simulated).floor() as i64;
            values.push(value);
            samples.push(Sample::new(
                simulated,
                timestamp,
                round_to_precision(value, DISPLAY_PRECISION),
                unit,
            ));
        }

        let covered = if count > 0 { range.time_at(count - 1) - range.start } else { 0.0 };
        let statistics = SeriesStatistics::from_values(&values, covered, unit);

        debug!(count, truncated = count < available, "Series generated");
        Ok(GeneratedSeries {
            simulation_id: effective.id,
            output_unit: unit,
            time_unit: effective.time_unit,
            time_speed: effective.time_speed,
            samples,
            breakdown,
            statistics,
            truncated: count < available,
        })
    }

    /// Capped series for quick exploration
    pub fn preview(
        &self,
        params: &SimulationParameters,
        range: GenerationRange,
        max_samples: usize,
    ) -> SimulationResult<GeneratedSeries> {
        self.generate(params, &GenerationRequest::new(range).with_max_samples(max_samples))
    }

    /// [`generate`](Self::generate) on the blocking pool
    pub async fn generate_blocking(
        &self,
        params: SimulationParameters,
        request: GenerationRequest,
    ) -> SimulationResult<GeneratedSeries> {
        let generator = self.clone();
        info!(samples = request.range.sample_count(), "Offloading series generation");
        tokio::task::spawn_blocking(move || generator.generate(&params, &request))
            .await
            .map_err(|err| SimulationError::generation_error(err.to_string()))?
    }

    /// [`preview`](Self::preview) on the blocking pool
    pub async fn preview_blocking(
        &self,
        params: SimulationParameters,
        range: GenerationRange,
        max_samples: usize,
    ) -> SimulationResult<GeneratedSeries> {
        self.generate_blocking(params, GenerationRequest::new(range).with_max_samples(max_samples))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceProfile, ScheduleWindow};
    use chrono::TimeZone;

    fn fridge_generator() -> DataGenerator {
        let fridge = DeviceProfile::cyclic("fridge", 10.0, 100.0, 10.0, 0.3).unwrap();
        DataGenerator::new(Arc::new(Installation::single(fridge)))
    }

    #[test]
    fn test_range_validation() {
        assert_eq!(GenerationRange::new(0.0, 10.0, 0.0, 0.0).unwrap_err().field(), "step");
        assert_eq!(GenerationRange::new(10.0, 0.0, 1.0, 0.0).unwrap_err().field(), "end");
        assert!(GenerationRange::new(0.0, 1e9, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_huge_range_is_rejected_without_overflow() {
        let err = GenerationRange::new(0.0, 1e20, 1.0, 0.0).unwrap_err();
        assert!(matches!(err, ConfigValidationError::OutOfRange { .. }));
        assert_eq!(err.field(), "step");

        assert!(GenerationRange::new(0.0, 1.0, f64::MIN_POSITIVE, 0.0).is_err());

        let unchecked = GenerationRange { start: 0.0, end: 1e30, step: 1.0, epoch_origin: 0.0 };
        assert_eq!(unchecked.sample_count(), usize::MAX);
    }

    #[test]
    fn test_range_end_is_inclusive() {
        let range = GenerationRange::new(0.0, 10.0, 1.0, 0.0).unwrap();
        assert_eq!(range.sample_count(), 11);
        let range = GenerationRange::new(0.0, 10.0, 3.0, 0.0).unwrap();
        assert_eq!(range.sample_count(), 4);
        let range = GenerationRange::new(0.0, 0.3, 0.1, 0.0).unwrap();
        assert_eq!(range.sample_count(), 4);
    }

    #[test]
    fn test_generate_matches_algorithm() {
        let generator = fridge_generator();
        let params = SimulationParameters::new("gen");
        let range = GenerationRange::new(0.0, 19.0, 1.0, 1_000.0).unwrap();

        let series = generator.generate(&params, &GenerationRequest::new(range)).unwrap();
        assert_eq!(series.samples.len(), 20);
        for sample in &series.samples {
            let expected = if sample.simulated_time() % 10.0 < 3.0 { 100.0 } else { 10.0 };
            assert_eq!(sample.value(), expected);
            assert_eq!(sample.timestamp(), 1_000 + sample.simulated_time() as i64);
        }

        assert_eq!(series.statistics.count, 20);
        assert_eq!(series.statistics.min, 10.0);
        assert_eq!(series.statistics.max, 100.0);
        assert_eq!(series.statistics.average, 37.0);
        assert_eq!(series.statistics.energy_unit, "kWh");
        assert!(!series.truncated);
    }

    #[test]
    fn test_overrides_change_unit_only() {
        let generator = fridge_generator();
        let params = SimulationParameters::new("gen");
        let range = GenerationRange::new(0.0, 0.0, 1.0, 0.0).unwrap();

        let request = GenerationRequest::new(range)
            .with_output_unit(OutputUnit::Kilowatts)
            .with_time_speed(60.0);
        let series = generator.generate(&params, &request).unwrap();
        assert_eq!(series.output_unit, OutputUnit::Kilowatts);
        assert_eq!(series.time_speed, 60.0);
        assert_eq!(series.samples[0].value(), 0.1);

        let bad = GenerationRequest::new(range).with_time_speed(-1.0);
        assert!(generator.generate(&params, &bad).is_err());
    }

    #[test]
    fn test_preview_caps_samples() {
        let generator = fridge_generator();
        let params = SimulationParameters::new("gen");
        let instant = SimulatedInstant { simulated_seconds: 0.0, epoch_seconds: 0.0, speed: 1.0 };
        let range = PreviewRequest::default().range_from(instant).unwrap();
        assert_eq!(range.sample_count(), 289);

        let series = generator.preview(&params, range, 288).unwrap();
        assert_eq!(series.samples.len(), 288);
        assert!(series.truncated);
    }

    #[test]
    fn test_replay_range_and_device_subset() {
        let lamp = DeviceProfile::schedule(
            "lamp",
            0.0,
            vec![ScheduleWindow::new(18.0 * 3_600.0, 3_600.0, 60.0)],
            None,
        )
        .unwrap();
        let router = DeviceProfile::constant("router", 10.0).unwrap();
        let lamp_id = lamp.id;
        let installation = Installation::new("flat", 5.0).with_device(lamp).with_device(router);
        let generator = DataGenerator::new(Arc::new(installation));

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 17, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0).unwrap();
        let range = GenerationRange::between(start, end, 3_600.0).unwrap();
        let request = GenerationRequest::new(range).with_devices(vec![lamp_id]).with_breakdown();

        let series = generator.generate(&SimulationParameters::new("replay"), &request).unwrap();
        let values: Vec<f64> = series.samples.iter().map(Sample::value).collect();
        assert_eq!(values, vec![5.0, 65.0, 5.0]);
        assert_eq!(series.samples[0].timestamp(), start.timestamp());

        let breakdown = series.breakdown.unwrap();
        assert_eq!(breakdown.len(), 3);
        assert_eq!(breakdown[1].devices.len(), 1);
        assert_eq!(breakdown[1].devices[0].watts, 60.0);
    }

    #[test]
    fn test_total_energy_for_constant_load() {
        let router = DeviceProfile::constant("router", 1_000.0).unwrap();
        let generator = DataGenerator::new(Arc::new(Installation::single(router)));
        let range = GenerationRange::new(0.0, 86_400.0, 3_600.0, 0.0).unwrap();

        let series = generator
            .generate(&SimulationParameters::new("energy"), &GenerationRequest::new(range))
            .unwrap();
        assert_eq!(series.statistics.total_energy, 24.0);
        assert_eq!(series.statistics.duration_seconds, 86_400.0);
    }

    #[tokio::test]
    async fn test_generate_blocking_runs_off_runtime() {
        let generator = fridge_generator();
        let range = GenerationRange::new(0.0, 3_600.0, 1.0, 0.0).unwrap();
        let series = generator
            .generate_blocking(SimulationParameters::new("bg"), GenerationRequest::new(range))
            .await
            .unwrap();
        assert_eq!(series.samples.len(), 3_601);
    }
}
