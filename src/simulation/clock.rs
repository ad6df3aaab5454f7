//! Simulation Clock
//!
//! Maps wall-clock time to simulated time through an anchor: the real instant
//! of the anchor, the simulated time at that instant and the speed since then.
//! A speed change rebases the anchor at the moment of change, so simulated time
//! never jumps.

use super::parameters::{SimulationMode, SimulationParameters};
use crate::types::SimulationId;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Source of real time
pub trait WallClock: Send + Sync + Debug {
    /// Current real time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock driven by the tokio monotonic clock
///
/// Anchored at the system time when created; afterwards it advances with
/// `tokio::time::Instant`, so it follows paused time in tests and never steps
/// backwards when the system clock is adjusted.
#[derive(Debug, Clone)]
pub struct SystemWallClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl SystemWallClock {
    /// Create a wall clock anchored at the current system time
    pub fn new() -> Self {
        Self { origin: Utc::now(), started: tokio::time::Instant::now() }
    }
}

impl Default for SystemWallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemWallClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.started.elapsed();
        self.origin + Duration::from_std(elapsed).unwrap_or_else(|_| Duration::zero())
    }
}

/// Wall clock moved by hand, for deterministic tests
#[derive(Debug, Clone)]
pub struct ManualWallClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualWallClock {
    /// Create a manual clock reading `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }

    /// Move the clock forward by fractional seconds
    pub fn advance_secs(&self, seconds: f64) {
        self.advance(Duration::microseconds((seconds * 1e6).round() as i64));
    }

    /// Set the clock
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl WallClock for ManualWallClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Seconds since the Unix epoch with sub-second precision
pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_nanos()) / 1e9
}

/// A resolved simulated instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimulatedInstant {
    /// Position on the simulated axis, in seconds
    pub simulated_seconds: f64,
    /// Corresponding Unix time, in seconds
    pub epoch_seconds: f64,
    /// Speed in effect
    pub speed: f64,
}

impl SimulatedInstant {
    /// Whole-second Unix timestamp
    pub fn timestamp(&self) -> i64 {
        self.epoch_seconds.floor() as i64
    }

    /// Timestamp as a date, if representable
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        let secs = self.epoch_seconds.floor();
        let nanos = ((self.epoch_seconds - secs) * 1e9) as u32;
        Utc.timestamp_opt(secs as i64, nanos.min(999_999_999)).single()
    }
}

/// Mapping from real time to simulated time for one active simulation
///
/// Owned by the Parameter Store and replaced together with the active record,
/// so every consumer resolves time against the same anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeAnchor {
    /// Simulation the anchor belongs to
    pub simulation_id: SimulationId,
    /// Historical anchor of that simulation, if replaying
    pub start_time: Option<DateTime<Utc>>,
    /// Real time of the anchor
    pub real: DateTime<Utc>,
    /// Simulated seconds at `real`
    pub simulated: f64,
    /// Speed since `real`
    pub speed: f64,
    /// Unix time of simulated zero
    pub epoch_origin: f64,
}

impl TimeAnchor {
    /// Fresh axis for `params`, starting at `real_now`
    ///
    /// Live simulations start at zero; replays use Unix time as the axis.
    pub fn activate(params: &SimulationParameters, real_now: DateTime<Utc>) -> Self {
        match params.simulation_start_time {
            Some(start) => Self {
                simulation_id: params.id,
                start_time: Some(start),
                real: real_now,
                simulated: epoch_seconds(start),
                speed: params.time_speed,
                epoch_origin: 0.0,
            },
            None => Self {
                simulation_id: params.id,
                start_time: None,
                real: real_now,
                simulated: 0.0,
                speed: params.time_speed,
                epoch_origin: epoch_seconds(real_now),
            },
        }
    }

    /// Same axis with `speed` in effect from `real_now`
    pub fn rebase(&self, real_now: DateTime<Utc>, speed: f64) -> Self {
        Self { real: real_now, simulated: self.simulated_at(real_now), speed, ..*self }
    }

    /// Simulated seconds at `real_now`
    pub fn simulated_at(&self, real_now: DateTime<Utc>) -> f64 {
        let elapsed = epoch_seconds(real_now) - epoch_seconds(self.real);
        self.simulated + self.speed * elapsed
    }

    /// Resolved instant at `real_now`
    pub fn instant_at(&self, real_now: DateTime<Utc>) -> SimulatedInstant {
        let simulated_seconds = self.simulated_at(real_now);
        SimulatedInstant {
            simulated_seconds,
            epoch_seconds: self.epoch_origin + simulated_seconds,
            speed: self.speed,
        }
    }

    /// Whether the anchor still describes the axis of `params`
    pub fn belongs_to(&self, params: &SimulationParameters) -> bool {
        self.simulation_id == params.id && self.start_time == params.simulation_start_time
    }

    /// Live or replay
    pub fn mode(&self) -> SimulationMode {
        if self.start_time.is_some() {
            SimulationMode::Replay
        } else {
            SimulationMode::Live
        }
    }
}

/// Resolves simulated time from a [`TimeAnchor`] and a wall clock
///
/// Cheap to clone; clones share the wall clock.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    wall: Arc<dyn WallClock>,
}

impl SimulationClock {
    /// Create a clock reading real time from `wall`
    pub fn new(wall: Arc<dyn WallClock>) -> Self {
        Self { wall }
    }

    /// Clock reading the system wall clock
    pub fn system() -> Self {
        Self::new(Arc::new(SystemWallClock::new()))
    }

    /// Shared handle to the underlying wall clock
    pub fn wall(&self) -> Arc<dyn WallClock> {
        Arc::clone(&self.wall)
    }

    /// Current real time
    pub fn real_now(&self) -> DateTime<Utc> {
        self.wall.now()
    }

    /// Anchor for `params` becoming active now
    ///
    /// A new simulation or a new historical anchor starts a fresh axis; a speed
    /// change alone rebases `current` at this moment; anything else keeps it.
    #[instrument(skip_all, fields(simulation_id = %params.id))]
    pub fn anchor_for(
        &self,
        params: &SimulationParameters,
        current: Option<&TimeAnchor>,
    ) -> TimeAnchor {
        let real_now = self.real_now();

        match current {
            Some(anchor) if anchor.belongs_to(params) => {
                if anchor.speed == params.time_speed {
                    return *anchor;
                }
                let rebased = anchor.rebase(real_now, params.time_speed);
                debug!(
                    from = anchor.speed,
                    to = params.time_speed,
                    simulated = rebased.simulated,
                    "Simulation clock rebased"
                );
                rebased
            }
            _ => {
                let anchor = TimeAnchor::activate(params, real_now);
                info!(
                    mode = %params.mode(),
                    speed = params.time_speed,
                    simulated = anchor.simulated,
                    "Simulation clock anchored"
                );
                anchor
            }
        }
    }

    /// Current simulated instant on `anchor`
    pub fn now(&self, anchor: &TimeAnchor) -> SimulatedInstant {
        anchor.instant_at(self.real_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> (ManualWallClock, SimulationClock) {
        let wall = ManualWallClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let clock = SimulationClock::new(Arc::new(wall.clone()));
        (wall, clock)
    }

    #[test]
    fn test_live_mode_starts_at_zero() {
        let (wall, clock) = manual();
        let params = SimulationParameters::new("live");
        let anchor = clock.anchor_for(&params, None);

        let first = clock.now(&anchor);
        assert_eq!(first.simulated_seconds, 0.0);
        assert_eq!(first.timestamp(), wall.now().timestamp());

        wall.advance_secs(5.0);
        assert!((clock.now(&anchor).simulated_seconds - 5.0).abs() < 1e-9);
        assert_eq!(anchor.mode(), SimulationMode::Live);
    }

    #[test]
    fn test_speed_multiplies_elapsed_time() {
        let (wall, clock) = manual();
        let params = SimulationParameters::new("fast").with_time_speed(60.0);
        let anchor = clock.anchor_for(&params, None);

        wall.advance_secs(1.0);
        assert!((clock.now(&anchor).simulated_seconds - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_replay_mode_uses_historical_anchor() {
        let (wall, clock) = manual();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let params = SimulationParameters::new("replay")
            .with_start_time(Some(start))
            .with_time_speed(3600.0);
        let anchor = clock.anchor_for(&params, None);

        assert_eq!(clock.now(&anchor).timestamp(), start.timestamp());
        assert_eq!(anchor.mode(), SimulationMode::Replay);

        wall.advance_secs(2.0);
        let later = clock.now(&anchor);
        assert_eq!(later.timestamp(), start.timestamp() + 7200);
        assert_eq!(later.datetime(), Some(start + Duration::hours(2)));
    }

    #[test]
    fn test_speed_changes_are_continuous() {
        let (wall, clock) = manual();
        let mut params = SimulationParameters::new("continuity");
        let mut anchor = clock.anchor_for(&params, None);

        for (step, speed) in [(0.7, 60.0), (1.3, 0.5), (0.01, 3600.0), (2.9, 1.0), (0.25, 7.5)] {
            wall.advance_secs(step);
            let before = clock.now(&anchor).simulated_seconds;

            params.time_speed = speed;
            anchor = clock.anchor_for(&params, Some(&anchor));
            let after = clock.now(&anchor).simulated_seconds;
            assert!(
                (after - before).abs() <= f64::EPSILON * before.abs().max(1.0),
                "jump of {} at speed change to {}",
                after - before,
                speed
            );
        }
    }

    #[test]
    fn test_rebase_applies_new_speed_from_change() {
        let (wall, clock) = manual();
        let mut params = SimulationParameters::new("rebase");
        let anchor = clock.anchor_for(&params, None);

        wall.advance_secs(10.0);
        params.time_speed = 60.0;
        let rebased = clock.anchor_for(&params, Some(&anchor));
        assert!((rebased.simulated - 10.0).abs() < 1e-9);
        assert_eq!(rebased.epoch_origin, anchor.epoch_origin);

        wall.advance_secs(1.0);
        assert!((clock.now(&rebased).simulated_seconds - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_unchanged_speed_keeps_anchor() {
        let (wall, clock) = manual();
        let params = SimulationParameters::new("steady");
        let anchor = clock.anchor_for(&params, None);

        wall.advance_secs(42.0);
        let in_kilowatts = params.clone().with_output_unit(crate::types::OutputUnit::Kilowatts);
        let kept = clock.anchor_for(&in_kilowatts, Some(&anchor));
        assert_eq!(kept, anchor);
    }

    #[test]
    fn test_new_simulation_starts_new_axis() {
        let (wall, clock) = manual();
        let first = clock.anchor_for(&SimulationParameters::new("one"), None);
        wall.advance_secs(30.0);

        let second = SimulationParameters::new("two");
        let anchor = clock.anchor_for(&second, Some(&first));
        assert_eq!(clock.now(&anchor).simulated_seconds, 0.0);
        assert_eq!(anchor.simulation_id, second.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_system_wall_clock_follows_tokio_time() {
        let wall = SystemWallClock::new();
        let before = wall.now();
        tokio::time::advance(std::time::Duration::from_secs(3)).await;
        assert_eq!((wall.now() - before).num_seconds(), 3);
    }
}
