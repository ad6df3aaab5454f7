//! Algorithm Engine
//!
//! Pure functions computing the instantaneous draw of a device, in watts, at a
//! point on the algorithm time axis. The axis is measured in the simulation's
//! time unit, so a cycle period of 30 means 30 seconds under `seconds` and 30
//! minutes under `minutes`.

use super::profile::{
    AlgorithmSpec, DevicePower, DeviceProfile, Installation, PowerBreakdown, ScheduleWindow,
};
use crate::types::TimeUnit;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Width of one active-algorithm bucket, in algorithm time units
pub const ACTIVE_BUCKET_WIDTH: f64 = 60.0;

/// Schedule period used when a profile declares none
pub const DEFAULT_SCHEDULE_PERIOD_SECONDS: f64 = 24.0 * 3_600.0;

/// Negative and non-finite times collapse to the origin
fn clamp_time(t: f64) -> f64 {
    if t.is_finite() && t > 0.0 {
        t
    } else {
        0.0
    }
}

/// Draw of `profile` at `t`, with the axis in seconds
pub fn power_at(profile: &DeviceProfile, t: f64) -> f64 {
    power_at_in(profile, t, TimeUnit::Seconds)
}

/// Draw of `profile` at `t`, with the axis measured in `time_unit`
pub fn power_at_in(profile: &DeviceProfile, t: f64, time_unit: TimeUnit) -> f64 {
    let t = clamp_time(t);

    match &profile.algorithm {
        AlgorithmSpec::Constant => profile.base_consumption,
        AlgorithmSpec::Cyclic { cycle_period, duty_fraction } => {
            let phase = t % cycle_period;
            if phase < cycle_period * duty_fraction {
                profile.peak_consumption
            } else {
                profile.base_consumption
            }
        }
        AlgorithmSpec::Schedule { windows, period } => {
            let default_period = DEFAULT_SCHEDULE_PERIOD_SECONDS / time_unit.seconds();
            let period = schedule_period(windows, period.unwrap_or(default_period));
            let offset = t % period;

            windows
                .iter()
                .find(|window| window.contains(offset))
                .map(|window| window.level)
                .unwrap_or(profile.base_consumption)
        }
        AlgorithmSpec::Active {
            activation_probability,
            min_active_duration,
            max_active_duration,
            seed,
        } => {
            let seed = seed.unwrap_or_else(|| profile.id.fingerprint());
            let episode = EpisodeShape::new(*min_active_duration, *max_active_duration);
            if is_active(seed, *activation_probability, episode, t) {
                profile.peak_consumption
            } else {
                profile.base_consumption
            }
        }
    }
}

/// Repeating period of a schedule: the base period, stretched to cover every window
pub fn schedule_period(windows: &[ScheduleWindow], base_period: f64) -> f64 {
    windows.iter().map(ScheduleWindow::end).fold(base_period, f64::max)
}

/// Episode length bounds, in whole buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EpisodeShape {
    min_buckets: u64,
    max_buckets: u64,
}

impl EpisodeShape {
    fn new(min_duration: f64, max_duration: f64) -> Self {
        let to_buckets = |duration: f64| ((duration / ACTIVE_BUCKET_WIDTH).ceil() as u64).max(1);
        let min_buckets = to_buckets(min_duration);
        let max_buckets = to_buckets(max_duration).max(min_buckets);
        Self { min_buckets, max_buckets }
    }
}

/// Mix a profile seed with a bucket index into an RNG seed
fn episode_key(seed: u64, bucket: u64) -> u64 {
    // splitmix64 finalizer
    let mut z = seed ^ bucket.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Length in buckets of the episode starting at `bucket`, if one starts there
fn episode_starting_at(
    seed: u64,
    probability: f64,
    shape: EpisodeShape,
    bucket: u64,
) -> Option<u64> {
    let mut rng = StdRng::seed_from_u64(episode_key(seed, bucket));
    let starts = rng.gen::<f64>() < probability;
    let length = rng.gen_range(shape.min_buckets..=shape.max_buckets);
    starts.then_some(length)
}

/// Whether any episode covers the bucket containing `t`
///
/// Only buckets close enough to still cover the current one are examined, so
/// the answer depends on the seed and the bucket alone.
fn is_active(seed: u64, probability: f64, shape: EpisodeShape, t: f64) -> bool {
    if probability <= 0.0 {
        return false;
    }

    let bucket = (t / ACTIVE_BUCKET_WIDTH).floor() as u64;
    let first = bucket.saturating_sub(shape.max_buckets - 1);

    (first..=bucket).any(|start| {
        episode_starting_at(seed, probability, shape, start)
            .map_or(false, |length| start + length > bucket)
    })
}

impl DeviceProfile {
    /// Draw at `t` with the axis measured in `time_unit`
    pub fn power_at(&self, t: f64, time_unit: TimeUnit) -> f64 {
        power_at_in(self, t, time_unit)
    }
}

impl Installation {
    /// Total draw at `t`: the meter base plus every device
    pub fn power_at(&self, t: f64, time_unit: TimeUnit) -> f64 {
        self.base_consumption
            + self.devices.iter().map(|device| power_at_in(device, t, time_unit)).sum::<f64>()
    }

    /// Per-device decomposition of the draw at `t`
    pub fn breakdown_at(&self, t: f64, time_unit: TimeUnit) -> PowerBreakdown {
        let devices: Vec<DevicePower> = self
            .devices
            .iter()
            .map(|device| DevicePower {
                device_id: device.id,
                name: device.name.clone(),
                watts: power_at_in(device, t, time_unit),
            })
            .collect();
        let total = self.base_consumption + devices.iter().map(|d| d.watts).sum::<f64>();

        PowerBreakdown { meter_base: self.base_consumption, devices, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fridge() -> DeviceProfile {
        DeviceProfile::cyclic("fridge", 10.0, 100.0, 10.0, 0.3).unwrap()
    }

    #[test]
    fn test_constant() {
        let router = DeviceProfile::constant("router", 12.0).unwrap();
        for t in [0.0, 1.0, 3_600.0, 1e9] {
            assert_eq!(power_at(&router, t), 12.0);
        }
    }

    #[test]
    fn test_cyclic_periodicity() {
        let profile = fridge();
        for cycle in 0..5 {
            let origin = cycle as f64 * 10.0;
            for offset in [0.0, 1.0, 2.5, 2.99] {
                assert_eq!(power_at(&profile, origin + offset), 100.0, "t = {}", origin + offset);
            }
            for offset in [3.0, 5.0, 9.99] {
                assert_eq!(power_at(&profile, origin + offset), 10.0, "t = {}", origin + offset);
            }
        }
    }

    #[test]
    fn test_schedule_lookup() {
        let profile =
            DeviceProfile::schedule("lamp", 10.0, vec![ScheduleWindow::new(0.0, 5.0, 100.0)], None)
                .unwrap();
        assert_eq!(power_at(&profile, 2.0), 100.0);
        assert_eq!(power_at(&profile, 7.0), 10.0);
        // Default period is one day
        assert_eq!(power_at(&profile, 86_400.0 + 2.0), 100.0);
    }

    #[test]
    fn test_schedule_explicit_period_and_first_match() {
        let windows = vec![ScheduleWindow::new(2.0, 4.0, 50.0), ScheduleWindow::new(3.0, 4.0, 80.0)];
        let profile = DeviceProfile::schedule("pump", 1.0, windows, Some(10.0)).unwrap();
        assert_eq!(power_at(&profile, 3.0), 50.0);
        assert_eq!(power_at(&profile, 6.5), 80.0);
        assert_eq!(power_at(&profile, 13.0), 50.0);
        assert_eq!(power_at(&profile, 19.0), 1.0);
    }

    #[test]
    fn test_schedule_period_follows_time_unit() {
        let profile =
            DeviceProfile::schedule("lamp", 0.0, vec![ScheduleWindow::new(6.0, 2.0, 60.0)], None)
                .unwrap();
        // 24 hours is 24 units under hours
        assert_eq!(power_at_in(&profile, 24.0 + 7.0, TimeUnit::Hours), 60.0);
        assert_eq!(power_at_in(&profile, 24.0 + 9.0, TimeUnit::Hours), 0.0);
    }

    #[test]
    fn test_negative_and_non_finite_time_clamp_to_origin() {
        let profile = fridge();
        assert_eq!(power_at(&profile, -5.0), power_at(&profile, 0.0));
        assert_eq!(power_at(&profile, f64::NAN), power_at(&profile, 0.0));
        assert_eq!(power_at(&profile, f64::NEG_INFINITY), 100.0);
    }

    #[test]
    fn test_active_is_stable_within_a_bucket() {
        let profile = DeviceProfile::active("kettle", 1.0, 2000.0, 0.3, 60.0, 240.0)
            .unwrap()
            .with_seed(42);

        for bucket in 0..200 {
            let start = bucket as f64 * ACTIVE_BUCKET_WIDTH;
            let first = power_at(&profile, start);
            for offset in [0.5, 17.0, 59.9] {
                assert_eq!(power_at(&profile, start + offset), first);
            }
        }
    }

    #[test]
    fn test_active_is_deterministic_per_seed() {
        let a = DeviceProfile::active("kettle", 1.0, 2000.0, 0.3, 60.0, 240.0).unwrap().with_seed(7);
        let b = a.clone();
        let samples: Vec<f64> = (0..500).map(|i| power_at(&a, i as f64 * 60.0)).collect();
        let again: Vec<f64> = (0..500).map(|i| power_at(&b, i as f64 * 60.0)).collect();
        assert_eq!(samples, again);
    }

    #[test]
    fn test_active_probability_extremes() {
        let never = DeviceProfile::active("idle", 3.0, 900.0, 0.0, 60.0, 120.0).unwrap();
        let always = DeviceProfile::active("busy", 3.0, 900.0, 1.0, 60.0, 120.0).unwrap();
        for i in 0..100 {
            let t = i as f64 * 37.0;
            assert_eq!(power_at(&never, t), 3.0);
            assert_eq!(power_at(&always, t), 900.0);
        }
    }

    #[test]
    fn test_active_episodes_respect_length_bounds() {
        // Episodes of exactly three buckets, rare enough to be separated
        let profile = DeviceProfile::active("dryer", 0.0, 500.0, 0.02, 180.0, 180.0)
            .unwrap()
            .with_seed(99);
        let states: Vec<bool> =
            (0..20_000).map(|b| power_at(&profile, b as f64 * ACTIVE_BUCKET_WIDTH) > 0.0).collect();

        assert!(states.iter().any(|on| *on));
        // Every maximal on-run is at least one full episode long
        let mut run = 0;
        for on in states.iter().copied().chain(std::iter::once(false)) {
            if on {
                run += 1;
            } else {
                if run > 0 {
                    assert!(run >= 3, "run of {} buckets", run);
                }
                run = 0;
            }
        }
    }

    #[test]
    fn test_installation_total_and_breakdown() {
        let installation = Installation::new("home", 50.0)
            .with_device(fridge())
            .with_device(DeviceProfile::constant("router", 12.0).unwrap());

        assert_eq!(installation.power_at(1.0, TimeUnit::Seconds), 50.0 + 100.0 + 12.0);
        assert_eq!(installation.power_at(5.0, TimeUnit::Seconds), 50.0 + 10.0 + 12.0);

        let breakdown = installation.breakdown_at(5.0, TimeUnit::Seconds);
        assert_eq!(breakdown.meter_base, 50.0);
        assert_eq!(breakdown.devices.len(), 2);
        assert_eq!(breakdown.devices[0].watts, 10.0);
        assert_eq!(breakdown.total, 72.0);
    }
}
