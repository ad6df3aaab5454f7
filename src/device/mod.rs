//! Device profiles and the Algorithm Engine
//!
//! This module contains the declared and validated forms of device profiles,
//! metered installations, and the pure functions that compute a device's draw
//! at a simulated instant.
//!
//! # Usage Example
//!
//! ```rust
//! use energy_stream_simulator::device::*;
//!
//! let fridge = DeviceProfile::cyclic("Refrigerator", 10.0, 100.0, 10.0, 0.3).unwrap();
//! assert_eq!(power_at(&fridge, 2.0), 100.0);
//! assert_eq!(power_at(&fridge, 5.0), 10.0);
//! ```

pub mod algorithm;
pub mod profile;

pub use algorithm::{power_at, power_at_in, schedule_period, ACTIVE_BUCKET_WIDTH};
pub use profile::{
    AlgorithmSpec, DevicePower, DeviceProfile, DeviceProfileConfig, Installation,
    PowerBreakdown, ScheduleWindow,
};
