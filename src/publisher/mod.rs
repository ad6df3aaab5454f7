//! Streaming Publisher
//!
//! This module contains the long-running task that samples the active
//! simulation at a fixed cadence and publishes one message per tick to a
//! message bus, together with the bus seam, its transports, the reconnect
//! backoff and the wire format.
//!
//! # Example
//!
//! ```no_run
//! use energy_stream_simulator::device::Installation;
//! use energy_stream_simulator::publisher::{InMemoryBus, PublisherConfig, StreamingPublisher};
//! use energy_stream_simulator::simulation::{ParameterStore, SimulationParameters};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(ParameterStore::new(SimulationParameters::new("demo"))?);
//! let installation = Arc::new(Installation::default_household()?);
//! let bus = InMemoryBus::new();
//!
//! let handle = StreamingPublisher::new(
//!     Box::new(bus.clone()),
//!     store,
//!     installation,
//!     PublisherConfig::default(),
//! )
//! .spawn();
//! // ...
//! let stats = handle.shutdown().await;
//! println!("published {} messages", stats.published);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod bus;
pub mod message;
pub mod streamer;

pub use backoff::*;
pub use bus::*;
pub use message::*;
pub use streamer::*;
