//! Streaming publisher task
//!
//! One spawned task drives the state machine
//! `Stopped → Connecting → Streaming ⇄ Reconnecting → Stopped`. Every tick
//! reads the active snapshot, resolves simulated time, computes power and
//! publishes one [`BusMessage`]. Ticks missed while reconnecting are dropped.

use super::backoff::ReconnectPolicy;
use super::bus::{BusError, MessageBus};
use super::message::{topic_for, BusMessage};
use crate::device::Installation;
use crate::simulation::{ParameterStore, RecoveryStrategy, SimulationError, SimulationResult};
use crate::stream_event;
use crate::types::RuntimeConfig;
use crate::units;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument};

/// Lifecycle state of the publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublisherState {
    /// Not running
    Stopped,
    /// Establishing the first connection
    Connecting,
    /// Publishing one message per tick
    Streaming,
    /// Connection lost; retrying with backoff
    Reconnecting,
}

impl PublisherState {
    /// Upper-case label
    pub fn label(&self) -> &'static str {
        match self {
            PublisherState::Stopped => "STOPPED",
            PublisherState::Connecting => "CONNECTING",
            PublisherState::Streaming => "STREAMING",
            PublisherState::Reconnecting => "RECONNECTING",
        }
    }
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shortest tick cadence the publisher runs at
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Timing settings of the publisher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublisherConfig {
    /// Topic prefix; the simulation id is appended
    pub topic_prefix: String,
    /// Wall-clock cadence of ticks
    pub tick_interval: Duration,
    /// Deadline for one connect attempt
    pub connect_timeout: Duration,
    /// Deadline for one publish
    pub publish_timeout: Duration,
    /// Delays between connect attempts
    pub reconnect: ReconnectPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

impl PublisherConfig {
    /// Publisher settings from the runtime configuration
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            topic_prefix: config.topic_prefix.clone(),
            tick_interval: Duration::from_millis(config.tick_interval_ms).max(MIN_TICK_INTERVAL),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
            reconnect: ReconnectPolicy::new(
                Duration::from_millis(config.reconnect_initial_ms),
                Duration::from_millis(config.reconnect_max_ms),
            ),
        }
    }

    /// Set the tick cadence
    ///
    /// Clamped to at least [`MIN_TICK_INTERVAL`].
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(MIN_TICK_INTERVAL);
        self
    }

    /// Set the reconnect policy
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
    connect_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Publisher counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    /// Messages delivered to the bus
    pub published: u64,
    /// Publishes that failed or timed out
    pub failed: u64,
    /// Ticks dropped while reconnecting
    pub dropped: u64,
    /// Ticks skipped after a computation error
    pub skipped: u64,
    /// Connect attempts that failed or timed out
    pub connect_failures: u64,
    /// Successful reconnections after a lost connection
    pub reconnects: u64,
}

/// Publisher waiting to be spawned
#[derive(Debug)]
pub struct StreamingPublisher {
    bus: Box<dyn MessageBus>,
    store: Arc<ParameterStore>,
    installation: Arc<Installation>,
    config: PublisherConfig,
}

impl StreamingPublisher {
    /// Create a publisher
    ///
    /// Simulated time is read from the store, so the publisher and every other
    /// consumer of `store` share one axis.
    pub fn new(
        bus: Box<dyn MessageBus>,
        store: Arc<ParameterStore>,
        installation: Arc<Installation>,
        config: PublisherConfig,
    ) -> Self {
        Self { bus, store, installation, config }
    }

    /// Start the publisher task on the current runtime
    pub fn spawn(self) -> PublisherHandle {
        let (state_tx, state_rx) = watch::channel(PublisherState::Stopped);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let runner = Runner {
            bus: self.bus,
            store: self.store,
            installation: self.installation,
            config: self.config,
            state: state_tx,
            shutdown: shutdown_rx,
            counters: Arc::clone(&counters),
        };
        let task = tokio::spawn(runner.run());

        PublisherHandle { state: state_rx, shutdown: shutdown_tx, counters, task }
    }
}

/// Control handle of a running publisher
///
/// Dropping the handle also stops the task.
#[derive(Debug)]
pub struct PublisherHandle {
    state: watch::Receiver<PublisherState>,
    shutdown: watch::Sender<bool>,
    counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl PublisherHandle {
    /// Current state
    pub fn state(&self) -> PublisherState {
        *self.state.borrow()
    }

    /// Receiver of state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<PublisherState> {
        self.state.clone()
    }

    /// Current counters
    pub fn stats(&self) -> PublisherStats {
        self.counters.snapshot()
    }

    /// Wait until the publisher reaches `target`
    ///
    /// Returns `false` if the task ends first.
    pub async fn wait_for(&self, target: PublisherState) -> bool {
        let mut receiver = self.state.clone();
        let reached = receiver.wait_for(|state| *state == target).await.is_ok();
        reached
    }

    /// Stop the publisher and wait for it to reach `Stopped`
    ///
    /// The tick in progress completes; a pending connect attempt is abandoned.
    pub async fn shutdown(self) -> PublisherStats {
        self.shutdown.send_replace(true);
        if let Err(err) = self.task.await {
            error!(error = %err, "Publisher task did not finish cleanly");
        }
        self.counters.snapshot()
    }
}

#[derive(Debug)]
enum Established {
    Connected,
    Shutdown,
}

struct Runner {
    bus: Box<dyn MessageBus>,
    store: Arc<ParameterStore>,
    installation: Arc<Installation>,
    config: PublisherConfig,
    state: watch::Sender<PublisherState>,
    shutdown: watch::Receiver<bool>,
    counters: Arc<Counters>,
}

impl Runner {
    fn set_state(&self, next: PublisherState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            stream_event!(
                info,
                "Publisher state changed",
                from = previous.label(),
                to = next.label(),
                bus = self.bus.name(),
            );
        }
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    #[instrument(skip(self), fields(bus = self.bus.name()))]
    async fn run(mut self) {
        self.set_state(PublisherState::Connecting);
        if let Established::Connected = self.establish().await {
            self.stream().await;
        }

        self.release_bus().await;
        self.set_state(PublisherState::Stopped);
        debug!(stats = ?self.counters.snapshot(), "Publisher task exited");
    }

    async fn stream(&mut self) {
        self.set_state(PublisherState::Streaming);
        let mut ticker = interval(self.config.tick_interval.max(MIN_TICK_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if self.stopping() {
                break;
            }

            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let Err(err) = self.tick().await else {
                        continue;
                    };

                    match err.report("publisher tick") {
                        RecoveryStrategy::Reconnect => {
                            self.set_state(PublisherState::Reconnecting);
                            let lost = Instant::now();
                            if !self.release_bus().await {
                                break;
                            }
                            match self.establish().await {
                                Established::Connected => {
                                    self.record_dropped_ticks(lost.elapsed());
                                    Counters::bump(&self.counters.reconnects);
                                    self.set_state(PublisherState::Streaming);
                                    ticker.reset_immediately();
                                }
                                Established::Shutdown => break,
                            }
                        }
                        RecoveryStrategy::Skip | RecoveryStrategy::Abort => {
                            Counters::bump(&self.counters.skipped);
                        }
                    }
                }
            }
        }
    }

    /// Disconnect within `connect_timeout`
    ///
    /// Returns `false` if a shutdown arrived first. Once stopping, only the
    /// deadline bounds the wait.
    async fn release_bus(&mut self) -> bool {
        let deadline = self.config.connect_timeout;
        let stopping = self.stopping();
        let released = tokio::select! {
            biased;
            _ = self.shutdown.changed(), if !stopping => return false,
            released = timeout(deadline, self.bus.disconnect()) => released,
        };

        if released.is_err() {
            stream_event!(
                warn,
                "Disconnect abandoned",
                timeout_ms = millis(deadline),
            );
        }
        true
    }

    /// Connect with backoff until connected or told to stop
    async fn establish(&mut self) -> Established {
        let mut backoff = self.config.reconnect.backoff();

        loop {
            if self.stopping() {
                return Established::Shutdown;
            }

            let deadline = self.config.connect_timeout;
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.changed() => return Established::Shutdown,
                result = timeout(deadline, self.bus.connect()) => result,
            };

            let failure = match attempt {
                Ok(Ok(())) => {
                    stream_event!(
                        info,
                        "Connected to message bus",
                        attempts = backoff.attempts() + 1,
                    );
                    return Established::Connected;
                }
                Ok(Err(err)) => err,
                Err(_) => BusError::Timeout { operation: "connect", millis: millis(deadline) },
            };

            Counters::bump(&self.counters.connect_failures);
            let delay = backoff.next_delay();
            stream_event!(
                warn,
                "Connect attempt failed",
                error = tracing::field::display(&failure),
                attempt = backoff.attempts(),
                retry_in_ms = millis(delay),
            );

            tokio::select! {
                biased;
                _ = self.shutdown.changed() => return Established::Shutdown,
                _ = sleep(delay) => {}
            }
        }
    }

    fn record_dropped_ticks(&self, outage: Duration) {
        let tick = self.config.tick_interval.as_nanos().max(1);
        let dropped = (outage.as_nanos() / tick) as u64;
        if dropped > 0 {
            self.counters.dropped.fetch_add(dropped, Ordering::Relaxed);
            stream_event!(debug, "Ticks dropped while disconnected", dropped = dropped);
        }
    }

    /// Sample, convert and publish one message
    async fn tick(&mut self) -> SimulationResult<()> {
        let (snapshot, instant) = self.store.now();
        let at = snapshot.algorithm_time(instant.simulated_seconds);

        let watts = self.installation.power_at(at, snapshot.time_unit);
        if !watts.is_finite() {
            return Err(SimulationError::computation_error(format!(
                "non-finite power {} at simulated time {}",
                watts, instant.simulated_seconds
            )));
        }

        let converted = units::convert(watts, snapshot.output_unit, snapshot.time_unit);
        let message = BusMessage::new(&snapshot, &instant, converted);
        let payload = message.to_payload()?;
        let topic = topic_for(&self.config.topic_prefix, snapshot.id);

        let deadline = self.config.publish_timeout;
        let outcome = match timeout(deadline, self.bus.publish(&topic, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(BusError::Timeout { operation: "publish", millis: millis(deadline) }),
        };

        match outcome {
            Ok(()) => {
                Counters::bump(&self.counters.published);
                debug!(
                    topic = %topic,
                    value = message.value,
                    unit = %message.unit,
                    timestamp = message.timestamp,
                    revision = snapshot.revision(),
                    "Published"
                );
                Ok(())
            }
            Err(err) => {
                Counters::bump(&self.counters.failed);
                Err(err.into())
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
