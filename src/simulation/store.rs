//! Parameter Store
//!
//! Holds every simulation record, the single active one and its time anchor.
//! All writes go through one write-locked critical section that deactivates
//! the previous holder, installs the replacement, anchors or rebases simulated
//! time and bumps the revision, so readers only ever see whole snapshots.

use super::clock::{SimulatedInstant, SimulationClock, TimeAnchor};
use super::parameters::SimulationParameters;
use crate::types::{ConfigValidationError, SimulationId};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// Immutable view of the active record at one revision
#[derive(Debug, Clone)]
pub struct ActiveSnapshot {
    params: Arc<SimulationParameters>,
    anchor: TimeAnchor,
    revision: u64,
}

impl ActiveSnapshot {
    /// Store revision the snapshot was taken at
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Time anchor of the active simulation at this revision
    pub fn anchor(&self) -> &TimeAnchor {
        &self.anchor
    }

    /// Shared handle to the record
    pub fn params(&self) -> &Arc<SimulationParameters> {
        &self.params
    }
}

impl Deref for ActiveSnapshot {
    type Target = SimulationParameters;

    fn deref(&self) -> &Self::Target {
        &self.params
    }
}

#[derive(Debug)]
struct StoreState {
    records: BTreeMap<SimulationId, SimulationParameters>,
    active: Arc<SimulationParameters>,
    anchor: TimeAnchor,
    revision: u64,
}

impl StoreState {
    fn snapshot(&self) -> ActiveSnapshot {
        ActiveSnapshot {
            params: Arc::clone(&self.active),
            anchor: self.anchor,
            revision: self.revision,
        }
    }

    /// Swap `next` in as the active record; caller holds the write lock
    fn install(
        &mut self,
        mut next: SimulationParameters,
        clock: &SimulationClock,
    ) -> Arc<SimulationParameters> {
        self.anchor = clock.anchor_for(&next, Some(&self.anchor));

        let previous_id = self.active.id;
        if previous_id != next.id {
            if let Some(record) = self.records.get_mut(&previous_id) {
                record.is_active = false;
                record.updated_at = Utc::now();
            }
        }

        next.is_active = true;
        self.records.insert(next.id, next.clone());
        self.revision += 1;
        std::mem::replace(&mut self.active, Arc::new(next))
    }
}

/// Store of simulation records with exactly one active record
#[derive(Debug)]
pub struct ParameterStore {
    state: RwLock<StoreState>,
    revisions: watch::Sender<u64>,
    clock: SimulationClock,
}

impl ParameterStore {
    /// Create a store whose first active record is `initial`, on the system clock
    pub fn new(initial: SimulationParameters) -> Result<Self, ConfigValidationError> {
        Self::with_clock(initial, SimulationClock::system())
    }

    /// Create a store reading real time through `clock`
    ///
    /// The initial record is activated, and its simulated time anchored, now.
    pub fn with_clock(
        initial: SimulationParameters,
        clock: SimulationClock,
    ) -> Result<Self, ConfigValidationError> {
        initial.validate()?;

        let mut initial = initial;
        initial.is_active = true;

        let mut records = BTreeMap::new();
        records.insert(initial.id, initial.clone());

        info!(simulation_id = %initial.id, name = %initial.name, "Parameter store initialized");

        let anchor = clock.anchor_for(&initial, None);
        let (revisions, _) = watch::channel(0);
        Ok(Self {
            state: RwLock::new(StoreState {
                records,
                active: Arc::new(initial),
                anchor,
                revision: 0,
            }),
            revisions,
            clock,
        })
    }

    /// Snapshot of the active record
    pub fn get_active(&self) -> ActiveSnapshot {
        self.state.read().snapshot()
    }

    /// Snapshot of the active record with the simulated instant it is at
    ///
    /// Real time is read under the lock, so the instant always belongs to the
    /// anchor of the returned snapshot.
    pub fn now(&self) -> (ActiveSnapshot, SimulatedInstant) {
        let state = self.state.read();
        let instant = self.clock.now(&state.anchor);
        (state.snapshot(), instant)
    }

    /// Clock the store anchors simulated time with
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Make `next` the active record, returning the one it replaced
    #[instrument(skip(self, next), fields(simulation_id = %next.id))]
    pub fn set_active(
        &self,
        next: SimulationParameters,
    ) -> Result<Arc<SimulationParameters>, ConfigValidationError> {
        next.validate()?;

        let mut state = self.state.write();
        let previous = state.install(next, &self.clock);
        self.revisions.send_replace(state.revision);

        info!(previous = %previous.id, revision = state.revision, "Active simulation swapped");
        Ok(previous)
    }

    /// Read-modify-write of the active record in one critical section
    ///
    /// `update` sees the current record and returns its replacement. The store
    /// is left untouched if it fails or the replacement does not validate.
    pub fn update_active<F>(
        &self,
        update: F,
    ) -> Result<(Arc<SimulationParameters>, ActiveSnapshot), ConfigValidationError>
    where
        F: FnOnce(&SimulationParameters) -> Result<SimulationParameters, ConfigValidationError>,
    {
        let mut state = self.state.write();
        let next = update(state.active.as_ref())?;
        next.validate()?;

        let previous = state.install(next, &self.clock);
        self.revisions.send_replace(state.revision);

        let snapshot = state.snapshot();
        debug!(simulation_id = %snapshot.id, revision = snapshot.revision, "Active simulation updated");
        Ok((previous, snapshot))
    }

    /// Store an inactive record
    pub fn insert(&self, mut params: SimulationParameters) -> Result<(), ConfigValidationError> {
        params.validate()?;

        let mut state = self.state.write();
        if params.id == state.active.id {
            return Err(ConfigValidationError::Inconsistent {
                field: "id".to_string(),
                reason: "use set_active to replace the active simulation".to_string(),
            });
        }
        params.is_active = false;
        state.records.insert(params.id, params);
        Ok(())
    }

    /// Activate a stored record by id
    pub fn activate(
        &self,
        id: SimulationId,
    ) -> Result<Arc<SimulationParameters>, ConfigValidationError> {
        let record = self
            .state
            .read()
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| ConfigValidationError::unsupported("id", id.to_string()))?;
        self.set_active(record)
    }

    /// Every stored record, ordered by id
    pub fn records(&self) -> Vec<SimulationParameters> {
        self.state.read().records.values().cloned().collect()
    }

    /// Number of records flagged active
    pub fn active_count(&self) -> usize {
        self.state.read().records.values().filter(|record| record.is_active).count()
    }

    /// Current revision
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Receiver notified with the new revision after every swap
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }
}
